//! Headless VNC viewer example.
//!
//! Connects to a VNC server, renders the remote desktop into an in-memory
//! framebuffer and nudges the pointer around while updates arrive.
//!
//! Usage:
//!   cargo run --example headless_viewer -- host[:display] [updates]
//!
//! The password is taken from `VNC_PASSWORD`, or prompted for if the server
//! asks for one.

use rfbview::{
    Credentials, Framebuffer, InputEvent, ServerAddress, Session, SessionConfig, SessionEvent,
    StaticPassword, TerminalPrompt,
};
use std::error::Error;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(target) = args.next() else {
        eprintln!("usage: headless_viewer host[:display] [updates]");
        std::process::exit(2);
    };
    let wanted: usize = args.next().map(|n| n.parse()).transpose()?.unwrap_or(10);

    let config = SessionConfig::new(ServerAddress::parse(&target)?)
        .with_encodings(["tight", "hextile", "zlib", "copyrect"])
        .with_compress_level(6)
        .with_quality(7);
    let surface = Framebuffer::new(1024, 768, config.pixel_format.clone());

    let mut creds: Box<dyn Credentials> = match std::env::var("VNC_PASSWORD") {
        Ok(password) => Box::new(StaticPassword::new(password)),
        Err(_) => Box::new(TerminalPrompt),
    };

    // Pointer wiggle: a small square, one step every 200ms
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let steps = [(8, 0), (0, 8), (-8, 0), (0, -8)];
        for (dx, dy) in steps.iter().cycle() {
            time::sleep(Duration::from_millis(200)).await;
            if tx.send(InputEvent::PointerMove { dx: *dx, dy: *dy }).is_err() {
                break;
            }
        }
    });

    let mut session = Session::connect_tcp(config, surface, creds.as_mut(), Some(rx)).await?;
    let init = session.server_init();
    println!(
        "Connected to \"{}\" ({}x{})",
        init.name, init.framebuffer_width, init.framebuffer_height
    );

    let mut updates = 0;
    session
        .run(|event| {
            match event {
                SessionEvent::FramebufferUpdated { rects } => {
                    updates += 1;
                    println!("Update {updates}: {rects} rectangles");
                }
                SessionEvent::CutText(text) => println!("Clipboard: {text}"),
                other => println!("{other:?}"),
            }
            if updates >= wanted {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;

    let pointer = session.display().pointer();
    println!("Done; pointer at ({}, {})", pointer.x, pointer.y);
    Ok(())
}
