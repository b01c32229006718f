// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! VNC client session management.
//!
//! A [`Session`] owns one connection to a VNC server from the handshake to
//! the end. It reads server messages one at a time, draws framebuffer
//! updates through the display (keeping the local cursor out of the way of
//! incoming rectangles) and sends key and pointer events, either on request
//! or from the local input channel while it waits for the server.
//!
//! # Update Loop
//!
//! [`Session::run`] follows the classic polling viewer:
//!
//! 1. Request a full framebuffer update
//! 2. Handle the next server message and report it
//! 3. Request an incremental update
//! 4. Service local input for the poll interval, then go back to 2

use crate::auth::Credentials;
use crate::config::SessionConfig;
use crate::display::Display;
use crate::encoding::{Decoders, UpdateContext};
use crate::error::{Result, VncError};
use crate::events::{InputEvent, SessionEvent};
use crate::handshake::{handshake, negotiate_format};
use crate::protocol::{
    ClientMessage, Rectangle, ServerInit, ENCODING_LAST_RECT, SERVER_MSG_BELL,
    SERVER_MSG_FRAMEBUFFER_UPDATE, SERVER_MSG_SERVER_CUT_TEXT, SERVER_MSG_SET_COLOUR_MAP_ENTRIES,
};
use crate::surface::Surface;
use crate::transport::{IdleHook, Transport};
use log::{debug, info, trace};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;

#[cfg(feature = "debug-logging")]
use crate::transport::hex_prefix;

/// Bytes per colour map entry (three u16 channels).
const COLOUR_MAP_ENTRY_LEN: usize = 6;

/// A connected VNC session drawing onto a surface of type `O`.
pub struct Session<S, O> {
    transport: Transport<S>,
    display: Display<O>,
    decoders: Decoders,
    server_init: ServerInit,
    config: SessionConfig,
}

impl<O: Surface> Session<TcpStream, O> {
    /// Connects to the server named in `config` over TCP.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Io`] if the connection cannot be made, otherwise
    /// whatever [`Session::connect`] reports.
    pub async fn connect_tcp<C>(
        config: SessionConfig,
        surface: O,
        creds: &mut C,
        input: Option<UnboundedReceiver<InputEvent>>,
    ) -> Result<Self>
    where
        C: Credentials + ?Sized,
    {
        config.validate()?;
        let addr = &config.address;
        info!("Connecting to {addr} (port {})", addr.port());
        let stream = TcpStream::connect((addr.host.as_str(), addr.port())).await?;
        stream.set_nodelay(true)?;
        Self::connect(stream, config, surface, creds, input).await
    }
}

impl<S, O> Session<S, O>
where
    S: AsyncRead + AsyncWrite + Unpin,
    O: Surface,
{
    /// Runs the handshake and format negotiation over an open stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - Connected byte stream to the server
    /// * `config` - Session configuration, validated first
    /// * `surface` - Where the remote desktop is drawn
    /// * `creds` - Asked for a password if the server wants one and `config` has none
    /// * `input` - Local input, serviced whenever the session waits on the server
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Config`] for an invalid configuration, or any
    /// handshake failure.
    pub async fn connect<C>(
        stream: S,
        config: SessionConfig,
        surface: O,
        creds: &mut C,
        input: Option<UnboundedReceiver<InputEvent>>,
    ) -> Result<Self>
    where
        C: Credentials + ?Sized,
    {
        config.validate()?;
        let mut transport = Transport::new(stream);
        let server_init = handshake(&mut transport, &config, creds).await?;
        negotiate_format(&mut transport, &config).await?;

        let server_size = (server_init.framebuffer_width, server_init.framebuffer_height);
        let format = config.pixel_format.clone();
        let mut display = if config.centre {
            Display::centred(surface, format, server_size)
        } else {
            Display::new(surface, format, server_size)
        };
        if let Some(input) = input {
            display.set_input(input);
        }

        Ok(Self {
            transport,
            display,
            decoders: Decoders::new(),
            server_init,
            config,
        })
    }

    /// The server's `ServerInit` message.
    pub fn server_init(&self) -> &ServerInit {
        &self.server_init
    }

    /// The configuration this session runs with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The display state: surface, cursor and pointer.
    pub fn display(&self) -> &Display<O> {
        &self.display
    }

    /// The output surface.
    pub fn surface(&self) -> &O {
        self.display.surface()
    }

    /// The session's decoders and their stream state.
    pub fn decoders(&self) -> &Decoders {
        &self.decoders
    }

    /// Ends the session, returning the surface.
    pub fn into_surface(self) -> O {
        self.display.into_surface()
    }

    /// Asks for an update of the whole server framebuffer.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Io`] if the socket fails.
    pub async fn request_update(&mut self, incremental: bool) -> Result<()> {
        self.transport
            .send(&ClientMessage::FramebufferUpdateRequest {
                incremental,
                x: 0,
                y: 0,
                width: self.server_init.framebuffer_width,
                height: self.server_init.framebuffer_height,
            })
            .await
    }

    /// Sends a key press or release.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Io`] if the socket fails.
    pub async fn send_key(&mut self, key: u32, down: bool) -> Result<()> {
        self.transport.send(&ClientMessage::KeyEvent { down, key }).await
    }

    /// Sends an absolute pointer position and button mask.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Io`] if the socket fails.
    pub async fn send_pointer(&mut self, x: u16, y: u16, button_mask: u8) -> Result<()> {
        self.transport
            .send(&ClientMessage::PointerEvent { button_mask, x, y })
            .await
    }

    /// Sends clipboard text to the server.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Io`] if the socket fails.
    pub async fn send_cut_text(&mut self, text: &str) -> Result<()> {
        self.transport
            .send(&ClientMessage::ClientCutText(text.to_string()))
            .await
    }

    /// Reads and handles one server message.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Protocol`] for unknown message types or
    /// encodings, and any decoder or socket error.
    pub async fn handle_server_message(&mut self) -> Result<SessionEvent> {
        let msg_type = self.transport.read_u8(&mut self.display).await?;
        match msg_type {
            SERVER_MSG_FRAMEBUFFER_UPDATE => {
                let rects = self.handle_framebuffer_update().await?;
                Ok(SessionEvent::FramebufferUpdated { rects })
            }
            SERVER_MSG_SET_COLOUR_MAP_ENTRIES => {
                self.transport.read_u8(&mut self.display).await?; // padding
                let first = self.transport.read_u16(&mut self.display).await?;
                let count = self.transport.read_u16(&mut self.display).await?;
                self.transport
                    .read_vec(usize::from(count) * COLOUR_MAP_ENTRY_LEN, &mut self.display)
                    .await?;
                debug!("Ignoring {count} colour map entries from {first}");
                Ok(SessionEvent::ColourMapEntries { first, count })
            }
            SERVER_MSG_BELL => {
                debug!("Bell");
                Ok(SessionEvent::Bell)
            }
            SERVER_MSG_SERVER_CUT_TEXT => {
                let mut padding = [0u8; 3];
                self.transport.read_exact(&mut padding, &mut self.display).await?;
                let len = self.transport.read_u32(&mut self.display).await? as usize;
                let text = self.transport.read_vec(len, &mut self.display).await?;
                debug!("Server cut text: {len} bytes");
                // ServerCutText is Latin-1, which maps one to one onto chars.
                Ok(SessionEvent::CutText(text.into_iter().map(char::from).collect()))
            }
            other => Err(VncError::protocol(format!("unknown server message type {other}"))),
        }
    }

    /// Draws every rectangle of one update, returning how many were read.
    async fn handle_framebuffer_update(&mut self) -> Result<u16> {
        self.transport.read_u8(&mut self.display).await?; // padding
        let count = self.transport.read_u16(&mut self.display).await?;
        trace!("Framebuffer update with {count} rectangles");

        let mut header = [0u8; Rectangle::HEADER_LEN];
        for done in 0..count {
            self.transport.read_exact(&mut header, &mut self.display).await?;
            let rect = Rectangle::from_header(&header);

            #[cfg(feature = "debug-logging")]
            trace!("Rectangle header: {}", hex_prefix(&header));

            if rect.encoding == ENCODING_LAST_RECT {
                debug!("LastRect after {done} of {count} rectangles");
                return Ok(done + 1);
            }
            trace!(
                "Rectangle {}x{} at ({}, {}), encoding {}",
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                rect.encoding
            );
            // Pseudo-encodings (negative ids) reuse the geometry fields.
            if rect.encoding >= 0 {
                self.check_bounds(&rect)?;
            }

            self.display.lock_area(rect.x, rect.y, rect.width, rect.height);
            let mut ctx = UpdateContext::new(&mut self.transport, &mut self.display);
            let result = self.decoders.decode(&rect, &mut ctx).await;
            self.display.unlock();
            result?;
        }
        Ok(count)
    }

    /// Rejects a drawing rectangle reaching past the server framebuffer.
    fn check_bounds(&self, rect: &Rectangle) -> Result<()> {
        let right = u32::from(rect.x) + u32::from(rect.width);
        let bottom = u32::from(rect.y) + u32::from(rect.height);
        if right > u32::from(self.server_init.framebuffer_width)
            || bottom > u32::from(self.server_init.framebuffer_height)
        {
            return Err(VncError::protocol(format!(
                "rectangle {}x{} at ({}, {}) outside {}x{} framebuffer",
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                self.server_init.framebuffer_width,
                self.server_init.framebuffer_height
            )));
        }
        Ok(())
    }

    /// Services local input until `period` has passed.
    async fn idle(&mut self, period: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + period;
        loop {
            let event = tokio::select! {
                () = tokio::time::sleep_until(deadline) => return Ok(()),
                event = self.display.next_event() => event,
            };
            self.transport.service(&mut self.display, event).await?;
        }
    }

    /// Runs the update loop until `on_event` breaks or an error occurs.
    ///
    /// Every handled server message is passed to `on_event`.
    ///
    /// # Errors
    ///
    /// Returns the first error; the session cannot continue after one.
    pub async fn run<F>(&mut self, mut on_event: F) -> Result<()>
    where
        F: FnMut(&SessionEvent) -> ControlFlow<()>,
    {
        self.request_update(false).await?;
        loop {
            let event = self.handle_server_message().await?;
            if on_event(&event).is_break() {
                info!("Session loop stopped");
                return Ok(());
            }
            self.request_update(true).await?;
            self.idle(self.config.poll_interval).await?;
        }
    }
}
