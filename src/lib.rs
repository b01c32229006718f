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


//! # rfbview
//!
//! A pure Rust VNC (Virtual Network Computing) client engine.
//!
//! This library speaks the RFB (Remote Framebuffer) protocol, version 3.3, and
//! renders the remote desktop onto any local drawing surface: a frame buffer
//! device, a window, or the in-memory [`Framebuffer`]. There is no window
//! manager involved; the client draws its own cursor and keeps it clear of
//! incoming updates.
//!
//! ## Features
//!
//! - **7 encoding types**: Raw, CopyRect, RRE, CoRRE, Hextile, Zlib, Tight
//! - **Tight encoding**: fill, JPEG, and the copy, palette and gradient
//!   filters over four persistent zlib streams
//! - **Local cursor**: RichCursor shapes composited on the client side
//! - **VNC authentication**: DES challenge-response
//! - **Async I/O**: Built on Tokio; local input is serviced while waiting on
//!   the server
//! - **Optional TurboJPEG**: libjpeg-turbo JPEG decoding via feature flag
//!
//! ## Quick Start
//!
//! ```no_run
//! use rfbview::{Framebuffer, ServerAddress, Session, SessionConfig, StaticPassword};
//! use std::ops::ControlFlow;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new(ServerAddress::parse("localhost:1")?)
//!         .with_encodings(["tight", "hextile"]);
//!     let surface = Framebuffer::new(1024, 768, config.pixel_format.clone());
//!
//!     let mut session =
//!         Session::connect_tcp(config, surface, &mut StaticPassword::new("secret"), None).await?;
//!
//!     // Stop after the first framebuffer update
//!     session.run(|_event| ControlFlow::Break(())).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Your Application              │
//! │                                         │
//! │  • Provide the output surface           │
//! │  • Feed local input events              │
//! │  • Receive session events               │
//! └──────────────────┬──────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │            Session (Public)             │
//! │                                         │
//! │  • Handshake and negotiation            │
//! │  • Server message dispatch              │
//! │  • Update requests                      │
//! └──────────────────┬──────────────────────┘
//!                    │
//!        ┌───────────┼───────────┐
//!        ▼           ▼           ▼
//!   ┌─────────┐ ┌─────────┐ ┌─────────┐
//!   │Transport│ │Decoders │ │ Display │
//!   └─────────┘ └─────────┘ └─────────┘
//!        │           │           │
//!        └───────────┴───────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │        Surface + Cursor Compositor      │
//! │                                         │
//! │  • Clipped draw calls                   │
//! │  • Saved area under the cursor          │
//! │  • Lock / unlock around rectangles      │
//! └─────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod config;
pub mod cursor;
pub mod display;
pub mod encoding;
pub mod error;
pub mod events;
pub mod framebuffer;
pub mod handshake;
pub mod jpeg;
pub mod protocol;
pub mod surface;
pub mod transport;

// Internal modules
mod translate;

// Re-exports
pub use auth::{Credentials, StaticPassword, TerminalPrompt};
pub use client::Session;
pub use config::{ServerAddress, SessionConfig, DEFAULT_PORT};
pub use display::Display;
pub use error::{ErrorClass, Result, VncError};
pub use events::{InputEvent, SessionEvent};
pub use framebuffer::Framebuffer;
pub use protocol::{PixelFormat, PROTOCOL_VERSION};
pub use surface::{AreaId, Surface};
pub use translate::PixelCodec;
