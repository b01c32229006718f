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

//! Session configuration.
//!
//! A [`SessionConfig`] is built once, checked with [`SessionConfig::validate`]
//! and then owned by the session for its whole lifetime.

use crate::error::{Result, VncError};
use crate::protocol::{
    PixelFormat, ENCODING_COMPRESS_LEVEL_0, ENCODING_COPYRECT, ENCODING_CORRE, ENCODING_HEXTILE,
    ENCODING_QUALITY_LEVEL_0, ENCODING_RAW, ENCODING_RICH_CURSOR, ENCODING_RRE, ENCODING_TIGHT,
    ENCODING_ZLIB, MAX_ENCODINGS,
};
use log::warn;
use std::fmt;
use std::time::Duration;

/// Base TCP port; display `n` listens on `5900 + n`.
pub const DEFAULT_PORT: u16 = 5900;

/// Default pause between update requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Encodings offered when the user names none the client knows.
pub const DEFAULT_ENCODINGS: [i32; 7] = [
    ENCODING_TIGHT,
    ENCODING_HEXTILE,
    ENCODING_ZLIB,
    ENCODING_COPYRECT,
    ENCODING_RRE,
    ENCODING_CORRE,
    ENCODING_RAW,
];

/// Highest compress and quality level.
const MAX_LEVEL: u8 = 9;

/// Maps an encoding name to its id, ignoring case.
#[must_use]
pub fn encoding_id(token: &str) -> Option<i32> {
    match token.to_ascii_lowercase().as_str() {
        "raw" => Some(ENCODING_RAW),
        "tight" => Some(ENCODING_TIGHT),
        "hextile" => Some(ENCODING_HEXTILE),
        "zlib" => Some(ENCODING_ZLIB),
        "copyrect" => Some(ENCODING_COPYRECT),
        "corre" => Some(ENCODING_CORRE),
        "rre" => Some(ENCODING_RRE),
        _ => None,
    }
}

/// A VNC server address: host plus display number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Host name or IP address.
    pub host: String,
    /// Display number.
    pub display: u16,
}

impl ServerAddress {
    /// Creates an address for `display` on `host`.
    pub fn new(host: impl Into<String>, display: u16) -> Self {
        Self {
            host: host.into(),
            display,
        }
    }

    /// Parses `host[:display]`. A missing display means display 0.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Config`] for an empty host, a display that is not
    /// a number, or a display whose port would overflow.
    pub fn parse(s: &str) -> Result<Self> {
        let (host, display) = match s.rsplit_once(':') {
            Some((host, display)) => {
                let display = display
                    .parse::<u16>()
                    .map_err(|_| VncError::Config(format!("invalid display number in {s:?}")))?;
                (host, display)
            }
            None => (s, 0),
        };
        if host.is_empty() {
            return Err(VncError::Config(format!("missing host in {s:?}")));
        }
        if DEFAULT_PORT.checked_add(display).is_none() {
            return Err(VncError::Config(format!("display {display} out of range")));
        }
        Ok(Self::new(host, display))
    }

    /// The TCP port of this display.
    #[must_use]
    pub fn port(&self) -> u16 {
        DEFAULT_PORT.saturating_add(self.display)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.display)
    }
}

/// Everything a session needs to know before connecting.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where to connect.
    pub address: ServerAddress,
    /// Password for VNC authentication, if known in advance.
    pub password: Option<String>,
    /// Encoding names in order of preference.
    pub encodings: Vec<String>,
    /// Pixel format requested from the server and used on the surface.
    pub pixel_format: PixelFormat,
    /// Whether other clients may stay connected.
    pub shared: bool,
    /// Whether the server should send cursor shapes for local drawing.
    pub local_cursor: bool,
    /// Whether a desktop smaller than the surface is centred on it.
    pub centre: bool,
    /// Zlib compression level hint, 0 to 9.
    pub compress_level: Option<u8>,
    /// JPEG quality hint, 0 to 9.
    pub quality: Option<u8>,
    /// Pause between update requests.
    pub poll_interval: Duration,
}

impl SessionConfig {
    /// Creates a configuration with defaults for `address`.
    #[must_use]
    pub fn new(address: ServerAddress) -> Self {
        Self {
            address,
            password: None,
            encodings: Vec::new(),
            pixel_format: PixelFormat::rgb565(),
            shared: true,
            local_cursor: true,
            centre: false,
            compress_level: None,
            quality: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the preferred encodings, e.g. `["tight", "hextile"]`.
    #[must_use]
    pub fn with_encodings<I, S>(mut self, encodings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encodings = encodings.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the client pixel format.
    #[must_use]
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Sets the shared flag sent in ClientInit.
    #[must_use]
    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Enables or disables the locally drawn cursor.
    #[must_use]
    pub fn with_local_cursor(mut self, local_cursor: bool) -> Self {
        self.local_cursor = local_cursor;
        self
    }

    /// Centres a smaller desktop on the surface instead of drawing it in
    /// the top-left corner.
    #[must_use]
    pub fn with_centre(mut self, centre: bool) -> Self {
        self.centre = centre;
        self
    }

    /// Sets the compression level hint.
    #[must_use]
    pub fn with_compress_level(mut self, level: u8) -> Self {
        self.compress_level = Some(level);
        self
    }

    /// Sets the JPEG quality hint.
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Sets the pause between update requests.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Checks the configuration before any connection is made.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Config`] if the pixel format is not 16 bpp true
    /// colour or a level is above 9.
    pub fn validate(&self) -> Result<()> {
        let pf = &self.pixel_format;
        if pf.bits_per_pixel != 16 || !pf.is_true_colour() {
            return Err(VncError::Config(format!(
                "unsupported client pixel format: {} bpp, true colour {}",
                pf.bits_per_pixel,
                pf.is_true_colour()
            )));
        }
        for (name, level) in [("compress level", self.compress_level), ("quality", self.quality)] {
            if let Some(level) = level.filter(|&l| l > MAX_LEVEL) {
                return Err(VncError::Config(format!("{name} {level} is above {MAX_LEVEL}")));
            }
        }
        Ok(())
    }

    /// Builds the SetEncodings list: known user encodings (or the defaults),
    /// then the cursor, compression and quality pseudo-encodings.
    #[must_use]
    pub fn encoding_list(&self) -> Vec<i32> {
        let mut list: Vec<i32> = Vec::with_capacity(MAX_ENCODINGS);
        for token in &self.encodings {
            match encoding_id(token) {
                Some(id) if !list.contains(&id) => list.push(id),
                Some(_) => {}
                None => warn!("Ignoring unknown encoding {token:?}"),
            }
        }
        if list.is_empty() {
            list.extend_from_slice(&DEFAULT_ENCODINGS);
        }
        if self.local_cursor {
            list.push(ENCODING_RICH_CURSOR);
        }
        if let Some(level) = self.compress_level {
            list.push(ENCODING_COMPRESS_LEVEL_0 + i32::from(level));
        }
        if let Some(quality) = self.quality {
            list.push(ENCODING_QUALITY_LEVEL_0 + i32::from(quality));
        }
        list.truncate(MAX_ENCODINGS);
        list
    }
}
