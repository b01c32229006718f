//! Error types for the VNC client library.

use std::io;
use thiserror::Error;

/// Result type for VNC operations.
pub type Result<T> = std::result::Result<T, VncError>;

/// Errors that can occur while driving a VNC session.
#[derive(Debug, Error)]
pub enum VncError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server closed the connection mid-read.
    #[error("Connection closed")]
    ConnectionClosed,

    /// VNC protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Decompression or image decoding failed.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Pixel layout or feature the client does not handle.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Authentication failed.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The server rejected the session because too many clients are attached.
    #[error("Too many authentication failures")]
    TooManyConnections,

    /// The server refused the connection during security negotiation.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The server asked for a password and none could be obtained.
    #[error("Password required but none available")]
    PasswordUnavailable,

    /// Invalid session configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of a [`VncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Socket failure or peer disconnect.
    Io,
    /// Malformed or unsupported data on the wire.
    Protocol,
    /// Rejected by the server or missing credentials.
    Auth,
    /// Raised before connecting, from the local configuration.
    Config,
}

impl VncError {
    /// Returns the class this error belongs to.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Io(_) | Self::ConnectionClosed => ErrorClass::Io,
            Self::Protocol(_) | Self::Encoding(_) | Self::NotImplemented(_) => {
                ErrorClass::Protocol
            }
            Self::AuthenticationFailed
            | Self::TooManyConnections
            | Self::ConnectionRefused(_)
            | Self::PasswordUnavailable => ErrorClass::Auth,
            Self::Config(_) => ErrorClass::Config,
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(VncError::ConnectionClosed.class(), ErrorClass::Io);
        assert_eq!(
            VncError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).class(),
            ErrorClass::Io
        );
        assert_eq!(VncError::protocol("bad").class(), ErrorClass::Protocol);
        assert_eq!(
            VncError::NotImplemented("24 bpp".into()).class(),
            ErrorClass::Protocol
        );
        assert_eq!(VncError::TooManyConnections.class(), ErrorClass::Auth);
        assert_eq!(VncError::Config("x".into()).class(), ErrorClass::Config);
    }
}
