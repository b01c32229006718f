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

//! RFB 3.3 connection setup.
//!
//! The client side of the handshake runs strictly in order:
//!
//! 1. Version exchange (the client always answers `RFB 003.003`)
//! 2. Security: the server picks the type, 3.3 has no negotiation
//! 3. VNC authentication, if the server asked for it
//! 4. `ClientInit` with the shared flag
//! 5. `ServerInit` with the framebuffer size, pixel format and desktop name
//!
//! After that [`negotiate_format`] tells the server which pixel format and
//! encodings to use.

use crate::auth::{Credentials, CHALLENGE_LEN};
use crate::config::SessionConfig;
use crate::error::{Result, VncError};
use crate::protocol::{
    ClientMessage, ServerInit, PROTOCOL_VERSION, PROTOCOL_VERSION_LEN, SECURITY_RESULT_FAILED,
    SECURITY_RESULT_OK, SECURITY_RESULT_TOO_MANY, SECURITY_TYPE_INVALID, SECURITY_TYPE_NONE,
    SECURITY_TYPE_VNC_AUTH,
};
use crate::transport::{Quiet, Transport};
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};

/// Runs the handshake up to and including `ServerInit`.
///
/// A password in `config` is used as is; otherwise `creds` is asked, and only
/// if the server requires authentication.
///
/// # Errors
///
/// - [`VncError::Protocol`] if the server does not speak RFB or picks an
///   unknown security type
/// - [`VncError::ConnectionRefused`] if the server refuses the connection
/// - [`VncError::AuthenticationFailed`] or [`VncError::TooManyConnections`]
///   if authentication is rejected
/// - [`VncError::PasswordUnavailable`] if no password can be obtained
/// - [`VncError::ConnectionClosed`] or [`VncError::Io`] on socket failure
pub async fn handshake<S, C>(
    transport: &mut Transport<S>,
    config: &SessionConfig,
    creds: &mut C,
) -> Result<ServerInit>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Credentials + ?Sized,
{
    let mut version = [0u8; PROTOCOL_VERSION_LEN];
    transport.read_exact(&mut version, &mut Quiet).await?;
    if !version.starts_with(b"RFB ") {
        return Err(VncError::protocol(format!(
            "not an RFB server (got {:?})",
            String::from_utf8_lossy(&version)
        )));
    }
    info!("Server version: {}", String::from_utf8_lossy(&version).trim_end());
    transport.write_all(PROTOCOL_VERSION.as_bytes()).await?;

    let security = transport.read_u32(&mut Quiet).await?;
    match security {
        SECURITY_TYPE_INVALID => {
            let len = transport.read_u32(&mut Quiet).await? as usize;
            let reason = transport.read_vec(len, &mut Quiet).await?;
            return Err(VncError::ConnectionRefused(
                String::from_utf8_lossy(&reason).into_owned(),
            ));
        }
        SECURITY_TYPE_NONE => debug!("No authentication required"),
        SECURITY_TYPE_VNC_AUTH => authenticate(transport, config, creds).await?,
        other => {
            return Err(VncError::protocol(format!("unknown security type {other}")));
        }
    }

    transport.write_all(&[u8::from(config.shared)]).await?;

    let header = transport.read_vec(ServerInit::HEADER_LEN, &mut Quiet).await?;
    let (mut init, name_len) = ServerInit::parse_header(&mut header.as_slice())?;
    let name = transport.read_vec(name_len as usize, &mut Quiet).await?;
    init.name = String::from_utf8_lossy(&name).into_owned();

    info!(
        "Connected to \"{}\" ({}x{}, {} bpp)",
        init.name, init.framebuffer_width, init.framebuffer_height, init.pixel_format.bits_per_pixel
    );
    Ok(init)
}

async fn authenticate<S, C>(transport: &mut Transport<S>, config: &SessionConfig, creds: &mut C) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Credentials + ?Sized,
{
    debug!("VNC authentication required");
    let password = match &config.password {
        Some(password) => password.clone(),
        None => creds.password()?,
    };

    let mut challenge = [0u8; CHALLENGE_LEN];
    transport.read_exact(&mut challenge, &mut Quiet).await?;
    let response = creds.respond(&challenge, &password)?;
    transport.write_all(&response).await?;

    match transport.read_u32(&mut Quiet).await? {
        SECURITY_RESULT_OK => {
            info!("Authentication successful");
            Ok(())
        }
        SECURITY_RESULT_FAILED => Err(VncError::AuthenticationFailed),
        SECURITY_RESULT_TOO_MANY => Err(VncError::TooManyConnections),
        other => Err(VncError::protocol(format!("unknown security result {other}"))),
    }
}

/// Sends the client pixel format and the encoding list.
///
/// # Errors
///
/// Returns [`VncError::Io`] if the socket fails.
pub async fn negotiate_format<S>(transport: &mut Transport<S>, config: &SessionConfig) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport
        .send(&ClientMessage::SetPixelFormat(config.pixel_format.clone()))
        .await?;
    let encodings = config.encoding_list();
    debug!("Requesting encodings {encodings:?}");
    transport.send(&ClientMessage::SetEncodings(encodings)).await
}

#[cfg(test)]
pub(crate) mod testing {
    //! Wire fixtures for a scripted server.

    use crate::protocol::PixelFormat;
    use bytes::{BufMut, BytesMut};

    /// `ServerInit` for a `width` x `height` RGB565 desktop called `name`.
    pub fn server_init(width: u16, height: u16, name: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u16(width);
        buf.put_u16(height);
        PixelFormat::rgb565().write_to(&mut buf);
        buf.put_u32(name.len() as u32);
        buf.put_slice(name.as_bytes());
        buf.to_vec()
    }

    /// SetPixelFormat followed by SetEncodings for the given list.
    pub fn negotiation(encodings: &[i32]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        buf.put_bytes(0, 3);
        PixelFormat::rgb565().write_to(&mut buf);
        buf.put_u8(2);
        buf.put_u8(0);
        buf.put_u16(encodings.len() as u16);
        for e in encodings {
            buf.put_i32(*e);
        }
        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{negotiation, server_init};
    use super::*;
    use crate::auth::{vnc_auth_response, StaticPassword};
    use crate::config::ServerAddress;
    use tokio_test::io::Builder;

    fn config() -> SessionConfig {
        SessionConfig::new(ServerAddress::new("localhost", 0))
    }

    #[tokio::test]
    async fn test_no_auth_handshake() {
        let mock = Builder::new()
            .read(b"RFB 003.008\n")
            .write(b"RFB 003.003\n")
            .read(&[0, 0, 0, 1])
            .write(&[1])
            .read(&server_init(640, 480, "desk"))
            .build();
        let mut transport = Transport::new(mock);
        let init = handshake(&mut transport, &config(), &mut StaticPassword(None))
            .await
            .unwrap();
        assert_eq!((init.framebuffer_width, init.framebuffer_height), (640, 480));
        assert_eq!(init.name, "desk");
        assert_eq!(init.pixel_format, crate::protocol::PixelFormat::rgb565());
    }

    #[tokio::test]
    async fn test_vnc_auth_handshake() {
        let challenge = [7u8; 16];
        let response = vnc_auth_response(&challenge, "secret").unwrap();
        let mock = Builder::new()
            .read(b"RFB 003.003\n")
            .write(b"RFB 003.003\n")
            .read(&[0, 0, 0, 2])
            .read(&challenge)
            .write(&response)
            .read(&[0, 0, 0, 0])
            .write(&[0])
            .read(&server_init(8, 8, ""))
            .build();
        let mut transport = Transport::new(mock);
        let config = config().with_shared(false);
        let init = handshake(&mut transport, &config, &mut StaticPassword::new("secret"))
            .await
            .unwrap();
        assert_eq!(init.name, "");
    }

    #[tokio::test]
    async fn test_auth_failures() {
        for (code, expect_too_many) in [(1u8, false), (2u8, true)] {
            let challenge = [1u8; 16];
            let response = vnc_auth_response(&challenge, "pw").unwrap();
            let mock = Builder::new()
                .read(b"RFB 003.003\n")
                .write(b"RFB 003.003\n")
                .read(&[0, 0, 0, 2])
                .read(&challenge)
                .write(&response)
                .read(&[0, 0, 0, code])
                .build();
            let mut transport = Transport::new(mock);
            let err = handshake(&mut transport, &config().with_password("pw"), &mut StaticPassword(None))
                .await
                .unwrap_err();
            if expect_too_many {
                assert!(matches!(err, VncError::TooManyConnections));
            } else {
                assert!(matches!(err, VncError::AuthenticationFailed));
            }
        }
    }

    #[tokio::test]
    async fn test_missing_password() {
        let mock = Builder::new()
            .read(b"RFB 003.003\n")
            .write(b"RFB 003.003\n")
            .read(&[0, 0, 0, 2])
            .build();
        let mut transport = Transport::new(mock);
        let err = handshake(&mut transport, &config(), &mut StaticPassword(None))
            .await
            .unwrap_err();
        assert!(matches!(err, VncError::PasswordUnavailable));
    }

    #[tokio::test]
    async fn test_connection_refused_reason() {
        let mut refusal = vec![0, 0, 0, 0, 0, 0, 0, 4];
        refusal.extend_from_slice(b"busy");
        let mock = Builder::new()
            .read(b"RFB 003.003\n")
            .write(b"RFB 003.003\n")
            .read(&refusal)
            .build();
        let mut transport = Transport::new(mock);
        let err = handshake(&mut transport, &config(), &mut StaticPassword(None))
            .await
            .unwrap_err();
        assert!(matches!(err, VncError::ConnectionRefused(reason) if reason == "busy"));
    }

    #[tokio::test]
    async fn test_not_rfb_rejected() {
        let mock = Builder::new().read(b"HTTP/1.1 200").build();
        let mut transport = Transport::new(mock);
        let err = handshake(&mut transport, &config(), &mut StaticPassword(None))
            .await
            .unwrap_err();
        assert!(matches!(err, VncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_unknown_security_type() {
        let mock = Builder::new()
            .read(b"RFB 003.003\n")
            .write(b"RFB 003.003\n")
            .read(&[0, 0, 0, 16])
            .build();
        let mut transport = Transport::new(mock);
        let err = handshake(&mut transport, &config(), &mut StaticPassword(None))
            .await
            .unwrap_err();
        assert!(matches!(err, VncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_negotiate_format() {
        let config = config().with_encodings(["zlib", "raw"]).with_quality(5);
        let mock = Builder::new()
            .write(&negotiation(&[6, 0, -239, -27]))
            .build();
        let mut transport = Transport::new(mock);
        negotiate_format(&mut transport, &config).await.unwrap();
    }
}
