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

//! VNC authentication.
//!
//! The server sends a random 16-byte challenge which the client encrypts
//! with DES, keyed by the password, and returns. The key is the first 8
//! password bytes (zero padded) with the bits of every byte reversed, a
//! quirk every VNC implementation shares.

use crate::error::{Result, VncError};
use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;
use std::io;

/// Length of the VNC authentication challenge and response.
pub const CHALLENGE_LEN: usize = 16;

/// Computes the response to a VNC authentication challenge.
///
/// # Errors
///
/// Returns [`VncError::Protocol`] if the DES cipher cannot be keyed.
pub fn vnc_auth_response(challenge: &[u8; CHALLENGE_LEN], password: &str) -> Result<[u8; CHALLENGE_LEN]> {
    let mut key = [0u8; 8];
    for (k, b) in key.iter_mut().zip(password.as_bytes()) {
        *k = b.reverse_bits();
    }
    let cipher = Des::new_from_slice(&key)
        .map_err(|e| VncError::protocol(format!("DES key rejected: {e}")))?;

    let mut response = *challenge;
    for block in response.chunks_exact_mut(8) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(response)
}

/// Supplies the password for VNC authentication.
///
/// Asked only when the server actually requires authentication.
pub trait Credentials {
    /// Returns the password to authenticate with.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::PasswordUnavailable`] if no password can be had.
    fn password(&mut self) -> Result<String>;

    /// Encrypts the server's challenge with `password`.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be computed.
    fn respond(&self, challenge: &[u8; CHALLENGE_LEN], password: &str) -> Result<[u8; CHALLENGE_LEN]> {
        vnc_auth_response(challenge, password)
    }
}

/// A password fixed up front, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticPassword(pub Option<String>);

impl StaticPassword {
    /// Wraps a known password.
    pub fn new(password: impl Into<String>) -> Self {
        Self(Some(password.into()))
    }
}

impl Credentials for StaticPassword {
    fn password(&mut self) -> Result<String> {
        self.0.clone().ok_or(VncError::PasswordUnavailable)
    }
}

/// Prompts for the password on the terminal with echo turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl Credentials for TerminalPrompt {
    fn password(&mut self) -> Result<String> {
        prompt_outcome(rpassword::prompt_password("Password: "))
    }
}

/// Maps the terminal read onto a password. End of input means none was given.
fn prompt_outcome(read: io::Result<String>) -> Result<String> {
    match read {
        Ok(password) => Ok(password),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(VncError::PasswordUnavailable),
        Err(e) => Err(VncError::Io(e)),
    }
}
