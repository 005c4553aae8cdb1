// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::{thread_rng, Rng};
use sha1::{Digest, Sha1};

use crate::client::{Mechanism, MechanismError};
use crate::common::Credentials;

/// Length of the SHA-1 digest and of all derived keys.
const DIGEST_LEN: usize = 20;

/// Random bytes in the client nonce before Base64 encoding.
const NONCE_LEN: usize = 24;

/// GS2 header for "no channel binding": `c=` is always Base64("n,,").
const GS2_HEADER: &str = "n,,";
const CHANNEL_BINDING: &str = "biws";

/// The SCRAM-SHA-1 mechanism (RFC 5802).
pub struct Scram {
    creds: Credentials,
    client_nonce: String,
    state: ScramState,
}

enum ScramState {
    Initial,
    SentClientFirst {
        client_first_bare: String,
    },
    SentClientFinal {
        server_signature: Vec<u8>,
    },
    Complete,
}

impl Scram {
    /// Build a SCRAM-SHA-1 machine with a fresh random nonce.
    pub fn new(creds: Credentials) -> Scram {
        let mut raw = [0u8; NONCE_LEN];
        thread_rng().fill(&mut raw);
        Scram::with_nonce(creds, BASE64.encode(raw))
    }

    fn with_nonce(creds: Credentials, client_nonce: String) -> Scram {
        Scram {
            creds,
            client_nonce,
            state: ScramState::Initial,
        }
    }
}

impl Mechanism for Scram {
    fn name(&self) -> &'static str {
        "SCRAM-SHA-1"
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn initial(&mut self) -> Vec<u8> {
        let bare = format!(
            "n={},r={}",
            escape_username(&self.creds.username),
            self.client_nonce
        );
        let message = format!("{}{}", GS2_HEADER, bare);
        self.state = ScramState::SentClientFirst {
            client_first_bare: bare,
        };
        message.into_bytes()
    }

    fn response(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        match &self.state {
            ScramState::SentClientFirst { client_first_bare } => {
                let client_first_bare = client_first_bare.clone();
                let server_first = core::str::from_utf8(challenge)
                    .map_err(|_| MechanismError::CannotDecodeChallenge)?;
                let (nonce, salt_b64, iterations) = parse_server_first(server_first)?;
                if !nonce.starts_with(&self.client_nonce) || nonce == self.client_nonce {
                    return Err(MechanismError::NonceMismatch);
                }
                let salt = BASE64
                    .decode(salt_b64)
                    .map_err(|_| MechanismError::InvalidDirective("s"))?;

                let salted_password = hi(self.creds.password.as_bytes(), &salt, iterations);
                let client_key = hmac(&salted_password, b"Client Key");
                let stored_key = sha1(&client_key);

                let without_proof = format!("c={},r={}", CHANNEL_BINDING, nonce);
                let auth_message = format!(
                    "{},{},{}",
                    client_first_bare, server_first, without_proof
                );

                let client_signature = hmac(&stored_key, auth_message.as_bytes());
                let proof: Vec<u8> = client_key
                    .iter()
                    .zip(client_signature.iter())
                    .map(|(k, s)| k ^ s)
                    .collect();

                let server_key = hmac(&salted_password, b"Server Key");
                let server_signature = hmac(&server_key, auth_message.as_bytes());

                let message = format!("{},p={}", without_proof, BASE64.encode(&proof));
                self.state = ScramState::SentClientFinal { server_signature };
                Ok(message.into_bytes())
            }
            ScramState::SentClientFinal { server_signature } => {
                // Some servers deliver the server-final message as one last
                // challenge followed by an empty <success/>.
                let server_signature = server_signature.clone();
                verify_server_final(challenge, &server_signature)?;
                self.state = ScramState::Complete;
                Ok(Vec::new())
            }
            _ => Err(MechanismError::UnexpectedChallenge),
        }
    }

    fn success(&mut self, data: &[u8]) -> Result<(), MechanismError> {
        match &self.state {
            ScramState::SentClientFinal { server_signature } => {
                let server_signature = server_signature.clone();
                verify_server_final(data, &server_signature)?;
                self.state = ScramState::Complete;
                Ok(())
            }
            ScramState::Complete => Ok(()),
            _ => Err(MechanismError::AuthenticationNotComplete),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.state, ScramState::Complete)
    }
}

/// `Hi()` from RFC 5802: PBKDF2-HMAC-SHA1.
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    pbkdf2_hmac::<Sha1>(password, salt, iterations, &mut out);
    out
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha1(data: &[u8]) -> Vec<u8> {
    Sha1::digest(data).to_vec()
}

/// `,` and `=` escaping of RFC 5802 §5.1.
fn escape_username(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            ',' => out.push_str("=2C"),
            '=' => out.push_str("=3D"),
            _ => out.push(c),
        }
    }
    out
}

fn parse_server_first(message: &str) -> Result<(&str, &str, u32), MechanismError> {
    let mut nonce = None;
    let mut salt = None;
    let mut iterations = None;
    for field in message.split(',') {
        if let Some(v) = field.strip_prefix("r=") {
            nonce = Some(v);
        } else if let Some(v) = field.strip_prefix("s=") {
            salt = Some(v);
        } else if let Some(v) = field.strip_prefix("i=") {
            iterations = Some(
                v.parse::<u32>()
                    .map_err(|_| MechanismError::InvalidDirective("i"))?,
            );
        }
    }
    Ok((
        nonce.ok_or(MechanismError::MissingDirective("r"))?,
        salt.ok_or(MechanismError::MissingDirective("s"))?,
        iterations.ok_or(MechanismError::MissingDirective("i"))?,
    ))
}

fn verify_server_final(data: &[u8], expected: &[u8]) -> Result<(), MechanismError> {
    let message =
        core::str::from_utf8(data).map_err(|_| MechanismError::CannotDecodeChallenge)?;
    let signature = message
        .split(',')
        .find_map(|f| f.strip_prefix("v="))
        .ok_or(MechanismError::MissingDirective("v"))?;
    let signature = BASE64
        .decode(signature)
        .map_err(|_| MechanismError::InvalidDirective("v"))?;
    if signature == expected {
        Ok(())
    } else {
        Err(MechanismError::ServerSignatureMismatch)
    }
}
