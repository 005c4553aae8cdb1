// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use md5::{Digest, Md5};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::client::{Mechanism, MechanismError};
use crate::common::Credentials;

/// The nonce-count is always 1: we never reuse a server nonce.
const NC: &str = "00000001";

/// The DIGEST-MD5 mechanism (RFC 2831).
///
/// Historic, but still advertised by a number of deployed servers. The
/// digest URI is derived from the realm as `xmpp/<realm>`.
pub struct DigestMd5 {
    creds: Credentials,
    cnonce: String,
    state: DigestState,
}

enum DigestState {
    Initial,
    SentResponse { rspauth: String },
    Complete,
}

impl DigestMd5 {
    /// Build a DIGEST-MD5 machine with a fresh random cnonce.
    pub fn new(creds: Credentials) -> DigestMd5 {
        let cnonce: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();
        DigestMd5::with_cnonce(creds, cnonce)
    }

    fn with_cnonce(creds: Credentials, cnonce: String) -> DigestMd5 {
        DigestMd5 {
            creds,
            cnonce,
            state: DigestState::Initial,
        }
    }
}

impl Mechanism for DigestMd5 {
    fn name(&self) -> &'static str {
        "DIGEST-MD5"
    }

    fn response(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        match self.state {
            DigestState::Initial => {
                let challenge = core::str::from_utf8(challenge)
                    .map_err(|_| MechanismError::CannotDecodeChallenge)?;
                let directives = parse_directives(challenge);

                let nonce = directives
                    .get("nonce")
                    .ok_or(MechanismError::MissingDirective("nonce"))?;
                let realm = directives.get("realm").map(String::as_str).unwrap_or("");
                if let Some(qop) = directives.get("qop") {
                    if !qop.split(',').any(|q| q.trim() == "auth") {
                        return Err(MechanismError::NoSupportedQop);
                    }
                }
                if let Some(algorithm) = directives.get("algorithm") {
                    if algorithm != "md5-sess" {
                        return Err(MechanismError::InvalidDirective("algorithm"));
                    }
                }

                let digest_uri = format!("xmpp/{}", realm);
                let (response, rspauth) = compute_digests(
                    &self.creds.username,
                    realm,
                    &self.creds.password,
                    nonce,
                    &self.cnonce,
                    &digest_uri,
                );

                let mut out = String::new();
                out.push_str(&format!("username=\"{}\"", self.creds.username));
                if !realm.is_empty() {
                    out.push_str(&format!(",realm=\"{}\"", realm));
                }
                out.push_str(&format!(",nonce=\"{}\"", nonce));
                out.push_str(&format!(",cnonce=\"{}\"", self.cnonce));
                out.push_str(&format!(",nc={}", NC));
                out.push_str(",qop=auth");
                out.push_str(&format!(",digest-uri=\"{}\"", digest_uri));
                out.push_str(&format!(",response={}", response));
                out.push_str(",charset=utf-8");

                self.state = DigestState::SentResponse { rspauth };
                Ok(out.into_bytes())
            }
            DigestState::SentResponse { ref rspauth } => {
                let expected = rspauth.clone();
                let challenge = core::str::from_utf8(challenge)
                    .map_err(|_| MechanismError::CannotDecodeChallenge)?;
                let directives = parse_directives(challenge);
                match directives.get("rspauth") {
                    Some(v) if *v == expected => {
                        self.state = DigestState::Complete;
                        Ok(Vec::new())
                    }
                    Some(_) => Err(MechanismError::RspauthMismatch),
                    None => Err(MechanismError::MissingDirective("rspauth")),
                }
            }
            DigestState::Complete => Err(MechanismError::UnexpectedChallenge),
        }
    }

    fn success(&mut self, data: &[u8]) -> Result<(), MechanismError> {
        match self.state {
            DigestState::Complete => Ok(()),
            // Servers may skip the empty final round-trip and put the
            // rspauth directly into <success/>.
            DigestState::SentResponse { .. } if !data.is_empty() => {
                self.response(data).map(|_| ())
            }
            _ => Err(MechanismError::AuthenticationNotComplete),
        }
    }

    fn is_complete(&self) -> bool {
        matches!(self.state, DigestState::Complete)
    }
}

/// Compute the `response` and `rspauth` values of RFC 2831 §2.1.2.1.
fn compute_digests(
    username: &str,
    realm: &str,
    password: &str,
    nonce: &str,
    cnonce: &str,
    digest_uri: &str,
) -> (String, String) {
    let mut a1 = md5_raw(format!("{}:{}:{}", username, realm, password).as_bytes()).to_vec();
    a1.extend_from_slice(format!(":{}:{}", nonce, cnonce).as_bytes());
    let ha1 = hex(&md5_raw(&a1));

    let kd = |ha2: &str| {
        hex(&md5_raw(
            format!("{}:{}:{}:{}:auth:{}", ha1, nonce, NC, cnonce, ha2).as_bytes(),
        ))
    };

    let response = kd(&hex(&md5_raw(
        format!("AUTHENTICATE:{}", digest_uri).as_bytes(),
    )));
    let rspauth = kd(&hex(&md5_raw(format!(":{}", digest_uri).as_bytes())));
    (response, rspauth)
}

fn md5_raw(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse the `key=value,key="quoted value"` directive list of a challenge.
fn parse_directives(input: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let mut chars = input.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.next().is_none() {
            break;
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        out.insert(key.trim().to_owned(), value);
    }
    out
}
