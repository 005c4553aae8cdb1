// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The client side of a SASL exchange.

use core::fmt;
use std::error::Error as StdError;

use crate::common::Credentials;

pub mod mechanisms;

use self::mechanisms::{DigestMd5, Plain, Scram};

/// Errors raised by a mechanism while processing server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MechanismError {
    /// The server challenge was not valid UTF-8 or not decodable.
    CannotDecodeChallenge,
    /// A challenge arrived in a phase where none was expected.
    UnexpectedChallenge,
    /// A required directive was missing from the server challenge.
    MissingDirective(&'static str),
    /// The server repeated or mangled the nonce.
    NonceMismatch,
    /// The iteration count or another numeric directive did not parse.
    InvalidDirective(&'static str),
    /// The server requested a quality of protection we do not offer.
    NoSupportedQop,
    /// The `rspauth` value of the server did not match our computation.
    RspauthMismatch,
    /// The SCRAM server signature did not verify.
    ServerSignatureMismatch,
    /// `<success/>` was received although the exchange is not finished.
    AuthenticationNotComplete,
}

impl fmt::Display for MechanismError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MechanismError::CannotDecodeChallenge => write!(fmt, "cannot decode challenge"),
            MechanismError::UnexpectedChallenge => write!(fmt, "unexpected challenge"),
            MechanismError::MissingDirective(d) => {
                write!(fmt, "missing directive `{}` in challenge", d)
            }
            MechanismError::NonceMismatch => write!(fmt, "server nonce mismatch"),
            MechanismError::InvalidDirective(d) => write!(fmt, "invalid directive `{}`", d),
            MechanismError::NoSupportedQop => write!(fmt, "no supported quality of protection"),
            MechanismError::RspauthMismatch => write!(fmt, "rspauth verification failed"),
            MechanismError::ServerSignatureMismatch => {
                write!(fmt, "server signature verification failed")
            }
            MechanismError::AuthenticationNotComplete => {
                write!(fmt, "authentication success before the exchange completed")
            }
        }
    }
}

impl StdError for MechanismError {}

/// A SASL mechanism state machine.
///
/// The caller drives the machine: [`Mechanism::initial`] for the first
/// message (if the mechanism has one), [`Mechanism::response`] for every
/// server challenge, and [`Mechanism::success`] when the server declares
/// success, at which point the mechanism verifies any trailing data (e.g.
/// the SCRAM server signature).
pub trait Mechanism: Send {
    /// The IANA name of the mechanism, e.g. `"SCRAM-SHA-1"`.
    fn name(&self) -> &'static str;

    /// Whether the mechanism sends data along with the initial `<auth/>`.
    fn has_initial_response(&self) -> bool {
        false
    }

    /// Produce the initial response. Only meaningful when
    /// [`Mechanism::has_initial_response`] returns true.
    fn initial(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Consume a server challenge and produce the client response.
    fn response(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError>;

    /// Consume the payload of the server's success notification.
    ///
    /// Fails when the payload carries a final verification (SCRAM server
    /// signature) that does not check out, or when the exchange has not
    /// reached its final phase yet.
    fn success(&mut self, data: &[u8]) -> Result<(), MechanismError>;

    /// Whether the exchange has run to completion.
    fn is_complete(&self) -> bool;
}

/// Preference-ordered mechanism names.
const PREFERRED: &[&str] = &["SCRAM-SHA-1", "DIGEST-MD5", "PLAIN"];

/// Select the strongest supported mechanism from a server-advertised list.
///
/// Matching is case-insensitive. Returns `None` when no advertised
/// mechanism is supported.
pub fn choose_mechanism<S: AsRef<str>>(
    offered: &[S],
    creds: Credentials,
) -> Option<Box<dyn Mechanism>> {
    for name in PREFERRED {
        if offered.iter().any(|o| o.as_ref().eq_ignore_ascii_case(name)) {
            return Some(match *name {
                "SCRAM-SHA-1" => Box::new(Scram::new(creds)),
                "DIGEST-MD5" => Box::new(DigestMd5::new(creds)),
                "PLAIN" => Box::new(Plain::new(creds)),
                _ => unreachable!(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("user", "pencil")
    }

    #[test]
    fn prefers_scram_over_everything() {
        let offered = ["PLAIN", "DIGEST-MD5", "SCRAM-SHA-1"];
        let mech = choose_mechanism(&offered, creds()).unwrap();
        assert_eq!(mech.name(), "SCRAM-SHA-1");
    }

    #[test]
    fn prefers_digest_md5_over_plain() {
        let offered = ["PLAIN", "DIGEST-MD5"];
        let mech = choose_mechanism(&offered, creds()).unwrap();
        assert_eq!(mech.name(), "DIGEST-MD5");
    }

    #[test]
    fn selection_ignores_server_order_and_case() {
        let offered = ["plain", "scram-sha-1"];
        let mech = choose_mechanism(&offered, creds()).unwrap();
        assert_eq!(mech.name(), "SCRAM-SHA-1");
    }

    #[test]
    fn no_supported_mechanism() {
        let offered = ["EXTERNAL", "ANONYMOUS"];
        assert!(choose_mechanism(&offered, creds()).is_none());
    }
}
