// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::client::{Mechanism, MechanismError};
use crate::common::Credentials;

/// The PLAIN mechanism (RFC 4616).
///
/// A single initial response of `\0authcid\0password`; the caller is
/// expected to only offer this over an encrypted transport.
pub struct Plain {
    creds: Credentials,
    sent: bool,
}

impl Plain {
    /// Build a PLAIN machine from credentials.
    pub fn new(creds: Credentials) -> Plain {
        Plain { creds, sent: false }
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn has_initial_response(&self) -> bool {
        true
    }

    fn initial(&mut self) -> Vec<u8> {
        let mut data = Vec::with_capacity(
            self.creds.username.len() + self.creds.password.len() + 2,
        );
        data.push(0);
        data.extend_from_slice(self.creds.username.as_bytes());
        data.push(0);
        data.extend_from_slice(self.creds.password.as_bytes());
        self.sent = true;
        data
    }

    fn response(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        Err(MechanismError::UnexpectedChallenge)
    }

    fn success(&mut self, _data: &[u8]) -> Result<(), MechanismError> {
        if self.sent {
            Ok(())
        } else {
            Err(MechanismError::AuthenticationNotComplete)
        }
    }

    fn is_complete(&self) -> bool {
        self.sent
    }
}
