// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Credentials shared by all mechanisms.

/// A username/password pair handed to a mechanism at construction time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    /// The authentication identity.
    pub username: String,
    /// The password, kept as entered by the user.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from a username and a password.
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Credentials {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Replace the username.
    pub fn with_username<U: Into<String>>(mut self, username: U) -> Credentials {
        self.username = username.into();
        self
    }

    /// Replace the password.
    pub fn with_password<P: Into<String>>(mut self, password: P) -> Credentials {
        self.password = password.into();
        self
    }
}
