// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Client-side SASL mechanism state machines.
//!
//! This crate knows nothing about XMPP or I/O: a [`client::Mechanism`] is fed
//! the raw (already Base64-decoded) server challenges and produces the raw
//! client responses. Wire framing is the caller's business.
//!
//! Supported mechanisms, in preference order: SCRAM-SHA-1, DIGEST-MD5, PLAIN.

#![deny(unsafe_code, missing_docs, bare_trait_objects)]

pub mod client;
pub mod common;

pub use crate::client::{choose_mechanism, Mechanism, MechanismError};
pub use crate::common::Credentials;
