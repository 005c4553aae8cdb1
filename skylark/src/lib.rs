//! Asynchronous [XMPP](https://xmpp.org/) client core with asynchronous I/O
//! using [tokio](https://tokio.rs/).
//!
//! Skylark implements the RFC 6120 connection lifecycle — TCP, TLS (direct
//! or STARTTLS), SASL (SCRAM-SHA-1, DIGEST-MD5, PLAIN), resource binding —
//! and the stanza exchange on top of it: ordered dispatch of messages,
//! presence and IQ requests to registered handlers, with IQ responses
//! correlated back to blocking or callback-style requests. The
//! [`bytestreams`] module adds XEP-0065 SOCKS5 file transfers, direct or
//! through a proxy, with NAT detection.
//!
//! # Getting started
//!
//! Build a [`Config`], create a [`Client`], register handlers, and call
//! [`Client::connect`]. See `examples/echo_bot.rs` for a complete program.
//!
//! IM-level extensions (rosters, avatars, service discovery beyond proxy
//! lookup, …) are out of scope; stanza payloads stay opaque
//! [`minidom::Element`]s for higher layers to interpret.

#![deny(unsafe_code, missing_docs, bare_trait_objects)]

pub use minidom;

pub mod bytestreams;
mod client;
mod config;
pub mod connect;
pub mod error;
mod event;
pub mod jid;
pub mod ns;
pub mod proto;
pub mod stanza;

pub use crate::client::Client;
pub use crate::config::{Config, TlsMode};
#[doc(inline)]
pub use crate::error::Error;
pub use crate::jid::Jid;
pub use crate::stanza::{Iq, IqType, Message, Presence, Stanza};
