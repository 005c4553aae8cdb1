// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The stanza data model: `<message/>`, `<presence/>` and `<iq/>` plus the
//! negotiation elements used during stream establishment.
//!
//! Conversions go through [`minidom::Element`] in both directions; payloads
//! outside the small set needed by the core stay opaque elements.

use minidom::Element;

use crate::error::ProtocolError;
use crate::ns;

pub mod bind;
pub mod bytestreams;
pub mod disco;
pub mod iq;
pub mod message;
pub mod ping;
pub mod presence;
pub mod sasl;
pub mod stanza_error;
pub mod stream_features;

pub use self::iq::{Iq, IqType};
pub use self::message::Message;
pub use self::presence::Presence;
pub use self::stream_features::StreamFeatures;

/// Any of the three top-level stanza kinds.
#[derive(Debug, Clone)]
pub enum Stanza {
    /// A `<message/>` stanza.
    Message(Message),
    /// A `<presence/>` stanza.
    Presence(Presence),
    /// An `<iq/>` stanza.
    Iq(Iq),
}

impl TryFrom<Element> for Stanza {
    type Error = ProtocolError;

    fn try_from(elem: Element) -> Result<Stanza, ProtocolError> {
        if elem.is("message", ns::CLIENT) {
            Ok(Stanza::Message(Message::try_from(elem)?))
        } else if elem.is("presence", ns::CLIENT) {
            Ok(Stanza::Presence(Presence::try_from(elem)?))
        } else if elem.is("iq", ns::CLIENT) {
            Ok(Stanza::Iq(Iq::try_from(elem)?))
        } else {
            Err(ProtocolError::UnexpectedElement(elem.name().to_owned()))
        }
    }
}

impl From<Stanza> for Element {
    fn from(stanza: Stanza) -> Element {
        match stanza {
            Stanza::Message(message) => message.into(),
            Stanza::Presence(presence) => presence.into(),
            Stanza::Iq(iq) => iq.into(),
        }
    }
}

pub(crate) fn parse_jid_attr(
    elem: &Element,
    name: &str,
) -> Result<Option<crate::jid::Jid>, ProtocolError> {
    match elem.attr(name) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ProtocolError::InvalidStanza("unparseable JID attribute")),
    }
}
