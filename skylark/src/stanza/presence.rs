// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `<presence/>` stanza.

use minidom::Element;

use crate::error::ProtocolError;
use crate::jid::Jid;
use crate::ns;
use crate::stanza::parse_jid_attr;

/// A `<presence/>` stanza with zero or more opaque payload children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Presence {
    /// The addressee; broadcast presence leaves this empty.
    pub to: Option<Jid>,
    /// The sender.
    pub from: Option<Jid>,
    /// Optional stanza id.
    pub id: Option<String>,
    /// The presence type attribute (`unavailable`, `subscribe`, …).
    pub type_: Option<String>,
    /// `xml:lang` of the stanza.
    pub lang: Option<String>,
    /// Payload children (`<show/>`, `<status/>`, caps, …).
    pub payloads: Vec<Element>,
}

impl Presence {
    /// Empty available presence.
    pub fn available() -> Presence {
        Presence::default()
    }

    /// Unavailable presence.
    pub fn unavailable() -> Presence {
        Presence {
            type_: Some("unavailable".to_owned()),
            ..Presence::default()
        }
    }

    /// Address this presence.
    pub fn with_to(mut self, to: Jid) -> Presence {
        self.to = Some(to);
        self
    }

    /// Append a payload child.
    pub fn with_payload(mut self, payload: Element) -> Presence {
        self.payloads.push(payload);
        self
    }
}

impl TryFrom<Element> for Presence {
    type Error = ProtocolError;

    fn try_from(elem: Element) -> Result<Presence, ProtocolError> {
        if !elem.is("presence", ns::CLIENT) {
            return Err(ProtocolError::UnexpectedElement(elem.name().to_owned()));
        }
        Ok(Presence {
            to: parse_jid_attr(&elem, "to")?,
            from: parse_jid_attr(&elem, "from")?,
            id: elem.attr("id").map(str::to_owned),
            type_: elem.attr("type").map(str::to_owned),
            lang: elem.attr("xml:lang").map(str::to_owned),
            payloads: elem.children().cloned().collect(),
        })
    }
}

impl From<Presence> for Element {
    fn from(presence: Presence) -> Element {
        Element::builder("presence", ns::CLIENT)
            .attr("to", presence.to.map(|j| j.to_string()))
            .attr("from", presence.from.map(|j| j.to_string()))
            .attr("id", presence.id)
            .attr("type", presence.type_)
            .attr("xml:lang", presence.lang)
            .append_all(presence.payloads)
            .build()
    }
}
