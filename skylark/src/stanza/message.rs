// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `<message/>` stanza.

use minidom::Element;

use crate::error::ProtocolError;
use crate::jid::Jid;
use crate::ns;
use crate::stanza::parse_jid_attr;

/// A `<message/>` stanza.
///
/// The payload children are opaque to the core; IM semantics (body,
/// chat states, carbons, …) live in higher layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The addressee.
    pub to: Option<Jid>,
    /// The sender, as stamped by the server on inbound stanzas.
    pub from: Option<Jid>,
    /// Optional stanza id.
    pub id: Option<String>,
    /// The message type attribute (`chat`, `groupchat`, `error`, …).
    pub type_: Option<String>,
    /// `xml:lang` of the stanza.
    pub lang: Option<String>,
    /// All payload children, in document order.
    pub payloads: Vec<Element>,
}

impl Message {
    /// A new message addressed to `to`.
    pub fn new(to: Option<Jid>) -> Message {
        Message {
            to,
            from: None,
            id: None,
            type_: None,
            lang: None,
            payloads: Vec::new(),
        }
    }

    /// Append a payload child.
    pub fn with_payload(mut self, payload: Element) -> Message {
        self.payloads.push(payload);
        self
    }

    /// Set the type attribute.
    pub fn with_type<T: Into<String>>(mut self, type_: T) -> Message {
        self.type_ = Some(type_.into());
        self
    }

    /// A `<body/>` convenience constructor.
    pub fn chat(to: Jid, body: &str) -> Message {
        Message::new(Some(to)).with_type("chat").with_payload(
            Element::builder("body", ns::CLIENT)
                .append(body.to_owned())
                .build(),
        )
    }
}

impl TryFrom<Element> for Message {
    type Error = ProtocolError;

    fn try_from(elem: Element) -> Result<Message, ProtocolError> {
        if !elem.is("message", ns::CLIENT) {
            return Err(ProtocolError::UnexpectedElement(elem.name().to_owned()));
        }
        Ok(Message {
            to: parse_jid_attr(&elem, "to")?,
            from: parse_jid_attr(&elem, "from")?,
            id: elem.attr("id").map(str::to_owned),
            type_: elem.attr("type").map(str::to_owned),
            lang: elem.attr("xml:lang").map(str::to_owned),
            payloads: elem.children().cloned().collect(),
        })
    }
}

impl From<Message> for Element {
    fn from(message: Message) -> Element {
        Element::builder("message", ns::CLIENT)
            .attr("to", message.to.map(|j| j.to_string()))
            .attr("from", message.from.map(|j| j.to_string()))
            .attr("id", message.id)
            .attr("type", message.type_)
            .attr("xml:lang", message.lang)
            .append_all(message.payloads)
            .build()
    }
}
