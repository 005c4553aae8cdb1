// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `<iq/>` stanza and its request/response type.

use minidom::Element;

use crate::error::ProtocolError;
use crate::jid::Jid;
use crate::ns;
use crate::stanza::parse_jid_attr;
use crate::stanza::stanza_error::StanzaError;

/// The type attribute and payload of an `<iq/>`.
#[derive(Debug, Clone, PartialEq)]
pub enum IqType {
    /// A `type="get"` request with its payload.
    Get(Element),
    /// A `type="set"` request with its payload.
    Set(Element),
    /// A `type="result"` response with an optional payload.
    Result(Option<Element>),
    /// A `type="error"` response carrying the `<error/>` element.
    Error(Element),
}

impl IqType {
    /// The wire value of the type attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            IqType::Get(_) => "get",
            IqType::Set(_) => "set",
            IqType::Result(_) => "result",
            IqType::Error(_) => "error",
        }
    }
}

/// An `<iq/>` stanza. Requests (`get`/`set`) always pair with exactly one
/// response (`result`/`error`) carrying the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct Iq {
    /// The addressee; absent means "the server".
    pub to: Option<Jid>,
    /// The sender.
    pub from: Option<Jid>,
    /// The id correlating request and response. Required.
    pub id: String,
    /// `xml:lang` of the stanza.
    pub lang: Option<String>,
    /// Type and payload.
    pub payload: IqType,
}

impl Iq {
    /// A `get` request.
    pub fn from_get<I: Into<String>>(id: I, payload: Element) -> Iq {
        Iq {
            to: None,
            from: None,
            id: id.into(),
            lang: None,
            payload: IqType::Get(payload),
        }
    }

    /// A `set` request.
    pub fn from_set<I: Into<String>>(id: I, payload: Element) -> Iq {
        Iq {
            to: None,
            from: None,
            id: id.into(),
            lang: None,
            payload: IqType::Set(payload),
        }
    }

    /// Address the stanza.
    pub fn with_to(mut self, to: Jid) -> Iq {
        self.to = Some(to);
        self
    }

    /// The `result` answering `request`, addressed back at its sender.
    pub fn result_of(request: &Iq, payload: Option<Element>) -> Iq {
        Iq {
            to: request.from.clone(),
            from: None,
            id: request.id.clone(),
            lang: None,
            payload: IqType::Result(payload),
        }
    }

    /// The `error` answering `request`, addressed back at its sender.
    pub fn error_of(request: &Iq, error: StanzaError) -> Iq {
        Iq {
            to: request.from.clone(),
            from: None,
            id: request.id.clone(),
            lang: None,
            payload: IqType::Error(error.into()),
        }
    }

    /// Whether this is a `get` or `set`.
    pub fn is_request(&self) -> bool {
        matches!(self.payload, IqType::Get(_) | IqType::Set(_))
    }

    /// Whether this is a `result` or `error`.
    pub fn is_response(&self) -> bool {
        !self.is_request()
    }
}

impl TryFrom<Element> for Iq {
    type Error = ProtocolError;

    fn try_from(elem: Element) -> Result<Iq, ProtocolError> {
        if !elem.is("iq", ns::CLIENT) {
            return Err(ProtocolError::UnexpectedElement(elem.name().to_owned()));
        }
        let id = elem
            .attr("id")
            .ok_or(ProtocolError::InvalidStanza("iq without id"))?
            .to_owned();
        let type_ = elem
            .attr("type")
            .ok_or(ProtocolError::InvalidStanza("iq without type"))?;

        let mut children = elem.children();
        let payload = match type_ {
            "get" => IqType::Get(
                children
                    .next()
                    .cloned()
                    .ok_or(ProtocolError::InvalidStanza("get iq without payload"))?,
            ),
            "set" => IqType::Set(
                children
                    .next()
                    .cloned()
                    .ok_or(ProtocolError::InvalidStanza("set iq without payload"))?,
            ),
            "result" => IqType::Result(children.next().cloned()),
            "error" => IqType::Error(
                elem.get_child("error", ns::CLIENT)
                    .cloned()
                    .ok_or(ProtocolError::InvalidStanza("error iq without error"))?,
            ),
            _ => return Err(ProtocolError::InvalidStanza("unknown iq type")),
        };

        Ok(Iq {
            to: parse_jid_attr(&elem, "to")?,
            from: parse_jid_attr(&elem, "from")?,
            id,
            lang: elem.attr("xml:lang").map(str::to_owned),
            payload,
        })
    }
}

impl From<Iq> for Element {
    fn from(iq: Iq) -> Element {
        let type_ = iq.payload.as_str();
        let builder = Element::builder("iq", ns::CLIENT)
            .attr("to", iq.to.map(|j| j.to_string()))
            .attr("from", iq.from.map(|j| j.to_string()))
            .attr("id", iq.id)
            .attr("type", type_)
            .attr("xml:lang", iq.lang);
        match iq.payload {
            IqType::Get(payload) | IqType::Set(payload) | IqType::Error(payload) => {
                builder.append(payload).build()
            }
            IqType::Result(Some(payload)) => builder.append(payload).build(),
            IqType::Result(None) => builder.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let elem: Element = "<iq xmlns='jabber:client' type='get' id='p1' to='example.net'>\
                             <ping xmlns='urn:xmpp:ping'/></iq>"
            .parse()
            .unwrap();
        let iq = Iq::try_from(elem.clone()).unwrap();
        assert!(iq.is_request());
        assert_eq!(iq.id, "p1");
        assert_eq!(Element::from(iq), elem);
    }

    #[test]
    fn empty_result() {
        let elem: Element = "<iq xmlns='jabber:client' type='result' id='p1'/>"
            .parse()
            .unwrap();
        let iq = Iq::try_from(elem).unwrap();
        assert!(iq.is_response());
        assert_eq!(iq.payload, IqType::Result(None));
    }

    #[test]
    fn missing_id_is_rejected() {
        let elem: Element = "<iq xmlns='jabber:client' type='result'/>".parse().unwrap();
        assert!(Iq::try_from(elem).is_err());
    }

    #[test]
    fn request_without_payload_is_rejected() {
        let elem: Element = "<iq xmlns='jabber:client' type='get' id='x'/>"
            .parse()
            .unwrap();
        assert!(Iq::try_from(elem).is_err());
    }

    #[test]
    fn result_of_swaps_addressing() {
        let mut request = Iq::from_get(
            "q1",
            Element::builder("ping", ns::PING).build(),
        );
        request.from = Some("alice@example.net/a".parse().unwrap());
        let response = Iq::result_of(&request, None);
        assert_eq!(response.id, "q1");
        assert_eq!(response.to, request.from);
    }
}
