// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The SASL negotiation nonzas (RFC 6120 §6).
//!
//! Payloads travel Base64-encoded in element text; an empty payload is
//! represented as `=` on the wire.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use minidom::Element;

use crate::error::ProtocolError;
use crate::ns;

fn encode_data(data: &[u8]) -> String {
    if data.is_empty() {
        "=".to_owned()
    } else {
        BASE64.encode(data)
    }
}

fn decode_text(elem: &Element) -> Result<Vec<u8>, ProtocolError> {
    let text = elem.text();
    let text = text.trim();
    if text.is_empty() || text == "=" {
        return Ok(Vec::new());
    }
    BASE64
        .decode(text)
        .map_err(|_| ProtocolError::InvalidStanza("undecodable SASL payload"))
}

/// The `<auth/>` nonza opening the SASL exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Auth {
    /// The selected mechanism name.
    pub mechanism: String,
    /// The initial response, possibly empty.
    pub data: Vec<u8>,
}

impl From<Auth> for Element {
    fn from(auth: Auth) -> Element {
        let builder = Element::builder("auth", ns::SASL).attr("mechanism", auth.mechanism);
        if auth.data.is_empty() {
            builder.build()
        } else {
            builder.append(encode_data(&auth.data)).build()
        }
    }
}

/// A server `<challenge/>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    /// The decoded challenge bytes.
    pub data: Vec<u8>,
}

impl TryFrom<Element> for Challenge {
    type Error = ProtocolError;

    fn try_from(elem: Element) -> Result<Challenge, ProtocolError> {
        if !elem.is("challenge", ns::SASL) {
            return Err(ProtocolError::UnexpectedElement(elem.name().to_owned()));
        }
        Ok(Challenge {
            data: decode_text(&elem)?,
        })
    }
}

/// A client `<response/>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The raw response bytes.
    pub data: Vec<u8>,
}

impl From<Response> for Element {
    fn from(response: Response) -> Element {
        Element::builder("response", ns::SASL)
            .append(encode_data(&response.data))
            .build()
    }
}

/// The server's `<success/>`, with optional additional data.
#[derive(Debug, Clone, PartialEq)]
pub struct Success {
    /// The decoded additional data, e.g. a SCRAM server-final message.
    pub data: Vec<u8>,
}

impl TryFrom<Element> for Success {
    type Error = ProtocolError;

    fn try_from(elem: Element) -> Result<Success, ProtocolError> {
        if !elem.is("success", ns::SASL) {
            return Err(ProtocolError::UnexpectedElement(elem.name().to_owned()));
        }
        Ok(Success {
            data: decode_text(&elem)?,
        })
    }
}

/// The server's `<failure/>` with its defined condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// The name of the defined condition child, e.g. `not-authorized`.
    pub condition: String,
}

impl TryFrom<Element> for Failure {
    type Error = ProtocolError;

    fn try_from(elem: Element) -> Result<Failure, ProtocolError> {
        if !elem.is("failure", ns::SASL) {
            return Err(ProtocolError::UnexpectedElement(elem.name().to_owned()));
        }
        let condition = elem
            .children()
            .find(|child| child.name() != "text")
            .map(|child| child.name().to_owned())
            .unwrap_or_else(|| "not-authorized".to_owned());
        Ok(Failure { condition })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_with_data() {
        let elem = Element::from(Auth {
            mechanism: "PLAIN".to_owned(),
            data: b"\0user\0pencil".to_vec(),
        });
        assert_eq!(elem.attr("mechanism"), Some("PLAIN"));
        assert_eq!(elem.text(), "AHVzZXIAcGVuY2ls");
    }

    #[test]
    fn auth_without_data_has_no_text() {
        let elem = Element::from(Auth {
            mechanism: "DIGEST-MD5".to_owned(),
            data: Vec::new(),
        });
        assert_eq!(elem.text(), "");
    }

    #[test]
    fn empty_response_is_equals_sign() {
        let elem = Element::from(Response { data: Vec::new() });
        assert_eq!(elem.text(), "=");
    }

    #[test]
    fn challenge_decodes() {
        let elem: Element =
            "<challenge xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>AHVzZXIAcGVuY2ls</challenge>"
                .parse()
                .unwrap();
        let challenge = Challenge::try_from(elem).unwrap();
        assert_eq!(challenge.data, b"\0user\0pencil");
    }

    #[test]
    fn empty_success() {
        let elem: Element = "<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>"
            .parse()
            .unwrap();
        assert!(Success::try_from(elem).unwrap().data.is_empty());
    }

    #[test]
    fn failure_condition() {
        let elem: Element = "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
                             <not-authorized/></failure>"
            .parse()
            .unwrap();
        assert_eq!(Failure::try_from(elem).unwrap().condition, "not-authorized");
    }
}
