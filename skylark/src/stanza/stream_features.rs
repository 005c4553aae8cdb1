// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The subset of `<stream:features/>` the transport core negotiates on.

use minidom::Element;

use crate::error::ProtocolError;
use crate::ns;

/// STARTTLS advertisement inside `<stream:features/>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartTls {
    /// Whether the server mandates TLS before anything else.
    pub required: bool,
}

/// The subset of `<stream:features/>` the transport core negotiates on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamFeatures {
    /// STARTTLS support, if advertised.
    pub starttls: Option<StartTls>,
    /// Whether resource binding is advertised.
    pub bind: bool,
    /// The advertised SASL mechanism names, in server order.
    pub mechanisms: Vec<String>,
}

impl StreamFeatures {
    /// Can we initiate a TLS session with this server?
    pub fn can_starttls(&self) -> bool {
        self.starttls.is_some()
    }

    /// Does the server mandate TLS?
    pub fn tls_required(&self) -> bool {
        matches!(self.starttls, Some(StartTls { required: true }))
    }

    /// Does the server support resource binding?
    pub fn can_bind(&self) -> bool {
        self.bind
    }
}

impl TryFrom<Element> for StreamFeatures {
    type Error = ProtocolError;

    fn try_from(elem: Element) -> Result<StreamFeatures, ProtocolError> {
        if !elem.is("features", ns::STREAM) {
            return Err(ProtocolError::UnexpectedElement(elem.name().to_owned()));
        }
        let mut features = StreamFeatures::default();
        for child in elem.children() {
            if child.is("starttls", ns::TLS) {
                features.starttls = Some(StartTls {
                    required: child.has_child("required", ns::TLS),
                });
            } else if child.is("bind", ns::BIND) {
                features.bind = true;
            } else if child.is("mechanisms", ns::SASL) {
                for mechanism in child.children() {
                    if mechanism.is("mechanism", ns::SASL) {
                        features.mechanisms.push(mechanism.text());
                    }
                }
            }
            // Anything else (sm, compression, …) is none of our business.
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_starttls() {
        let elem: Element = "<stream:features xmlns:stream='http://etherx.jabber.org/streams'>\
                             <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>\
                             </stream:features>"
            .parse()
            .unwrap();
        let features = StreamFeatures::try_from(elem).unwrap();
        assert!(features.can_starttls());
        assert!(features.tls_required());
        assert!(!features.can_bind());
        assert!(features.mechanisms.is_empty());
    }

    #[test]
    fn mechanisms_and_bind() {
        let elem: Element = "<stream:features xmlns:stream='http://etherx.jabber.org/streams'>\
                             <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
                             <mechanism>PLAIN</mechanism><mechanism>SCRAM-SHA-1</mechanism>\
                             </mechanisms>\
                             <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>\
                             </stream:features>"
            .parse()
            .unwrap();
        let features = StreamFeatures::try_from(elem).unwrap();
        assert_eq!(features.mechanisms, vec!["PLAIN", "SCRAM-SHA-1"]);
        assert!(features.can_bind());
        assert!(!features.can_starttls());
    }

    #[test]
    fn empty_features() {
        let elem: Element = "<stream:features xmlns:stream='http://etherx.jabber.org/streams'/>"
            .parse()
            .unwrap();
        let features = StreamFeatures::try_from(elem).unwrap();
        assert_eq!(features, StreamFeatures::default());
    }
}
