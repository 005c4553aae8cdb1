// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The fraction of XEP-0030 service discovery needed to locate
//! bytestream proxies on the user's server.

use minidom::Element;

use crate::error::ProtocolError;
use crate::jid::Jid;
use crate::ns;

/// Build a `disco#items` query payload.
pub fn items_query() -> Element {
    Element::builder("query", ns::DISCO_ITEMS).build()
}

/// Build a `disco#info` query payload.
pub fn info_query() -> Element {
    Element::builder("query", ns::DISCO_INFO).build()
}

/// One `<item/>` of a disco#items result.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoItem {
    /// The entity behind the item.
    pub jid: Jid,
    /// Optional human-readable name.
    pub name: Option<String>,
}

/// Parse the items of a disco#items result payload.
pub fn parse_items(elem: &Element) -> Result<Vec<DiscoItem>, ProtocolError> {
    if !elem.is("query", ns::DISCO_ITEMS) {
        return Err(ProtocolError::UnexpectedElement(elem.name().to_owned()));
    }
    let mut items = Vec::new();
    for child in elem.children() {
        if child.is("item", ns::DISCO_ITEMS) {
            let jid = child
                .attr("jid")
                .ok_or(ProtocolError::InvalidStanza("disco item without jid"))?
                .parse()
                .map_err(|_| ProtocolError::InvalidStanza("disco item with bad jid"))?;
            items.push(DiscoItem {
                jid,
                name: child.attr("name").map(str::to_owned),
            });
        }
    }
    Ok(items)
}

/// One `<identity/>` of a disco#info result.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// The identity category, e.g. `proxy`.
    pub category: String,
    /// The identity type, e.g. `bytestreams`.
    pub type_: String,
}

/// Parse the identities of a disco#info result payload.
pub fn parse_identities(elem: &Element) -> Result<Vec<Identity>, ProtocolError> {
    if !elem.is("query", ns::DISCO_INFO) {
        return Err(ProtocolError::UnexpectedElement(elem.name().to_owned()));
    }
    let mut identities = Vec::new();
    for child in elem.children() {
        if child.is("identity", ns::DISCO_INFO) {
            identities.push(Identity {
                category: child.attr("category").unwrap_or_default().to_owned(),
                type_: child.attr("type").unwrap_or_default().to_owned(),
            });
        }
    }
    Ok(identities)
}

/// Whether a disco#info result describes a bytestreams proxy.
pub fn is_bytestreams_proxy(identities: &[Identity]) -> bool {
    identities
        .iter()
        .any(|identity| identity.category == "proxy" && identity.type_ == "bytestreams")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items() {
        let elem: Element = "<query xmlns='http://jabber.org/protocol/disco#items'>\
                             <item jid='proxy.example.net' name='Proxy'/>\
                             <item jid='muc.example.net'/></query>"
            .parse()
            .unwrap();
        let items = parse_items(&elem).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].jid, "proxy.example.net".parse().unwrap());
        assert_eq!(items[0].name.as_deref(), Some("Proxy"));
    }

    #[test]
    fn proxy_identity() {
        let elem: Element = "<query xmlns='http://jabber.org/protocol/disco#info'>\
                             <identity category='proxy' type='bytestreams' name='SOCKS5'/>\
                             <feature var='http://jabber.org/protocol/bytestreams'/></query>"
            .parse()
            .unwrap();
        let identities = parse_identities(&elem).unwrap();
        assert!(is_bytestreams_proxy(&identities));
    }

    #[test]
    fn non_proxy_identity() {
        let elem: Element = "<query xmlns='http://jabber.org/protocol/disco#info'>\
                             <identity category='conference' type='text'/></query>"
            .parse()
            .unwrap();
        assert!(!is_bytestreams_proxy(&parse_identities(&elem).unwrap()));
    }
}
