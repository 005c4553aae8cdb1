// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The XEP-0065 `<query/>` forms.

use minidom::Element;

use crate::error::ProtocolError;
use crate::jid::Jid;
use crate::ns;

/// A single advertised SOCKS5 endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Streamhost {
    /// The JID answering for this endpoint.
    pub jid: Jid,
    /// Hostname or IP literal to connect to.
    pub host: String,
    /// TCP port; XEP-0065 defaults to 1080 when omitted.
    pub port: u16,
}

impl TryFrom<&Element> for Streamhost {
    type Error = ProtocolError;

    fn try_from(elem: &Element) -> Result<Streamhost, ProtocolError> {
        let jid = elem
            .attr("jid")
            .ok_or(ProtocolError::InvalidStanza("streamhost without jid"))?
            .parse()
            .map_err(|_| ProtocolError::InvalidStanza("streamhost with bad jid"))?;
        let host = elem
            .attr("host")
            .ok_or(ProtocolError::InvalidStanza("streamhost without host"))?
            .to_owned();
        let port = match elem.attr("port") {
            None => 1080,
            Some(port) => port
                .parse()
                .map_err(|_| ProtocolError::InvalidStanza("streamhost with bad port"))?,
        };
        Ok(Streamhost { jid, host, port })
    }
}

impl From<Streamhost> for Element {
    fn from(streamhost: Streamhost) -> Element {
        Element::builder("streamhost", ns::BYTESTREAMS)
            .attr("jid", streamhost.jid.to_string())
            .attr("host", streamhost.host)
            .attr("port", streamhost.port)
            .build()
    }
}

/// What a `<query/>` carries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPayload {
    /// Offered endpoints (initiator → target, or proxy → requester).
    Streamhosts(Vec<Streamhost>),
    /// The endpoint the target actually connected to.
    StreamhostUsed(Jid),
    /// Activation order sent to a proxy, naming the target.
    Activate(Jid),
    /// An empty query, e.g. asking a proxy for its streamhost.
    Empty,
}

/// A bytestreams `<query/>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// The session id this query belongs to; absent on proxy discovery.
    pub sid: Option<String>,
    /// Transport mode attribute; anything but `tcp` is refused upstream.
    pub mode: Option<String>,
    /// The payload children.
    pub payload: QueryPayload,
}

impl Query {
    /// An empty discovery query toward a proxy.
    pub fn discover() -> Query {
        Query {
            sid: None,
            mode: None,
            payload: QueryPayload::Empty,
        }
    }

    /// A streamhost offer for session `sid`.
    pub fn offer<S: Into<String>>(sid: S, streamhosts: Vec<Streamhost>) -> Query {
        Query {
            sid: Some(sid.into()),
            mode: None,
            payload: QueryPayload::Streamhosts(streamhosts),
        }
    }

    /// The target's answer naming the used streamhost.
    pub fn used<S: Into<String>>(sid: S, jid: Jid) -> Query {
        Query {
            sid: Some(sid.into()),
            mode: None,
            payload: QueryPayload::StreamhostUsed(jid),
        }
    }

    /// An activation order for a proxy.
    pub fn activate<S: Into<String>>(sid: S, target: Jid) -> Query {
        Query {
            sid: Some(sid.into()),
            mode: None,
            payload: QueryPayload::Activate(target),
        }
    }
}

impl TryFrom<Element> for Query {
    type Error = ProtocolError;

    fn try_from(elem: Element) -> Result<Query, ProtocolError> {
        if !elem.is("query", ns::BYTESTREAMS) {
            return Err(ProtocolError::UnexpectedElement(elem.name().to_owned()));
        }
        let sid = elem.attr("sid").map(str::to_owned);
        let mode = elem.attr("mode").map(str::to_owned);

        let mut streamhosts = Vec::new();
        let mut payload = None;
        for child in elem.children() {
            if child.is("streamhost", ns::BYTESTREAMS) {
                streamhosts.push(Streamhost::try_from(child)?);
            } else if child.is("streamhost-used", ns::BYTESTREAMS) {
                let jid = child
                    .attr("jid")
                    .ok_or(ProtocolError::InvalidStanza("streamhost-used without jid"))?
                    .parse()
                    .map_err(|_| ProtocolError::InvalidStanza("streamhost-used with bad jid"))?;
                payload = Some(QueryPayload::StreamhostUsed(jid));
            } else if child.is("activate", ns::BYTESTREAMS) {
                let target = child
                    .text()
                    .parse()
                    .map_err(|_| ProtocolError::InvalidStanza("activate with bad jid"))?;
                payload = Some(QueryPayload::Activate(target));
            }
        }
        let payload = match payload {
            Some(payload) => payload,
            None if !streamhosts.is_empty() => QueryPayload::Streamhosts(streamhosts),
            None => QueryPayload::Empty,
        };
        Ok(Query { sid, mode, payload })
    }
}

impl From<Query> for Element {
    fn from(query: Query) -> Element {
        let builder = Element::builder("query", ns::BYTESTREAMS)
            .attr("sid", query.sid)
            .attr("mode", query.mode);
        match query.payload {
            QueryPayload::Streamhosts(streamhosts) => builder
                .append_all(streamhosts.into_iter().map(Element::from))
                .build(),
            QueryPayload::StreamhostUsed(jid) => builder
                .append(
                    Element::builder("streamhost-used", ns::BYTESTREAMS)
                        .attr("jid", jid.to_string())
                        .build(),
                )
                .build(),
            QueryPayload::Activate(target) => builder
                .append(
                    Element::builder("activate", ns::BYTESTREAMS)
                        .append(target.to_string())
                        .build(),
                )
                .build(),
            QueryPayload::Empty => builder.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_round_trip() {
        let query = Query::offer(
            "vsid",
            vec![Streamhost {
                jid: "romeo@montague.lit/orchard".parse().unwrap(),
                host: "192.0.2.1".to_owned(),
                port: 52035,
            }],
        );
        let elem = Element::from(query.clone());
        assert_eq!(Query::try_from(elem).unwrap(), query);
    }

    #[test]
    fn streamhost_used() {
        let elem: Element = "<query xmlns='http://jabber.org/protocol/bytestreams' sid='vsid'>\
                             <streamhost-used jid='proxy.example.net'/></query>"
            .parse()
            .unwrap();
        let query = Query::try_from(elem).unwrap();
        assert_eq!(query.sid.as_deref(), Some("vsid"));
        assert_eq!(
            query.payload,
            QueryPayload::StreamhostUsed("proxy.example.net".parse().unwrap())
        );
    }

    #[test]
    fn activate_round_trip() {
        let query = Query::activate("vsid", "juliet@capulet.lit/balcony".parse().unwrap());
        let elem = Element::from(query.clone());
        assert_eq!(Query::try_from(elem).unwrap(), query);
    }

    #[test]
    fn udp_mode_is_surfaced() {
        let elem: Element = "<query xmlns='http://jabber.org/protocol/bytestreams' \
                             sid='s' mode='udp'>\
                             <streamhost jid='a@b' host='h' port='1'/></query>"
            .parse()
            .unwrap();
        let query = Query::try_from(elem).unwrap();
        assert_eq!(query.mode.as_deref(), Some("udp"));
    }

    #[test]
    fn streamhost_port_defaults_to_1080() {
        let elem: Element = "<query xmlns='http://jabber.org/protocol/bytestreams' sid='s'>\
                             <streamhost jid='proxy.example.net' host='h'/></query>"
            .parse()
            .unwrap();
        match Query::try_from(elem).unwrap().payload {
            QueryPayload::Streamhosts(hosts) => assert_eq!(hosts[0].port, 1080),
            other => panic!("wrong payload: {:?}", other),
        }
    }
}
