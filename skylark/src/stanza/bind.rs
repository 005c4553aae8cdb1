// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Resource binding request and response elements (RFC 6120 §7).

use minidom::Element;

use crate::error::ProtocolError;
use crate::jid::Jid;
use crate::ns;

/// The resource binding request (RFC 6120 §7).
#[derive(Debug, Clone, PartialEq)]
pub struct BindQuery {
    resource: Option<String>,
}

impl BindQuery {
    /// Request binding, optionally asking for a specific resource.
    pub fn new(resource: Option<String>) -> BindQuery {
        BindQuery { resource }
    }
}

impl From<BindQuery> for Element {
    fn from(bind: BindQuery) -> Element {
        Element::builder("bind", ns::BIND)
            .append_all(
                bind.resource
                    .map(|resource| Element::builder("resource", ns::BIND).append(resource)),
            )
            .build()
    }
}

/// The binding response carrying the full JID picked by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct BindResponse {
    jid: Jid,
}

impl From<BindResponse> for Jid {
    fn from(bind: BindResponse) -> Jid {
        bind.jid
    }
}

impl TryFrom<Element> for BindResponse {
    type Error = ProtocolError;

    fn try_from(elem: Element) -> Result<BindResponse, ProtocolError> {
        if !elem.is("bind", ns::BIND) {
            return Err(ProtocolError::InvalidBindResponse);
        }
        let jid = elem
            .get_child("jid", ns::BIND)
            .ok_or(ProtocolError::InvalidBindResponse)?
            .text()
            .parse::<Jid>()
            .map_err(|_| ProtocolError::InvalidBindResponse)?;
        if jid.is_bare() {
            // The server must hand out a full JID.
            return Err(ProtocolError::InvalidBindResponse);
        }
        Ok(BindResponse { jid })
    }
}
