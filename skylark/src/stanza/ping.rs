// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The XEP-0199 `<ping/>` payload.

use minidom::Element;

use crate::ns;

/// The XEP-0199 `<ping/>` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ping;

impl From<Ping> for Element {
    fn from(_: Ping) -> Element {
        Element::builder("ping", ns::PING).build()
    }
}

/// Whether an element is a stream ping payload.
pub fn is_ping(elem: &Element) -> bool {
    elem.is("ping", ns::PING)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape() {
        let elem = Element::from(Ping);
        assert!(is_ping(&elem));
        assert!(!is_ping(&Element::builder("ping", ns::CLIENT).build()));
    }
}
