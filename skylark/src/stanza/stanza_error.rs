// Copyright (c) 2025 skylark contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Stanza-level `<error/>` conditions (RFC 6120 §8.3).

use minidom::Element;

use crate::ns;

/// The subset of RFC 6120 defined conditions the core answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinedCondition {
    /// The request does not match an expected session.
    NotAcceptable,
    /// The requested feature is not implemented here.
    FeatureNotImplemented,
    /// No usable item was found.
    ItemNotFound,
    /// The service is not available at all.
    ServiceUnavailable,
}

impl DefinedCondition {
    fn element_name(self) -> &'static str {
        match self {
            DefinedCondition::NotAcceptable => "not-acceptable",
            DefinedCondition::FeatureNotImplemented => "feature-not-implemented",
            DefinedCondition::ItemNotFound => "item-not-found",
            DefinedCondition::ServiceUnavailable => "service-unavailable",
        }
    }

    fn error_type(self) -> &'static str {
        match self {
            DefinedCondition::NotAcceptable => "modify",
            DefinedCondition::FeatureNotImplemented => "cancel",
            DefinedCondition::ItemNotFound => "cancel",
            DefinedCondition::ServiceUnavailable => "cancel",
        }
    }
}

/// A stanza-level `<error/>` to be attached to an IQ response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StanzaError {
    /// The defined condition to report.
    pub condition: DefinedCondition,
}

impl StanzaError {
    /// Build an error around a defined condition.
    pub fn new(condition: DefinedCondition) -> StanzaError {
        StanzaError { condition }
    }
}

impl From<StanzaError> for Element {
    fn from(error: StanzaError) -> Element {
        Element::builder("error", ns::CLIENT)
            .attr("type", error.condition.error_type())
            .append(
                Element::builder(error.condition.element_name(), ns::STANZAS).build(),
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization() {
        let elem = Element::from(StanzaError::new(DefinedCondition::FeatureNotImplemented));
        assert_eq!(elem.attr("type"), Some("cancel"));
        assert!(elem.has_child("feature-not-implemented", ns::STANZAS));
    }
}
