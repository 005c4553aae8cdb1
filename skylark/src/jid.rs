//! Jabber identifiers.
//!
//! A JID is the `node@domain/resource` triple identifying an XMPP entity.
//! Comparison is case-insensitive on node and domain and case-sensitive on
//! the resource, so `Alice@Example.NET/Home` equals `alice@example.net/Home`
//! but not `alice@example.net/home`.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::str::FromStr;
use std::error::Error as StdError;

/// Error raised when parsing an ill-formed JID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JidParseError {
    /// The domain part is missing or empty.
    NoDomain,
    /// A `@` was present but the node part is empty.
    EmptyNode,
    /// A `/` was present but the resource part is empty.
    EmptyResource,
}

impl fmt::Display for JidParseError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JidParseError::NoDomain => write!(fmt, "missing domain"),
            JidParseError::EmptyNode => write!(fmt, "empty node before @"),
            JidParseError::EmptyResource => write!(fmt, "empty resource after /"),
        }
    }
}

impl StdError for JidParseError {}

/// A parsed Jabber identifier.
#[derive(Debug, Clone, Eq)]
pub struct Jid {
    node: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Jid {
    /// A JID consisting of a domain alone.
    pub fn from_domain<D: Into<String>>(domain: D) -> Jid {
        Jid {
            node: None,
            domain: domain.into(),
            resource: None,
        }
    }

    /// Assemble a JID from its parts.
    pub fn from_parts(
        node: Option<&str>,
        domain: &str,
        resource: Option<&str>,
    ) -> Result<Jid, JidParseError> {
        if domain.is_empty() {
            return Err(JidParseError::NoDomain);
        }
        if node == Some("") {
            return Err(JidParseError::EmptyNode);
        }
        if resource == Some("") {
            return Err(JidParseError::EmptyResource);
        }
        Ok(Jid {
            node: node.map(str::to_owned),
            domain: domain.to_owned(),
            resource: resource.map(str::to_owned),
        })
    }

    /// The node part, i.e. the localpart before `@`.
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// The domain part.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The resource part after `/`.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Whether this JID carries a resource.
    pub fn is_full(&self) -> bool {
        self.resource.is_some()
    }

    /// Whether this JID is bare (no resource).
    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// This JID with the resource stripped.
    pub fn bare(&self) -> Jid {
        Jid {
            node: self.node.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// This JID with the given resource attached.
    pub fn with_resource<R: Into<String>>(mut self, resource: R) -> Jid {
        self.resource = Some(resource.into());
        self
    }
}

impl FromStr for Jid {
    type Err = JidParseError;

    fn from_str(s: &str) -> Result<Jid, JidParseError> {
        let (bare, resource) = match s.split_once('/') {
            Some((bare, resource)) => {
                if resource.is_empty() {
                    return Err(JidParseError::EmptyResource);
                }
                (bare, Some(resource))
            }
            None => (s, None),
        };
        let (node, domain) = match bare.split_once('@') {
            Some((node, domain)) => {
                if node.is_empty() {
                    return Err(JidParseError::EmptyNode);
                }
                (Some(node), domain)
            }
            None => (None, bare),
        };
        if domain.is_empty() {
            return Err(JidParseError::NoDomain);
        }
        Jid::from_parts(node, domain, resource)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref node) = self.node {
            write!(fmt, "{}@", node)?;
        }
        write!(fmt, "{}", self.domain)?;
        if let Some(ref resource) = self.resource {
            write!(fmt, "/{}", resource)?;
        }
        Ok(())
    }
}

impl PartialEq for Jid {
    fn eq(&self, other: &Jid) -> bool {
        let node_eq = match (&self.node, &other.node) {
            (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
            (None, None) => true,
            _ => false,
        };
        node_eq
            && self.domain.to_lowercase() == other.domain.to_lowercase()
            && self.resource == other.resource
    }
}

impl Hash for Jid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.as_ref().map(|n| n.to_lowercase()).hash(state);
        self.domain.to_lowercase().hash(state);
        self.resource.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn jid(s: &str) -> Jid {
        s.parse().unwrap()
    }

    #[test]
    fn parse_forms() {
        let j = jid("alice@example.net/balcony");
        assert_eq!(j.node(), Some("alice"));
        assert_eq!(j.domain(), "example.net");
        assert_eq!(j.resource(), Some("balcony"));

        let j = jid("example.net");
        assert_eq!(j.node(), None);
        assert!(j.is_bare());

        let j = jid("example.net/component");
        assert_eq!(j.node(), None);
        assert_eq!(j.resource(), Some("component"));
    }

    #[test]
    fn parse_serialize_round_trip() {
        for s in ["alice@example.net/balcony", "example.net", "a@b", "b/r"] {
            assert_eq!(jid(s).to_string(), s);
            assert_eq!(jid(&jid(s).to_string()), jid(s));
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<Jid>(), Err(JidParseError::NoDomain));
        assert_eq!("@example.net".parse::<Jid>(), Err(JidParseError::EmptyNode));
        assert_eq!(
            "alice@example.net/".parse::<Jid>(),
            Err(JidParseError::EmptyResource)
        );
        assert_eq!("alice@".parse::<Jid>(), Err(JidParseError::NoDomain));
    }

    #[test]
    fn equality_case_rules() {
        assert_eq!(jid("Alice@Example.NET/Home"), jid("alice@example.net/Home"));
        assert_ne!(jid("alice@example.net/home"), jid("alice@example.net/Home"));
        assert_ne!(jid("alice@example.net"), jid("bob@example.net"));
        assert_ne!(jid("alice@example.net"), jid("alice@example.net/Home"));
    }

    #[test]
    fn hash_follows_equality() {
        fn h(j: &Jid) -> u64 {
            let mut hasher = DefaultHasher::new();
            j.hash(&mut hasher);
            hasher.finish()
        }
        assert_eq!(
            h(&jid("Alice@Example.NET/Home")),
            h(&jid("alice@example.net/Home"))
        );
    }

    #[test]
    fn bare_and_resource_helpers() {
        let j = jid("alice@example.net/balcony");
        assert_eq!(j.bare(), jid("alice@example.net"));
        assert_eq!(
            jid("alice@example.net").with_resource("orchard"),
            jid("alice@example.net/orchard")
        );
    }
}
