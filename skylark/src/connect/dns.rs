//! SRV resolution behind a replaceable interface.

use core::future::Future;
use core::pin::Pin;

use hickory_resolver::{IntoName, TokioAsyncResolver};
use log::debug;

use crate::error::Error;

/// One record of an SRV answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    /// Target host name.
    pub host: String,
    /// Target port.
    pub port: u16,
    /// Record priority; lower is tried first.
    pub priority: u16,
    /// Record weight; used as a secondary sort key.
    pub weight: u16,
}

/// A source of SRV answers. The default implementation asks the system
/// resolver; tests and embedders can substitute their own.
pub trait SrvResolver: Send + Sync {
    /// Look up `name` (e.g. `_xmpp-client._tcp.example.net`) and return the
    /// answer records in any order.
    fn resolve_srv<'x>(
        &'x self,
        name: &'x str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SrvRecord>, Error>> + Send + 'x>>;
}

/// [`SrvResolver`] backed by the system DNS configuration.
#[derive(Debug, Clone, Default)]
pub struct SystemSrvResolver;

impl SrvResolver for SystemSrvResolver {
    fn resolve_srv<'x>(
        &'x self,
        name: &'x str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SrvRecord>, Error>> + Send + 'x>> {
        Box::pin(async move {
            let resolver = TokioAsyncResolver::tokio_from_system_conf()?;
            let srv_domain = format!("{}.", name).into_name()?;
            let lookup = match resolver.srv_lookup(srv_domain).await {
                Ok(lookup) => lookup,
                Err(e) => {
                    debug!("SRV lookup for {name} failed: {e}");
                    return Ok(Vec::new());
                }
            };
            Ok(lookup
                .iter()
                .map(|srv| SrvRecord {
                    host: srv.target().to_ascii().trim_end_matches('.').to_owned(),
                    port: srv.port(),
                    priority: srv.priority(),
                    weight: srv.weight(),
                })
                .collect())
        })
    }
}

/// Sort records the way connect attempts walk them: priority ascending,
/// then weight ascending.
pub fn sort_records(records: &mut [SrvRecord]) {
    records.sort_by_key(|record| (record.priority, record.weight));
}

/// A cursor over the sorted SRV answer.
///
/// Every connect attempt takes the next host; the cursor wraps so a caller
/// retrying forever cycles through the whole answer. An empty answer serves
/// the configured literal host and port forever.
#[derive(Debug, Clone)]
pub struct HostCursor {
    records: Vec<SrvRecord>,
    fallback: (String, u16),
    next: usize,
}

impl HostCursor {
    /// Build a cursor from an unsorted answer and a literal fallback.
    pub fn new(mut records: Vec<SrvRecord>, fallback: (String, u16)) -> HostCursor {
        sort_records(&mut records);
        HostCursor {
            records,
            fallback,
            next: 0,
        }
    }

    /// The position of the next record in the sorted answer.
    pub fn position(&self) -> usize {
        self.next
    }

    /// Take the host and port for the next connect attempt.
    pub fn take(&mut self) -> (String, u16) {
        if self.records.is_empty() {
            return self.fallback.clone();
        }
        let record = &self.records[self.next % self.records.len()];
        self.next = (self.next + 1) % self.records.len();
        (record.host.clone(), record.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(host: &str, priority: u16, weight: u16) -> SrvRecord {
        SrvRecord {
            host: host.to_owned(),
            port: 5222,
            priority,
            weight,
        }
    }

    #[test]
    fn sorts_by_priority_then_weight() {
        let mut records = vec![
            record("c", 20, 0),
            record("b", 10, 5),
            record("a", 10, 1),
        ];
        sort_records(&mut records);
        let hosts: Vec<&str> = records.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, ["a", "b", "c"]);
    }

    #[test]
    fn equal_priority_ordered_by_weight() {
        let mut records = vec![record("heavy", 5, 30), record("light", 5, 10)];
        sort_records(&mut records);
        assert_eq!(records[0].host, "light");
    }

    #[test]
    fn cursor_advances_and_wraps() {
        let mut cursor = HostCursor::new(
            vec![record("b", 2, 0), record("a", 1, 0)],
            ("literal".to_owned(), 5222),
        );
        assert_eq!(cursor.take().0, "a");
        assert_eq!(cursor.take().0, "b");
        assert_eq!(cursor.take().0, "a");
    }

    #[test]
    fn empty_answer_falls_back_to_literal() {
        let mut cursor = HostCursor::new(Vec::new(), ("example.net".to_owned(), 5223));
        assert_eq!(cursor.take(), ("example.net".to_owned(), 5223));
        assert_eq!(cursor.take(), ("example.net".to_owned(), 5223));
        assert_eq!(cursor.position(), 0);
    }
}
