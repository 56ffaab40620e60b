use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::ReactorRef;

/// SNI acceptor for TCP proxying.
///
/// Matching is an exact, case-sensitive comparison of the SNI host name;
/// ordering is by host only, ignoring case.
#[derive(Debug, Clone)]
pub struct TcpAcceptor {
    host: String,
    server_ids: BTreeSet<String>,
    reactor: ReactorRef,
}

impl TcpAcceptor {
    #[must_use]
    pub fn new(host: impl Into<String>, reactor: ReactorRef) -> Self {
        Self {
            host: host.into(),
            server_ids: BTreeSet::new(),
            reactor,
        }
    }

    #[must_use]
    pub fn with_server_ids<I, S>(mut self, server_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_ids = server_ids.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn server_ids(&self) -> &BTreeSet<String> {
        &self.server_ids
    }

    #[must_use]
    pub const fn reactor(&self) -> &ReactorRef {
        &self.reactor
    }

    #[must_use]
    pub fn accept(&self, sni: &str, server_id: &str) -> bool {
        self.host == sni && (self.server_ids.is_empty() || self.server_ids.contains(server_id))
    }
}

impl PartialEq for TcpAcceptor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TcpAcceptor {}

impl PartialOrd for TcpAcceptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TcpAcceptor {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.host.bytes().map(|b| b.to_ascii_lowercase());
        let b = other.host.bytes().map(|b| b.to_ascii_lowercase());
        a.cmp(b)
            .then_with(|| self.host.cmp(&other.host))
            .then_with(|| self.server_ids.cmp(&other.server_ids))
            .then_with(|| self.reactor.cmp(&other.reactor))
    }
}
