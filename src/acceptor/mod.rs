//! Acceptors decide which reactor an inbound request belongs to.
//!
//! An [`Acceptor`] is one of a closed set of variants sharing a single
//! matching interface:
//!
//! - [`HttpAcceptor`]: host/path/server matching in either
//!   [`RoutingMode::Strict`] or [`RoutingMode::Overlapping`] mode.
//! - [`AccessPointAcceptor`]: a live group of HTTP acceptors, one per
//!   access point host, maintained from deploy events.
//! - [`TcpAcceptor`]: SNI host matching for TCP proxying.
//!
//! Acceptors form a strict total order (see [`Acceptor::cmp`]); the
//! registry sorts them and the first one that accepts a request wins.
//! Each acceptor keeps a [`ReactorRef`] back to the reactor it routes
//! to, without owning it.

mod group;
mod http;
mod tcp;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

pub use group::AccessPointAcceptor;
pub use http::HttpAcceptor;
pub use tcp::TcpAcceptor;

pub use crate::config::model::RoutingMode;
use crate::reactor::ReactorHandler;

/// Canonical form of a listener path: leading and trailing slash, no
/// repeated slashes. Empty input maps to `/`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized = String::with_capacity(path.len() + 2);
    for c in std::iter::once('/').chain(path.chars()).chain(std::iter::once('/')) {
        if c == '/' && normalized.ends_with('/') {
            continue;
        }
        normalized.push(c);
    }
    normalized
}

/// Bare variant of a normalized path, used for exact matches (`/a/` -> `/a`).
#[must_use]
pub fn without_trailing_slash(normalized: &str) -> &str {
    if normalized.len() > 1 {
        normalized.strip_suffix('/').unwrap_or(normalized)
    } else {
        normalized
    }
}

/// Drop a trailing `:port` from a host header value.
#[must_use]
pub fn strip_port(host: &str) -> &str {
    match host.rfind(':') {
        Some(idx)
            if !host[idx + 1..].is_empty()
                && host[idx + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &host[..idx]
        }
        _ => host,
    }
}

pub(crate) fn count_slashes(path: &str) -> i32 {
    i32::try_from(path.matches('/').count()).unwrap_or(i32::MAX)
}

/// Non-owning handle to the reactor an acceptor routes to.
///
/// Identity (equality, ordering, hashing) is the reactor id alone.
#[derive(Clone)]
pub struct ReactorRef {
    id: Arc<str>,
    handler: Option<Weak<dyn ReactorHandler>>,
}

impl ReactorRef {
    #[must_use]
    pub fn new(id: impl Into<Arc<str>>, handler: Weak<dyn ReactorHandler>) -> Self {
        Self {
            id: id.into(),
            handler: Some(handler),
        }
    }

    /// A reference that never resolves to a live reactor.
    #[must_use]
    pub fn detached(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            handler: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn upgrade(&self) -> Option<Arc<dyn ReactorHandler>> {
        self.handler.as_ref().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for ReactorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReactorRef").field(&self.id).finish()
    }
}

impl PartialEq for ReactorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ReactorRef {}

impl PartialOrd for ReactorRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReactorRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for ReactorRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug, Clone)]
pub enum Acceptor {
    Http(HttpAcceptor),
    AccessPoint(AccessPointAcceptor),
    Tcp(TcpAcceptor),
}

impl Acceptor {
    #[must_use]
    pub fn host(&self) -> Option<String> {
        match self {
            Self::Http(a) => a.host().map(str::to_string),
            Self::AccessPoint(g) => g.host(),
            Self::Tcp(a) => Some(a.host().to_string()),
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Http(a) => a.path().to_string(),
            Self::AccessPoint(g) => g.path(),
            Self::Tcp(_) => String::new(),
        }
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        match self {
            Self::Http(a) => a.priority(),
            Self::AccessPoint(g) => g.priority(),
            Self::Tcp(_) => 0,
        }
    }

    #[must_use]
    pub fn reactor(&self) -> &ReactorRef {
        match self {
            Self::Http(a) => a.reactor(),
            Self::AccessPoint(g) => g.reactor(),
            Self::Tcp(a) => a.reactor(),
        }
    }

    #[must_use]
    pub const fn is_tcp(&self) -> bool {
        matches!(self, Self::Tcp(_))
    }

    /// HTTP matching. TCP acceptors never accept here.
    #[must_use]
    pub fn accept(&self, host: Option<&str>, path: &str, server_id: Option<&str>) -> bool {
        match self {
            Self::Http(a) => a.accept(host, path, server_id),
            Self::AccessPoint(g) => g.accept(host, path, server_id),
            Self::Tcp(_) => false,
        }
    }

    /// SNI matching. HTTP acceptors never accept here.
    #[must_use]
    pub fn accept_sni(&self, sni: &str, server_id: &str) -> bool {
        match self {
            Self::Tcp(a) => a.accept(sni, server_id),
            _ => false,
        }
    }

    /// Release event subscriptions held by the acceptor. Idempotent.
    pub fn clear(&self) {
        if let Self::AccessPoint(g) = self {
            g.clear();
        }
    }

    const fn variant_rank(&self) -> u8 {
        match self {
            Self::Http(_) => 0,
            Self::AccessPoint(_) => 1,
            Self::Tcp(_) => 2,
        }
    }

    fn with_head<R>(&self, f: impl FnOnce(Option<&HttpAcceptor>) -> R) -> R {
        match self {
            Self::Http(a) => f(Some(a)),
            Self::AccessPoint(g) => g.with_head(f),
            Self::Tcp(_) => f(None),
        }
    }

    fn head(&self) -> Option<HttpAcceptor> {
        self.with_head(|head| head.cloned())
    }

    /// Ordering given the head each side resolved to.
    fn cmp_with_heads(
        &self,
        head: Option<&HttpAcceptor>,
        other: &Self,
        other_head: Option<&HttpAcceptor>,
    ) -> Ordering {
        if let (Self::Tcp(a), Self::Tcp(b)) = (self, other) {
            return a.cmp(b);
        }
        if self.is_tcp() || other.is_tcp() {
            return self.variant_rank().cmp(&other.variant_rank());
        }

        let by_head = match (head, other_head) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };

        by_head
            .then_with(|| self.variant_rank().cmp(&other.variant_rank()))
            .then_with(|| match (self, other) {
                (Self::AccessPoint(a), Self::AccessPoint(b)) => a.group_cmp(b),
                _ => Ordering::Equal,
            })
    }
}

/// Sort acceptors in resolution order.
///
/// Access-point groups can change their head while the sort runs, so each
/// head is captured once up front and the whole sort sees the same values.
pub fn sort_acceptors(acceptors: &mut Vec<Acceptor>) {
    let mut keyed: Vec<(Option<HttpAcceptor>, Acceptor)> =
        acceptors.drain(..).map(|a| (a.head(), a)).collect();
    keyed.sort_by(|(head, a), (other_head, b)| {
        a.cmp_with_heads(head.as_ref(), b, other_head.as_ref())
    });
    acceptors.extend(keyed.into_iter().map(|(_, a)| a));
}

impl PartialEq for Acceptor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Acceptor {}

impl PartialOrd for Acceptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Acceptor {
    /// TCP acceptors sort after every HTTP acceptor. HTTP-side variants
    /// compare through their head acceptor; an empty access-point group
    /// has no head and sorts last among them.
    fn cmp(&self, other: &Self) -> Ordering {
        self.with_head(|head| {
            other.with_head(|other_head| self.cmp_with_heads(head, other, other_head))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_normalizes_to_root() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn duplicate_slashes_collapse() {
        assert_eq!(normalize_path("//a//b"), "/a/b/");
        assert_eq!(normalize_path("teams"), "/teams/");
        assert_eq!(normalize_path("/teams/"), "/teams/");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["", "/", "a", "//a//b", "/a/b/c/", "///x///"] {
            let once = normalize_path(raw);
            assert_eq!(normalize_path(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn bare_path_keeps_root() {
        assert_eq!(without_trailing_slash("/"), "/");
        assert_eq!(without_trailing_slash("/a/b/"), "/a/b");
    }

    #[test]
    fn port_is_stripped_only_when_numeric() {
        assert_eq!(strip_port("foo.acme.com:8080"), "foo.acme.com");
        assert_eq!(strip_port("foo.acme.com"), "foo.acme.com");
        assert_eq!(strip_port("foo.acme.com:"), "foo.acme.com:");
        assert_eq!(strip_port("[::1]:443"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
    }

    #[test]
    fn tcp_sorts_after_http() {
        let http = Acceptor::Http(HttpAcceptor::new(
            RoutingMode::Strict,
            None,
            "/",
            ReactorRef::detached("a"),
        ));
        let tcp = Acceptor::Tcp(TcpAcceptor::new("db.acme.com", ReactorRef::detached("a")));
        assert!(http < tcp);
        assert!(!http.accept_sni("db.acme.com", "tcp"));
        assert!(!tcp.accept(Some("db.acme.com"), "/", None));
    }

    #[test]
    fn sort_acceptors_matches_ord() {
        let http = |host: Option<&str>, path: &str, id: &str| {
            Acceptor::Http(HttpAcceptor::new(
                RoutingMode::Overlapping,
                host,
                path,
                ReactorRef::detached(id),
            ))
        };
        let input = vec![
            Acceptor::Tcp(TcpAcceptor::new("db.acme.com", ReactorRef::detached("db"))),
            http(None, "/", "root"),
            http(Some("*.acme.com"), "/orders", "wild"),
            http(None, "/orders/v2", "v2"),
            http(Some("api.acme.com"), "/orders", "exact"),
        ];

        let mut by_key = input.clone();
        sort_acceptors(&mut by_key);
        let mut by_ord = input;
        by_ord.sort();

        let ids = |v: &[Acceptor]| {
            v.iter()
                .map(|a| a.reactor().id().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&by_key), ids(&by_ord));
        assert_eq!(ids(&by_key), vec!["exact", "wild", "v2", "root", "db"]);
    }

    #[test]
    fn reactor_ref_identity_is_its_id() {
        assert_eq!(ReactorRef::detached("a"), ReactorRef::detached("a"));
        assert!(ReactorRef::detached("a") < ReactorRef::detached("b"));
        assert!(ReactorRef::detached("a").upgrade().is_none());
    }
}
