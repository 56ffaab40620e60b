use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::{count_slashes, normalize_path, strip_port, without_trailing_slash, ReactorRef, RoutingMode};

const HOST_PRIORITY: i32 = 1000;

/// Host/path/server acceptor for HTTP traffic.
///
/// In [`RoutingMode::Overlapping`] a host written `*.acme.com` is kept as
/// the suffix `.acme.com` and matches any request host ending with it.
#[derive(Debug, Clone)]
pub struct HttpAcceptor {
    mode: RoutingMode,
    host: Option<String>,
    path: String,
    bare_path: String,
    priority: i32,
    server_ids: BTreeSet<String>,
    reactor: ReactorRef,
    // lowercase host, reversed in overlapping mode
    sort_host: Option<String>,
}

impl HttpAcceptor {
    #[must_use]
    pub fn new(mode: RoutingMode, host: Option<&str>, path: &str, reactor: ReactorRef) -> Self {
        let host = host
            .filter(|h| !h.is_empty())
            .map(|h| match mode {
                RoutingMode::Overlapping => h.strip_prefix('*').unwrap_or(h).to_string(),
                RoutingMode::Strict => h.to_string(),
            });
        let path = normalize_path(path);
        let bare_path = without_trailing_slash(&path).to_string();
        let priority = if host.is_some() { HOST_PRIORITY } else { 0 } + count_slashes(&path);
        let sort_host = host.as_deref().map(|h| {
            let lower = h.to_ascii_lowercase();
            match mode {
                RoutingMode::Overlapping => lower.chars().rev().collect(),
                RoutingMode::Strict => lower,
            }
        });

        Self {
            mode,
            host,
            path,
            bare_path,
            priority,
            server_ids: BTreeSet::new(),
            reactor,
            sort_host,
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
    pub const fn mode(&self) -> RoutingMode {
        self.mode
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn path_without_trailing_slash(&self) -> &str {
        &self.bare_path
    }

    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
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
    pub fn is_wildcard(&self) -> bool {
        self.mode == RoutingMode::Overlapping && self.host.as_deref().is_some_and(|h| h.starts_with('.'))
    }

    #[must_use]
    pub fn accept(&self, host: Option<&str>, path: &str, server_id: Option<&str>) -> bool {
        self.accept_server(server_id) && self.accept_host(host) && self.accept_path(path)
    }

    fn accept_server(&self, server_id: Option<&str>) -> bool {
        self.server_ids.is_empty() || server_id.is_some_and(|id| self.server_ids.contains(id))
    }

    fn accept_path(&self, path: &str) -> bool {
        path.starts_with(&self.path) || path == self.bare_path
    }

    fn accept_host(&self, host: Option<&str>) -> bool {
        let Some(expected) = self.host.as_deref() else {
            return true;
        };
        let Some(actual) = host else {
            return false;
        };

        match self.mode {
            RoutingMode::Strict => actual.eq_ignore_ascii_case(expected),
            RoutingMode::Overlapping => {
                let actual = strip_port(actual);
                if self.is_wildcard() {
                    actual
                        .len()
                        .checked_sub(expected.len())
                        .and_then(|start| actual.get(start..))
                        .is_some_and(|tail| tail.eq_ignore_ascii_case(expected))
                } else {
                    actual.eq_ignore_ascii_case(expected)
                }
            }
        }
    }

    fn compare_strict(&self, other: &Self) -> Ordering {
        nulls_last(self.sort_host.as_deref(), other.sort_host.as_deref(), |a, b| a.cmp(b))
            .then_with(|| self.path.cmp(&other.path))
            .then_with(|| other.priority.cmp(&self.priority))
    }

    fn compare_overlapping(&self, other: &Self) -> Ordering {
        nulls_last(self.sort_host.as_deref(), other.sort_host.as_deref(), |a, b| b.cmp(a))
            .then_with(|| other.path.cmp(&self.path))
            .then_with(|| other.priority.cmp(&self.priority))
    }
}

fn nulls_last(a: Option<&str>, b: Option<&str>, cmp: impl FnOnce(&str, &str) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl PartialEq for HttpAcceptor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HttpAcceptor {}

impl PartialOrd for HttpAcceptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HttpAcceptor {
    fn cmp(&self, other: &Self) -> Ordering {
        let ordering = if self.mode == other.mode {
            match self.mode {
                RoutingMode::Strict => self.compare_strict(other),
                RoutingMode::Overlapping => self.compare_overlapping(other),
            }
        } else {
            self.mode.cmp(&other.mode)
        };

        // Remaining fields make the order total and consistent with equality.
        ordering
            .then_with(|| self.host.cmp(&other.host))
            .then_with(|| self.server_ids.cmp(&other.server_ids))
            .then_with(|| self.reactor.cmp(&other.reactor))
    }
}
