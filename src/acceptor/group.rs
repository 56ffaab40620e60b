use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use super::{normalize_path, HttpAcceptor, ReactorRef, RoutingMode};
use crate::config::model::{AccessPoint, AccessPointTarget};
use crate::event::{Event, EventManager, EventType, Subscription};

/// Live set of HTTP acceptors, one per access point host of an
/// environment and target kind.
///
/// The set is seeded from a snapshot and then follows access-point
/// DEPLOY / UNDEPLOY events. Readers load an immutable snapshot and never
/// observe a partially applied change. Matching and ordering delegate to
/// the first acceptor in the set; an empty group never accepts and
/// reports priority `-1`.
#[derive(Clone)]
pub struct AccessPointAcceptor {
    inner: Arc<Group>,
}

struct Group {
    environment_id: String,
    target: AccessPointTarget,
    path: String,
    mode: RoutingMode,
    reactor: ReactorRef,
    server_ids: BTreeSet<String>,
    acceptors: ArcSwap<Vec<HttpAcceptor>>,
    events: EventManager,
    subscription: OnceLock<Subscription>,
    on_change: OnceLock<ChangeHook>,
    cleared: AtomicBool,
}

type ChangeHook = Box<dyn Fn() + Send + Sync>;

impl AccessPointAcceptor {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        events: &EventManager,
        environment_id: &str,
        target: AccessPointTarget,
        snapshot: &[AccessPoint],
        path: &str,
        mode: RoutingMode,
        reactor: ReactorRef,
        server_ids: &[String],
    ) -> Self {
        let mut group = Group {
            environment_id: environment_id.to_string(),
            target,
            path: normalize_path(path),
            mode,
            reactor,
            server_ids: server_ids.iter().cloned().collect(),
            acceptors: ArcSwap::from_pointee(Vec::new()),
            events: events.clone(),
            subscription: OnceLock::new(),
            on_change: OnceLock::new(),
            cleared: AtomicBool::new(false),
        };

        let seeded: Vec<HttpAcceptor> = snapshot
            .iter()
            .filter(|ap| group.in_scope(ap))
            .map(|ap| group.acceptor_for(&ap.host))
            .collect();
        group.acceptors = ArcSwap::from_pointee(seeded);

        let inner = Arc::new(group);
        let weak = Arc::downgrade(&inner);
        let id = events.access_points().subscribe(move |event| {
            if let Some(group) = weak.upgrade() {
                group.on_event(event);
            }
        });
        let _ = inner.subscription.set(id);

        Self { inner }
    }

    #[must_use]
    pub fn environment_id(&self) -> &str {
        &self.inner.environment_id
    }

    #[must_use]
    pub fn target(&self) -> AccessPointTarget {
        self.inner.target
    }

    #[must_use]
    pub fn reactor(&self) -> &ReactorRef {
        &self.inner.reactor
    }

    /// Current members, in deployment order.
    #[must_use]
    pub fn acceptors(&self) -> Arc<Vec<HttpAcceptor>> {
        self.inner.acceptors.load_full()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.acceptors.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.acceptors.load().is_empty()
    }

    #[must_use]
    pub fn host(&self) -> Option<String> {
        self.with_head(|head| head.and_then(|a| a.host().map(str::to_string)))
    }

    #[must_use]
    pub fn path(&self) -> String {
        self.with_head(|head| head.map_or_else(|| self.inner.path.clone(), |a| a.path().to_string()))
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.with_head(|head| head.map_or(-1, HttpAcceptor::priority))
    }

    #[must_use]
    pub fn accept(&self, host: Option<&str>, path: &str, server_id: Option<&str>) -> bool {
        self.with_head(|head| head.is_some_and(|a| a.accept(host, path, server_id)))
    }

    /// Run `hook` after every membership change, once the new members are
    /// visible. Only the first hook is kept; returns `false` if one was set.
    pub fn on_change(&self, hook: impl Fn() + Send + Sync + 'static) -> bool {
        self.inner.on_change.set(Box::new(hook)).is_ok()
    }

    /// Unsubscribe from access-point events and drop every member. Idempotent.
    pub fn clear(&self) {
        if self.inner.cleared.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        if let Some(id) = self.inner.subscription.get() {
            self.inner.events.access_points().unsubscribe(*id);
        }
        self.inner.acceptors.store(Arc::new(Vec::new()));
        tracing::debug!(
            reactor = %self.inner.reactor.id(),
            environment = %self.inner.environment_id,
            "access point acceptors cleared"
        );
    }

    pub(super) fn with_head<R>(&self, f: impl FnOnce(Option<&HttpAcceptor>) -> R) -> R {
        let snapshot = self.inner.acceptors.load();
        f(snapshot.first())
    }

    /// Tie-break between groups whose heads compare equal.
    pub(super) fn group_cmp(&self, other: &Self) -> Ordering {
        let a = &self.inner;
        let b = &other.inner;
        a.environment_id
            .cmp(&b.environment_id)
            .then_with(|| a.target.cmp(&b.target))
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.mode.cmp(&b.mode))
            .then_with(|| a.server_ids.cmp(&b.server_ids))
            .then_with(|| a.reactor.cmp(&b.reactor))
    }
}

impl Group {
    fn in_scope(&self, access_point: &AccessPoint) -> bool {
        access_point.environment_id == self.environment_id && access_point.target == self.target
    }

    fn acceptor_for(&self, host: &str) -> HttpAcceptor {
        HttpAcceptor::new(self.mode, Some(host), &self.path, self.reactor.clone())
            .with_server_ids(self.server_ids.iter().cloned())
    }

    fn on_event(&self, event: &Event<AccessPoint>) {
        if !self.in_scope(&event.content) || self.cleared.load(AtomicOrdering::SeqCst) {
            return;
        }

        let acceptor = self.acceptor_for(&event.content.host);
        match event.kind {
            EventType::Deploy => {
                self.acceptors.rcu(|current| {
                    let mut next = Vec::clone(current);
                    next.push(acceptor.clone());
                    next
                });
            }
            EventType::Undeploy => {
                self.acceptors.rcu(|current| {
                    let mut next = Vec::clone(current);
                    if let Some(idx) = next.iter().position(|a| *a == acceptor) {
                        next.remove(idx);
                    }
                    next
                });
            }
            EventType::Update => return,
        }

        if let Some(hook) = self.on_change.get() {
            hook();
        }

        tracing::debug!(
            kind = %event.kind,
            host = %event.content.host,
            reactor = %self.reactor.id(),
            "access point acceptors updated"
        );
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.get() {
            self.events.access_points().unsubscribe(*id);
        }
    }
}

impl fmt::Debug for AccessPointAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPointAcceptor")
            .field("environment_id", &self.inner.environment_id)
            .field("target", &self.inner.target)
            .field("path", &self.inner.path)
            .field("reactor", &self.inner.reactor)
            .field("acceptors", &self.inner.acceptors.load().len())
            .finish()
    }
}
