//! Deployed reactors and the sorted acceptor snapshot the router reads.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::api::ApiReactor;
use super::invoker::InvokerKind;
use super::processor::builtin_chains;
use super::timer::{RequestTimeoutConfiguration, Timer, TokioTimer};
use super::ReactorHandler;
use crate::acceptor::{sort_acceptors, Acceptor};
use crate::access_point::AccessPointManager;
use crate::config::model::{Api, GatewaySettings};
use crate::config::properties::Configuration;
use crate::error::GatehouseError;
use crate::event::{Event, EventManager, EventType, Subscription};
use crate::lifecycle::Node;
use crate::proxy::EndpointInvoker;
use crate::server::HttpClient;

/// Builds the reactors serving one API definition.
pub trait ReactorFactory: Send + Sync {
    fn create(&self, api: &Api) -> Result<Vec<Arc<dyn ReactorHandler>>, GatehouseError>;
}

/// Factory wiring [`ApiReactor`]s with the built-in processors and an
/// [`EndpointInvoker`] from the gateway settings.
pub struct GatewayReactorFactory {
    settings: GatewaySettings,
    configuration: Configuration,
    events: EventManager,
    access_points: Arc<AccessPointManager>,
    node: Node,
    client: HttpClient,
    timer: Arc<dyn Timer>,
}

impl GatewayReactorFactory {
    #[must_use]
    pub fn new(
        settings: GatewaySettings,
        events: EventManager,
        access_points: Arc<AccessPointManager>,
        node: Node,
        client: HttpClient,
    ) -> Self {
        let configuration = Configuration::with_env_overrides(settings.properties.clone());
        Self {
            settings,
            configuration,
            events,
            access_points,
            node,
            client,
            timer: Arc::new(TokioTimer),
        }
    }

    #[must_use]
    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }
}

impl ReactorFactory for GatewayReactorFactory {
    fn create(&self, api: &Api) -> Result<Vec<Arc<dyn ReactorHandler>>, GatehouseError> {
        let timeout = RequestTimeoutConfiguration::new(
            self.settings.request_timeout_ms,
            self.settings.request_timeout_grace_delay_ms,
        );
        let default_endpoint_timeout = u64::try_from(self.settings.request_timeout_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        let invoker =
            EndpointInvoker::new(&api.id, &api.endpoint, self.client.clone(), default_endpoint_timeout)?;

        let mut builder = ApiReactor::builder(api.clone())
            .routing_mode(self.settings.routing_mode)
            .server_id(self.settings.server_id.as_str())
            .chains(builtin_chains(&self.configuration))
            .invoker(InvokerKind::Reactive(Arc::new(invoker)))
            .request_timeout(timeout)
            .timer(Arc::clone(&self.timer))
            .node(self.node.clone())
            .configuration(self.configuration.clone());

        if self.settings.access_points_enabled {
            builder = builder.access_points(
                self.events.clone(),
                self.access_points.get_by_environment_id(&api.environment_id),
            );
        }

        let reactor: Arc<dyn ReactorHandler> = builder.build();
        Ok(vec![reactor])
    }
}

struct Registered {
    handlers: Vec<Arc<dyn ReactorHandler>>,
    acceptors: Vec<Acceptor>,
}

/// Deployed reactors by API id, plus every acceptor in resolution order.
///
/// The acceptor list is an immutable snapshot swapped on each change, so
/// request routing never waits on deployments. Access-point groups re-sort
/// the snapshot themselves whenever their members change.
pub struct ReactorHandlerRegistry {
    factory: Arc<dyn ReactorFactory>,
    reactors: DashMap<String, Registered>,
    acceptors: Arc<ArcSwap<Vec<Acceptor>>>,
}

impl ReactorHandlerRegistry {
    #[must_use]
    pub fn new(factory: Arc<dyn ReactorFactory>) -> Self {
        Self {
            factory,
            reactors: DashMap::new(),
            acceptors: Arc::new(ArcSwap::from_pointee(Vec::new())),
        }
    }

    pub async fn create(&self, api: &Api) -> Result<(), GatehouseError> {
        self.deploy(api).await
    }

    /// Replace the reactors of a deployed API, or create them when absent.
    pub async fn update(&self, api: &Api) -> Result<(), GatehouseError> {
        self.deploy(api).await
    }

    async fn deploy(&self, api: &Api) -> Result<(), GatehouseError> {
        let registered = self.start_reactors(api).await?;
        let acceptors = registered.acceptors.clone();
        let previous = self.reactors.insert(api.id.clone(), registered);
        self.replace_acceptors(&api.id, &acceptors);

        match previous {
            Some(previous) => {
                Self::retire(&api.id, previous).await;
                tracing::info!(api_id = %api.id, "api updated");
            }
            None => tracing::info!(api_id = %api.id, "api deployed"),
        }
        Ok(())
    }

    /// Returns `false` when no API with this id is deployed.
    pub async fn remove(&self, api_id: &str) -> bool {
        let Some((_, previous)) = self.reactors.remove(api_id) else {
            return false;
        };

        self.replace_acceptors(api_id, &[]);
        Self::retire(api_id, previous).await;
        tracing::info!(api_id = %api_id, "api undeployed");
        true
    }

    pub async fn clear(&self) {
        let ids: Vec<String> = self.reactors.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.remove(&id).await;
        }
    }

    #[must_use]
    pub fn contains(&self, api_id: &str) -> bool {
        self.reactors.contains_key(api_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reactors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reactors.is_empty()
    }

    /// Every acceptor, sorted in resolution order.
    #[must_use]
    pub fn acceptors(&self) -> Arc<Vec<Acceptor>> {
        self.acceptors.load_full()
    }

    #[must_use]
    pub fn handlers(&self) -> Vec<Arc<dyn ReactorHandler>> {
        self.reactors
            .iter()
            .flat_map(|entry| entry.value().handlers.clone())
            .collect()
    }

    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.reactors
            .iter()
            .map(|entry| {
                entry
                    .value()
                    .handlers
                    .iter()
                    .map(|h| h.pending_requests())
                    .sum::<usize>()
            })
            .sum()
    }

    /// First acceptor, in resolution order, that accepts the request and
    /// whose reactor is still alive.
    #[must_use]
    pub fn resolve_http(
        &self,
        host: Option<&str>,
        path: &str,
        server_id: Option<&str>,
    ) -> Option<(Acceptor, Arc<dyn ReactorHandler>)> {
        self.resolve(|acceptor| acceptor.accept(host, path, server_id))
    }

    #[must_use]
    pub fn resolve_tcp(&self, sni: &str, server_id: &str) -> Option<(Acceptor, Arc<dyn ReactorHandler>)> {
        self.resolve(|acceptor| acceptor.accept_sni(sni, server_id))
    }

    /// A matching acceptor whose reactor is gone was retired by a
    /// concurrent update; look again in the newer snapshot.
    fn resolve(
        &self,
        accepts: impl Fn(&Acceptor) -> bool,
    ) -> Option<(Acceptor, Arc<dyn ReactorHandler>)> {
        'snapshot: loop {
            let snapshot = self.acceptors.load_full();
            for acceptor in snapshot.iter().filter(|a| accepts(a)) {
                if let Some(handler) = acceptor.reactor().upgrade() {
                    return Some((acceptor.clone(), handler));
                }
                if !Arc::ptr_eq(&snapshot, &self.acceptors.load_full()) {
                    continue 'snapshot;
                }
            }
            return None;
        }
    }

    async fn start_reactors(&self, api: &Api) -> Result<Registered, GatehouseError> {
        let handlers = self.factory.create(api)?;
        for (idx, handler) in handlers.iter().enumerate() {
            if let Err(e) = handler.start().await {
                for started in &handlers[..idx] {
                    if let Err(stop_error) = started.stop().await {
                        tracing::error!(
                            api_id = %api.id,
                            error = %stop_error,
                            "failed to stop reactor after a failed start"
                        );
                    }
                }
                for acceptor in handlers.iter().flat_map(|h| h.acceptors()) {
                    acceptor.clear();
                }
                return Err(e);
            }
        }

        let acceptors = handlers.iter().flat_map(|h| h.acceptors()).collect();
        Ok(Registered { handlers, acceptors })
    }

    async fn retire(api_id: &str, previous: Registered) {
        for acceptor in &previous.acceptors {
            acceptor.clear();
        }
        for handler in previous.handlers {
            if let Err(e) = handler.stop().await {
                tracing::error!(api_id = %api_id, error = %e, "failed to stop reactor");
            }
        }
    }

    /// Swap the acceptors of `api_id` for `acceptors` in a single snapshot
    /// change, so readers see either the old set or the new one.
    fn replace_acceptors(&self, api_id: &str, acceptors: &[Acceptor]) {
        for acceptor in acceptors {
            if let Acceptor::AccessPoint(group) = acceptor {
                let snapshot = Arc::downgrade(&self.acceptors);
                group.on_change(move || {
                    if let Some(snapshot) = snapshot.upgrade() {
                        resort(&snapshot);
                    }
                });
            }
        }

        self.acceptors.rcu(|current| {
            let mut next = Vec::clone(current);
            next.retain(|acceptor| acceptor.reactor().id() != api_id);
            next.extend(acceptors.iter().cloned());
            sort_acceptors(&mut next);
            next
        });
    }
}

fn resort(snapshot: &ArcSwap<Vec<Acceptor>>) {
    snapshot.rcu(|current| {
        let mut next = Vec::clone(current);
        sort_acceptors(&mut next);
        next
    });
}

/// Applies reactor deploy events to a registry, one at a time, in the
/// order they were published.
pub struct ReactorEventListener {
    events: EventManager,
    subscription: Subscription,
    applied: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl ReactorEventListener {
    #[must_use]
    pub fn spawn(events: &EventManager, registry: Arc<ReactorHandlerRegistry>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event<Api>>();
        let subscription = events.reactors().subscribe(move |event| {
            let _ = tx.send(event.clone());
        });

        let (applied_tx, applied) = watch::channel(0_u64);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                apply(&registry, event).await;
                applied_tx.send_modify(|count| *count += 1);
            }
        });

        Self {
            events: events.clone(),
            subscription,
            applied,
            task,
        }
    }

    /// Number of events applied so far.
    #[must_use]
    pub fn applied(&self) -> watch::Receiver<u64> {
        self.applied.clone()
    }

    /// Stop listening. Events already received are still applied.
    pub async fn shutdown(self) {
        self.events.reactors().unsubscribe(self.subscription);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "reactor event listener task failed");
        }
    }
}

async fn apply(registry: &ReactorHandlerRegistry, event: Event<Api>) {
    let api = event.content;
    let result = match event.kind {
        EventType::Deploy => registry.create(&api).await,
        EventType::Update => registry.update(&api).await,
        EventType::Undeploy => {
            registry.remove(&api.id).await;
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::error!(api_id = %api.id, kind = %event.kind, error = %e, "unable to apply reactor event");
    }
}
