//! `gatehouse run`: start the gateway.
//!
//! Loads the configuration file, deploys one reactor per API into the
//! registry, starts the Axum HTTP server with graceful shutdown, and
//! spawns a background refresh loop that turns config changes into
//! access-point and reactor deploy events.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::access_point::AccessPointManager;
use crate::cli::RunArgs;
use crate::config::model::{AccessPoint, Api, Config, GatewaySettings};
use crate::config::sources::file_source::FileSource;
use crate::config::sources::SUPPORTED_EXTENSIONS;
use crate::config::{ConfigResolver, ConfigSource};
use crate::error::GatehouseError;
use crate::event::{Event, EventManager, EventType};
use crate::lifecycle::{LifecycleState, Node};
use crate::logging;
use crate::reactor::{GatewayReactorFactory, ReactorEventListener, ReactorHandlerRegistry};
use crate::server::{self, AppState, LoadedConfig, Stats};

/// CLI values that win over the file, on startup and on every reload.
#[derive(Debug, Clone, Copy, Default)]
struct Overrides {
    request_timeout_ms: Option<i64>,
    grace_delay_ms: Option<u64>,
}

impl Overrides {
    fn apply(self, settings: &mut GatewaySettings) {
        if let Some(ms) = self.request_timeout_ms {
            settings.request_timeout_ms = ms;
        }
        if let Some(ms) = self.grace_delay_ms {
            settings.request_timeout_grace_delay_ms = ms;
        }
    }
}

struct Runtime {
    state: Arc<AppState>,
    events: EventManager,
    access_points: Arc<AccessPointManager>,
    overrides: Overrides,
}

pub async fn execute(args: RunArgs) -> Result<(), GatehouseError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    #[cfg(feature = "sentry-integration")]
    let _sentry_guard = args
        .sentry_dsn
        .as_ref()
        .map(|dsn| crate::sentry_integration::init(dsn, args.sentry_environment.as_deref()));

    let overrides = Overrides {
        request_timeout_ms: args.request_timeout,
        grace_delay_ms: args.grace_delay,
    };

    let resolver = resolve_config_sources(&args).await?;
    let (mut config, version) = resolver.load_with_fallback().await?;
    overrides.apply(&mut config.gateway);

    let node = Node::new();
    let events = EventManager::new();
    let access_points = Arc::new(AccessPointManager::new(events.clone()));
    for access_point in &config.access_points {
        access_points.register(access_point.clone());
    }

    let factory = GatewayReactorFactory::new(
        config.gateway.clone(),
        events.clone(),
        Arc::clone(&access_points),
        node.clone(),
        server::build_http_client(),
    );
    let registry = Arc::new(ReactorHandlerRegistry::new(Arc::new(factory)));
    for api in &config.apis {
        if let Err(e) = registry.create(api).await {
            tracing::error!(api_id = %api.id, error = %e, "failed to deploy api");
        }
    }
    let listener = ReactorEventListener::spawn(&events, Arc::clone(&registry));

    let server_id = config.gateway.server_id.clone();
    let api_count = registry.len();
    let acceptor_count = registry.acceptors().len();

    let state = Arc::new(AppState {
        config: tokio::sync::RwLock::new(LoadedConfig {
            config: Arc::new(config),
            version,
            source_name: resolver.primary_name().to_string(),
            loaded_at: Instant::now(),
        }),
        registry: Arc::clone(&registry),
        node: node.clone(),
        server_id: server_id.clone(),
        start_time: Instant::now(),
        stats: Stats::new(),
    });

    // Shutdown signal: dropping shutdown_tx closes the channel and stops the refresh loop
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let runtime = Runtime {
        state: Arc::clone(&state),
        events: events.clone(),
        access_points,
        overrides,
    };
    let poll_interval = args.poll_interval;
    let refresh_handle = tokio::spawn(async move {
        config_refresh_loop(runtime, resolver, poll_interval, shutdown_rx).await;
    });

    let router = server::build_router(state, args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let tcp_listener = tokio::net::TcpListener::bind(addr).await?;
    node.set_state(LifecycleState::Started);

    tracing::info!(
        addr = %addr,
        server_id = %server_id,
        apis = api_count,
        acceptors = acceptor_count,
        "gatehouse started"
    );

    let shutdown_node = node.clone();
    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        shutdown_node.set_state(LifecycleState::Stopping);
        let _ = shutdown_tx.send(true);
    };

    axum::serve(
        tcp_listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown)
    .await?;

    // Wait for the config refresh task to finish (catches panics)
    if let Err(e) = refresh_handle.await {
        tracing::error!(error = %e, "config refresh task failed");
    }

    listener.shutdown().await;
    registry.clear().await;
    node.set_state(LifecycleState::Stopped);

    tracing::info!("gatehouse stopped");
    Ok(())
}

async fn resolve_config_sources(args: &RunArgs) -> Result<ConfigResolver, GatehouseError> {
    let primary = resolve_file_source(args.config.as_deref()).await?;

    primary.map_or_else(
        || {
            Err(GatehouseError::NoConfigSource {
                hint: "Provide --config <file> or create ./gatehouse.yaml.\n  \
                       Run 'gatehouse validate <file>' to check it first."
                    .into(),
            })
        },
        |p| Ok(ConfigResolver::new(p, None)),
    )
}

async fn resolve_file_source(
    explicit: Option<&Path>,
) -> Result<Option<Box<dyn ConfigSource>>, GatehouseError> {
    if let Some(path) = explicit {
        return Ok(Some(Box::new(FileSource::for_path(path)?)));
    }

    // Auto-detect in current directory
    for ext in SUPPORTED_EXTENSIONS {
        let path = PathBuf::from(format!("gatehouse.{ext}"));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return Ok(Some(Box::new(FileSource::for_path(&path)?)));
        }
    }

    Ok(None)
}

async fn config_refresh_loop(
    runtime: Runtime,
    resolver: ConfigResolver,
    interval_secs: u64,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("config refresh loop shutting down");
                return;
            }
        }

        let current_version = {
            let config = runtime.state.config.read().await;
            config.version.clone()
        };

        match resolver.primary().has_changed(&current_version).await {
            Ok(true) => {
                tracing::info!("config change detected, reloading");
                match resolver.load_with_fallback().await {
                    Ok((mut config, version)) => {
                        runtime.overrides.apply(&mut config.gateway);
                        let previous = {
                            let loaded = runtime.state.config.read().await;
                            Arc::clone(&loaded.config)
                        };
                        redeploy(&runtime, &previous, &config);

                        let api_count = config.apis.len();
                        let mut loaded = runtime.state.config.write().await;
                        loaded.config = Arc::new(config);
                        loaded.version = version;
                        loaded.loaded_at = Instant::now();
                        drop(loaded);
                        runtime
                            .state
                            .stats
                            .config_reloads
                            .fetch_add(1, Ordering::Relaxed);
                        tracing::info!(apis = api_count, "config reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "config reload failed, keeping current config");
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "config change check failed");
            }
        }
    }
}

/// Publish the events that move the running gateway from `previous` to `next`.
fn redeploy(runtime: &Runtime, previous: &Config, next: &Config) {
    if previous.gateway != next.gateway {
        tracing::warn!("gateway settings changed, restart to apply them");
    }

    let (removed, added) = diff_access_points(&previous.access_points, &next.access_points);
    for access_point in &removed {
        runtime.access_points.unregister(access_point);
    }
    for access_point in added {
        runtime.access_points.register(access_point);
    }

    for event in diff_apis(&previous.apis, &next.apis) {
        tracing::info!(api_id = %event.content.id, kind = %event.kind, "publishing api change");
        runtime.events.reactors().publish(&event);
    }
}

/// Undeploys first, then updates, then deploys, each in id order.
fn diff_apis(previous: &[Api], next: &[Api]) -> Vec<Event<Api>> {
    let before: BTreeMap<&str, &Api> = previous.iter().map(|a| (a.id.as_str(), a)).collect();
    let after: BTreeMap<&str, &Api> = next.iter().map(|a| (a.id.as_str(), a)).collect();

    let undeploys = before
        .iter()
        .filter(|(id, _)| !after.contains_key(*id))
        .map(|(_, api)| Event::new(EventType::Undeploy, (*api).clone()));
    let updates = after
        .iter()
        .filter(|(id, api)| before.get(*id).is_some_and(|old| old != *api))
        .map(|(_, api)| Event::new(EventType::Update, (*api).clone()));
    let deploys = after
        .iter()
        .filter(|(id, _)| !before.contains_key(*id))
        .map(|(_, api)| Event::new(EventType::Deploy, (*api).clone()));

    undeploys.chain(updates).chain(deploys).collect()
}

/// Returns `(removed, added)`.
fn diff_access_points(
    previous: &[AccessPoint],
    next: &[AccessPoint],
) -> (Vec<AccessPoint>, Vec<AccessPoint>) {
    let removed = previous
        .iter()
        .filter(|ap| !next.contains(ap))
        .cloned()
        .collect();
    let added = next
        .iter()
        .filter(|ap| !previous.contains(ap))
        .cloned()
        .collect();
    (removed, added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{AccessPointTarget, Endpoint, Listener};

    fn api(id: &str, path: &str) -> Api {
        Api {
            id: id.to_string(),
            name: id.to_string(),
            version: "1".to_string(),
            environment_id: "DEFAULT".to_string(),
            listeners: vec![Listener::path(path)],
            servers: Vec::new(),
            tcp_hosts: Vec::new(),
            endpoint: Endpoint {
                target: "http://localhost:9000".to_string(),
                timeout_ms: None,
            },
        }
    }

    fn summary(events: &[Event<Api>]) -> Vec<(EventType, String)> {
        events
            .iter()
            .map(|e| (e.kind, e.content.id.clone()))
            .collect()
    }

    #[test]
    fn api_diff_orders_undeploy_update_deploy() {
        let previous = vec![api("a", "/a"), api("b", "/b"), api("c", "/c")];
        let next = vec![api("d", "/d"), api("b", "/b2"), api("c", "/c")];

        let events = diff_apis(&previous, &next);
        assert_eq!(
            summary(&events),
            vec![
                (EventType::Undeploy, "a".to_string()),
                (EventType::Update, "b".to_string()),
                (EventType::Deploy, "d".to_string()),
            ]
        );
        assert_eq!(events[1].content.listeners[0].path, "/b2");
    }

    #[test]
    fn identical_apis_produce_no_events() {
        let apis = vec![api("a", "/a")];
        assert!(diff_apis(&apis, &apis).is_empty());
    }

    #[test]
    fn access_point_diff_splits_removed_and_added() {
        let keep = AccessPoint::new("keep.acme.com", "DEFAULT", AccessPointTarget::Gateway);
        let gone = AccessPoint::new("gone.acme.com", "DEFAULT", AccessPointTarget::Gateway);
        let new = AccessPoint::new("new.acme.com", "DEFAULT", AccessPointTarget::Gateway);

        let (removed, added) =
            diff_access_points(&[keep.clone(), gone.clone()], &[keep, new.clone()]);
        assert_eq!(removed, vec![gone]);
        assert_eq!(added, vec![new]);
    }

    #[test]
    fn overrides_replace_only_what_was_given() {
        let mut settings = GatewaySettings::default();
        Overrides {
            request_timeout_ms: Some(-1),
            grace_delay_ms: None,
        }
        .apply(&mut settings);
        assert_eq!(settings.request_timeout_ms, -1);
        assert_eq!(settings.request_timeout_grace_delay_ms, 30);
    }
}
