//! Integration tests for request resolution through the reactor registry,
//! built the way `gatehouse run` builds it.

use std::sync::Arc;

use gatehouse::access_point::AccessPointManager;
use gatehouse::acceptor::Acceptor;
use gatehouse::config::model::{
    AccessPoint, AccessPointTarget, Api, Endpoint, GatewaySettings, Listener,
};
use gatehouse::error::GatehouseError;
use gatehouse::event::{Event, EventManager, EventType};
use gatehouse::lifecycle::Node;
use gatehouse::reactor::{GatewayReactorFactory, ReactorEventListener, ReactorHandlerRegistry};
use gatehouse::server;

fn api(id: &str, listeners: Vec<Listener>) -> Api {
    Api {
        id: id.into(),
        name: id.into(),
        version: "1".into(),
        environment_id: "prod".into(),
        listeners,
        servers: vec![],
        tcp_hosts: vec![],
        endpoint: Endpoint {
            target: "http://localhost:9999".into(),
            timeout_ms: None,
        },
    }
}

struct Gateway {
    events: EventManager,
    access_points: Arc<AccessPointManager>,
    registry: Arc<ReactorHandlerRegistry>,
}

fn gateway(settings: GatewaySettings) -> Gateway {
    let events = EventManager::new();
    let access_points = Arc::new(AccessPointManager::new(events.clone()));
    let factory = GatewayReactorFactory::new(
        settings,
        events.clone(),
        Arc::clone(&access_points),
        Node::new(),
        server::build_http_client(),
    );
    Gateway {
        events,
        access_points,
        registry: Arc::new(ReactorHandlerRegistry::new(Arc::new(factory))),
    }
}

fn resolved(gw: &Gateway, host: Option<&str>, path: &str) -> Option<String> {
    gw.registry
        .resolve_http(host, path, Some("http"))
        .map(|(_, handler)| handler.id().to_string())
}

#[tokio::test]
async fn specific_host_beats_wildcard_and_depth_beats_shallow() {
    let gw = gateway(GatewaySettings::default());
    let apis = [
        api("root", vec![Listener::path("/")]),
        api("v2", vec![Listener::path("/orders/v2")]),
        api("wild", vec![Listener::with_host("*.acme.com", "/orders")]),
        api("exact", vec![Listener::with_host("api.acme.com", "/orders")]),
    ];
    for api in &apis {
        gw.registry.create(api).await.unwrap();
    }

    assert_eq!(resolved(&gw, Some("api.acme.com"), "/orders/1").as_deref(), Some("exact"));
    assert_eq!(resolved(&gw, Some("API.acme.com:8082"), "/orders").as_deref(), Some("exact"));
    assert_eq!(resolved(&gw, Some("shop.acme.com"), "/orders/1").as_deref(), Some("wild"));
    assert_eq!(resolved(&gw, Some("other.io"), "/orders/v2/x").as_deref(), Some("v2"));
    assert_eq!(resolved(&gw, Some("other.io"), "/orders").as_deref(), Some("root"));
    assert_eq!(resolved(&gw, None, "/anything").as_deref(), Some("root"));

    let order: Vec<String> = gw
        .registry
        .acceptors()
        .iter()
        .map(|a| a.reactor().id().to_string())
        .collect();
    assert_eq!(order, vec!["exact", "wild", "v2", "root"]);
}

#[tokio::test]
async fn server_ids_restrict_exposure() {
    let gw = gateway(GatewaySettings::default());
    let mut internal = api("internal", vec![Listener::path("/admin")]);
    internal.servers = vec!["internal".into()];
    gw.registry.create(&internal).await.unwrap();

    assert!(gw.registry.resolve_http(None, "/admin", Some("http")).is_none());
    assert!(gw.registry.resolve_http(None, "/admin", Some("internal")).is_some());
}

#[tokio::test]
async fn tcp_hosts_resolve_by_sni() {
    let gw = gateway(GatewaySettings::default());
    let mut db = api("ledger-db", vec![]);
    db.tcp_hosts = vec!["ledger.db.acme.com".into()];
    gw.registry.create(&db).await.unwrap();

    let (acceptor, handler) = gw.registry.resolve_tcp("ledger.db.acme.com", "http").unwrap();
    assert!(matches!(acceptor, Acceptor::Tcp(_)));
    assert_eq!(handler.id(), "ledger-db");
    assert!(gw.registry.resolve_tcp("other.db.acme.com", "http").is_none());
    assert!(gw.registry.resolve_http(Some("ledger.db.acme.com"), "/", None).is_none());
}

#[tokio::test]
async fn host_less_listeners_follow_access_points() {
    let settings = GatewaySettings {
        environment_id: "prod".into(),
        access_points_enabled: true,
        ..GatewaySettings::default()
    };
    let gw = gateway(settings);
    let primary = AccessPoint::new("gw.acme.com", "prod", AccessPointTarget::Gateway);
    let secondary = AccessPoint::new("gw.acme.eu", "prod", AccessPointTarget::Gateway);
    gw.access_points.register(primary.clone());

    gw.registry
        .create(&api("payments", vec![Listener::path("/payments")]))
        .await
        .unwrap();

    assert_eq!(resolved(&gw, Some("gw.acme.com"), "/payments").as_deref(), Some("payments"));
    assert_eq!(resolved(&gw, Some("elsewhere.io"), "/payments"), None);

    // The group matches on its first member only.
    gw.access_points.register(secondary.clone());
    assert_eq!(resolved(&gw, Some("gw.acme.eu"), "/payments"), None);

    gw.access_points.unregister(&primary);
    assert_eq!(resolved(&gw, Some("gw.acme.eu"), "/payments").as_deref(), Some("payments"));
    assert_eq!(resolved(&gw, Some("gw.acme.com"), "/payments"), None);

    // An empty group is never selected.
    gw.access_points.unregister(&secondary);
    assert_eq!(resolved(&gw, Some("gw.acme.eu"), "/payments"), None);
    assert_eq!(gw.registry.acceptors()[0].priority(), -1);
}

#[tokio::test]
async fn group_moves_ahead_when_its_first_access_point_arrives() {
    let settings = GatewaySettings {
        environment_id: "prod".into(),
        access_points_enabled: true,
        ..GatewaySettings::default()
    };
    let gw = gateway(settings);
    gw.registry
        .create(&api("payments", vec![Listener::path("/payments")]))
        .await
        .unwrap();
    gw.registry
        .create(&api("wild", vec![Listener::with_host("*.acme.com", "/")]))
        .await
        .unwrap();
    assert_eq!(resolved(&gw, Some("gw.acme.com"), "/payments/1").as_deref(), Some("wild"));

    gw.access_points
        .register(AccessPoint::new("gw.acme.com", "prod", AccessPointTarget::Gateway));

    assert_eq!(resolved(&gw, Some("gw.acme.com"), "/payments/1").as_deref(), Some("payments"));
    assert_eq!(resolved(&gw, Some("shop.acme.com"), "/payments/1").as_deref(), Some("wild"));
    let first = &gw.registry.acceptors()[0];
    assert_eq!(first.reactor().id(), "payments");
}

#[tokio::test]
async fn deploy_events_are_applied_in_order() {
    let gw = gateway(GatewaySettings::default());
    let listener = ReactorEventListener::spawn(&gw.events, Arc::clone(&gw.registry));
    let mut applied = listener.applied();

    let v1 = api("orders", vec![Listener::path("/orders")]);
    let mut v2 = v1.clone();
    v2.listeners = vec![Listener::path("/orders/v2")];

    gw.events.reactors().publish(&Event::new(EventType::Deploy, v1.clone()));
    gw.events.reactors().publish(&Event::new(EventType::Update, v2));
    applied.wait_for(|n| *n >= 2).await.unwrap();

    assert_eq!(resolved(&gw, None, "/orders/v2/1").as_deref(), Some("orders"));
    assert_eq!(resolved(&gw, None, "/orders/1"), None);
    assert_eq!(gw.registry.acceptors().len(), 1);

    gw.events.reactors().publish(&Event::new(EventType::Undeploy, v1));
    applied.wait_for(|n| *n >= 3).await.unwrap();
    assert!(gw.registry.is_empty());
    assert!(gw.registry.acceptors().is_empty());

    listener.shutdown().await;
}

#[tokio::test]
async fn invalid_endpoint_is_not_deployed() {
    let gw = gateway(GatewaySettings::default());
    let mut broken = api("broken", vec![Listener::path("/broken")]);
    broken.endpoint.target = "not a url".into();

    let err = gw.registry.create(&broken).await.unwrap_err();
    assert!(matches!(err, GatehouseError::EndpointUrl { .. }));
    assert!(!gw.registry.contains("broken"));
    assert!(gw.registry.acceptors().is_empty());
}
