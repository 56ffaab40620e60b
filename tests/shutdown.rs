//! Integration tests for reactor shutdown: draining pending requests,
//! the drain timeout, and stopping dependent components exactly once.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;

use gatehouse::config::model::{Api, Endpoint, Listener};
use gatehouse::config::properties::{Configuration, PENDING_REQUESTS_TIMEOUT};
use gatehouse::error::GatehouseError;
use gatehouse::lifecycle::{LifecycleComponent, LifecycleState, Node};
use gatehouse::reactor::chain::ExecutionResult;
use gatehouse::reactor::{
    ApiReactor, ExecutionContext, GatewayRequest, Invoker, InvokerKind, ReactorComponents,
    ReactorHandler, RequestTimeoutConfiguration, Timer, TokioTimer,
};

#[derive(Default)]
struct CountingComponent {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

#[async_trait]
impl LifecycleComponent for CountingComponent {
    fn name(&self) -> &str {
        "counting"
    }

    async fn start(&self) -> Result<(), GatehouseError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatehouseError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct SleepingInvoker(Duration);

#[async_trait]
impl Invoker for SleepingInvoker {
    fn id(&self) -> &str {
        "sleeping"
    }

    async fn invoke(&self, _ctx: &mut ExecutionContext) -> ExecutionResult {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

/// Clock that only moves when slept on, independent of the tokio runtime.
struct SteppingClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Timer for SteppingClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        *self.offset.lock().unwrap() += duration;
        Box::pin(std::future::ready(()))
    }
}

struct Fixture {
    reactor: Arc<ApiReactor>,
    node: Node,
    policy: Arc<CountingComponent>,
    resource: Arc<CountingComponent>,
    group: Arc<CountingComponent>,
}

async fn fixture(request_duration: Duration, properties: &[(&str, &str)]) -> Fixture {
    fixture_with_timer(request_duration, properties, Arc::new(TokioTimer)).await
}

async fn fixture_with_timer(
    request_duration: Duration,
    properties: &[(&str, &str)],
    timer: Arc<dyn Timer>,
) -> Fixture {
    let node = Node::new();
    node.set_state(LifecycleState::Started);

    let policy = Arc::new(CountingComponent::default());
    let resource = Arc::new(CountingComponent::default());
    let group = Arc::new(CountingComponent::default());

    let properties: BTreeMap<String, String> = properties
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();

    let reactor = ApiReactor::builder(Api {
        id: "drain".into(),
        name: "Drain".into(),
        version: "1".into(),
        environment_id: "DEFAULT".into(),
        listeners: vec![Listener::path("/drain")],
        servers: vec![],
        tcp_hosts: vec![],
        endpoint: Endpoint {
            target: "http://localhost:9999".into(),
            timeout_ms: None,
        },
    })
    .components(ReactorComponents {
        resource_manager: resource.clone(),
        policy_manager: policy.clone(),
        group_lifecycle_manager: group.clone(),
    })
    .invoker(InvokerKind::Reactive(Arc::new(SleepingInvoker(request_duration))))
    .request_timeout(RequestTimeoutConfiguration::new(0, 0))
    .timer(timer)
    .configuration(Configuration::new(properties))
    .node(node.clone())
    .build();
    reactor.start().await.unwrap();

    Fixture {
        reactor,
        node,
        policy,
        resource,
        group,
    }
}

/// Spawn one request and wait until the reactor counts it as pending.
async fn in_flight(reactor: &Arc<ApiReactor>) -> tokio::task::JoinHandle<()> {
    let handler = Arc::clone(reactor);
    let task = tokio::spawn(async move {
        handler
            .handle(
                ExecutionContext::new(GatewayRequest::get("/drain")),
                Box::new(|_| {}),
            )
            .await;
    });
    while reactor.pending_requests() == 0 {
        tokio::task::yield_now().await;
    }
    task
}

#[tokio::test(start_paused = true)]
async fn drain_waits_for_pending_request() {
    let f = fixture(Duration::from_millis(350), &[]).await;
    assert_eq!(f.policy.starts.load(Ordering::SeqCst), 1);
    let request = in_flight(&f.reactor).await;

    let busy_ticks = f.reactor.stop_until(Duration::from_secs(10)).await;

    assert_eq!(busy_ticks, 3);
    assert_eq!(f.reactor.pending_requests(), 0);
    assert_eq!(f.reactor.lifecycle_state(), LifecycleState::Stopped);
    request.await.unwrap();

    // A second stop does not stop the components again.
    f.node.set_state(LifecycleState::Stopping);
    f.reactor.stop().await.unwrap();
    for component in [&f.policy, &f.resource, &f.group] {
        assert_eq!(component.stops.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn idle_reactor_stops_on_first_tick() {
    let f = fixture(Duration::ZERO, &[]).await;

    let begin = tokio::time::Instant::now();
    let busy_ticks = f.reactor.stop_until(Duration::from_secs(10)).await;

    assert_eq!(busy_ticks, 0);
    assert_eq!(begin.elapsed(), Duration::from_millis(100));
    assert_eq!(f.reactor.lifecycle_state(), LifecycleState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn drain_gives_up_after_pending_timeout() {
    let f = fixture(Duration::from_secs(3600), &[(PENDING_REQUESTS_TIMEOUT, "250")]).await;
    let request = in_flight(&f.reactor).await;

    let mut state = f.reactor.subscribe_state();
    f.reactor.stop().await.unwrap();
    assert_eq!(f.reactor.lifecycle_state(), LifecycleState::Stopping);

    let begin = tokio::time::Instant::now();
    state
        .wait_for(|s| *s == LifecycleState::Stopped)
        .await
        .unwrap();

    assert_eq!(begin.elapsed(), Duration::from_millis(300));
    assert_eq!(f.reactor.pending_requests(), 1);
    assert_eq!(f.group.stops.load(Ordering::SeqCst), 1);
    request.abort();
}

#[tokio::test]
async fn stop_when_node_is_not_started_is_immediate() {
    let f = fixture(Duration::ZERO, &[]).await;
    f.node.set_state(LifecycleState::Stopping);

    f.reactor.stop().await.unwrap();

    assert_eq!(f.reactor.lifecycle_state(), LifecycleState::Stopped);
    assert_eq!(f.resource.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn drain_timeout_follows_the_injected_clock() {
    let clock = Arc::new(SteppingClock {
        origin: Instant::now(),
        offset: Mutex::new(Duration::ZERO),
    });
    let f = fixture_with_timer(Duration::from_secs(3600), &[], clock.clone()).await;
    let request = in_flight(&f.reactor).await;

    let busy_ticks = f.reactor.stop_until(Duration::from_millis(250)).await;

    assert_eq!(busy_ticks, 3);
    assert_eq!(clock.elapsed_since(clock.origin), Duration::from_millis(300));
    assert_eq!(f.reactor.lifecycle_state(), LifecycleState::Stopped);
    assert_eq!(f.reactor.pending_requests(), 1);
    request.abort();
}
