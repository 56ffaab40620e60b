//! Integration tests for the reactor pipeline: stage order, request
//! deadlines, security rejection, benign interruptions, and the legacy
//! invoker bridge.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use gatehouse::config::model::{Api, Endpoint, Listener};
use gatehouse::entrypoint::dispatch;
use gatehouse::reactor::chain::{ExecutionResult, FlowChain, ProcessorChain, SecurityChain};
use gatehouse::reactor::interrupt::REQUEST_TIMEOUT_KEY;
use gatehouse::reactor::invoker::{LegacyHandler, LegacyResponse};
use gatehouse::reactor::{
    ApiReactor, ExecutionContext, ExecutionFailure, ExecutionPhase, GatewayRequest, Invoker,
    InvokerKind, LegacyInvoker, ReactorChains, ReactorHandler, RequestTimeoutConfiguration,
};

type Log = Arc<Mutex<Vec<String>>>;

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

struct RecordingFlow {
    id: &'static str,
    log: Log,
    interrupt_request: bool,
}

#[async_trait]
impl FlowChain for RecordingFlow {
    fn id(&self) -> &str {
        self.id
    }

    async fn execute(&self, ctx: &mut ExecutionContext, phase: ExecutionPhase) -> ExecutionResult {
        self.log.lock().unwrap().push(format!("{}:{phase}", self.id));
        if self.interrupt_request && phase == ExecutionPhase::Request {
            ctx.response_mut().status = StatusCode::FOUND;
            return Err(ctx.interrupt());
        }
        Ok(())
    }
}

struct RecordingProcessors {
    id: &'static str,
    log: Log,
}

#[async_trait]
impl ProcessorChain for RecordingProcessors {
    fn id(&self) -> &str {
        self.id
    }

    async fn execute(&self, _ctx: &mut ExecutionContext, _phase: ExecutionPhase) -> ExecutionResult {
        self.log.lock().unwrap().push(self.id.to_string());
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Security {
    Pass,
    Reject(u16),
    /// Fails without recording the failure on the context.
    Refuse(u16),
    Interrupt,
}

struct RecordingSecurity {
    log: Log,
    outcome: Security,
}

#[async_trait]
impl SecurityChain for RecordingSecurity {
    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        self.log.lock().unwrap().push("security".to_string());
        match self.outcome {
            Security::Pass => Ok(()),
            Security::Reject(status) => Err(ctx.interrupt_with(
                ExecutionFailure::new(status).with_message("Unauthorized"),
            )),
            Security::Refuse(status) => {
                Err(ExecutionFailure::new(status).with_message("Unauthorized").into())
            }
            Security::Interrupt => Err(ctx.interrupt()),
        }
    }
}

struct SlowInvoker {
    log: Log,
    delay: Duration,
}

#[async_trait]
impl Invoker for SlowInvoker {
    fn id(&self) -> &str {
        "slow"
    }

    async fn invoke(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        self.log.lock().unwrap().push("invoke".to_string());
        tokio::time::sleep(self.delay).await;
        ctx.response_mut().body = Bytes::from_static(b"pong");
        Ok(())
    }
}

fn api() -> Api {
    Api {
        id: "echo".into(),
        name: "Echo".into(),
        version: "1".into(),
        environment_id: "DEFAULT".into(),
        listeners: vec![Listener::path("/echo")],
        servers: vec![],
        tcp_hosts: vec![],
        endpoint: Endpoint {
            target: "http://localhost:9999".into(),
            timeout_ms: None,
        },
    }
}

fn recording_chains(log: &Log, security: Security, interrupt_api_request: bool) -> ReactorChains {
    let flow = |id: &'static str, interrupt_request: bool| -> Arc<dyn FlowChain> {
        Arc::new(RecordingFlow {
            id,
            log: Arc::clone(log),
            interrupt_request,
        })
    };
    let processors = |id: &'static str| -> Arc<dyn ProcessorChain> {
        Arc::new(RecordingProcessors {
            id,
            log: Arc::clone(log),
        })
    };

    ReactorChains {
        platform: flow("platform", false),
        plan: flow("plan", false),
        api: flow("api", interrupt_api_request),
        security: Arc::new(RecordingSecurity {
            log: Arc::clone(log),
            outcome: security,
        }),
        before_handle: processors("before-handle"),
        before_security: processors("before-security"),
        before_api_flows: processors("before-api-flows"),
        after_api_flows: processors("after-api-flows"),
        on_error: processors("on-error"),
        after_handle: processors("after-handle"),
    }
}

async fn started(
    chains: ReactorChains,
    invoker: InvokerKind,
    timeout: RequestTimeoutConfiguration,
) -> Arc<ApiReactor> {
    let reactor = ApiReactor::builder(api())
        .chains(chains)
        .invoker(invoker)
        .request_timeout(timeout)
        .build();
    reactor.start().await.unwrap();
    reactor
}

async fn run(reactor: &ApiReactor, path: &str) -> ExecutionContext {
    let (tx, rx) = tokio::sync::oneshot::channel();
    reactor
        .handle(
            ExecutionContext::new(GatewayRequest::get(path)),
            Box::new(move |ctx| {
                let _ = tx.send(ctx);
            }),
        )
        .await;
    rx.await.unwrap()
}

fn slow(log: &Log, delay: Duration) -> InvokerKind {
    InvokerKind::Reactive(Arc::new(SlowInvoker {
        log: Arc::clone(log),
        delay,
    }))
}

#[tokio::test]
async fn stages_run_in_order() {
    let log = Log::default();
    let reactor = started(
        recording_chains(&log, Security::Pass, false),
        slow(&log, Duration::ZERO),
        RequestTimeoutConfiguration::default(),
    )
    .await;

    let ctx = run(&reactor, "/echo/items").await;

    assert_eq!(
        entries(&log),
        vec![
            "before-handle",
            "platform:REQUEST",
            "before-security",
            "security",
            "before-api-flows",
            "plan:REQUEST",
            "api:REQUEST",
            "invoke",
            "plan:RESPONSE",
            "api:RESPONSE",
            "after-api-flows",
            "platform:RESPONSE",
            "after-handle",
        ]
    );
    assert_eq!(ctx.response().status, StatusCode::OK);
    assert_eq!(ctx.response().body, Bytes::from_static(b"pong"));
    assert!(ctx.response().ended());
    assert_eq!(ctx.metrics().status, 200);
    assert_eq!(reactor.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_fires_after_timeout_plus_grace() {
    let log = Log::default();
    let reactor = started(
        recording_chains(&log, Security::Pass, false),
        slow(&log, Duration::from_secs(10)),
        RequestTimeoutConfiguration::new(200, 30),
    )
    .await;

    let begin = tokio::time::Instant::now();
    let ctx = run(&reactor, "/echo").await;
    let elapsed = begin.elapsed();

    assert!(elapsed >= Duration::from_millis(230), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "fired late: {elapsed:?}");
    assert_eq!(ctx.response().status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(ctx.metrics().error_key.as_deref(), Some(REQUEST_TIMEOUT_KEY));
    assert_eq!(ctx.failure().map(ExecutionFailure::status_code), Some(504));

    let log = entries(&log);
    assert!(log.contains(&"on-error".to_string()));
    assert!(!log.contains(&"after-api-flows".to_string()));
    assert!(!log.contains(&"api:RESPONSE".to_string()));
    assert_eq!(log[log.len() - 2..], ["platform:RESPONSE", "after-handle"]);
}

#[tokio::test(start_paused = true)]
async fn non_positive_timeout_never_arms_a_deadline() {
    for request_timeout_ms in [0, -1] {
        let log = Log::default();
        let reactor = started(
            recording_chains(&log, Security::Pass, false),
            slow(&log, Duration::from_secs(120)),
            RequestTimeoutConfiguration::new(request_timeout_ms, 30),
        )
        .await;

        let begin = tokio::time::Instant::now();
        let ctx = run(&reactor, "/echo").await;

        assert!(begin.elapsed() >= Duration::from_secs(120));
        assert_eq!(ctx.response().status, StatusCode::OK);
        assert!(ctx.failure().is_none());
        assert!(!entries(&log).contains(&"on-error".to_string()));
    }
}

#[tokio::test]
async fn security_rejection_skips_api_stages() {
    let log = Log::default();
    let reactor = started(
        recording_chains(&log, Security::Reject(401), false),
        slow(&log, Duration::ZERO),
        RequestTimeoutConfiguration::default(),
    )
    .await;

    let ctx = run(&reactor, "/echo").await;

    assert_eq!(
        entries(&log),
        vec![
            "before-handle",
            "platform:REQUEST",
            "before-security",
            "security",
            "on-error",
            "platform:RESPONSE",
            "after-handle",
        ]
    );
    assert_eq!(ctx.response().status, StatusCode::UNAUTHORIZED);
    assert_eq!(ctx.metrics().error_message.as_deref(), Some("Unauthorized"));
}

#[tokio::test]
async fn benign_security_interruption_runs_response_flows() {
    let log = Log::default();
    let reactor = started(
        recording_chains(&log, Security::Interrupt, false),
        slow(&log, Duration::ZERO),
        RequestTimeoutConfiguration::default(),
    )
    .await;

    run(&reactor, "/echo").await;

    assert_eq!(
        entries(&log),
        vec![
            "before-handle",
            "platform:REQUEST",
            "before-security",
            "security",
            "plan:RESPONSE",
            "api:RESPONSE",
            "after-api-flows",
            "platform:RESPONSE",
            "after-handle",
        ]
    );
}

#[tokio::test]
async fn benign_flow_interruption_skips_invocation_only() {
    let log = Log::default();
    let reactor = started(
        recording_chains(&log, Security::Pass, true),
        slow(&log, Duration::ZERO),
        RequestTimeoutConfiguration::default(),
    )
    .await;

    let ctx = run(&reactor, "/echo").await;

    assert_eq!(
        entries(&log),
        vec![
            "before-handle",
            "platform:REQUEST",
            "before-security",
            "security",
            "before-api-flows",
            "plan:REQUEST",
            "api:REQUEST",
            "plan:RESPONSE",
            "api:RESPONSE",
            "after-api-flows",
            "platform:RESPONSE",
            "after-handle",
        ]
    );
    assert_eq!(ctx.response().status, StatusCode::FOUND);
    assert!(ctx.failure().is_none());
}

struct CallbackInvoker {
    respond: bool,
}

impl LegacyInvoker for CallbackInvoker {
    fn id(&self) -> &str {
        "callback"
    }

    fn invoke(&self, request: GatewayRequest, handler: LegacyHandler) {
        if !self.respond {
            drop(handler);
            return;
        }
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let mut headers = HeaderMap::new();
            headers.insert("x-echo-path", request.path().parse().unwrap());
            handler(Ok(LegacyResponse {
                status: StatusCode::CREATED,
                headers,
                body: Bytes::from_static(b"created"),
            }));
        });
    }
}

#[tokio::test]
async fn legacy_invoker_response_is_bridged() {
    let log = Log::default();
    let reactor = started(
        recording_chains(&log, Security::Pass, false),
        InvokerKind::Legacy(Arc::new(CallbackInvoker { respond: true })),
        RequestTimeoutConfiguration::default(),
    )
    .await;

    let ctx = run(&reactor, "/echo/orders").await;

    assert_eq!(ctx.response().status, StatusCode::CREATED);
    assert_eq!(ctx.response().headers["x-echo-path"], "/echo/orders");
    assert_eq!(ctx.response().body, Bytes::from_static(b"created"));
    assert!(!entries(&log).contains(&"on-error".to_string()));
}

#[tokio::test]
async fn dropped_legacy_handler_fails_the_request() {
    let log = Log::default();
    let reactor = started(
        recording_chains(&log, Security::Pass, false),
        InvokerKind::Legacy(Arc::new(CallbackInvoker { respond: false })),
        RequestTimeoutConfiguration::default(),
    )
    .await;

    let ctx = run(&reactor, "/echo").await;

    assert!(entries(&log).contains(&"on-error".to_string()));
    assert_eq!(
        ctx.metrics().error_message.as_deref(),
        Some("legacy invoker dropped its handler without responding")
    );
}

#[tokio::test]
async fn builtin_chains_render_failures_as_json() {
    let chains = ReactorChains {
        security: Arc::new(RecordingSecurity {
            log: Log::default(),
            outcome: Security::Reject(403),
        }),
        ..gatehouse::reactor::processor::builtin_chains(&Default::default())
    };
    let reactor = started(
        chains,
        slow(&Log::default(), Duration::ZERO),
        RequestTimeoutConfiguration::default(),
    )
    .await;

    let ctx = run(&reactor, "/echo").await;

    assert_eq!(ctx.response().status, StatusCode::FORBIDDEN);
    assert_eq!(ctx.response().headers[http::header::CONTENT_TYPE], "application/json");
    let body: serde_json::Value = serde_json::from_slice(&ctx.response().body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "message": "Unauthorized", "http_status_code": 403 })
    );
    assert!(ctx
        .response()
        .headers
        .contains_key(gatehouse::reactor::processor::REQUEST_ID_HEADER));
}

#[tokio::test]
async fn returned_failure_drives_the_error_response() {
    let chains = ReactorChains {
        security: Arc::new(RecordingSecurity {
            log: Log::default(),
            outcome: Security::Refuse(401),
        }),
        ..gatehouse::reactor::processor::builtin_chains(&Default::default())
    };
    let reactor = started(
        chains,
        slow(&Log::default(), Duration::ZERO),
        RequestTimeoutConfiguration::default(),
    )
    .await;

    let ctx = run(&reactor, "/echo").await;

    assert_eq!(ctx.response().status, StatusCode::UNAUTHORIZED);
    assert_eq!(ctx.failure().map(ExecutionFailure::status_code), Some(401));
    let body: serde_json::Value = serde_json::from_slice(&ctx.response().body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "message": "Unauthorized", "http_status_code": 401 })
    );
}

#[tokio::test(start_paused = true)]
async fn abandoned_request_still_runs_to_completion() {
    let log = Log::default();
    let reactor = started(
        recording_chains(&log, Security::Pass, false),
        slow(&log, Duration::from_secs(1)),
        RequestTimeoutConfiguration::new(0, 0),
    )
    .await;

    let handler: Arc<dyn ReactorHandler> = reactor.clone();
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        dispatch(handler, ExecutionContext::new(GatewayRequest::get("/echo"))),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(reactor.pending_requests(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(reactor.pending_requests(), 0);
    assert_eq!(entries(&log).last().map(String::as_str), Some("after-handle"));
}
