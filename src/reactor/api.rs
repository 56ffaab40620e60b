//! The per-API reactor and its staged request pipeline.
//!
//! Stages run strictly in sequence on the request's own task:
//!
//! 1. count the request in (released on every exit path)
//! 2. before-handle processors
//! 3. platform flow, request phase
//! 4. before-security processors
//! 5. security chain
//! 6. before-api-flow processors
//! 7. plan flow, request phase
//! 8. API flow, request phase
//! 9. request deadline, armed around stages 6 to 10 and the response flows
//! 10. backend invocation
//!
//! A benign interruption or a normal completion continues with the plan
//! and API response flows and the after-api-flow processors. A failure
//! skips them and runs the on-error processors. Both paths then run the
//! platform response flow and the after-handle processors, end the
//! response, and hand the context back through the end handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use http::header::{HeaderValue, CONNECTION};
use http::StatusCode;
use tokio::sync::watch;

use super::chain::{
    EmptyFlowChain, ExecutionResult, FlowChain, PassThroughSecurityChain, ProcessorChain,
    ProcessorList, SecurityChain,
};
use super::context::{
    ExecutionContext, ExecutionPhase, ATTR_API, ATTR_API_NAME, ATTR_API_VERSION,
    ATTR_CONTEXT_PATH, ATTR_ENVIRONMENT,
};
use super::interrupt::{ExecutionError, ExecutionFailure};
use super::invoker::{self, InvokerKind};
use super::pending::PendingRequests;
use super::timer::{RequestTimeoutConfiguration, Timer, TokioTimer};
use super::{EndHandler, ReactorHandler};
use crate::acceptor::{
    normalize_path, without_trailing_slash, AccessPointAcceptor, Acceptor, HttpAcceptor,
    ReactorRef, RoutingMode, TcpAcceptor,
};
use crate::config::model::{AccessPoint, AccessPointTarget, Api};
use crate::config::properties::{
    Configuration, DEFAULT_PENDING_REQUESTS_TIMEOUT_MS, PENDING_REQUESTS_TIMEOUT,
};
use crate::error::GatehouseError;
use crate::event::EventManager;
use crate::lifecycle::{LifecycleComponent, LifecycleState, Node, NoopComponent};

const DRAIN_TICK: Duration = Duration::from_millis(100);

/// The chains a reactor drives, shared by all of its in-flight requests.
#[derive(Clone)]
pub struct ReactorChains {
    pub platform: Arc<dyn FlowChain>,
    pub plan: Arc<dyn FlowChain>,
    pub api: Arc<dyn FlowChain>,
    pub security: Arc<dyn SecurityChain>,
    pub before_handle: Arc<dyn ProcessorChain>,
    pub before_security: Arc<dyn ProcessorChain>,
    pub before_api_flows: Arc<dyn ProcessorChain>,
    pub after_api_flows: Arc<dyn ProcessorChain>,
    pub on_error: Arc<dyn ProcessorChain>,
    pub after_handle: Arc<dyn ProcessorChain>,
}

impl Default for ReactorChains {
    fn default() -> Self {
        Self {
            platform: Arc::new(EmptyFlowChain::new("platform")),
            plan: Arc::new(EmptyFlowChain::new("plan")),
            api: Arc::new(EmptyFlowChain::new("api")),
            security: Arc::new(PassThroughSecurityChain),
            before_handle: Arc::new(ProcessorList::new("before-handle")),
            before_security: Arc::new(ProcessorList::new("before-security-chain")),
            before_api_flows: Arc::new(ProcessorList::new("before-api-flows")),
            after_api_flows: Arc::new(ProcessorList::new("after-api-flows")),
            on_error: Arc::new(ProcessorList::new("on-error")),
            after_handle: Arc::new(ProcessorList::new("after-handle")),
        }
    }
}

/// Managers started and stopped together with the reactor.
#[derive(Clone)]
pub struct ReactorComponents {
    pub resource_manager: Arc<dyn LifecycleComponent>,
    pub policy_manager: Arc<dyn LifecycleComponent>,
    pub group_lifecycle_manager: Arc<dyn LifecycleComponent>,
}

impl Default for ReactorComponents {
    fn default() -> Self {
        Self {
            resource_manager: Arc::new(NoopComponent::new("resource-manager")),
            policy_manager: Arc::new(NoopComponent::new("policy-manager")),
            group_lifecycle_manager: Arc::new(NoopComponent::new("group-lifecycle-manager")),
        }
    }
}

pub struct ApiReactorBuilder {
    api: Api,
    mode: RoutingMode,
    server_id: Option<String>,
    access_points: Option<(EventManager, Vec<AccessPoint>)>,
    chains: ReactorChains,
    components: ReactorComponents,
    invoker: Option<InvokerKind>,
    timeout: RequestTimeoutConfiguration,
    timer: Arc<dyn Timer>,
    node: Node,
    configuration: Configuration,
}

impl ApiReactorBuilder {
    #[must_use]
    pub const fn routing_mode(mut self, mode: RoutingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Host-less listeners become access-point groups seeded from `snapshot`.
    #[must_use]
    pub fn access_points(mut self, events: EventManager, snapshot: Vec<AccessPoint>) -> Self {
        self.access_points = Some((events, snapshot));
        self
    }

    #[must_use]
    pub fn chains(mut self, chains: ReactorChains) -> Self {
        self.chains = chains;
        self
    }

    #[must_use]
    pub fn components(mut self, components: ReactorComponents) -> Self {
        self.components = components;
        self
    }

    #[must_use]
    pub fn invoker(mut self, invoker: InvokerKind) -> Self {
        self.invoker = Some(invoker);
        self
    }

    #[must_use]
    pub const fn request_timeout(mut self, timeout: RequestTimeoutConfiguration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    #[must_use]
    pub fn node(mut self, node: Node) -> Self {
        self.node = node;
        self
    }

    #[must_use]
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    #[must_use]
    pub fn server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<ApiReactor> {
        let (state, _) = watch::channel(LifecycleState::Initialized);

        Arc::new_cyclic(|this: &Weak<ApiReactor>| {
            let handler: Weak<dyn ReactorHandler> = this.clone();
            let reactor = ReactorRef::new(self.api.id.as_str(), handler);
            let acceptors = build_acceptors(
                &self.api,
                self.mode,
                self.access_points.as_ref(),
                &reactor,
            );
            let context_paths = self
                .api
                .listeners
                .iter()
                .map(|l| normalize_path(&l.path))
                .collect();

            ApiReactor {
                api: self.api,
                this: this.clone(),
                acceptors,
                context_paths,
                chains: self.chains,
                components: self.components,
                invoker: self.invoker,
                timeout: self.timeout,
                timer: self.timer,
                node: self.node,
                configuration: self.configuration,
                pending: PendingRequests::new(),
                state,
                components_stopped: AtomicBool::new(false),
                server_id: self.server_id,
            }
        })
    }
}

fn build_acceptors(
    api: &Api,
    mode: RoutingMode,
    access_points: Option<&(EventManager, Vec<AccessPoint>)>,
    reactor: &ReactorRef,
) -> Vec<Acceptor> {
    let mut acceptors = Vec::with_capacity(api.listeners.len() + api.tcp_hosts.len());

    for listener in &api.listeners {
        let acceptor = match (&listener.host, access_points) {
            (Some(host), _) => Acceptor::Http(
                HttpAcceptor::new(mode, Some(host.as_str()), &listener.path, reactor.clone())
                    .with_server_ids(api.servers.iter().cloned()),
            ),
            (None, Some((events, snapshot))) => Acceptor::AccessPoint(AccessPointAcceptor::new(
                events,
                &api.environment_id,
                AccessPointTarget::Gateway,
                snapshot,
                &listener.path,
                mode,
                reactor.clone(),
                &api.servers,
            )),
            (None, None) => Acceptor::Http(
                HttpAcceptor::new(mode, None, &listener.path, reactor.clone())
                    .with_server_ids(api.servers.iter().cloned()),
            ),
        };
        acceptors.push(acceptor);
    }

    for host in &api.tcp_hosts {
        acceptors.push(Acceptor::Tcp(
            TcpAcceptor::new(host.as_str(), reactor.clone())
                .with_server_ids(api.servers.iter().cloned()),
        ));
    }

    acceptors
}

pub struct ApiReactor {
    api: Api,
    this: Weak<ApiReactor>,
    acceptors: Vec<Acceptor>,
    context_paths: Vec<String>,
    chains: ReactorChains,
    components: ReactorComponents,
    invoker: Option<InvokerKind>,
    timeout: RequestTimeoutConfiguration,
    timer: Arc<dyn Timer>,
    node: Node,
    configuration: Configuration,
    pending: PendingRequests,
    state: watch::Sender<LifecycleState>,
    components_stopped: AtomicBool,
    server_id: Option<String>,
}

impl ApiReactor {
    #[must_use]
    pub fn builder(api: Api) -> ApiReactorBuilder {
        ApiReactorBuilder {
            api,
            mode: RoutingMode::default(),
            server_id: None,
            access_points: None,
            chains: ReactorChains::default(),
            components: ReactorComponents::default(),
            invoker: None,
            timeout: RequestTimeoutConfiguration::default(),
            timer: Arc::new(TokioTimer),
            node: Node::new(),
            configuration: Configuration::default(),
        }
    }

    #[must_use]
    pub const fn api(&self) -> &Api {
        &self.api
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.send_replace(state);
    }

    /// Tick every 100ms until no request is pending or `max` has elapsed,
    /// then stop the dependent components. Returns the number of ticks
    /// that still saw pending requests.
    pub async fn stop_until(&self, max: Duration) -> usize {
        let started = self.timer.now();
        let mut busy_ticks = 0;

        loop {
            self.timer.sleep(DRAIN_TICK).await;
            let pending = self.pending.get();
            if pending == 0 {
                break;
            }
            busy_ticks += 1;
            tracing::debug!(api_id = %self.api.id, pending, "waiting for pending requests");
            if self.timer.elapsed_since(started) >= max {
                tracing::warn!(
                    api_id = %self.api.id,
                    pending,
                    timeout_ms = max.as_millis(),
                    "pending requests did not complete in time, stopping anyway"
                );
                break;
            }
        }

        if let Err(e) = self.stop_now().await {
            tracing::error!(api_id = %self.api.id, error = %e, "failed to stop reactor components");
        }
        busy_ticks
    }

    async fn stop_now(&self) -> Result<(), GatehouseError> {
        let result = self.stop_components().await;
        self.set_state(LifecycleState::Stopped);
        tracing::info!(api_id = %self.api.id, "reactor stopped");
        result
    }

    /// Stops policy, resource and group managers, at most once per reactor.
    async fn stop_components(&self) -> Result<(), GatehouseError> {
        if self.components_stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut first_error = None;
        for component in [
            &self.components.policy_manager,
            &self.components.resource_manager,
            &self.components.group_lifecycle_manager,
        ] {
            if let Err(e) = component.stop().await {
                tracing::error!(
                    api_id = %self.api.id,
                    component = component.name(),
                    error = %e,
                    "component failed to stop"
                );
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn context_path_for(&self, path: &str) -> Option<&str> {
        self.context_paths
            .iter()
            .filter(|cp| path.starts_with(cp.as_str()) || path == without_trailing_slash(cp))
            .max_by_key(|cp| cp.len())
            .map(String::as_str)
    }

    fn prepare(&self, ctx: &mut ExecutionContext) -> Result<(), GatehouseError> {
        let state = *self.state.borrow();
        if !matches!(state, LifecycleState::Started | LifecycleState::Stopping) {
            return Err(GatehouseError::ReactorNotStarted {
                api_id: self.api.id.clone(),
                state: state.to_string(),
            });
        }

        let path = ctx.request().path().to_string();
        let context_path = self.context_path_for(&path).unwrap_or("/").to_string();
        let bare = without_trailing_slash(&context_path);
        let path_info = if bare == "/" {
            path
        } else {
            path.strip_prefix(bare).unwrap_or_default().to_string()
        };

        ctx.set_attribute(ATTR_API, self.api.id.as_str());
        ctx.set_attribute(ATTR_API_NAME, self.api.name.as_str());
        ctx.set_attribute(ATTR_API_VERSION, self.api.version.as_str());
        ctx.set_attribute(ATTR_CONTEXT_PATH, context_path);
        ctx.set_attribute(ATTR_ENVIRONMENT, self.api.environment_id.as_str());

        if ctx.request().server_id.is_none() {
            ctx.request_mut().server_id.clone_from(&self.server_id);
        }
        ctx.request_mut().path_info.clone_from(&path_info);

        let metrics = ctx.metrics_mut();
        metrics.api_id = Some(self.api.id.clone());
        metrics.api_name = Some(self.api.name.clone());
        metrics.path_info = Some(path_info);

        if ctx.invoker().is_none() {
            if let Some(ref invoker) = self.invoker {
                ctx.set_invoker(invoker.clone());
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: &mut ExecutionContext) {
        let started = self.timer.now();

        let outcome = match self.security_stages(ctx).await {
            Ok(()) => self.api_stages_with_deadline(ctx).await,
            Err(ExecutionError::Interrupted) => self.response_stages(ctx).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            self.handle_error(ctx, e).await;
        }

        let remaining = self.timeout.remaining(self.timer.elapsed_since(started));
        match self.platform_response(ctx, remaining).await {
            Ok(()) | Err(ExecutionError::Interrupted) => {}
            Err(e) => self.handle_error(ctx, e).await,
        }

        if let Err(e) = self.chains.after_handle.execute(ctx, ExecutionPhase::Response).await {
            if !e.is_interruption() {
                tracing::warn!(
                    api_id = %self.api.id,
                    request_id = %ctx.request().id,
                    error = %e,
                    "after-handle processors failed"
                );
            }
        }
    }

    /// Stages 2 to 5.
    async fn security_stages(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        self.chains.before_handle.execute(ctx, ExecutionPhase::Request).await?;
        self.chains.platform.execute(ctx, ExecutionPhase::Request).await?;
        self.chains.before_security.execute(ctx, ExecutionPhase::Request).await?;
        self.chains.security.execute(ctx).await
    }

    async fn api_stages_with_deadline(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let Some(budget) = self.timeout.budget() else {
            return self.api_stages(ctx).await;
        };

        let completed = tokio::select! {
            result = self.api_stages(ctx) => Some(result),
            () = self.timer.sleep(budget) => None,
        };

        match completed {
            Some(result) => result,
            None => {
                tracing::warn!(
                    api_id = %self.api.id,
                    request_id = %ctx.request().id,
                    budget_ms = budget.as_millis(),
                    "request timed out"
                );
                Err(ctx.interrupt_with(ExecutionFailure::request_timeout()))
            }
        }
    }

    /// Stages 6 to 10, then the response flows.
    async fn api_stages(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let request: ExecutionResult = async {
            self.chains.before_api_flows.execute(ctx, ExecutionPhase::Request).await?;
            self.chains.plan.execute(ctx, ExecutionPhase::Request).await?;
            self.chains.api.execute(ctx, ExecutionPhase::Request).await?;
            self.invoke(ctx).await
        }
        .await;

        match request {
            Ok(()) | Err(ExecutionError::Interrupted) => self.response_stages(ctx).await,
            Err(e) => Err(e),
        }
    }

    async fn invoke(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let started = self.timer.now();
        let result = invoker::invoke(ctx).await;
        ctx.metrics_mut().endpoint_response_time = Some(self.timer.elapsed_since(started));
        result
    }

    async fn response_stages(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let flows: ExecutionResult = async {
            self.chains.plan.execute(ctx, ExecutionPhase::Response).await?;
            self.chains.api.execute(ctx, ExecutionPhase::Response).await
        }
        .await;

        match flows {
            Ok(()) | Err(ExecutionError::Interrupted) => {
                match self.chains.after_api_flows.execute(ctx, ExecutionPhase::Response).await {
                    Err(ExecutionError::Interrupted) => Ok(()),
                    other => other,
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn platform_response(
        &self,
        ctx: &mut ExecutionContext,
        remaining: Option<Duration>,
    ) -> ExecutionResult {
        let Some(remaining) = remaining else {
            return self.chains.platform.execute(ctx, ExecutionPhase::Response).await;
        };

        let completed = tokio::select! {
            result = self.chains.platform.execute(ctx, ExecutionPhase::Response) => Some(result),
            () = self.timer.sleep(remaining) => None,
        };
        completed.unwrap_or_else(|| Err(ctx.interrupt_with(ExecutionFailure::request_timeout())))
    }

    async fn handle_error(&self, ctx: &mut ExecutionContext, error: ExecutionError) {
        match &error {
            ExecutionError::Interrupted => return,
            ExecutionError::Failure(failure) => {
                tracing::debug!(
                    api_id = %self.api.id,
                    request_id = %ctx.request().id,
                    failure = %failure,
                    "request interrupted with failure"
                );
                // Failures returned without `interrupt_with` still drive the response.
                if ctx.failure() != Some(failure) {
                    let _ = ctx.interrupt_with(failure.clone());
                }
            }
            ExecutionError::Unexpected(cause) => {
                tracing::error!(
                    api_id = %self.api.id,
                    request_id = %ctx.request().id,
                    error = %cause,
                    "unexpected error while handling request"
                );
                ctx.metrics_mut().error_message = Some(cause.to_string());
            }
        }

        if let Err(e) = self.chains.on_error.execute(ctx, ExecutionPhase::Response).await {
            if !e.is_interruption() {
                tracing::warn!(
                    api_id = %self.api.id,
                    request_id = %ctx.request().id,
                    error = %e,
                    "on-error processors failed"
                );
            }
        }
    }
}

#[async_trait]
impl ReactorHandler for ApiReactor {
    fn id(&self) -> &str {
        &self.api.id
    }

    fn acceptors(&self) -> Vec<Acceptor> {
        self.acceptors.clone()
    }

    fn lifecycle_state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    fn pending_requests(&self) -> usize {
        self.pending.get()
    }

    async fn handle(&self, mut ctx: ExecutionContext, end: EndHandler) {
        let _pending = self.pending.enter();

        if let Err(e) = self.prepare(&mut ctx) {
            tracing::error!(
                api_id = %self.api.id,
                request_id = %ctx.request().id,
                error = %e,
                "unable to handle request"
            );
            let response = ctx.response_mut();
            response.status = StatusCode::INTERNAL_SERVER_ERROR;
            response.headers.insert(CONNECTION, HeaderValue::from_static("close"));
            response.end();
            end(ctx);
            return;
        }

        self.execute(&mut ctx).await;
        ctx.metrics_mut().status = ctx.response().status.as_u16();
        ctx.response_mut().end();
        end(ctx);
    }

    async fn start(&self) -> Result<(), GatehouseError> {
        for component in [
            &self.components.resource_manager,
            &self.components.policy_manager,
            &self.components.group_lifecycle_manager,
        ] {
            component.start().await?;
        }

        for acceptor in &self.acceptors {
            let host = acceptor.host();
            tracing::info!(
                api_id = %self.api.id,
                host = host.as_deref().unwrap_or("*"),
                path = %acceptor.path(),
                priority = acceptor.priority(),
                "acceptor registered"
            );
        }

        self.set_state(LifecycleState::Started);
        tracing::info!(api_id = %self.api.id, name = %self.api.name, "reactor started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatehouseError> {
        self.set_state(LifecycleState::Stopping);

        if self.node.state() == LifecycleState::Started {
            if let Some(this) = self.this.upgrade() {
                let max = Duration::from_millis(self.configuration.property(
                    PENDING_REQUESTS_TIMEOUT,
                    DEFAULT_PENDING_REQUESTS_TIMEOUT_MS,
                ));
                tracing::info!(
                    api_id = %self.api.id,
                    pending = self.pending.get(),
                    "draining reactor before stop"
                );
                tokio::spawn(async move {
                    this.stop_until(max).await;
                });
                return Ok(());
            }
        }

        self.stop_now().await
    }
}

impl std::fmt::Debug for ApiReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiReactor")
            .field("api_id", &self.api.id)
            .field("state", &*self.state.borrow())
            .field("pending", &self.pending.get())
            .field("acceptors", &self.acceptors.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{Endpoint, Listener};
    use crate::reactor::context::GatewayRequest;

    fn api(listeners: Vec<Listener>) -> Api {
        Api {
            id: "echo".into(),
            name: "Echo".into(),
            version: "1".into(),
            environment_id: "DEFAULT".into(),
            listeners,
            servers: vec![],
            tcp_hosts: vec![],
            endpoint: Endpoint {
                target: "http://localhost:9999".into(),
                timeout_ms: None,
            },
        }
    }

    #[test]
    fn acceptor_per_listener_and_tcp_host() {
        let mut definition = api(vec![
            Listener::path("/echo"),
            Listener::with_host("api.acme.com", "/echo"),
        ]);
        definition.tcp_hosts = vec!["db.acme.com".into()];
        let reactor = ApiReactor::builder(definition).build();

        let acceptors = reactor.acceptors();
        assert_eq!(acceptors.len(), 3);
        assert!(matches!(acceptors[0], Acceptor::Http(_)));
        assert!(acceptors[2].is_tcp());
        assert_eq!(acceptors[0].reactor().id(), "echo");
        assert!(acceptors[0].reactor().upgrade().is_some());
    }

    #[test]
    fn host_less_listener_becomes_group_with_access_points() {
        let events = EventManager::new();
        let snapshot = vec![AccessPoint::new("a.acme.com", "DEFAULT", AccessPointTarget::Gateway)];
        let reactor = ApiReactor::builder(api(vec![Listener::path("/echo")]))
            .access_points(events, snapshot)
            .build();

        let acceptors = reactor.acceptors();
        assert!(matches!(acceptors[0], Acceptor::AccessPoint(_)));
        assert_eq!(acceptors[0].host().as_deref(), Some("a.acme.com"));
    }

    #[test]
    fn longest_context_path_wins() {
        let reactor = ApiReactor::builder(api(vec![
            Listener::path("/echo"),
            Listener::path("/echo/v2"),
        ]))
        .build();

        assert_eq!(reactor.context_path_for("/echo/v2/items"), Some("/echo/v2/"));
        assert_eq!(reactor.context_path_for("/echo/v1"), Some("/echo/"));
        assert_eq!(reactor.context_path_for("/echo"), Some("/echo/"));
        assert_eq!(reactor.context_path_for("/other"), None);
    }

    #[tokio::test]
    async fn not_started_reactor_answers_500_and_closes() {
        let reactor = ApiReactor::builder(api(vec![Listener::path("/echo")])).build();
        let (tx, rx) = tokio::sync::oneshot::channel();

        reactor
            .handle(
                ExecutionContext::new(GatewayRequest::get("/echo")),
                Box::new(move |ctx| {
                    let _ = tx.send(ctx);
                }),
            )
            .await;

        let ctx = rx.await.unwrap();
        assert_eq!(ctx.response().status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ctx.response().headers[CONNECTION], "close");
        assert!(ctx.response().ended());
        assert_eq!(reactor.pending_requests(), 0);
    }

    #[tokio::test]
    async fn prepare_sets_attributes_and_path_info() {
        let reactor = ApiReactor::builder(api(vec![Listener::path("/echo")]))
            .server_id("http")
            .build();
        reactor.start().await.unwrap();

        let mut ctx = ExecutionContext::new(GatewayRequest::get("/echo/items/1"));
        reactor.prepare(&mut ctx).unwrap();

        assert_eq!(ctx.attribute(ATTR_API), Some(&serde_json::json!("echo")));
        assert_eq!(ctx.attribute(ATTR_CONTEXT_PATH), Some(&serde_json::json!("/echo/")));
        assert_eq!(ctx.request().path_info, "/items/1");
        assert_eq!(ctx.request().server_id.as_deref(), Some("http"));
        assert_eq!(ctx.metrics().api_id.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn stop_outside_started_node_stops_immediately() {
        let reactor = ApiReactor::builder(api(vec![Listener::path("/echo")])).build();
        reactor.start().await.unwrap();
        reactor.stop().await.unwrap();
        assert_eq!(reactor.lifecycle_state(), LifecycleState::Stopped);
    }
}
