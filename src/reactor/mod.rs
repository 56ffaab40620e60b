//! Per-API runtime units and the request pipeline they execute.
//!
//! A reactor is created for each deployed API. The router resolves an
//! inbound request to a reactor through its [`Acceptor`]s and hands it
//! an [`ExecutionContext`]; the reactor runs the staged pipeline in
//! [`api`] and calls the [`EndHandler`] exactly once when done.
//!
//! - [`api`] -- [`ApiReactor`], the staged pipeline and graceful drain.
//! - [`chain`] -- Flow, processor and security chain seams.
//! - [`context`] -- Request, response and per-request attributes.
//! - [`interrupt`] -- Benign and failure interruptions.
//! - [`invoker`] -- Backend invokers and the legacy callback bridge.
//! - [`processor`] -- Built-in processors.
//! - [`registry`] -- Deployed reactors and their sorted acceptors.

pub mod api;
pub mod chain;
pub mod context;
pub mod interrupt;
pub mod invoker;
pub mod pending;
pub mod processor;
pub mod registry;
pub mod timer;

use async_trait::async_trait;

pub use api::{ApiReactor, ApiReactorBuilder, ReactorChains, ReactorComponents};
pub use chain::{ExecutionResult, FlowChain, Processor, ProcessorChain, SecurityChain};
pub use context::{ExecutionContext, ExecutionPhase, GatewayRequest, GatewayResponse};
pub use interrupt::{ExecutionError, ExecutionFailure};
pub use invoker::{Invoker, InvokerKind, LegacyInvoker};
pub use registry::{
    GatewayReactorFactory, ReactorEventListener, ReactorFactory, ReactorHandlerRegistry,
};
pub use timer::{RequestTimeoutConfiguration, Timer, TokioTimer};

use crate::acceptor::Acceptor;
use crate::error::GatehouseError;
use crate::lifecycle::LifecycleState;

/// Called once with the finished context, whichever way the request ended.
pub type EndHandler = Box<dyn FnOnce(ExecutionContext) + Send>;

#[async_trait]
pub trait ReactorHandler: Send + Sync {
    /// Identity of the reactor; the id of the API it serves.
    fn id(&self) -> &str;

    fn acceptors(&self) -> Vec<Acceptor>;

    fn lifecycle_state(&self) -> LifecycleState;

    fn pending_requests(&self) -> usize;

    async fn handle(&self, ctx: ExecutionContext, end: EndHandler);

    async fn start(&self) -> Result<(), GatehouseError>;

    async fn stop(&self) -> Result<(), GatehouseError>;
}
