//! Backend invocation: the reactive [`Invoker`] trait, the callback-style
//! [`LegacyInvoker`], and the adapter bridging the latter into the former.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tokio::sync::oneshot;

use super::chain::ExecutionResult;
use super::context::{ExecutionContext, GatewayRequest};
use super::interrupt::{ExecutionError, ExecutionFailure};

#[async_trait]
pub trait Invoker: Send + Sync {
    fn id(&self) -> &str;

    async fn invoke(&self, ctx: &mut ExecutionContext) -> ExecutionResult;
}

#[derive(Debug, Clone)]
pub struct LegacyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub type LegacyHandler = Box<dyn FnOnce(Result<LegacyResponse, ExecutionFailure>) + Send>;

/// Callback-style invoker. Implementations are expected to call `handler`
/// exactly once; the adapter fails the request if the handler is dropped
/// without being called.
pub trait LegacyInvoker: Send + Sync {
    fn id(&self) -> &str;

    fn invoke(&self, request: GatewayRequest, handler: LegacyHandler);
}

/// Invoker selected for a request, stored on the [`ExecutionContext`].
#[derive(Clone)]
pub enum InvokerKind {
    Reactive(Arc<dyn Invoker>),
    Legacy(Arc<dyn LegacyInvoker>),
}

impl InvokerKind {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Reactive(invoker) => invoker.id(),
            Self::Legacy(invoker) => invoker.id(),
        }
    }
}

impl fmt::Debug for InvokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reactive(invoker) => f.debug_tuple("Reactive").field(&invoker.id()).finish(),
            Self::Legacy(invoker) => f.debug_tuple("Legacy").field(&invoker.id()).finish(),
        }
    }
}

pub struct LegacyInvokerAdapter {
    inner: Arc<dyn LegacyInvoker>,
}

impl LegacyInvokerAdapter {
    #[must_use]
    pub fn new(inner: Arc<dyn LegacyInvoker>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Invoker for LegacyInvokerAdapter {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn invoke(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let (tx, rx) = oneshot::channel();
        self.inner.invoke(
            ctx.request().clone(),
            Box::new(move |outcome| {
                // The receiver is gone once the request deadline fired.
                let _ = tx.send(outcome);
            }),
        );

        match rx.await {
            Ok(Ok(response)) => {
                let target = ctx.response_mut();
                target.status = response.status;
                target.headers.extend(response.headers);
                target.body = response.body;
                Ok(())
            }
            Ok(Err(failure)) => Err(ctx.interrupt_with(failure)),
            Err(_) => Err(ExecutionError::unexpected(
                "legacy invoker dropped its handler without responding",
            )),
        }
    }
}

/// Run the invoker stored on the context. Without one there is nothing to call.
pub async fn invoke(ctx: &mut ExecutionContext) -> ExecutionResult {
    let Some(kind) = ctx.invoker().cloned() else {
        tracing::debug!(request_id = %ctx.request().id, "no invoker on context, skipping invocation");
        return Ok(());
    };

    match kind {
        InvokerKind::Reactive(invoker) => invoker.invoke(ctx).await,
        InvokerKind::Legacy(invoker) => LegacyInvokerAdapter::new(invoker).invoke(ctx).await,
    }
}
