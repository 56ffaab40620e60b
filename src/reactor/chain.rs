//! Collaborator seams the reactor drives but does not implement.
//!
//! Flow chains run policies at platform, plan and API level; processor
//! chains run built-in transformations; the security chain runs once
//! per request before any business flow. All of them are shared by every
//! in-flight request of a reactor and must tolerate concurrent calls.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::{ExecutionContext, ExecutionPhase};
use super::interrupt::ExecutionError;

pub type ExecutionResult = Result<(), ExecutionError>;

#[async_trait]
pub trait FlowChain: Send + Sync {
    fn id(&self) -> &str;

    async fn execute(&self, ctx: &mut ExecutionContext, phase: ExecutionPhase) -> ExecutionResult;
}

#[async_trait]
pub trait ProcessorChain: Send + Sync {
    fn id(&self) -> &str;

    async fn execute(&self, ctx: &mut ExecutionContext, phase: ExecutionPhase) -> ExecutionResult;
}

#[async_trait]
pub trait SecurityChain: Send + Sync {
    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult;
}

/// A single step of a [`ProcessorList`].
#[async_trait]
pub trait Processor: Send + Sync {
    fn id(&self) -> &str;

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult;
}

/// Runs its processors in order, stopping at the first error.
#[derive(Clone)]
pub struct ProcessorList {
    id: String,
    processors: Vec<Arc<dyn Processor>>,
}

impl ProcessorList {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            processors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    #[must_use]
    pub fn with_shared(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl fmt::Debug for ProcessorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.processors.iter().map(|p| p.id()).collect();
        f.debug_struct("ProcessorList")
            .field("id", &self.id)
            .field("processors", &ids)
            .finish()
    }
}

#[async_trait]
impl ProcessorChain for ProcessorList {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &mut ExecutionContext, phase: ExecutionPhase) -> ExecutionResult {
        for processor in &self.processors {
            tracing::trace!(chain = %self.id, processor = processor.id(), %phase, "executing processor");
            processor.execute(ctx).await?;
        }
        Ok(())
    }
}

/// Flow chain with no policies.
#[derive(Debug, Clone)]
pub struct EmptyFlowChain {
    id: String,
}

impl EmptyFlowChain {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl FlowChain for EmptyFlowChain {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, _ctx: &mut ExecutionContext, _phase: ExecutionPhase) -> ExecutionResult {
        Ok(())
    }
}

/// Security chain for keyless APIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughSecurityChain;

#[async_trait]
impl SecurityChain for PassThroughSecurityChain {
    async fn execute(&self, _ctx: &mut ExecutionContext) -> ExecutionResult {
        Ok(())
    }
}
