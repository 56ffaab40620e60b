//! Node-wide lifecycle state and the dependent components a reactor
//! starts and stops alongside itself.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::GatehouseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Initialized,
    Started,
    Stopping,
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        })
    }
}

/// Lifecycle of the whole gateway process.
///
/// Reactors consult it on `stop()`: while the node is started, an
/// undeployed reactor drains in the background; during node shutdown it
/// stops at once, leaving ordering to the shutdown sequence.
#[derive(Debug, Clone)]
pub struct Node {
    state: watch::Sender<LifecycleState>,
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Initialized);
        Self { state }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn set_state(&self, state: LifecycleState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "node lifecycle changed");
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }
}

/// A manager a reactor depends on (resources, policies, groups).
#[async_trait]
pub trait LifecycleComponent: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), GatehouseError>;

    async fn stop(&self) -> Result<(), GatehouseError>;
}

#[derive(Debug, Clone)]
pub struct NoopComponent {
    name: String,
}

impl NoopComponent {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LifecycleComponent for NoopComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), GatehouseError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatehouseError> {
        Ok(())
    }
}
