use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// In-flight request count for one reactor.
#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    count: Arc<AtomicUsize>,
}

impl PendingRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request in. The returned guard counts it out when dropped,
    /// whichever way the request ends.
    #[must_use]
    pub fn enter(&self) -> PendingGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        PendingGuard {
            count: Arc::clone(&self.count),
        }
    }

    #[must_use]
    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
#[must_use = "the request is counted out as soon as the guard is dropped"]
pub struct PendingGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}
