use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::vm::fiber::FiberId;

/// Host-visible cancellation registry. The VM loop is single threaded; this
/// is the one piece of shared state another thread may touch, so a host can
/// flag a fiber for cancellation while the loop is running. The flag is
/// observed at suspension points only.
#[derive(Clone, Default)]
pub struct FiberControl {
    state: Arc<Mutex<HashMap<FiberId, FiberFlags>>>,
}

#[derive(Default)]
struct FiberFlags {
    cancelled: bool,
}

impl FiberControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, fiber: FiberId) {
        self.state.lock().insert(fiber, FiberFlags::default());
    }

    /// Flag a fiber for cancellation. Returns false when the fiber is not
    /// registered (already completed and reaped).
    pub fn cancel(&self, fiber: FiberId) -> bool {
        if let Some(flags) = self.state.lock().get_mut(&fiber) {
            flags.cancelled = true;
            true
        } else {
            false
        }
    }

    pub fn is_cancelled(&self, fiber: FiberId) -> bool {
        self.state
            .lock()
            .get(&fiber)
            .map(|flags| flags.cancelled)
            .unwrap_or(false)
    }

    pub fn complete(&self, fiber: FiberId) {
        self.state.lock().remove(&fiber);
    }
}
