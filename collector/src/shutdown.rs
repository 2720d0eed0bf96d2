use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single cooperative shutdown flag observed at every suspension point
/// (spec.md §5, §9). No forced cancellation: every blocking read uses a
/// bounded deadline and loops back to check this flag, and every sleep is
/// interruptible.
#[derive(Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}
