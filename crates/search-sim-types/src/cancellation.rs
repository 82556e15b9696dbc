//! Ambient cancellation signal for long-running operations, per spec §5/§9:
//! "every public operation takes an optional cancellation signal" and
//! cancelled requests "return a dedicated cancelled outcome, not a failure".
//!
//! Grounded on the same ambient-injection shape as [`crate::clock::Clock`]:
//! a small, cheaply-cloned handle the caller holds and flips from another
//! thread, polled by the engine at well-defined phase boundaries rather than
//! delivered via a signal/interrupt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation flag. Cloning shares the same underlying flag;
/// setting it from any clone is visible to all others.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
