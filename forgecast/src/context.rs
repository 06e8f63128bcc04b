//! Cooperative cancellation.
//!
//! Every `execute`/`run`/`publish`/`build` entry point in this crate takes
//! a [`RunContext`] by reference, so a fatal error in one task can signal
//! every sibling task to stop starting new work without a dedicated
//! cancellation crate: a small purpose-built type over the same
//! `Arc`+atomics primitives the rest of the crate already uses for
//! shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{ForgecastError, Result};

/// A cancellable, cloneable handle threaded through every stage.
///
/// Cloning a `RunContext` shares the same cancellation flag: cancelling
/// any clone cancels all of them, exactly like deriving a child
/// `context.Context` from a cancellable parent.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancelled: Arc<AtomicBool>,
}

impl RunContext {
    /// A fresh, not-yet-cancelled context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark this context (and every clone of it) as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether this context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(ForgecastError::Cancelled)` if cancelled, `Ok(())` otherwise.
    /// Call this at subprocess/I/O boundaries so cancellation is observed
    /// promptly rather than only between stages.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ForgecastError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelling_a_clone_cancels_the_original() {
        let ctx = RunContext::new();
        let clone = ctx.clone();
        assert!(ctx.check().is_ok());
        clone.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(ForgecastError::Cancelled)));
    }
}
