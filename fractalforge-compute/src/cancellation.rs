use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Polled by render loops between units of work.
pub trait CancellationChecker: Clone + Send {
    fn is_cancelled(&self) -> bool;
}

/// Never cancels; used for one-off evaluations such as orbit traces.
#[derive(Clone, Copy, Default)]
pub struct NeverCancel;

impl CancellationChecker for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared abort flag of one render request.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Checker handed to workers; observes later `abort` calls.
    pub fn checker(&self) -> AtomicBoolChecker {
        AtomicBoolChecker::new(Arc::clone(&self.flag))
    }
}

/// Checks an atomic boolean flag for cancellation.
#[derive(Clone)]
pub struct AtomicBoolChecker {
    flag: Arc<AtomicBool>,
}

impl AtomicBoolChecker {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }
}

impl CancellationChecker for AtomicBoolChecker {
    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_cancel_always_returns_false() {
        assert!(!NeverCancel.is_cancelled());
    }

    #[test]
    fn test_checkers_observe_abort_after_creation() {
        let signal = AbortSignal::new();
        let first = signal.checker();
        let second = first.clone();
        assert!(!first.is_cancelled());

        signal.abort();
        assert!(signal.is_aborted());
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
    }

    #[test]
    fn test_fresh_signals_are_independent() {
        let old = AbortSignal::new();
        old.abort();
        let fresh = AbortSignal::new();
        assert!(!fresh.checker().is_cancelled());
    }
}
