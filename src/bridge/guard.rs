//! In-flight guard for background passes

use std::sync::atomic::{AtomicBool, Ordering};

/// Allows at most one pass of a kind to run at a time
#[derive(Debug, Default)]
pub struct PassGuard {
    running: AtomicBool,
}

/// Held for the duration of a pass; releases the guard on drop
#[derive(Debug)]
pub struct PassTicket<'a> {
    running: &'a AtomicBool,
}

impl PassGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` when a pass is already running
    pub fn try_begin(&self) -> Option<PassTicket<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PassTicket {
                running: &self.running,
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for PassTicket<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_refused_until_drop() {
        let guard = PassGuard::new();
        let ticket = guard.try_begin();
        assert!(ticket.is_some());
        assert!(guard.is_running());
        assert!(guard.try_begin().is_none());

        drop(ticket);
        assert!(!guard.is_running());
        assert!(guard.try_begin().is_some());
    }
}
