//! Write-in-progress detector.
//!
//! The table has no internal locking. Every mutation holds a `WriteGuard`
//! for its whole duration and every operation checks the flag on entry.
//! Finding it already set means a caller let two operations overlap
//! without synchronization; that is a contract violation and panics
//! instead of silently corrupting buckets.

use crate::error::ConcurrentAccessViolation;
use core::sync::atomic::{AtomicBool, Ordering};

/// Per-table access flag. Guard mutations with
/// `let _w = self.access.begin_write();`.
#[derive(Debug)]
pub(crate) struct AccessFlags {
    writing: AtomicBool,
}

impl AccessFlags {
    pub(crate) const fn new() -> Self {
        Self {
            writing: AtomicBool::new(false),
        }
    }

    /// Panics if a write is in progress.
    #[inline]
    pub(crate) fn check_read(&self, op: ConcurrentAccessViolation) {
        if self.writing.load(Ordering::Relaxed) {
            violation(op);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_writing(&self) -> bool {
        self.writing.load(Ordering::Relaxed)
    }

    /// Enter a mutation. Panics if another one is already running.
    #[inline]
    pub(crate) fn begin_write(&self) -> WriteGuard<'_> {
        if self.writing.swap(true, Ordering::Acquire) {
            violation(ConcurrentAccessViolation::WriteDuringWrite);
        }
        WriteGuard { owner: self }
    }
}

impl Default for AccessFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `AccessFlags::begin_write`.
pub(crate) struct WriteGuard<'a> {
    owner: &'a AccessFlags,
}

impl<'a> Drop for WriteGuard<'a> {
    fn drop(&mut self) {
        let was_set = self.owner.writing.swap(false, Ordering::Release);
        // Someone cleared our flag behind our back.
        if !was_set && !std::thread::panicking() {
            violation(ConcurrentAccessViolation::WriteDuringWrite);
        }
    }
}

#[cold]
#[inline(never)]
fn violation(op: ConcurrentAccessViolation) -> ! {
    tracing::error!(violation = %op, "unsynchronized hash table access");
    panic!("{op}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panic_message(res: std::thread::Result<()>) -> String {
        let payload = res.expect_err("expected a panic");
        payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn write_then_read_is_ok() {
        let f = AccessFlags::new();
        {
            let _w = f.begin_write();
            assert!(f.is_writing());
        }
        assert!(!f.is_writing());
        f.check_read(ConcurrentAccessViolation::ReadDuringWrite);
    }

    #[test]
    fn nested_write_panics() {
        let f = AccessFlags::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _w1 = f.begin_write();
            let _w2 = f.begin_write();
        }));
        assert_eq!(panic_message(res), "concurrent table writes");
    }

    #[test]
    fn read_during_write_panics() {
        let f = AccessFlags::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _w = f.begin_write();
            f.check_read(ConcurrentAccessViolation::ReadDuringWrite);
        }));
        assert_eq!(panic_message(res), "concurrent table read and table write");
    }

    #[test]
    fn guard_clears_flag_on_unwind() {
        let f = AccessFlags::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _w = f.begin_write();
            panic!("hash function blew up");
        }));
        assert!(res.is_err());
        assert!(!f.is_writing());
        let _w = f.begin_write();
    }
}
