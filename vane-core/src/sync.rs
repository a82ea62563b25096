//! Small synchronization helpers shared by rules and the balancer.

use std::sync::atomic::{AtomicBool, Ordering};

/// Holds a single-flight flag for as long as it lives.
///
/// The flag is released on drop, including when the holder unwinds.
#[derive(Debug)]
pub struct InProgress<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InProgress<'a> {
    /// Raise the flag, or return `None` if someone else holds it.
    pub fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
