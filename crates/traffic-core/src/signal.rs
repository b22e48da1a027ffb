use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Deadline,
    Interrupt,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Deadline => f.write_str("deadline"),
            StopReason::Interrupt => f.write_str("interrupt"),
        }
    }
}

const REASON_UNSET: u8 = 0;
const REASON_DEADLINE: u8 = 1;
const REASON_INTERRUPT: u8 = 2;

#[derive(Debug, Default)]
struct Inner {
    set: AtomicBool,
    reason: AtomicU8,
}

/// "Stop after the current iteration" flag shared by every long-running loop.
/// Set once; later triggers are ignored and keep the first reason.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal {
    inner: Arc<Inner>,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if this call was the one that set the flag.
    pub fn trigger(&self, reason: StopReason) -> bool {
        let code = match reason {
            StopReason::Deadline => REASON_DEADLINE,
            StopReason::Interrupt => REASON_INTERRUPT,
        };
        let first = self
            .inner
            .reason
            .compare_exchange(REASON_UNSET, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.inner.set.store(true, Ordering::Release);
        }
        first
    }

    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<StopReason> {
        match self.inner.reason.load(Ordering::Acquire) {
            REASON_DEADLINE => Some(StopReason::Deadline),
            REASON_INTERRUPT => Some(StopReason::Interrupt),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_trigger_wins() {
        let signal = TerminationSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_set());
        assert_eq!(observer.reason(), None);

        assert!(signal.trigger(StopReason::Interrupt));
        assert!(!signal.trigger(StopReason::Deadline));

        assert!(observer.is_set());
        assert_eq!(observer.reason(), Some(StopReason::Interrupt));
    }
}
