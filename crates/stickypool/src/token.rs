use core::fmt;
use core::num::NonZeroU64;
use portable_atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one worker slot.
///
/// Tokens are issued by the [`WorkerPool`](crate::WorkerPool) once per worker
/// thread and handed to the [`JobProcessor`](crate::JobProcessor) with every
/// job that worker runs. They are unique for the life of the process and never
/// reused, so the [`StickyPool`](crate::StickyPool) can key its bindings on
/// them without knowing anything about the threads behind them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotToken(NonZeroU64);

impl SlotToken {
    /// Issues a fresh, process-unique token.
    pub fn issue() -> Self {
        let raw = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and would need 2^64 issues to wrap.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Returns the raw integer value of this token.
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SlotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
