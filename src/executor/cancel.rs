use std::sync::atomic::{AtomicU64, Ordering};

/// Cooperative cancellation shared between an executor and its streams.
///
/// Each stream takes a generation from [`begin`](Self::begin). `cancel` marks
/// the newest generation, so a stream only observes cancellation aimed at it
/// and starting a new stream implicitly resets the flag.
#[derive(Debug, Default)]
pub struct CancellationToken {
    generation: AtomicU64,
    /// Generation that was cancelled, 0 when none
    cancelled: AtomicU64,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return it
    pub fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Cancel the in-flight generation. Idempotent.
    pub fn cancel(&self) {
        let current = self.generation.load(Ordering::Acquire);
        if current > 0 {
            self.cancelled.store(current, Ordering::Release);
        }
    }

    pub fn is_cancelled(&self, generation: u64) -> bool {
        self.cancelled.load(Ordering::Acquire) == generation
    }

    /// Whether the newest generation has been cancelled
    pub fn is_set(&self) -> bool {
        let current = self.generation.load(Ordering::Acquire);
        current > 0 && self.is_cancelled(current)
    }
}
