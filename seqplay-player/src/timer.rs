//! Segment timer: single-shot deadlines on a monotonic clock
//!
//! Bounds the maximum duration of one segment. The clock origin is captured
//! once at player construction, independent of any renegotiable pipeline
//! clock, so an armed deadline survives clock changes in the composition.
//!
//! At most one timer is armed per player; arming while one is active cancels
//! the previous one first. A deadline already in the past still fires exactly
//! once through the normal asynchronous path.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Upper bound on a single segment; longer deadlines are a scheduling error
const MAX_SEGMENT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Single-shot segment timer
#[derive(Debug)]
pub struct SegmentTimer {
    origin: Instant,
    armed: Option<ArmedTimer>,
    next_generation: u64,
}

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    task: JoinHandle<()>,
}

impl SegmentTimer {
    /// Capture the monotonic clock origin; done once at player construction
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            armed: None,
            next_generation: 0,
        }
    }

    /// Arm a deadline `after` from now, cancelling any previous timer
    ///
    /// Returns the generation of the armed timer. `on_fire` runs exactly
    /// once when the deadline passes, unless the timer is cancelled first;
    /// a stale fire is detected by comparing generations.
    pub fn arm(
        &mut self,
        after: Duration,
        on_fire: impl FnOnce(u64) + Send + 'static,
    ) -> Result<u64> {
        if after > MAX_SEGMENT {
            return Err(Error::Scheduling(format!(
                "segment deadline {after:?} exceeds maximum {MAX_SEGMENT:?}"
            )));
        }

        self.cancel();

        let generation = self.next_generation;
        self.next_generation += 1;

        let deadline = Instant::now() + after;
        let elapsed = self.origin.elapsed();
        debug!(
            "arming segment timer generation {} for {:?} (clock at {:?})",
            generation, after, elapsed
        );

        let task = tokio::spawn(async move {
            // A deadline already in the past returns immediately, which is
            // exactly the required "fire anyway" behavior.
            tokio::time::sleep_until(deadline).await;
            on_fire(generation);
        });

        self.armed = Some(ArmedTimer { generation, task });
        Ok(generation)
    }

    /// Cancel any armed timer; idempotent
    pub fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            debug!("cancelling segment timer generation {}", armed.generation);
            armed.task.abort();
        }
    }

    /// Whether a timer is currently armed
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Check a fire notification against the armed timer
    ///
    /// Returns true and disarms when the generation matches; a mismatch
    /// means the fire raced a cancel and must be ignored.
    pub fn acknowledge_fire(&mut self, generation: u64) -> bool {
        match &self.armed {
            Some(armed) if armed.generation == generation => {
                self.armed = None;
                true
            }
            _ => {
                warn!("ignoring stale timer fire (generation {})", generation);
                false
            }
        }
    }
}

impl Default for SegmentTimer {
    fn default() -> Self {
        Self::new()
    }
}
