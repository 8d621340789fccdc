//! Offset synchronizer: one shared presentation timeline per segment
//!
//! Streams of one segment can appear a few tens of milliseconds apart
//! (audio first, then video). Each first bind computes a candidate offset
//! from the engine clock; candidates within the coalescing window of the
//! previous offset reuse it, so both streams start on the same timeline
//! instead of each starting its own clock.

use std::time::Duration;

use tracing::debug;

/// Fixed presentation latency added to every computed offset and to
/// reported minimum latencies on the player boundary
pub const PRESENTATION_LATENCY: Duration = Duration::from_millis(50);

/// Candidates closer than this to the stored offset reuse it
pub const COALESCE_WINDOW: Duration = Duration::from_millis(100);

/// Running timeline offset with coalescing
#[derive(Debug, Default)]
pub struct OffsetTracker {
    current: Duration,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset to apply to a stream bound at `engine_now`
    ///
    /// The candidate is `engine_now - base_time + PRESENTATION_LATENCY`;
    /// a candidate within the coalescing window of the stored offset (or
    /// behind it) reuses the stored offset.
    pub fn offset_for_bind(&mut self, engine_now: Duration, base_time: Duration) -> Duration {
        let candidate = engine_now.saturating_sub(base_time) + PRESENTATION_LATENCY;

        let adopted = match candidate.checked_sub(self.current) {
            Some(ahead) if ahead >= COALESCE_WINDOW => candidate,
            _ => self.current,
        };

        debug!(
            "timeline offset: candidate {:?}, using {:?}",
            candidate, adopted
        );
        self.current = adopted;
        adopted
    }

    /// Currently stored offset
    pub fn current(&self) -> Duration {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(100);

    #[test]
    fn test_first_bind_adopts_candidate() {
        let mut tracker = OffsetTracker::new();
        let offset = tracker.offset_for_bind(BASE + Duration::from_secs(2), BASE);
        assert_eq!(offset, Duration::from_secs(2) + PRESENTATION_LATENCY);
    }

    #[test]
    fn test_close_binds_coalesce() {
        // Audio and video of the same segment 40ms apart share one offset
        let mut tracker = OffsetTracker::new();
        let audio = tracker.offset_for_bind(BASE + Duration::from_secs(2), BASE);
        let video =
            tracker.offset_for_bind(BASE + Duration::from_secs(2) + Duration::from_millis(40), BASE);
        assert_eq!(audio, video);
    }

    #[test]
    fn test_distant_binds_diverge() {
        let mut tracker = OffsetTracker::new();
        let first = tracker.offset_for_bind(BASE + Duration::from_secs(2), BASE);
        let second =
            tracker.offset_for_bind(BASE + Duration::from_secs(2) + Duration::from_millis(150), BASE);
        assert_ne!(first, second);
        assert_eq!(second - first, Duration::from_millis(150));
    }

    #[test]
    fn test_candidate_behind_stored_reuses_stored() {
        let mut tracker = OffsetTracker::new();
        let first = tracker.offset_for_bind(BASE + Duration::from_secs(5), BASE);
        let second = tracker.offset_for_bind(BASE + Duration::from_secs(4), BASE);
        assert_eq!(first, second);
    }

    #[test]
    fn test_clock_behind_base_saturates() {
        // The candidate clamps to the latency constant instead of
        // underflowing, and at 50ms it coalesces into the initial offset
        let mut tracker = OffsetTracker::new();
        let offset = tracker.offset_for_bind(Duration::from_secs(1), BASE);
        assert_eq!(offset, Duration::ZERO);
    }
}
