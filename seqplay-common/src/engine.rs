//! Decoding-engine collaborator interface
//!
//! The player sits above an external media-decoding engine: it hands the
//! engine one source URI at a time and the engine asynchronously reports the
//! elementary streams it finds. The engine is specified only at this
//! boundary; decoding itself is out of scope.
//!
//! Notifications may be delivered from the engine's own worker threads, so
//! they travel over a channel rather than as direct calls back into the
//! player. The player never calls back into the engine from inside a
//! notification handler without going through its own dispatch queue first.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::decoder::DecoderPolicy;
use crate::stream::{StreamCategory, StreamHandle};

/// Error reported by the decoding engine for the current source
#[derive(Error, Debug)]
#[error("engine error: {0}")]
pub struct EngineError(pub String);

/// Asynchronous stream-lifecycle notifications from the decoding engine
#[derive(Debug, Clone)]
pub enum EngineNotification {
    /// The engine exposed a new elementary stream for the current source
    StreamAppeared { handle: StreamHandle },

    /// A previously exposed stream went away
    StreamRemoved { handle: StreamHandle },

    /// The engine will not expose further streams for the current source
    NoMoreStreams,

    /// The current source is exhausted (natural end of media)
    Drained,

    /// End-of-stream observed on a channel's target before full unbind.
    /// Subject to the player's suppression policy until the playlist is done.
    EndOfStream { category: StreamCategory },

    /// Unrecoverable engine error for the current source
    Error { message: String },

    /// Recoverable engine condition, logged only
    Warning { message: String },
}

/// Downstream event forwarded through the player boundary
///
/// The player does not interpret these; an unanswered event is handed to
/// the bound live stream or, with nothing bound, to the engine itself.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Reposition the current source
    Seek { position: Duration },
    /// Engine-specific event, forwarded opaquely
    Custom { name: String },
}

/// Latency as reported by the engine or a bound stream
///
/// The player augments `min` with its fixed presentation latency before
/// answering latency queries on its own boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyReport {
    /// Whether the source is live (self-timed transport)
    pub live: bool,
    pub min: Duration,
    pub max: Option<Duration>,
}

/// Narrow interface the player consumes from the decoding engine
///
/// Implementations resolve a URI into zero or more typed elementary streams
/// and report their lifecycle over the notification channel installed with
/// [`MediaEngine::connect`].
pub trait MediaEngine: Send + Sync + 'static {
    /// Install the notification channel and the decoder-selection policy.
    /// Called once, before the first `set_source`.
    fn connect(&self, notify: mpsc::UnboundedSender<EngineNotification>, policy: DecoderPolicy);

    /// Point the engine at the next source to decode
    fn set_source(&self, uri: &str) -> Result<(), EngineError>;

    /// Tear down the current decode, releasing any streams it exposed.
    /// Idempotent; safe to call with no source set.
    fn teardown(&self);

    /// Current engine clock reading (monotonic, shared with the composition)
    fn clock_now(&self) -> Duration;

    /// Base time of the owning composition on the engine clock
    fn base_time(&self) -> Duration;

    /// Shift a bound stream onto the shared presentation timeline
    fn apply_offset(&self, handle: &StreamHandle, offset: Duration);

    /// Latency of the engine/current source, before player augmentation
    fn query_latency(&self) -> LatencyReport;

    /// Latency of one bound stream; None when the stream cannot answer
    fn stream_latency(&self, handle: &StreamHandle) -> Option<LatencyReport>;

    /// Forward a downstream event to a bound stream (`Some`) or to the
    /// engine itself (`None`); returns whether the event was handled
    fn push_event(&self, handle: Option<&StreamHandle>, event: StreamEvent) -> bool;
}
