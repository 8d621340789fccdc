//! Event types for the seqplay notification stream

use serde::{Deserialize, Serialize};

/// Outward player events
///
/// Broadcast to every subscriber of the player's notification stream.
/// `PlaylistCompleted` is emitted exactly once per playlist run, after the
/// final segment's end-of-stream has been pushed through every channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// A playlist item started playing
    PlaybackStarted {
        /// Source URI of the item, as listed in the playlist
        uri: String,
        /// 0-based index of the item in the playlist
        index: u32,
        /// Total number of items in the playlist
        size: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The playlist finished its configured playthroughs
    PlaylistCompleted {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}
