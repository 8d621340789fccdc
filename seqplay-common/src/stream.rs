//! Stream categories, handles, and per-channel output signals

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed output category of the player
///
/// Every output channel of the player carries exactly one category. The set
/// is fixed at construction; there is no per-category subclassing, only a
/// per-category fallback generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamCategory {
    Audio,
    Video,
}

impl StreamCategory {
    /// All categories the player exposes, in channel-creation order
    pub const ALL: [StreamCategory; 2] = [StreamCategory::Audio, StreamCategory::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamCategory::Audio => "audio",
            StreamCategory::Video => "video",
        }
    }
}

impl std::fmt::Display for StreamCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to one elementary stream produced by the decoding engine
///
/// Handles are minted by the engine when it reports `StreamAppeared` and stay
/// valid until the matching `StreamRemoved`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    /// Unique id for routing removal notifications back to the right channel
    pub id: Uuid,
    /// Category the engine negotiated for this stream
    pub category: StreamCategory,
    /// Engine-side name, for logging only (e.g. "decoder.src_0")
    pub name: String,
}

impl StreamHandle {
    pub fn new(category: StreamCategory, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.name, self.category)
    }
}

/// Signal observed by a downstream consumer on a channel's public output
///
/// This is the channel's boundary: a consumer sees binding changes and,
/// only once the whole playlist has finished, a single `EndOfStream`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    /// A live stream from the current segment was bound to this channel
    LiveBound { stream_name: String },
    /// The fallback generator (silence/black) was bound to this channel
    FallbackBound,
    /// The channel was detached from its target
    Unbound,
    /// Real end-of-stream; emitted only after the playlist is exhausted
    EndOfStream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_display() {
        assert_eq!(StreamCategory::Audio.to_string(), "audio");
        assert_eq!(StreamCategory::Video.to_string(), "video");
    }

    #[test]
    fn test_handle_ids_unique() {
        let a = StreamHandle::new(StreamCategory::Audio, "dec.src_0");
        let b = StreamHandle::new(StreamCategory::Audio, "dec.src_0");
        assert_ne!(a.id, b.id);
    }
}
