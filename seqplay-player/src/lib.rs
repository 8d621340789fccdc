//! # Seqplay Player Library
//!
//! Playlist-driven segment scheduler and output router sitting above an
//! external media-decoding engine. Sequences playback of each playlist item
//! into typed output channels (audio, video), switching to the next item
//! when a source ends naturally or its timeout elapses, looping the playlist
//! a configurable number of times, and keeping a fallback idle signal on any
//! channel the current source does not feed.
//!
//! **Architecture:** a single control task drains a dispatch queue fed by
//! the decoding engine's notifications, the segment timer, and internal
//! advance requests; one mutex guards the playlist cursor, timer handle,
//! and channel bindings.

pub mod channel;
pub mod error;
pub mod offset;
pub mod player;
pub mod playlist;
pub mod settings;
pub mod timer;

pub use error::{Error, Result};
pub use player::{Player, PlayerState};
pub use settings::PlayerSettings;
