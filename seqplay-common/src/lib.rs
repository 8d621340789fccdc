//! # Seqplay Common Library
//!
//! Shared code for the seqplay playlist player:
//! - Outward event types (`PlayerEvent` enum)
//! - Stream categories and handles
//! - The decoding-engine collaborator interface (`MediaEngine`)
//! - Decoder selection policy

pub mod decoder;
pub mod engine;
pub mod events;
pub mod stream;

pub use decoder::{ConfigurableDecoder, DecoderPolicy, DecoderVerdict};
pub use engine::{EngineError, EngineNotification, LatencyReport, MediaEngine, StreamEvent};
pub use events::PlayerEvent;
pub use stream::{ChannelSignal, StreamCategory, StreamHandle};
