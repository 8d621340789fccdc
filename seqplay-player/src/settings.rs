//! Player configuration surface
//!
//! Constructor-time configuration for the player. Everything that was once a
//! process-wide flag (verbosity, decoder preferences) is explicit here.

use seqplay_common::DecoderPolicy;

/// Player settings, applied at construction
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    /// Initial playlist: inline JSON, or `@path` referencing a JSON file
    pub playlist: Option<String>,

    /// Number of playthroughs of the playlist; negative means unbounded
    pub playthroughs: i32,

    /// GPU PCI-slot affinity hint passed to hardware decoders
    pub gpu_slot: Option<u8>,

    /// When false, hardware-accelerated decoders are rejected during autoplug
    pub prefer_hardware_decode: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            playlist: None,
            playthroughs: 1,
            gpu_slot: None,
            prefer_hardware_decode: true,
        }
    }
}

impl PlayerSettings {
    /// Decoder-selection policy derived from these settings
    pub fn decoder_policy(&self) -> DecoderPolicy {
        DecoderPolicy {
            gpu_slot: self.gpu_slot,
            prefer_hardware_decode: self.prefer_hardware_decode,
        }
    }
}
