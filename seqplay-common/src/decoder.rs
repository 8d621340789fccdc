//! Decoder selection and configuration policy
//!
//! The engine consults this policy while autoplugging decoders for a source:
//! candidate decoders are accepted or rejected by name, and decoders that
//! declare a GPU-slot property get the configured slot passed through.

use tracing::debug;

/// Name prefix identifying hardware-accelerated candidate decoders
pub const HARDWARE_DECODER_PREFIX: &str = "hw";

/// Verdict on a candidate decoder offered by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderVerdict {
    /// Let the engine try this decoder
    Try,
    /// Skip this decoder and keep autoplugging
    Skip,
}

/// A decoder element the engine allows the player to configure
pub trait ConfigurableDecoder {
    /// Factory/type name of the decoder element
    fn type_name(&self) -> &str;

    /// Whether this decoder declares a GPU-slot affinity property
    fn supports_gpu_slot(&self) -> bool;

    /// Set the GPU PCI-slot affinity hint
    fn set_gpu_slot(&mut self, slot: u8);
}

/// Decoder-selection policy handed to the engine at connect time
#[derive(Debug, Clone, Default)]
pub struct DecoderPolicy {
    /// Optional GPU PCI-slot affinity hint for hardware decoders
    pub gpu_slot: Option<u8>,
    /// When false, hardware-accelerated candidates are rejected by name prefix
    pub prefer_hardware_decode: bool,
}

impl DecoderPolicy {
    /// Accept or reject a candidate decoder by factory name
    pub fn select_decoder(&self, name: &str) -> DecoderVerdict {
        let verdict = if !self.prefer_hardware_decode && name.starts_with(HARDWARE_DECODER_PREFIX) {
            DecoderVerdict::Skip
        } else {
            DecoderVerdict::Try
        };
        debug!("decoder candidate {}: {:?}", name, verdict);
        verdict
    }

    /// Pass the GPU slot through to a decoder that declares the property
    pub fn configure_decoder(&self, decoder: &mut dyn ConfigurableDecoder) {
        if let Some(slot) = self.gpu_slot {
            if decoder.supports_gpu_slot() {
                debug!("setting gpu slot {} on {}", slot, decoder.type_name());
                decoder.set_gpu_slot(slot);
            }
        }
    }
}
