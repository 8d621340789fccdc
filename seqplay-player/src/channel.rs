//! Output channels: per-category binding between the player's public
//! outputs and either the current live stream or a fallback generator
//!
//! One `OutputChannel` exists per stream category for the player's whole
//! lifetime; only its binding changes. Downstream consumers observe binding
//! changes and end-of-stream on the channel's signal stream; a premature
//! end-of-stream is suppressed until the whole playlist has finished, since
//! one channel ending early would otherwise tear down the entire downstream
//! composition.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use seqplay_common::{ChannelSignal, StreamCategory, StreamHandle};

/// Broadcast capacity for channel signals; consumers are expected to keep up
const SIGNAL_CAPACITY: usize = 64;

/// Bounded iterations for the fallback-stop poll in `unbind`
const STOP_POLL_LIMIT: u32 = 100;

/// Long-lived silent/blank generator for one category
///
/// Shared across segments. Locked (inert) whenever no channel targets it;
/// unlocking synchronizes it with the composition's playback clock.
#[derive(Debug)]
pub struct FallbackGenerator {
    category: StreamCategory,
    running: AtomicBool,
}

impl FallbackGenerator {
    fn new(category: StreamCategory) -> Self {
        Self {
            category,
            running: AtomicBool::new(false),
        }
    }

    /// Unlock and start generating idle signal
    fn activate(&self) {
        debug!("activating {} fallback generator", self.category);
        self.running.store(true, Ordering::SeqCst);
    }

    /// Force back to the locked/inert state, polling until fully stopped
    ///
    /// The generator is a local object, so the poll completes on the first
    /// iteration in practice; the bound keeps the wait deterministic.
    fn deactivate(&self) {
        self.running.store(false, Ordering::SeqCst);
        for _ in 0..STOP_POLL_LIMIT {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            std::thread::yield_now();
        }
        warn!("{} fallback generator did not stop in time", self.category);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Current binding of a channel's public output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    None,
    Live(StreamHandle),
    Fallback,
}

/// One typed public output of the player
#[derive(Debug)]
pub struct OutputChannel {
    category: StreamCategory,
    binding: Binding,
    fallback: FallbackGenerator,
    signal_tx: broadcast::Sender<ChannelSignal>,
}

impl OutputChannel {
    pub fn new(category: StreamCategory) -> Self {
        let (signal_tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            category,
            binding: Binding::None,
            fallback: FallbackGenerator::new(category),
            signal_tx,
        }
    }

    pub fn category(&self) -> StreamCategory {
        self.category
    }

    /// Subscribe to this channel's public output signals
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelSignal> {
        self.signal_tx.subscribe()
    }

    fn emit(&self, signal: ChannelSignal) {
        // No receivers is fine; the composition may not be watching yet
        let _ = self.signal_tx.send(signal);
    }

    /// Bind a live stream from the current segment
    ///
    /// First-writer-wins per segment: if a live stream is already bound for
    /// this category, the newcomer is refused and playback continues with
    /// the first. Returns whether the bind took effect.
    pub fn bind_live(&mut self, handle: StreamHandle) -> bool {
        match &self.binding {
            Binding::Live(bound) => {
                warn!(
                    "multiple {} streams: refusing {} (keeping {})",
                    self.category, handle, bound
                );
                false
            }
            Binding::Fallback | Binding::None => {
                if self.binding == Binding::Fallback {
                    self.fallback.deactivate();
                }
                debug!("{} linked from {}", self.category, handle);
                let name = handle.name.clone();
                self.binding = Binding::Live(handle);
                self.emit(ChannelSignal::LiveBound { stream_name: name });
                true
            }
        }
    }

    /// Target the public output at the fallback generator
    pub fn bind_fallback(&mut self) {
        if self.binding == Binding::Fallback {
            return;
        }
        self.fallback.activate();
        self.binding = Binding::Fallback;
        debug!("null {} linked", self.category);
        self.emit(ChannelSignal::FallbackBound);
    }

    /// Detach the public output from any target
    ///
    /// If the fallback was active it is forced back to its inert state
    /// before returning, so an immediate rebind is safe.
    pub fn unbind(&mut self) {
        match std::mem::replace(&mut self.binding, Binding::None) {
            Binding::None => {
                debug!("{} already unlinked", self.category);
            }
            Binding::Live(handle) => {
                debug!("unlinking {} from {}", self.category, handle);
                self.emit(ChannelSignal::Unbound);
            }
            Binding::Fallback => {
                debug!("unlinking {} from fallback", self.category);
                self.fallback.deactivate();
                self.emit(ChannelSignal::Unbound);
            }
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding != Binding::None
    }

    pub fn is_fallback_bound(&self) -> bool {
        self.binding == Binding::Fallback
    }

    pub fn is_live_bound(&self) -> bool {
        matches!(self.binding, Binding::Live(_))
    }

    /// Handle of the bound live stream, if any
    pub fn bound_stream(&self) -> Option<&StreamHandle> {
        match &self.binding {
            Binding::Live(handle) => Some(handle),
            _ => None,
        }
    }

    /// Deliver an end-of-stream arriving from the bound target
    ///
    /// Dropped while the player is not finishing; forwarded once the
    /// playlist is done.
    pub fn end_of_stream(&self, finishing: bool) {
        if finishing {
            self.emit(ChannelSignal::EndOfStream);
        } else {
            debug!("{}: EOS dropped", self.category);
        }
    }

    /// Push the final end-of-stream through the public output
    pub fn push_eos(&self) {
        self.emit(ChannelSignal::EndOfStream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(name: &str) -> StreamHandle {
        StreamHandle::new(StreamCategory::Audio, name)
    }

    #[test]
    fn test_first_writer_wins() {
        let mut channel = OutputChannel::new(StreamCategory::Audio);
        let first = handle("dec.src_0");

        assert!(channel.bind_live(first.clone()));
        assert!(!channel.bind_live(handle("dec.src_1")));
        assert_eq!(channel.bound_stream(), Some(&first));
    }

    #[test]
    fn test_live_replaces_fallback() {
        let mut channel = OutputChannel::new(StreamCategory::Audio);
        channel.bind_fallback();
        assert!(channel.is_fallback_bound());

        assert!(channel.bind_live(handle("dec.src_0")));
        assert!(channel.is_live_bound());
        assert!(!channel.fallback.is_running());
    }

    #[test]
    fn test_unbind_stops_fallback() {
        let mut channel = OutputChannel::new(StreamCategory::Video);
        channel.bind_fallback();
        assert!(channel.fallback.is_running());

        channel.unbind();
        assert!(!channel.is_bound());
        assert!(!channel.fallback.is_running());

        // Idempotent
        channel.unbind();
        assert!(!channel.is_bound());
    }

    #[test]
    fn test_signals_in_order() {
        let mut channel = OutputChannel::new(StreamCategory::Audio);
        let mut rx = channel.subscribe();

        channel.bind_live(handle("dec.src_0"));
        channel.unbind();
        channel.bind_fallback();

        assert_eq!(
            rx.try_recv().unwrap(),
            ChannelSignal::LiveBound {
                stream_name: "dec.src_0".to_string()
            }
        );
        assert_eq!(rx.try_recv().unwrap(), ChannelSignal::Unbound);
        assert_eq!(rx.try_recv().unwrap(), ChannelSignal::FallbackBound);
    }

    #[test]
    fn test_eos_suppressed_until_finishing() {
        let channel = OutputChannel::new(StreamCategory::Audio);
        let mut rx = channel.subscribe();

        channel.end_of_stream(false);
        assert!(rx.try_recv().is_err());

        channel.end_of_stream(true);
        assert_eq!(rx.try_recv().unwrap(), ChannelSignal::EndOfStream);
    }

    #[test]
    fn test_rebind_after_unbind() {
        let mut channel = OutputChannel::new(StreamCategory::Audio);
        assert!(channel.bind_live(handle("a")));
        channel.unbind();
        assert!(channel.bind_live(handle("b")));
    }
}
