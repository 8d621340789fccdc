//! Mock decoding engine for player integration tests
//!
//! Records every call the player makes and lets tests drive the engine's
//! asynchronous notifications by hand.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use seqplay_common::{
    DecoderPolicy, EngineError, EngineNotification, LatencyReport, MediaEngine, StreamCategory,
    StreamEvent, StreamHandle,
};

/// Scripted engine double with call recording
pub struct MockEngine {
    inner: Mutex<Inner>,
}

struct Inner {
    notify: Option<mpsc::UnboundedSender<EngineNotification>>,
    policy: DecoderPolicy,
    sources: Vec<String>,
    teardowns: u32,
    offsets: Vec<(String, Duration)>,
    clock: Duration,
    latency: LatencyReport,
    stream_latency: Option<LatencyReport>,
    pushed_events: Vec<(Option<String>, StreamEvent)>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                notify: None,
                policy: DecoderPolicy::default(),
                sources: Vec::new(),
                teardowns: 0,
                offsets: Vec::new(),
                clock: Duration::ZERO,
                latency: LatencyReport {
                    live: false,
                    min: Duration::ZERO,
                    max: None,
                },
                stream_latency: None,
                pushed_events: Vec::new(),
            }),
        })
    }

    fn notify(&self, notification: EngineNotification) {
        let sender = self
            .inner
            .lock()
            .unwrap()
            .notify
            .clone()
            .expect("engine connected");
        sender.send(notification).expect("player listening");
    }

    /// Report a new elementary stream, returning its handle
    pub fn emit_stream(&self, category: StreamCategory, name: &str) -> StreamHandle {
        let handle = StreamHandle::new(category, name);
        self.notify(EngineNotification::StreamAppeared {
            handle: handle.clone(),
        });
        handle
    }

    pub fn emit_stream_removed(&self, handle: StreamHandle) {
        self.notify(EngineNotification::StreamRemoved { handle });
    }

    pub fn emit_no_more_streams(&self) {
        self.notify(EngineNotification::NoMoreStreams);
    }

    pub fn emit_drained(&self) {
        self.notify(EngineNotification::Drained);
    }

    pub fn emit_eos(&self, category: StreamCategory) {
        self.notify(EngineNotification::EndOfStream { category });
    }

    pub fn emit_error(&self, message: &str) {
        self.notify(EngineNotification::Error {
            message: message.to_string(),
        });
    }

    /// Every URI the player handed to `set_source`, in order
    pub fn sources(&self) -> Vec<String> {
        self.inner.lock().unwrap().sources.clone()
    }

    pub fn teardown_count(&self) -> u32 {
        self.inner.lock().unwrap().teardowns
    }

    /// Offsets the player applied, as (stream name, offset) pairs
    pub fn offsets(&self) -> Vec<(String, Duration)> {
        self.inner.lock().unwrap().offsets.clone()
    }

    pub fn policy(&self) -> DecoderPolicy {
        self.inner.lock().unwrap().policy.clone()
    }

    /// Move the fake engine clock
    pub fn set_clock(&self, clock: Duration) {
        self.inner.lock().unwrap().clock = clock;
    }

    pub fn set_latency(&self, latency: LatencyReport) {
        self.inner.lock().unwrap().latency = latency;
    }

    /// Latency individual bound streams will answer with
    pub fn set_stream_latency(&self, latency: LatencyReport) {
        self.inner.lock().unwrap().stream_latency = Some(latency);
    }

    /// Events the player forwarded, as (target stream name, event) pairs;
    /// None means the event went to the engine directly
    pub fn pushed_events(&self) -> Vec<(Option<String>, StreamEvent)> {
        self.inner.lock().unwrap().pushed_events.clone()
    }
}

impl MediaEngine for MockEngine {
    fn connect(&self, notify: mpsc::UnboundedSender<EngineNotification>, policy: DecoderPolicy) {
        let mut inner = self.inner.lock().unwrap();
        inner.notify = Some(notify);
        inner.policy = policy;
    }

    fn set_source(&self, uri: &str) -> Result<(), EngineError> {
        self.inner.lock().unwrap().sources.push(uri.to_string());
        Ok(())
    }

    fn teardown(&self) {
        self.inner.lock().unwrap().teardowns += 1;
    }

    fn clock_now(&self) -> Duration {
        self.inner.lock().unwrap().clock
    }

    fn base_time(&self) -> Duration {
        Duration::ZERO
    }

    fn apply_offset(&self, handle: &StreamHandle, offset: Duration) {
        self.inner
            .lock()
            .unwrap()
            .offsets
            .push((handle.name.clone(), offset));
    }

    fn query_latency(&self) -> LatencyReport {
        self.inner.lock().unwrap().latency
    }

    fn stream_latency(&self, _handle: &StreamHandle) -> Option<LatencyReport> {
        self.inner.lock().unwrap().stream_latency
    }

    fn push_event(&self, handle: Option<&StreamHandle>, event: StreamEvent) -> bool {
        self.inner
            .lock()
            .unwrap()
            .pushed_events
            .push((handle.map(|h| h.name.clone()), event));
        true
    }
}
