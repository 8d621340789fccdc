//! Playback state machine
//!
//! Orchestrates segment start, advance, and teardown using the playlist
//! store, the segment timer, and the per-category output channels. Driven
//! from three execution contexts: the host's lifecycle calls, the decoding
//! engine's asynchronous stream-lifecycle notifications, and the segment
//! timer's clock callback.
//!
//! A single mutex serializes all shared mutation. The lock is never held
//! across a call that could re-enter the state machine: every
//! engine-mutating action triggered from inside an engine notification goes
//! through the player's dispatch queue, which a dedicated control task
//! drains one message at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use seqplay_common::{
    ChannelSignal, EngineNotification, LatencyReport, MediaEngine, PlayerEvent, StreamCategory,
    StreamEvent, StreamHandle,
};

use crate::channel::OutputChannel;
use crate::error::{Error, Result};
use crate::offset::{OffsetTracker, PRESENTATION_LATENCY};
use crate::playlist::PlaylistStore;
use crate::settings::PlayerSettings;
use crate::timer::SegmentTimer;

/// Broadcast capacity for outward player events
const EVENT_CAPACITY: usize = 100;

/// Lifecycle states of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No active segment
    Idle,
    /// Source handed to the engine, waiting for first streams
    Starting,
    /// At least one channel bound (live or fallback)
    Playing,
    /// Current segment torn down, next item being fetched
    Advancing,
    /// Playlist exhausted or stopped for good
    Finished,
}

/// Messages drained by the control task
///
/// Engine notifications and timer fires are funneled through this queue so
/// that re-entrant calls back into the engine never happen from inside the
/// callback that triggered them.
#[derive(Debug)]
enum Dispatch {
    Engine(EngineNotification),
    TimerFired { generation: u64 },
    EndSegment,
    TeardownEngine,
    Shutdown,
}

/// State protected by the player's single mutex
struct PlayerShared {
    playlist: PlaylistStore,
    state: PlayerState,
    playing: bool,
    /// One-way latch; once set, end-of-stream suppression is lifted
    finishing: bool,
    timer: SegmentTimer,
    channels: HashMap<StreamCategory, OutputChannel>,
    /// Routes stream ids back to the channel they were bound to, for
    /// stream-removal notifications
    routes: HashMap<Uuid, StreamCategory>,
    offset: OffsetTracker,
    /// Current segment uses a self-timed transport; offsets are skipped
    live_source: bool,
    /// Per-segment latch keeping the two natural-end paths from both
    /// advancing the playlist
    segment_ending: bool,
    /// Consecutive no-more-streams rounds with every channel already on
    /// fallback and nothing new arriving
    all_fallback_rounds: u8,
}

impl PlayerShared {
    fn new(settings: &PlayerSettings) -> Self {
        let channels = StreamCategory::ALL
            .iter()
            .map(|&category| (category, OutputChannel::new(category)))
            .collect();
        Self {
            playlist: PlaylistStore::new(settings.playthroughs),
            state: PlayerState::Idle,
            playing: false,
            finishing: false,
            timer: SegmentTimer::new(),
            channels,
            routes: HashMap::new(),
            offset: OffsetTracker::new(),
            live_source: false,
            segment_ending: false,
            all_fallback_rounds: 0,
        }
    }
}

/// Shared handles cloned into the control task
#[derive(Clone)]
struct Core {
    shared: Arc<Mutex<PlayerShared>>,
    engine: Arc<dyn MediaEngine>,
    event_tx: broadcast::Sender<PlayerEvent>,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
}

/// Playlist player: sequences playlist items into the output channels
///
/// Construction wires the engine's notification channel and decoder policy;
/// [`Player::start`] launches the control task. Lifecycle is driven through
/// `prepare` / `announce` / `stop`, mirroring the host composition's own
/// state transitions.
pub struct Player {
    core: Core,
    dispatch_rx: Mutex<Option<mpsc::UnboundedReceiver<Dispatch>>>,
    notify_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineNotification>>>,
    started: AtomicBool,
}

impl Player {
    /// Create a player over the given decoding engine
    ///
    /// Loads the initial playlist from `settings` if one is configured;
    /// an invalid initial playlist fails construction.
    pub fn new(engine: Arc<dyn MediaEngine>, settings: PlayerSettings) -> Result<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        engine.connect(notify_tx, settings.decoder_policy());

        let mut shared = PlayerShared::new(&settings);
        if let Some(playlist) = &settings.playlist {
            shared.playlist.load(playlist)?;
        }

        Ok(Self {
            core: Core {
                shared: Arc::new(Mutex::new(shared)),
                engine,
                event_tx,
                dispatch_tx,
            },
            dispatch_rx: Mutex::new(Some(dispatch_rx)),
            notify_rx: Mutex::new(Some(notify_rx)),
            started: AtomicBool::new(false),
        })
    }

    /// Launch the notification pump and the control task
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("player already started");
            return;
        }

        let mut notify_rx = self
            .notify_rx
            .lock()
            .unwrap()
            .take()
            .expect("notification receiver present before first start");
        let dispatch_tx = self.core.dispatch_tx.clone();
        tokio::spawn(async move {
            while let Some(notification) = notify_rx.recv().await {
                if dispatch_tx.send(Dispatch::Engine(notification)).is_err() {
                    break;
                }
            }
        });

        let mut dispatch_rx = self
            .dispatch_rx
            .lock()
            .unwrap()
            .take()
            .expect("dispatch receiver present before first start");
        let core = self.core.clone();
        tokio::spawn(async move {
            while let Some(message) = dispatch_rx.recv().await {
                if matches!(message, Dispatch::Shutdown) {
                    debug!("control task shutting down");
                    break;
                }
                core.handle_dispatch(message);
            }
        });

        info!("player started");
    }

    /// Stop the control task; the player cannot be restarted afterwards
    pub fn shutdown(&self) {
        let _ = self.core.dispatch_tx.send(Dispatch::Shutdown);
    }

    /// Host "prepare" transition: fetch the current item and hand it to the
    /// engine, arming the segment timer if the item carries a timeout
    pub fn prepare(&self) -> Result<()> {
        self.core.prepare()
    }

    /// Host "announce" transition: emit `PlaybackStarted` for the current
    /// item and mark the player as actively playing
    pub fn announce(&self) -> Result<()> {
        self.core.announce()
    }

    /// Host "stop" transition: cancel the timer and unbind every channel
    pub fn stop(&self) {
        self.core.stop();
    }

    /// Replace the playlist; stops playback first if currently playing
    ///
    /// `source` is inline JSON or an `@path` file reference. On failure the
    /// previous playlist and cursor remain queryable and unchanged, but a
    /// playing player is still stopped.
    pub fn set_playlist(&self, source: &str) -> Result<()> {
        self.core.replace_playlist(source)
    }

    /// Change the playthrough limit; negative means unbounded
    pub fn set_playthroughs(&self, playthroughs: i32) {
        self.core
            .shared
            .lock()
            .unwrap()
            .playlist
            .set_playthroughs(playthroughs);
    }

    /// Number of items in the loaded playlist
    pub fn playlist_size(&self) -> usize {
        self.core.shared.lock().unwrap().playlist.len()
    }

    /// 0-based index of the current item
    pub fn playlist_index(&self) -> usize {
        self.core.shared.lock().unwrap().playlist.index()
    }

    /// Source string of the current item, as listed in the playlist
    pub fn current_uri(&self) -> Option<String> {
        self.core
            .shared
            .lock()
            .unwrap()
            .playlist
            .current_uri()
            .map(str::to_string)
    }

    pub fn state(&self) -> PlayerState {
        self.core.shared.lock().unwrap().state
    }

    pub fn is_playing(&self) -> bool {
        self.core.shared.lock().unwrap().playing
    }

    /// Subscribe to the outward notification stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.core.event_tx.subscribe()
    }

    /// Subscribe to one channel's public output signals
    pub fn subscribe_channel(&self, category: StreamCategory) -> broadcast::Receiver<ChannelSignal> {
        self.core.shared.lock().unwrap().channels[&category].subscribe()
    }

    /// Latency query on one channel's public output
    ///
    /// Answered by the bound live stream when there is one, by the engine
    /// directly otherwise; the fixed presentation latency is added to the
    /// reported minimum either way.
    pub fn query_latency(&self, category: StreamCategory) -> LatencyReport {
        let handle = {
            let shared = self.core.shared.lock().unwrap();
            shared.channels[&category].bound_stream().cloned()
        };
        let mut report = handle
            .and_then(|handle| self.core.engine.stream_latency(&handle))
            .unwrap_or_else(|| self.core.engine.query_latency());
        report.min += PRESENTATION_LATENCY;
        report
    }

    /// Forward a downstream event through one channel's public output
    ///
    /// Targeted at the bound live stream; with nothing live bound the event
    /// goes to the engine directly. Returns whether the event was handled.
    pub fn push_event(&self, category: StreamCategory, event: StreamEvent) -> bool {
        let handle = {
            let shared = self.core.shared.lock().unwrap();
            shared.channels[&category].bound_stream().cloned()
        };
        self.core.engine.push_event(handle.as_ref(), event)
    }
}

impl Core {
    fn emit(&self, event: PlayerEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn prepare(&self) -> Result<()> {
        let (uri, timeout, prior) = {
            let mut shared = self.shared.lock().unwrap();
            match shared.state {
                PlayerState::Idle | PlayerState::Finished | PlayerState::Advancing => {}
                state => {
                    return Err(Error::InvalidState(format!("prepare while {state:?}")));
                }
            }
            let item = shared
                .playlist
                .current()
                .cloned()
                .ok_or_else(|| Error::Config("no playlist loaded".to_string()))?;
            let uri = shared.playlist.resolve_uri(&item.uri);
            let prior = shared.state;
            shared.state = PlayerState::Starting;
            shared.segment_ending = false;
            shared.all_fallback_rounds = 0;
            shared.live_source = uri.starts_with("rtsp://");
            (uri, item.timeout, prior)
        };

        info!("starting segment: {}", uri);
        if let Err(e) = self.engine.set_source(&uri) {
            self.shared.lock().unwrap().state = prior;
            return Err(Error::Engine(e.to_string()));
        }

        if let Some(secs) = timeout {
            let result = Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::Scheduling(format!("timeout {secs}s: {e}")))
                .and_then(|after| {
                    let dispatch_tx = self.dispatch_tx.clone();
                    self.shared.lock().unwrap().timer.arm(after, move |generation| {
                        let _ = dispatch_tx.send(Dispatch::TimerFired { generation });
                    })
                });
            if let Err(e) = result {
                self.shared.lock().unwrap().state = prior;
                return Err(e);
            }
        }

        Ok(())
    }

    fn announce(&self) -> Result<()> {
        let (uri, index, size) = {
            let mut shared = self.shared.lock().unwrap();
            match shared.state {
                PlayerState::Starting | PlayerState::Playing => {}
                state => {
                    return Err(Error::InvalidState(format!("announce while {state:?}")));
                }
            }
            let item = shared
                .playlist
                .current()
                .ok_or_else(|| Error::Config("no playlist loaded".to_string()))?;
            let uri = item.uri.clone();
            let index = shared.playlist.index() as u32;
            let size = shared.playlist.len() as u32;
            shared.playing = true;
            (uri, index, size)
        };

        info!("now playing {} ({}/{})", uri, index + 1, size);
        self.emit(PlayerEvent::PlaybackStarted {
            uri,
            index,
            size,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Stop bookkeeping under the lock; the engine teardown stays with the
    /// caller, outside the critical section
    fn halt_locked(shared: &mut PlayerShared) {
        shared.playing = false;
        shared.timer.cancel();
        for channel in shared.channels.values_mut() {
            channel.unbind();
        }
        shared.routes.clear();
        shared.state = PlayerState::Idle;
    }

    fn stop(&self) {
        {
            let mut shared = self.shared.lock().unwrap();
            Self::halt_locked(&mut shared);
        }
        self.engine.teardown();
        debug!("stopped");
    }

    /// Atomically stop (if playing) and reload, so no notification or host
    /// transition can interleave between the stop and the new cursor
    /// becoming visible
    fn replace_playlist(&self, source: &str) -> Result<()> {
        let (was_playing, result) = {
            let mut shared = self.shared.lock().unwrap();
            let was_playing = shared.playing;
            if was_playing {
                info!("playlist replaced while playing; stopping first");
                Self::halt_locked(&mut shared);
            }
            (was_playing, shared.playlist.load(source))
        };
        if was_playing {
            self.engine.teardown();
        }
        result
    }

    fn handle_dispatch(&self, message: Dispatch) {
        match message {
            Dispatch::Engine(notification) => self.handle_notification(notification),
            Dispatch::TimerFired { generation } => {
                let acknowledged = self
                    .shared
                    .lock()
                    .unwrap()
                    .timer
                    .acknowledge_fire(generation);
                if acknowledged {
                    info!("segment timeout reached");
                    self.end_segment();
                }
            }
            Dispatch::EndSegment => self.end_segment(),
            Dispatch::TeardownEngine => self.engine.teardown(),
            Dispatch::Shutdown => unreachable!("handled by the control loop"),
        }
    }

    fn handle_notification(&self, notification: EngineNotification) {
        match notification {
            EngineNotification::StreamAppeared { handle } => self.stream_appeared(handle),
            EngineNotification::StreamRemoved { handle } => self.stream_removed(handle),
            EngineNotification::NoMoreStreams => self.no_more_streams(),
            EngineNotification::Drained => self.drained(),
            EngineNotification::EndOfStream { category } => {
                let shared = self.shared.lock().unwrap();
                shared.channels[&category].end_of_stream(shared.finishing);
            }
            EngineNotification::Error { message } => {
                error!("engine error: {}", message);
                let active = matches!(
                    self.shared.lock().unwrap().state,
                    PlayerState::Starting | PlayerState::Playing
                );
                if active {
                    self.end_segment();
                }
            }
            EngineNotification::Warning { message } => {
                warn!("engine warning: {}", message);
            }
        }
    }

    fn stream_appeared(&self, handle: StreamHandle) {
        // Clock reads are cheap and non-re-entrant; take them before the lock
        let engine_now = self.engine.clock_now();
        let base_time = self.engine.base_time();

        let apply = {
            let mut shared = self.shared.lock().unwrap();
            if !matches!(shared.state, PlayerState::Starting | PlayerState::Playing) {
                debug!("ignoring stream {} while {:?}", handle, shared.state);
                return;
            }
            let category = handle.category;
            let channel = shared
                .channels
                .get_mut(&category)
                .expect("channel exists for every category");
            if !channel.bind_live(handle.clone()) {
                // Routing anomaly, already logged; keep the first stream
                return;
            }
            shared.routes.insert(handle.id, category);
            shared.state = PlayerState::Playing;
            if shared.live_source {
                None
            } else {
                Some(shared.offset.offset_for_bind(engine_now, base_time))
            }
        };

        if let Some(offset) = apply {
            self.engine.apply_offset(&handle, offset);
        }
    }

    fn stream_removed(&self, handle: StreamHandle) {
        let mut shared = self.shared.lock().unwrap();
        match shared.routes.remove(&handle.id) {
            Some(category) => {
                debug!("stream removed: {}", handle);
                shared
                    .channels
                    .get_mut(&category)
                    .expect("channel exists for every category")
                    .unbind();
            }
            None => debug!("removal for unrouted stream {}", handle),
        }
    }

    /// No further streams are coming: make sure every channel has a target
    ///
    /// The second consecutive round where every channel was already on
    /// fallback with nothing new arriving counts as a natural end, guarding
    /// against the engine reporting "no more streams" again after a drained
    /// cycle. The `segment_ending` latch keeps this path and `drained` from
    /// double-advancing.
    fn no_more_streams(&self) {
        let end = {
            let mut shared = self.shared.lock().unwrap();
            if !matches!(shared.state, PlayerState::Starting | PlayerState::Playing) {
                debug!("ignoring no-more-streams while {:?}", shared.state);
                return;
            }

            let mut newly_bound = 0;
            for channel in shared.channels.values_mut() {
                if !channel.is_bound() {
                    channel.bind_fallback();
                    newly_bound += 1;
                }
            }
            shared.state = PlayerState::Playing;

            let all_fallback = shared.channels.values().all(OutputChannel::is_fallback_bound);
            if all_fallback {
                if newly_bound == 0 {
                    shared.all_fallback_rounds += 1;
                } else {
                    shared.all_fallback_rounds = 1;
                }
            } else {
                shared.all_fallback_rounds = 0;
            }

            shared.all_fallback_rounds >= 2 && !shared.segment_ending
        };

        if end {
            info!("no streams across consecutive rounds; treating as natural end");
            self.end_segment();
        }
    }

    /// Current source exhausted
    ///
    /// With a timer still armed the operator asked for a minimum segment
    /// duration: swap only audio to fallback (video keeps its last frame)
    /// and tear the exhausted engine down asynchronously. Without a timer
    /// this is the natural end of the segment.
    fn drained(&self) {
        let timer_armed = {
            let shared = self.shared.lock().unwrap();
            if !matches!(shared.state, PlayerState::Starting | PlayerState::Playing) {
                // Stale notification from a segment already stopped
                debug!("ignoring drained while {:?}", shared.state);
                return;
            }
            shared.timer.is_armed()
        };
        if timer_armed {
            info!("drained with timer running; delaying end of segment");
            self.swap_out_audio();
            let _ = self.dispatch_tx.send(Dispatch::TeardownEngine);
        } else {
            info!("drained with no timer; segment done");
            self.end_segment();
        }
    }

    fn swap_out_audio(&self) {
        let mut shared = self.shared.lock().unwrap();
        let channel = shared
            .channels
            .get_mut(&StreamCategory::Audio)
            .expect("audio channel exists");
        if channel.is_live_bound() {
            channel.unbind();
            channel.bind_fallback();
            shared.routes.retain(|_, category| *category != StreamCategory::Audio);
        }
    }

    /// Tear down the current segment and move to the next item or finish
    fn end_segment(&self) {
        enum Outcome {
            Restart,
            Finish,
        }

        let outcome = {
            let mut shared = self.shared.lock().unwrap();
            if shared.segment_ending {
                debug!("segment already ending");
                return;
            }
            // A stale end-of-segment trigger after stop() must not restart
            // playback from Idle
            if matches!(shared.state, PlayerState::Idle | PlayerState::Finished) {
                debug!("no segment to end while {:?}", shared.state);
                return;
            }
            shared.segment_ending = true;
            shared.state = PlayerState::Advancing;
            shared.timer.cancel();
            for channel in shared.channels.values_mut() {
                channel.unbind();
            }
            shared.routes.clear();
            if shared.playlist.advance().is_some() {
                Outcome::Restart
            } else {
                Outcome::Finish
            }
        };

        match outcome {
            Outcome::Restart => {
                info!("advanced to next item");
                self.engine.teardown();
                if let Err(e) = self.prepare() {
                    error!("failed to start next segment: {}", e);
                    // Skip the broken item through the normal advance path
                    let _ = self.dispatch_tx.send(Dispatch::EndSegment);
                    return;
                }
                if let Err(e) = self.announce() {
                    error!("failed to announce segment: {}", e);
                }
            }
            Outcome::Finish => self.finish(),
        }
    }

    /// Playlist exhausted: lift suppression, push real end-of-stream through
    /// every channel and the player boundary, and emit `PlaylistCompleted`
    fn finish(&self) {
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.state == PlayerState::Finished {
                return;
            }
            info!("finished playthroughs");
            shared.finishing = true;
            shared.state = PlayerState::Finished;
            shared.playing = false;
            for channel in shared.channels.values_mut() {
                if !channel.is_fallback_bound() {
                    channel.bind_fallback();
                }
                channel.push_eos();
            }
        }
        self.engine.teardown();
        self.emit(PlayerEvent::PlaylistCompleted {
            timestamp: chrono::Utc::now(),
        });
    }
}
