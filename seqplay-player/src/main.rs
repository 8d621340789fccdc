//! Seqplay player - demo entry point
//!
//! Runs the playlist player against a scripted stand-in for the decoding
//! engine: each source "decodes" into the stream categories its extension
//! suggests, then drains after a short simulated duration. Useful for
//! exercising the full scheduler (timers, fallback binding, looping,
//! end-of-playlist) without real media.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seqplay_common::{
    DecoderPolicy, EngineError, EngineNotification, LatencyReport, MediaEngine, PlayerEvent,
    StreamCategory, StreamEvent, StreamHandle,
};
use seqplay_player::{Player, PlayerSettings};

/// Simulated media duration for every scripted source
const SCRIPTED_DURATION: Duration = Duration::from_secs(2);

/// Command-line arguments for the seqplay demo
#[derive(Parser, Debug)]
#[command(name = "seqplay-player")]
#[command(about = "Playlist segment scheduler demo over a scripted engine")]
#[command(version)]
struct Args {
    /// Playlist: inline JSON, or @path of a JSON file
    #[arg(short, long, env = "SEQPLAY_PLAYLIST")]
    playlist: String,

    /// Number of playthroughs (negative = loop forever)
    #[arg(short = 'n', long, default_value = "1")]
    playthroughs: i32,

    /// GPU PCI slot affinity hint
    #[arg(long)]
    gpu_slot: Option<u8>,

    /// Reject hardware-accelerated decoders
    #[arg(long)]
    software_decode: bool,
}

/// Scripted decoding engine for demos and self-tests
struct ScriptedEngine {
    epoch: Instant,
    inner: Mutex<ScriptedInner>,
}

#[derive(Default)]
struct ScriptedInner {
    notify: Option<mpsc::UnboundedSender<EngineNotification>>,
    policy: DecoderPolicy,
    decode_task: Option<JoinHandle<()>>,
}

impl ScriptedEngine {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            inner: Mutex::new(ScriptedInner::default()),
        }
    }

    /// Stream categories a source would decode into, judged by extension
    fn categories_for(uri: &str) -> Vec<StreamCategory> {
        let lower = uri.to_ascii_lowercase();
        if lower.ends_with(".wav") || lower.ends_with(".mp3") || lower.ends_with(".flac") {
            vec![StreamCategory::Audio]
        } else if lower.ends_with(".jpg") || lower.ends_with(".png") {
            vec![StreamCategory::Video]
        } else {
            vec![StreamCategory::Audio, StreamCategory::Video]
        }
    }
}

impl MediaEngine for ScriptedEngine {
    fn connect(&self, notify: mpsc::UnboundedSender<EngineNotification>, policy: DecoderPolicy) {
        let mut inner = self.inner.lock().unwrap();
        inner.notify = Some(notify);
        inner.policy = policy;
    }

    fn set_source(&self, uri: &str) -> std::result::Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let notify = inner
            .notify
            .clone()
            .ok_or_else(|| EngineError("engine not connected".to_string()))?;

        // Consult the decoder policy the way a real autoplugger would
        let verdict = inner.policy.select_decoder("hwdec_demo");
        debug!("hwdec_demo candidate: {:?}", verdict);

        if let Some(task) = inner.decode_task.take() {
            task.abort();
        }

        let categories = Self::categories_for(uri);
        let uri = uri.to_string();
        inner.decode_task = Some(tokio::spawn(async move {
            info!("scripted decode of {}", uri);
            for category in &categories {
                let handle = StreamHandle::new(*category, format!("scripted.{category}"));
                let _ = notify.send(EngineNotification::StreamAppeared { handle });
            }
            let _ = notify.send(EngineNotification::NoMoreStreams);

            tokio::time::sleep(SCRIPTED_DURATION).await;
            let _ = notify.send(EngineNotification::Drained);
        }));
        Ok(())
    }

    fn teardown(&self) {
        if let Some(task) = self.inner.lock().unwrap().decode_task.take() {
            task.abort();
        }
    }

    fn clock_now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn base_time(&self) -> Duration {
        Duration::ZERO
    }

    fn apply_offset(&self, handle: &StreamHandle, offset: Duration) {
        debug!("offset {:?} applied to {}", offset, handle);
    }

    fn query_latency(&self) -> LatencyReport {
        LatencyReport {
            live: false,
            min: Duration::ZERO,
            max: None,
        }
    }

    fn stream_latency(&self, _handle: &StreamHandle) -> Option<LatencyReport> {
        None
    }

    fn push_event(&self, handle: Option<&StreamHandle>, event: StreamEvent) -> bool {
        match handle {
            Some(handle) => debug!("event {:?} forwarded to {}", event, handle),
            None => debug!("event {:?} forwarded to engine", event),
        }
        true
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seqplay_player=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let settings = PlayerSettings {
        playlist: Some(args.playlist),
        playthroughs: args.playthroughs,
        gpu_slot: args.gpu_slot,
        prefer_hardware_decode: !args.software_decode,
    };

    let engine = Arc::new(ScriptedEngine::new());
    let player = Player::new(engine, settings).context("failed to initialize player")?;
    player.start();

    let mut events = player.subscribe_events();

    player.prepare().context("failed to prepare first segment")?;
    player.announce().context("failed to announce first segment")?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(PlayerEvent::PlaybackStarted { uri, index, size, .. }) => {
                    info!("now playing {} ({} of {})", uri, index + 1, size);
                }
                Ok(PlayerEvent::PlaylistCompleted { .. }) => {
                    info!("playlist completed");
                    break;
                }
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; stopping");
                player.stop();
                break;
            }
        }
    }

    player.shutdown();
    Ok(())
}
