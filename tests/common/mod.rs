#![allow(dead_code)]

use cadence::config::EngineConfig;
use cadence::effects::{EffectGraph, Topology};
use cadence::engine::Engine;
use cadence::events::{Event, Notice};
use cadence::models::{SongDetail, Track, TrackRef};
use cadence::ports::{HistorySink, MediaOutput, Resolver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Records every call; can be told to refuse effect graphs or loads, or to go idle.
#[derive(Debug, Clone, Default)]
pub struct FakeOutput {
    calls: Arc<Mutex<Vec<String>>>,
    refuse_effects: Arc<AtomicBool>,
    refuse_loads: Arc<AtomicBool>,
    /// Nothing loaded: seek and play fail until the next successful load.
    idle: Arc<AtomicBool>,
}

impl FakeOutput {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("load ").map(str::to_string))
            .collect()
    }

    pub fn refuse_effects(&self) {
        self.refuse_effects.store(true, Ordering::SeqCst);
    }

    pub fn refuse_loads(&self) {
        self.refuse_loads.store(true, Ordering::SeqCst);
    }

    /// Drop the loaded file, the way mpv does at end of file when started with `--idle`.
    pub fn go_idle(&self) {
        self.idle.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MediaOutput for FakeOutput {
    async fn load(&self, url: &str) -> anyhow::Result<()> {
        if self.refuse_loads.load(Ordering::SeqCst) {
            anyhow::bail!("cannot open {url}");
        }
        self.idle.store(false, Ordering::SeqCst);
        self.record(format!("load {url}"));
        Ok(())
    }

    async fn play(&self) -> anyhow::Result<()> {
        if self.idle.load(Ordering::SeqCst) {
            anyhow::bail!("nothing loaded");
        }
        self.record("play".into());
        Ok(())
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.record("pause".into());
        Ok(())
    }

    async fn seek(&self, seconds: f64) -> anyhow::Result<()> {
        if self.idle.load(Ordering::SeqCst) {
            anyhow::bail!("nothing loaded");
        }
        self.record(format!("seek {seconds}"));
        Ok(())
    }

    async fn set_volume(&self, volume_0_100: u8) -> anyhow::Result<()> {
        self.record(format!("volume {volume_0_100}"));
        Ok(())
    }

    async fn apply_effects(&self, graph: &EffectGraph) -> anyhow::Result<()> {
        let label = graph.topology().label();
        if self.refuse_effects.load(Ordering::SeqCst) && graph.topology() != Topology::Original {
            anyhow::bail!("no filter support for {label}");
        }
        self.record(format!("effects {label}"));
        Ok(())
    }
}

/// Canned answers keyed by platform song id.
#[derive(Debug, Default)]
pub struct FakeResolver {
    pub details: Mutex<HashMap<String, SongDetail>>,
    pub search_results: Mutex<Vec<Track>>,
    pub lyrics: Mutex<HashMap<String, String>>,
    /// (song id, fresh) per resolve call.
    pub resolve_calls: Mutex<Vec<(String, bool)>>,
}

impl FakeResolver {
    pub fn with_url(self, song_id: &str, url: &str) -> Self {
        self.details.lock().unwrap().insert(
            song_id.to_string(),
            SongDetail {
                url: Some(url.to_string()),
                ..SongDetail::default()
            },
        );
        self
    }

    pub fn resolve_calls(&self) -> Vec<(String, bool)> {
        self.resolve_calls.lock().unwrap().clone()
    }
}

impl Resolver for FakeResolver {
    async fn resolve(&self, track: &Track, fresh: bool) -> anyhow::Result<SongDetail> {
        self.resolve_calls
            .lock()
            .unwrap()
            .push((track.song_id.clone(), fresh));
        Ok(self
            .details
            .lock()
            .unwrap()
            .get(&track.song_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn search(
        &self,
        _query: &str,
        platform: &str,
        _page: u32,
        _page_size: u32,
    ) -> anyhow::Result<Vec<Track>> {
        Ok(self
            .search_results
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.platform == platform)
            .cloned()
            .collect())
    }

    async fn fetch_lyric_text(&self, url: &str) -> String {
        self.lyrics
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct FakeSink {
    pub persisted: Mutex<Vec<String>>,
}

impl HistorySink for FakeSink {
    async fn persist(&self, track: Track) -> anyhow::Result<()> {
        self.persisted.lock().unwrap().push(track.id);
        Ok(())
    }
}

pub type TestEngine = Engine<FakeOutput, FakeResolver, FakeSink>;

pub struct Harness {
    pub engine: TestEngine,
    pub rx: mpsc::Receiver<Event>,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    pub output: FakeOutput,
    pub resolver: Arc<FakeResolver>,
    pub sink: Arc<FakeSink>,
}

impl Harness {
    pub fn new(resolver: FakeResolver) -> Self {
        Self::with_config(resolver, test_config())
    }

    pub fn with_config(resolver: FakeResolver, cfg: EngineConfig) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let (notice_tx, notices) = mpsc::unbounded_channel();
        let output = FakeOutput::default();
        let resolver = Arc::new(resolver);
        let sink = Arc::new(FakeSink::default());
        let engine = Engine::new(
            &cfg,
            output.clone(),
            Arc::clone(&resolver),
            Arc::clone(&sink),
            tx,
            notice_tx,
        );
        Self {
            engine,
            rx,
            notices,
            output,
            resolver,
            sink,
        }
    }

    /// Feed spawned-task results back into the engine until nothing arrives for a while.
    pub async fn pump(&mut self) {
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(200), self.rx.recv()).await
        {
            self.engine.handle(event).await;
        }
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(n) = self.notices.try_recv() {
            out.push(n);
        }
        out
    }

    pub fn current_id(&self) -> Option<String> {
        self.engine.current_track().map(TrackRef::id)
    }
}

/// No pause before skipping; throttle window as shipped.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        skip_delay_ms: 0,
        ..EngineConfig::default()
    }
}

/// A track that needs no resolution: URL and timed lyrics already known.
pub fn ready(id: &str) -> TrackRef {
    let mut t = Track::new("netease", id, &format!("Song {id}"), "Artist");
    t.url = Some(stream_url(id));
    t.lyric = Some(format!("[00:01]{id} one\n[00:05]{id} two"));
    TrackRef::new(t)
}

/// A track the resolver has to fill in.
pub fn bare(id: &str) -> TrackRef {
    TrackRef::new(Track::new("netease", id, &format!("Song {id}"), "Artist"))
}

pub fn stream_url(id: &str) -> String {
    format!("https://stream/{id}.mp3")
}
