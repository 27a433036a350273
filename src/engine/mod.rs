//! Playback engine
//!
//! Owns the queue, the history stack, the playback mode and the single media output.
//! Network work (resolution, lyric fetches) runs in spawned tasks that report back through
//! the engine's event channel tagged with the [`Generation`] of the attempt that started them;
//! anything tagged with an older generation is never applied to playback.

pub mod mode;
pub mod resolution;
pub mod throttle;

use crate::config::EngineConfig;
use crate::effects::{EffectGraph, Topology};
use crate::error::PlayError;
use crate::events::{Command, Event, Notice, PlayerEvent, ResolutionEvent};
use crate::lyrics::{LyricCursor, LyricTrack};
use crate::models::{LyricPayload, Track, TrackRef};
use crate::ports::{HistorySink, MediaOutput, Resolver};
use crate::queue::{History, Queue};
use mode::PlaybackMode;
use resolution::{Attempt, Generation, Need, Resolution};
use std::sync::Arc;
use std::time::{Duration, Instant};
use throttle::ErrorThrottle;
use tokio::sync::mpsc;

/// Volume restored by unmute when nothing louder was ever set.
const UNMUTE_FALLBACK_VOLUME: u8 = 50;

pub struct Engine<M, R, H> {
    output: M,
    resolver: Arc<R>,
    history_sink: Arc<H>,
    events: mpsc::Sender<Event>,
    notices: mpsc::UnboundedSender<Notice>,
    skip_delay: Duration,

    queue: Queue,
    history: History,
    mode: PlaybackMode,
    current: Option<TrackRef>,
    generation: Generation,
    attempt: Attempt,
    /// The current transition has already been written to play history.
    persisted: bool,

    lyrics: Arc<LyricTrack>,
    cursor: LyricCursor,
    effects: EffectGraph,
    throttle: ErrorThrottle,

    playing: bool,
    position: f64,
    duration: f64,
    volume: u8,
    unmuted_volume: u8,
}

impl<M, R, H> Engine<M, R, H>
where
    M: MediaOutput,
    R: Resolver,
    H: HistorySink,
{
    /// `events` must be the sending half of the channel later passed to [`Engine::run`].
    pub fn new(
        cfg: &EngineConfig,
        output: M,
        resolver: Arc<R>,
        history_sink: Arc<H>,
        events: mpsc::Sender<Event>,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Self {
        Self {
            output,
            resolver,
            history_sink,
            events,
            notices,
            skip_delay: cfg.skip_delay(),
            queue: Queue::new(),
            history: History::with_limit(cfg.history_limit),
            mode: PlaybackMode::default(),
            current: None,
            generation: Generation::default(),
            attempt: Attempt::NotStarted,
            persisted: false,
            lyrics: Arc::new(LyricTrack::default()),
            cursor: LyricCursor::new(),
            effects: EffectGraph::new(),
            throttle: ErrorThrottle::new(cfg.error_throttle()),
            playing: false,
            position: 0.0,
            duration: 0.0,
            volume: 100,
            unmuted_volume: 0,
        }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn current_track(&self) -> Option<&TrackRef> {
        self.current.as_ref()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.queue.current_index()
    }

    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn lyrics(&self) -> &LyricTrack {
        &self.lyrics
    }

    pub fn active_line(&self) -> Option<usize> {
        self.cursor.active()
    }

    pub fn effect(&self) -> Topology {
        self.effects.topology()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Drain events until a `Quit` command arrives or every sender is gone.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<Event>) {
        while let Some(event) = rx.recv().await {
            if !self.handle(event).await {
                break;
            }
        }
        tracing::debug!("engine loop finished");
    }

    /// Returns `false` once the engine was asked to quit.
    pub async fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Command(cmd) => return self.command(cmd).await,
            Event::Player(pe) => self.handle_player(pe).await,
            Event::Resolution(re) => self.handle_resolution(re).await,
        }
        true
    }

    async fn command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::SetQueue { tracks, start } => self.set_queue(tracks, start).await,
            Command::PlayAt(index) => self.play_at(index).await,
            Command::EnqueueNext(track) => self.enqueue_next(track),
            Command::Next => self.next(false).await,
            Command::Previous => self.previous().await,
            Command::TogglePlayPause => self.toggle_play_pause().await,
            Command::Pause => self.pause().await,
            Command::Seek(seconds) => self.seek(seconds).await,
            Command::SeekToLine(index) => self.seek_to_line(index).await,
            Command::SetMode(mode) => self.set_mode(mode),
            Command::CycleMode => self.cycle_mode(),
            Command::SetEffect(topology) => self.set_effect(topology).await,
            Command::SetVolume(volume) => self.set_volume(volume).await,
            Command::ToggleMute => self.toggle_mute().await,
            Command::Quit => {
                let _ = self.output.pause().await;
                return false;
            }
        }
        true
    }

    // ---- queue & history -------------------------------------------------------------

    /// Load persisted history (most recent first) as the "previous" stack.
    pub fn seed_history(&mut self, most_recent_first: Vec<Track>) {
        self.history
            .seed(most_recent_first.into_iter().map(TrackRef::new).collect());
    }

    /// Replace the queue and start playing at `start` (clamped to 0 when out of range).
    pub async fn set_queue(&mut self, tracks: Vec<TrackRef>, start: usize) {
        if tracks.is_empty() {
            tracing::warn!("set_queue called with an empty list");
            return;
        }
        self.queue.replace(tracks, start);
        if let Some(track) = self.queue.current_track().cloned() {
            self.start(track, false).await;
        }
    }

    pub async fn play_at(&mut self, index: usize) {
        let Some(track) = self.queue.get(index).cloned() else {
            tracing::warn!(index, len = self.queue.len(), "play_at: index out of range");
            return;
        };
        self.queue.set_current(index);
        self.start(track, false).await;
    }

    pub fn enqueue_next(&mut self, track: TrackRef) {
        self.queue.insert_next(track);
    }

    /// Advance according to the mode. `auto` marks an end-of-track advance.
    pub async fn next(&mut self, auto: bool) {
        if self.queue.is_empty() {
            return;
        }
        if auto && self.mode == PlaybackMode::RepeatOne && self.current.is_some() {
            self.restart().await;
            return;
        }
        let index = match self.mode {
            PlaybackMode::Shuffle => self.queue.random_index(&mut rand::rng()),
            PlaybackMode::Sequential | PlaybackMode::RepeatOne => self.queue.following_index(),
        };
        if let Some(index) = index {
            self.play_at(index).await;
        }
    }

    /// Go back through history; fall back to the previous queue entry when history is empty.
    pub async fn previous(&mut self) {
        if let Some(track) = self.history.pop() {
            self.start(track, true).await;
            return;
        }
        if let Some(index) = self.queue.preceding_index() {
            self.play_at(index).await;
        }
    }

    /// Reload the current track from the top. An output that went idle at end of
    /// file has nothing left to seek in, so the stream is loaded again.
    async fn restart(&mut self) {
        self.position = 0.0;
        self.sync_lyrics();
        self.begin_playback().await;
    }

    /// Make `track` current and begin a new play attempt.
    ///
    /// History and queue bookkeeping finish before anything is awaited.
    async fn start(&mut self, track: TrackRef, from_history: bool) {
        if from_history {
            self.queue.sync_to(&track);
        } else if let Some(current) = &self.current
            && !current.same_track(&track)
            && !self.attempt.is_failure()
            && !current.read().unplayable
        {
            self.history.push(current.clone());
        }

        self.current = Some(track.clone());
        self.generation = self.generation.next();
        self.attempt = Attempt::NotStarted;
        self.persisted = false;
        self.position = 0.0;
        self.duration = f64::from(track.read().duration_secs);
        self.set_lyrics(LyricTrack::default());

        let snapshot = track.snapshot();
        tracing::info!(track = %snapshot.id, generation = ?self.generation, "starting {}", snapshot.display_name());
        self.notify(Notice::TrackChanged(snapshot));

        let need = resolution::need(&track.read());
        if need == Need::Ready {
            self.attempt = Attempt::Resolving.on_resolved(true);
            self.begin_playback().await;
        } else {
            self.attempt = Attempt::Resolving;
            self.spawn_resolution(track);
        }
    }

    fn persist(&self, track: Track) {
        let sink = Arc::clone(&self.history_sink);
        tokio::spawn(async move {
            let id = track.id.clone();
            if let Err(e) = sink.persist(track).await {
                tracing::warn!(track = %id, "persist history failed: {e:#}");
            }
        });
    }

    // ---- resolution ------------------------------------------------------------------

    fn spawn_resolution(&self, track: TrackRef) {
        let resolver = Arc::clone(&self.resolver);
        let tx = self.events.clone();
        let generation = self.generation;
        let fresh = self.attempt == Attempt::RetryingOnce;
        let snapshot = track.snapshot();
        tracing::debug!(track = %snapshot.id, ?generation, fresh, "resolving");

        tokio::spawn(async move {
            let resolution = resolution::resolve_track(&*resolver, &snapshot, fresh).await;
            let _ = tx
                .send(Event::Resolution(ResolutionEvent::Resolved {
                    generation,
                    track,
                    resolution,
                }))
                .await;
        });
    }

    async fn handle_resolution(&mut self, event: ResolutionEvent) {
        match event {
            ResolutionEvent::Resolved {
                generation,
                track,
                resolution,
            } => self.on_resolved(generation, track, resolution).await,
            ResolutionEvent::LyricFetched {
                generation,
                track,
                source_url,
                text,
            } => self.on_lyric_fetched(generation, &track, &source_url, text),
            ResolutionEvent::SkipDue { generation } => {
                if generation == self.generation && self.attempt.is_failure() {
                    self.skip_forward().await;
                }
            }
        }
    }

    async fn on_resolved(&mut self, generation: Generation, track: TrackRef, resolution: Resolution) {
        // What was learned is true for the track whether or not it is still current.
        let matched = match resolution {
            Resolution::Matched { song_id, detail } => {
                let mut t = track.write();
                t.rebind(&song_id);
                t.merge_detail(detail);
                true
            }
            Resolution::Detail(detail) => {
                track.write().merge_detail(detail);
                true
            }
            Resolution::NoMatch => false,
        };

        if generation != self.generation {
            tracing::debug!(track = %track.id(), ?generation, current = ?self.generation, "discarding stale resolution");
            return;
        }

        let has_url = matched && track.read().has_url();
        self.attempt = self.attempt.on_resolved(has_url);
        if has_url {
            self.begin_playback().await;
        } else {
            let title = track.read().title.clone();
            tracing::warn!(track = %track.id(), attempt = ?self.attempt, "no stream url");
            self.fail_current(PlayError::Resolution {
                track_id: track.id(),
                title,
            });
        }
    }

    /// Hand the current track's URL to the output, then deal with its lyrics.
    async fn begin_playback(&mut self) {
        let Some(track) = self.current.clone() else {
            return;
        };
        let (url, lyric) = {
            let t = track.read();
            (t.url.clone().filter(|u| !u.trim().is_empty()), t.lyric.clone())
        };
        let Some(url) = url else {
            self.attempt = Attempt::Failed;
            let (track_id, title) = {
                let t = track.read();
                (t.id.clone(), t.title.clone())
            };
            self.fail_current(PlayError::Resolution { track_id, title });
            return;
        };

        if let Err(e) = self.output.load(&url).await {
            self.on_media_error(format!("{e:#}"));
            return;
        }
        if !self.persisted {
            self.persisted = true;
            self.persist(track.snapshot());
        }
        self.set_playing(true);
        self.publish_lyrics(track, lyric.as_deref());
    }

    fn publish_lyrics(&mut self, track: TrackRef, lyric: Option<&str>) {
        match LyricPayload::of(lyric) {
            LyricPayload::Missing => self.set_lyrics(LyricTrack::default()),
            LyricPayload::Text(text) => self.set_lyrics(LyricTrack::parse(text)),
            LyricPayload::Url(url) => self.spawn_lyric_fetch(track, url.to_string()),
        }
    }

    fn spawn_lyric_fetch(&self, track: TrackRef, source_url: String) {
        let resolver = Arc::clone(&self.resolver);
        let tx = self.events.clone();
        let generation = self.generation;

        tokio::spawn(async move {
            let text = resolver.fetch_lyric_text(&source_url).await;
            let _ = tx
                .send(Event::Resolution(ResolutionEvent::LyricFetched {
                    generation,
                    track,
                    source_url,
                    text,
                }))
                .await;
        });
    }

    fn on_lyric_fetched(&mut self, generation: Generation, track: &TrackRef, source_url: &str, text: String) {
        if text.trim().is_empty() {
            tracing::info!(track = %track.id(), "lyric fetch returned nothing");
        } else {
            let mut t = track.write();
            if t.lyric.as_deref().map(str::trim) == Some(source_url) {
                t.lyric = Some(text.clone());
            }
        }

        if generation != self.generation {
            tracing::debug!(track = %track.id(), "discarding stale lyrics");
            return;
        }
        self.set_lyrics(LyricTrack::parse(&text));
    }

    // ---- failures --------------------------------------------------------------------

    fn on_media_error(&mut self, reason: String) {
        let Some(track) = self.current.clone() else {
            return;
        };
        match self.attempt.on_media_error() {
            Attempt::RetryingOnce => {
                tracing::info!(track = %track.id(), %reason, "playback error, resolving again");
                track.write().clear_url();
                self.attempt = Attempt::RetryingOnce;
                self.generation = self.generation.next();
                self.set_playing(false);
                self.spawn_resolution(track);
            }
            Attempt::GaveUp => {
                self.attempt = Attempt::GaveUp;
                let (track_id, title) = {
                    let t = track.read();
                    (t.id.clone(), t.title.clone())
                };
                tracing::warn!(track = %track_id, %reason, "playback failed after retry");
                self.fail_current(PlayError::Playback {
                    track_id,
                    title,
                    reason,
                });
            }
            other => tracing::debug!(attempt = ?other, %reason, "ignoring media error"),
        }
    }

    /// Mark the current track unplayable, tell the user, and move on after a pause.
    fn fail_current(&mut self, error: PlayError) {
        if let Some(track) = &self.current {
            track.write().mark_unplayable();
        }
        self.set_playing(false);
        self.report(error);

        if self.queue.len() <= 1 {
            return;
        }
        if self.queue.all_unplayable() {
            tracing::warn!("every queued track is unplayable");
            self.notify(Notice::Failure(PlayError::NothingPlayable));
            return;
        }

        let tx = self.events.clone();
        let generation = self.generation;
        let delay = self.skip_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx
                .send(Event::Resolution(ResolutionEvent::SkipDue { generation }))
                .await;
        });
    }

    /// Step to the following queue entry, whatever the mode.
    async fn skip_forward(&mut self) {
        if let Some(index) = self.queue.following_index() {
            self.play_at(index).await;
        }
    }

    fn report(&mut self, error: PlayError) {
        if self.throttle.allow(Instant::now()) {
            self.notify(Notice::Failure(error));
        } else {
            tracing::debug!("suppressed notice: {error}");
        }
    }

    // ---- transport -------------------------------------------------------------------

    pub async fn toggle_play_pause(&mut self) {
        let Some(track) = self.current.clone() else {
            if !self.queue.is_empty() {
                let index = self.queue.current_index().unwrap_or(0);
                self.play_at(index).await;
            }
            return;
        };

        if self.playing {
            self.pause().await;
        } else if self.attempt.is_failure() {
            self.start(track, true).await;
        } else if !self.attempt.is_pending() {
            if let Err(e) = self.output.play().await {
                tracing::warn!("resume failed: {e:#}");
                return;
            }
            self.set_playing(true);
        }
    }

    pub async fn pause(&mut self) {
        if let Err(e) = self.output.pause().await {
            tracing::warn!("pause failed: {e:#}");
        }
        self.set_playing(false);
    }

    pub async fn seek(&mut self, seconds: f64) {
        if !seconds.is_finite() || seconds < 0.0 {
            tracing::debug!(seconds, "ignoring seek");
            return;
        }
        if let Err(e) = self.output.seek(seconds).await {
            tracing::warn!("seek failed: {e:#}");
            return;
        }
        self.position = seconds;
        self.sync_lyrics();
    }

    pub async fn seek_to_line(&mut self, index: usize) {
        if let Some(time) = self.lyrics.line(index).map(|l| l.time) {
            self.seek(time).await;
        }
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
        self.notify(Notice::ModeChanged(mode));
    }

    pub fn cycle_mode(&mut self) {
        self.set_mode(self.mode.cycle());
    }

    pub async fn set_volume(&mut self, volume: u8) {
        let volume = volume.min(100);
        if let Err(e) = self.output.set_volume(volume).await {
            tracing::warn!("set volume failed: {e:#}");
            return;
        }
        self.volume = volume;
        if volume > 0 {
            self.unmuted_volume = volume;
        }
        self.notify(Notice::VolumeChanged(volume));
    }

    pub async fn toggle_mute(&mut self) {
        if self.volume > 0 {
            self.unmuted_volume = self.volume;
            self.set_volume(0).await;
        } else {
            let restore = match self.unmuted_volume {
                0 => UNMUTE_FALLBACK_VOLUME,
                v => v,
            };
            self.set_volume(restore).await;
        }
    }

    // ---- effects ---------------------------------------------------------------------

    /// Install `topology`. If the output refuses it, fall back to Original and say so.
    pub async fn set_effect(&mut self, topology: Topology) {
        self.effects.connect(topology);
        let err = match self.output.apply_effects(&self.effects).await {
            Ok(()) => {
                self.notify(Notice::EffectChanged(topology));
                return;
            }
            Err(e) => e,
        };

        if topology == Topology::Original {
            tracing::error!("could not reset effect graph: {err:#}");
            return;
        }

        tracing::warn!(requested = topology.label(), "effect graph unavailable: {err:#}");
        self.effects.connect(Topology::Original);
        if let Err(e) = self.output.apply_effects(&self.effects).await {
            tracing::error!("could not restore original path: {e:#}");
        }
        self.notify(Notice::Failure(PlayError::EffectDowngrade {
            requested: topology.label().to_string(),
            reason: format!("{err:#}"),
        }));
        self.notify(Notice::EffectChanged(Topology::Original));
    }

    // ---- player events ---------------------------------------------------------------

    async fn handle_player(&mut self, pe: PlayerEvent) {
        match pe {
            PlayerEvent::Started => self.set_playing(true),
            PlayerEvent::Paused => self.set_playing(false),
            PlayerEvent::Position { seconds } => {
                self.position = seconds;
                self.notify(Notice::Progress {
                    position: seconds,
                    duration: self.duration,
                });
                self.sync_lyrics();
            }
            PlayerEvent::Duration { seconds } => {
                if seconds > 0.0 {
                    self.duration = seconds;
                }
            }
            PlayerEvent::Ended => {
                self.set_playing(false);
                if matches!(self.attempt, Attempt::Resolved | Attempt::Recovered) {
                    self.next(true).await;
                }
            }
            PlayerEvent::Error(reason) => self.on_media_error(reason),
            PlayerEvent::Warning(text) => tracing::debug!("player: {text}"),
        }
    }

    // ---- notifications ---------------------------------------------------------------

    fn set_lyrics(&mut self, lyrics: LyricTrack) {
        self.lyrics = Arc::new(lyrics);
        self.cursor.reset();
        self.notify(Notice::LyricsLoaded(Arc::clone(&self.lyrics)));
        self.sync_lyrics();
    }

    fn sync_lyrics(&mut self) {
        if let Some(active) = self.cursor.update(&self.lyrics, self.position) {
            self.notify(Notice::LyricLine(active));
        }
    }

    fn set_playing(&mut self, playing: bool) {
        if self.playing != playing {
            self.playing = playing;
            self.notify(Notice::PlayState(playing));
        }
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }
}
