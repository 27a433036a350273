use crate::effects::Topology;
use crate::engine::mode::PlaybackMode;
use crate::engine::resolution::{Generation, Resolution};
use crate::error::PlayError;
use crate::lyrics::LyricTrack;
use crate::models::{Track, TrackRef};
use std::sync::Arc;

/// Everything the engine loop reacts to.
#[derive(Debug, Clone)]
pub enum Event {
    Command(Command),
    Player(PlayerEvent),
    Resolution(ResolutionEvent),
}

/// Requests from the UI layer.
#[derive(Debug, Clone)]
pub enum Command {
    SetQueue { tracks: Vec<TrackRef>, start: usize },
    PlayAt(usize),
    EnqueueNext(TrackRef),
    Next,
    Previous,
    TogglePlayPause,
    Pause,
    Seek(f64),
    SeekToLine(usize),
    SetMode(PlaybackMode),
    CycleMode,
    SetEffect(Topology),
    SetVolume(u8),
    ToggleMute,
    Quit,
}

/// Reports from the media backend.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    Started,
    Paused,
    Position { seconds: f64 },
    Duration { seconds: f64 },
    Ended,
    Error(String),
    Warning(String),
}

/// Results of work spawned by the engine, tagged with the attempt they belong to.
#[derive(Debug, Clone)]
pub enum ResolutionEvent {
    Resolved {
        generation: Generation,
        track: TrackRef,
        resolution: Resolution,
    },
    LyricFetched {
        generation: Generation,
        track: TrackRef,
        source_url: String,
        text: String,
    },
    /// The pause after an unplayable track is over.
    SkipDue { generation: Generation },
}

/// Change notifications for the UI layer.
#[derive(Debug, Clone)]
pub enum Notice {
    TrackChanged(Track),
    PlayState(bool),
    Progress { position: f64, duration: f64 },
    LyricsLoaded(Arc<LyricTrack>),
    /// Active lyric line; `None` before the first line.
    LyricLine(Option<usize>),
    ModeChanged(PlaybackMode),
    EffectChanged(Topology),
    VolumeChanged(u8),
    Failure(PlayError),
}
