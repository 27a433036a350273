//! Collaborators the playback engine is constructed with.

use crate::effects::EffectGraph;
use crate::models::{SongDetail, Track};
use std::future::Future;

/// Search / detail lookup against the music platforms.
pub trait Resolver: Send + Sync + 'static {
    /// Stream URL, cover and lyric (text or URL) for a track.
    /// `fresh` skips any cached answer, e.g. when a previously resolved URL failed to play.
    fn resolve(
        &self,
        track: &Track,
        fresh: bool,
    ) -> impl Future<Output = anyhow::Result<SongDetail>> + Send;

    /// Best-effort ranked matches. An empty list means "no results".
    fn search(
        &self,
        query: &str,
        platform: &str,
        page: u32,
        page_size: u32,
    ) -> impl Future<Output = anyhow::Result<Vec<Track>>> + Send;

    /// Plain lyric text behind `url`; empty on failure.
    fn fetch_lyric_text(&self, url: &str) -> impl Future<Output = String> + Send;
}

/// Receives each track the engine starts playing. Failures are logged, never fatal.
pub trait HistorySink: Send + Sync + 'static {
    fn persist(&self, track: Track) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// The single audio output. Only the engine drives it.
pub trait MediaOutput {
    /// Replace the current source and begin playback.
    fn load(&self, url: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn play(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn pause(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
    /// Absolute position in seconds.
    fn seek(&self, seconds: f64) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn set_volume(&self, volume_0_100: u8) -> impl Future<Output = anyhow::Result<()>> + Send;
    /// Install `graph` as the processing path, replacing whatever was installed before.
    fn apply_effects(
        &self,
        graph: &EffectGraph,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}
