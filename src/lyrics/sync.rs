//! Keeps the active lyric line in step with the playback position.

use super::LyricTrack;

/// Remembers the last published line so ticks that land on the same line stay quiet.
#[derive(Debug, Clone, Default)]
pub struct LyricCursor {
    published: Option<usize>,
}

impl LyricCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Some(active)` only when the active line differs from the last one published.
    pub fn update(&mut self, lyrics: &LyricTrack, position: f64) -> Option<Option<usize>> {
        let active = lyrics.active_index(position);
        if active == self.published {
            return None;
        }
        self.published = active;
        Some(active)
    }

    pub fn active(&self) -> Option<usize> {
        self.published
    }

    pub fn reset(&mut self) {
        self.published = None;
    }
}
