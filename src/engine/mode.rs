use serde::{Deserialize, Serialize};

/// How `next` picks the following track.
///
/// `RepeatOne` only affects automatic end-of-track advances. A manual skip still moves on,
/// the same way `Sequential` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    Sequential,
    /// Uniform random pick per advance; the queue order is left alone.
    Shuffle,
    RepeatOne,
}

impl PlaybackMode {
    pub fn cycle(self) -> Self {
        match self {
            PlaybackMode::Sequential => PlaybackMode::Shuffle,
            PlaybackMode::Shuffle => PlaybackMode::RepeatOne,
            PlaybackMode::RepeatOne => PlaybackMode::Sequential,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlaybackMode::Sequential => "Mode: List",
            PlaybackMode::Shuffle => "Mode: Shuffle",
            PlaybackMode::RepeatOne => "Mode: Repeat One",
        }
    }
}
