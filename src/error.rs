use thiserror::Error;

/// Failures the engine reports to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayError {
    /// No stream URL after search and detail lookup.
    #[error("could not resolve a stream for \"{title}\"")]
    Resolution { track_id: String, title: String },

    /// The output failed on this track, after the one retry.
    #[error("playback failed for \"{title}\": {reason}")]
    Playback {
        track_id: String,
        title: String,
        reason: String,
    },

    /// Every entry in the queue is marked unplayable.
    #[error("nothing in the queue is playable")]
    NothingPlayable,

    /// The effect topology could not be installed; playback fell back to the original path.
    #[error("{requested} effect unavailable, using Original: {reason}")]
    EffectDowngrade { requested: String, reason: String },
}
