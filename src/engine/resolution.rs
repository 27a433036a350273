//! Turning a track into something playable.

use crate::models::{LyricPayload, SongDetail, Track};
use crate::ports::Resolver;

/// Identifies one play attempt. Results tagged with an older generation are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Lifecycle of the attempt to play the current track.
///
/// A media error is retried at most once: `Resolved` may move to `RetryingOnce`, while
/// `RetryingOnce` and `Recovered` can only give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attempt {
    #[default]
    NotStarted,
    Resolving,
    Resolved,
    Failed,
    RetryingOnce,
    Recovered,
    GaveUp,
}

impl Attempt {
    /// State after resolution finished, with or without a stream URL.
    pub fn on_resolved(self, has_url: bool) -> Self {
        match (self, has_url) {
            (Attempt::Resolving, true) => Attempt::Resolved,
            (Attempt::Resolving, false) => Attempt::Failed,
            (Attempt::RetryingOnce, true) => Attempt::Recovered,
            (Attempt::RetryingOnce, false) => Attempt::GaveUp,
            (other, _) => other,
        }
    }

    /// State after the media backend reported an error for this attempt.
    pub fn on_media_error(self) -> Self {
        match self {
            Attempt::Resolved => Attempt::RetryingOnce,
            Attempt::RetryingOnce | Attempt::Recovered => Attempt::GaveUp,
            other => other,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Attempt::Failed | Attempt::GaveUp)
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Attempt::Resolving | Attempt::RetryingOnce)
    }
}

/// What a track needs before it can be handed to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Need {
    /// Imported track without URL: find it on its platform first.
    Search,
    /// Missing URL or lyric text.
    Detail,
    Ready,
}

pub fn need(track: &Track) -> Need {
    if track.imported && !track.has_url() {
        return Need::Search;
    }
    let lyric_pending = matches!(
        track.lyric_payload(),
        LyricPayload::Missing | LyricPayload::Url(_)
    );
    if !track.has_url() || lyric_pending {
        Need::Detail
    } else {
        Need::Ready
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Detail(SongDetail),
    /// An exact search hit; `song_id` is the platform id the detail belongs to.
    Matched { song_id: String, detail: SongDetail },
    NoMatch,
}

/// Results fetched per search when looking for an imported track.
pub const MATCH_PAGE_SIZE: u32 = 10;

/// Run the search/detail pipeline for a snapshot of the track. Resolver failures count as "no result".
pub async fn resolve_track<R: Resolver>(resolver: &R, track: &Track, fresh: bool) -> Resolution {
    if need(track) == Need::Search {
        return search_and_resolve(resolver, track, fresh).await;
    }
    Resolution::Detail(detail_or_default(resolver, track, fresh).await)
}

async fn search_and_resolve<R: Resolver>(resolver: &R, track: &Track, fresh: bool) -> Resolution {
    let query = format!("{} {}", track.title, track.artist);
    let results = match resolver
        .search(&query, &track.platform, 1, MATCH_PAGE_SIZE)
        .await
    {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(track = %track.id, "search for imported track failed: {e:#}");
            Vec::new()
        }
    };

    let Some(found) = results.into_iter().find(|t| is_exact_match(track, t)) else {
        tracing::info!(track = %track.id, %query, "no exact match for imported track");
        return Resolution::NoMatch;
    };

    let detail = detail_or_default(resolver, &found, fresh).await;
    Resolution::Matched {
        song_id: found.song_id,
        detail,
    }
}

async fn detail_or_default<R: Resolver>(resolver: &R, track: &Track, fresh: bool) -> SongDetail {
    match resolver.resolve(track, fresh).await {
        Ok(detail) => detail,
        Err(e) => {
            tracing::warn!(track = %track.id, "resolve failed: {e:#}");
            SongDetail::default()
        }
    }
}

fn is_exact_match(wanted: &Track, candidate: &Track) -> bool {
    let eq = |a: &str, b: &str| a.trim().to_lowercase() == b.trim().to_lowercase();
    eq(&wanted.title, &candidate.title) && eq(&wanted.artist, &candidate.artist)
}
