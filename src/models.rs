use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Everything learned about one song during a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    /// Platform-qualified id, e.g. `netease-186016`.
    pub id: String,
    /// Id on the source platform, used when asking the resolver for details.
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub cover: String,
    /// Source platform tag (`netease`, `qq`, `kuwo`, ...).
    pub platform: String,
    /// Seconds; 0 when unknown.
    pub duration_secs: u32,
    pub url: Option<String>,
    /// Raw LRC text, or a URL pointing at it.
    pub lyric: Option<String>,
    pub unplayable: bool,
    /// Imported from elsewhere; has no direct resolver path and must be found by search first.
    pub imported: bool,
}

/// What the resolver learned about a track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongDetail {
    pub url: Option<String>,
    pub cover: Option<String>,
    pub lyric: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyricPayload<'a> {
    Missing,
    Url(&'a str),
    Text(&'a str),
}

impl<'a> LyricPayload<'a> {
    pub fn of(lyric: Option<&'a str>) -> Self {
        match lyric.map(str::trim) {
            None | Some("") => LyricPayload::Missing,
            Some(l) if is_remote(l) => LyricPayload::Url(l),
            Some(l) => LyricPayload::Text(l),
        }
    }
}

impl Track {
    pub fn new(platform: &str, song_id: &str, title: &str, artist: &str) -> Self {
        Self {
            id: format!("{platform}-{song_id}"),
            song_id: song_id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            platform: platform.to_string(),
            ..Self::default()
        }
    }

    pub fn has_url(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn lyric_payload(&self) -> LyricPayload<'_> {
        LyricPayload::of(self.lyric.as_deref())
    }

    /// Merge resolver output. Non-empty values win; empty ones never erase what is known.
    pub fn merge_detail(&mut self, detail: SongDetail) {
        if let Some(url) = non_empty(detail.url) {
            self.url = Some(url);
            self.unplayable = false;
        }
        if let Some(cover) = non_empty(detail.cover) {
            self.cover = cover;
        }
        if let Some(lyric) = non_empty(detail.lyric) {
            self.lyric = Some(lyric);
        }
    }

    /// Point the track at the platform song a search matched. The session id stays.
    pub fn rebind(&mut self, song_id: &str) {
        self.song_id = song_id.to_string();
        self.imported = false;
    }

    pub fn clear_url(&mut self) {
        self.url = None;
    }

    pub fn mark_unplayable(&mut self) {
        self.unplayable = true;
    }

    pub fn display_name(&self) -> String {
        if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.artist)
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

pub fn is_remote(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Shared handle to a [`Track`]. Every list holding a clone sees what resolution fills in.
#[derive(Debug, Clone, Default)]
pub struct TrackRef(Arc<RwLock<Track>>);

impl TrackRef {
    pub fn new(track: Track) -> Self {
        Self(Arc::new(RwLock::new(track)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Track> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Track> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.read().id.clone()
    }

    pub fn snapshot(&self) -> Track {
        self.read().clone()
    }

    pub fn same_track(&self, other: &TrackRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.read().id == other.read().id
    }
}

impl From<Track> for TrackRef {
    fn from(track: Track) -> Self {
        Self::new(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(url: &str, cover: &str, lyric: &str) -> SongDetail {
        let f = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };
        SongDetail {
            url: f(url),
            cover: f(cover),
            lyric: f(lyric),
        }
    }

    #[test]
    fn merge_keeps_known_cover_when_result_is_empty() {
        let mut t = Track::new("qq", "1", "Song", "Artist");
        t.cover = "https://img/1.jpg".into();
        t.merge_detail(SongDetail {
            url: Some("https://a/1.mp3".into()),
            cover: Some(String::new()),
            lyric: None,
        });
        assert_eq!(t.cover, "https://img/1.jpg");
        assert_eq!(t.url.as_deref(), Some("https://a/1.mp3"));
    }

    #[test]
    fn merge_prefers_fresh_values() {
        let mut t = Track::new("qq", "1", "Song", "Artist");
        t.url = Some("https://old".into());
        t.lyric = Some("[00:01]old".into());
        t.merge_detail(detail("https://new", "https://cover", "[00:01]new"));
        assert_eq!(t.url.as_deref(), Some("https://new"));
        assert_eq!(t.cover, "https://cover");
        assert_eq!(t.lyric.as_deref(), Some("[00:01]new"));
    }

    #[test]
    fn merged_url_clears_unplayable() {
        let mut t = Track::new("kuwo", "9", "x", "y");
        t.mark_unplayable();
        t.merge_detail(detail("https://u", "", ""));
        assert!(!t.unplayable);
    }

    #[test]
    fn lyric_payload_kinds() {
        let mut t = Track::new("netease", "1", "a", "b");
        assert_eq!(t.lyric_payload(), LyricPayload::Missing);
        t.lyric = Some("  ".into());
        assert_eq!(t.lyric_payload(), LyricPayload::Missing);
        t.lyric = Some("https://lrc/1".into());
        assert_eq!(t.lyric_payload(), LyricPayload::Url("https://lrc/1"));
        t.lyric = Some("[00:01]hi".into());
        assert_eq!(t.lyric_payload(), LyricPayload::Text("[00:01]hi"));
    }

    #[test]
    fn shared_handle_sees_mutation() {
        let a = TrackRef::new(Track::new("qq", "5", "t", "a"));
        let b = a.clone();
        a.write().url = Some("https://s".into());
        assert!(b.read().has_url());
        assert!(a.same_track(&b));
    }
}
