use crate::models::Track;
use crate::ports::HistorySink;
use anyhow::Context;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let conn = Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        let s = Self { conn };
        s.init_schema()?;
        Ok(s)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                r#"
CREATE TABLE IF NOT EXISTS play_history (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  track_id TEXT NOT NULL,
  song_json TEXT NOT NULL,
  played_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_played_at ON play_history(played_at DESC);
CREATE INDEX IF NOT EXISTS idx_history_track_id ON play_history(track_id);
"#,
            )
            .context("init schema")?;
        Ok(())
    }

    /// Record a play. Stream URLs expire, so they are not stored.
    pub fn add_to_history(&self, track: &Track, played_at: i64) -> anyhow::Result<()> {
        let mut stored = track.clone();
        stored.url = None;
        stored.unplayable = false;
        let song_json = serde_json::to_string(&stored).context("encode history track")?;
        self.conn
            .execute(
                "INSERT INTO play_history(track_id, song_json, played_at) VALUES(?1, ?2, ?3)",
                params![stored.id, song_json, played_at],
            )
            .context("add to history")?;
        Ok(())
    }

    /// Get play history (most recent first, unique tracks only)
    pub fn get_history(&self, limit: usize) -> anyhow::Result<Vec<Track>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
SELECT h.song_json
FROM play_history h
JOIN (
  SELECT track_id, MAX(id) AS last_id
  FROM play_history
  GROUP BY track_id
) latest ON latest.last_id = h.id
ORDER BY h.played_at DESC, h.id DESC
LIMIT ?1
"#,
            )
            .context("prepare history")?;

        let tracks = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .context("query history")?
            .filter_map(|r| r.ok())
            .filter_map(|json| match serde_json::from_str::<Track>(&json) {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!("skipping unreadable history row: {e}");
                    None
                }
            })
            .collect();

        Ok(tracks)
    }
}

/// Cheap handle for async callers; each call opens its own connection on the blocking pool.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    path: PathBuf,
}

impl StorageHandle {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn history(&self, limit: usize) -> anyhow::Result<Vec<Track>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Storage::open(&path)?.get_history(limit))
            .await
            .context("history task panicked")?
    }
}

impl HistorySink for StorageHandle {
    async fn persist(&self, track: Track) -> anyhow::Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            Storage::open(&path)?.add_to_history(&track, now)
        })
        .await
        .context("history task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        let mut t = Track::new("netease", id, &format!("Song {id}"), "Artist");
        t.url = Some(format!("https://stream/{id}.mp3"));
        t.lyric = Some("[00:01]hello".into());
        t
    }

    #[test]
    fn history_is_unique_and_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("db").join("cadence.sqlite3")).unwrap();

        storage.add_to_history(&track("1"), 100).unwrap();
        storage.add_to_history(&track("2"), 200).unwrap();
        storage.add_to_history(&track("1"), 300).unwrap();
        storage.add_to_history(&track("3"), 300).unwrap();

        let history = storage.get_history(10).unwrap();
        let ids: Vec<&str> = history.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["netease-3", "netease-1", "netease-2"]);

        assert_eq!(storage.get_history(1).unwrap().len(), 1);
    }

    #[test]
    fn stored_tracks_drop_stream_url() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("h.sqlite3")).unwrap();
        let mut t = track("9");
        t.unplayable = true;
        storage.add_to_history(&t, 1).unwrap();

        let back = &storage.get_history(5).unwrap()[0];
        assert!(back.url.is_none());
        assert!(!back.unplayable);
        assert_eq!(back.lyric.as_deref(), Some("[00:01]hello"));
        assert_eq!(back.title, "Song 9");
    }

    #[tokio::test]
    async fn handle_persists_through_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let handle = StorageHandle::new(dir.path().join("h.sqlite3"));
        handle.persist(track("a")).await.unwrap();
        handle.persist(track("b")).await.unwrap();

        let history = handle.history(100).await.unwrap();
        assert_eq!(history.len(), 2);
    }
}
