use crate::effects::Topology;
use crate::engine::mode::PlaybackMode;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod defaults;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub player: PlayerConfig,
    pub engine: EngineConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Sent as `X-API-Key`.
    pub api_key: Option<String>,
    /// Preferred stream quality, e.g. "128k" or "320k".
    pub quality: String,
    /// Platforms searched by aggregate search, in order.
    pub platforms: Vec<String>,
    pub page_size: u32,
    pub timeout_secs: u64,
    /// Entries kept in each of the search and detail caches.
    pub cache_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// mpv audio device name (see `mpv --audio-device=help`)
    pub audio_device: Option<String>,
    /// Volume level (0-100)
    pub volume: u8,
    pub mode: PlaybackMode,
    pub effect: Topology,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history_limit: usize,
    /// Error notices closer together than this are dropped.
    pub error_throttle_ms: u64,
    /// Pause before skipping past an unplayable track.
    pub skip_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        defaults::defaults()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        defaults::defaults().api
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        defaults::defaults().player
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        defaults::defaults().engine
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let proj = ProjectDirs::from("dev", "cadence", "cadence");
        let data_dir = proj
            .as_ref()
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("cadence"));
        Self { data_dir }
    }
}

impl EngineConfig {
    pub fn error_throttle(&self) -> Duration {
        Duration::from_millis(self.error_throttle_ms)
    }

    pub fn skip_delay(&self) -> Duration {
        Duration::from_millis(self.skip_delay_ms)
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn save(cfg: &Config, override_path: Option<&Path>) -> anyhow::Result<()> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    write_config(cfg, &path)
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj =
        ProjectDirs::from("dev", "cadence", "cadence").context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        let cfg = defaults::defaults();
        write_config(&cfg, &path)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

fn write_config(cfg: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let raw = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.engine.history_limit, 100);
        assert_eq!(cfg.engine.error_throttle(), Duration::from_millis(2500));
        assert_eq!(cfg.api.platforms, vec!["netease", "qq", "kuwo"]);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[player]\nmode = \"shuffle\"\neffect = \"speaker\"\n\n[engine]\nskip_delay_ms = 0\n",
        )
        .unwrap();
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.player.mode, PlaybackMode::Shuffle);
        assert_eq!(cfg.player.effect, Topology::Speaker);
        assert_eq!(cfg.player.volume, 80);
        assert_eq!(cfg.engine.skip_delay(), Duration::ZERO);
        assert_eq!(cfg.engine.history_limit, 100);
    }

    #[test]
    fn save_then_load_keeps_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.player.volume = 35;
        cfg.api.api_key = Some("th_test".into());
        save(&cfg, Some(&path)).unwrap();
        let back = load(Some(&path)).unwrap();
        assert_eq!(back.player.volume, 35);
        assert_eq!(back.api.api_key.as_deref(), Some("th_test"));
    }
}
