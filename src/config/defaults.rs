use super::{ApiConfig, Config, EngineConfig, PathsConfig, PlayerConfig};
use crate::effects::Topology;
use crate::engine::mode::PlaybackMode;

pub const API_BASE_URL: &str = "https://tunehub.sayqz.com/api";
pub const PLATFORMS: [&str; 3] = ["netease", "qq", "kuwo"];

pub fn defaults() -> Config {
    Config {
        api: ApiConfig {
            base_url: API_BASE_URL.to_string(),
            api_key: None,
            quality: "320k".to_string(),
            platforms: PLATFORMS.iter().map(|p| p.to_string()).collect(),
            page_size: 20,
            timeout_secs: 15,
            cache_entries: 200,
        },
        player: PlayerConfig {
            audio_device: None,
            volume: 80,
            mode: PlaybackMode::Sequential,
            effect: Topology::Original,
        },
        engine: EngineConfig {
            history_limit: 100,
            error_throttle_ms: 2500,
            skip_delay_ms: 1200,
        },
        paths: PathsConfig::default(),
    }
}
