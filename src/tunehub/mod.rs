//! TuneHub client
//!
//! Detail lookups go through `POST /v1/parse`. Search is two-step: TuneHub hands out a
//! request template for the platform (`GET /v1/methods/{platform}/search`), which is then
//! filled in and sent to the platform directly.

pub mod transform;

use crate::config::ApiConfig;
use crate::models::{SongDetail, Track};
use crate::ports::Resolver;
use anyhow::{Context, bail};
use lru::LruCache;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Results per platform in an aggregate search.
const AGGREGATE_PAGE_SIZE: u32 = 10;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ParsedSong {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    pic: Option<String>,
    #[serde(default)]
    lrc: Option<String>,
}

/// Request template for one platform's search endpoint.
#[derive(Debug, Deserialize)]
struct MethodConfig {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: serde_json::Map<String, Value>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base_url: String,
    quality: String,
    platforms: Vec<String>,
    searches: Mutex<LruCache<String, Vec<Track>>>,
    details: Mutex<LruCache<String, SongDetail>>,
}

#[derive(Debug, Clone)]
pub struct TuneHubClient {
    inner: Arc<Inner>,
}

impl TuneHubClient {
    pub fn new(cfg: &ApiConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("cadence/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(key) = cfg.api_key.as_deref().filter(|k| !k.is_empty()) {
            headers.insert("x-api-key", HeaderValue::from_str(key).context("api key header")?);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(cfg.timeout())
            .build()
            .context("build reqwest client")?;

        let cap = NonZeroUsize::new(cfg.cache_entries).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: cfg.base_url.trim_end_matches('/').to_string(),
                quality: transform::normalize_quality(&cfg.quality),
                platforms: cfg.platforms.clone(),
                searches: Mutex::new(LruCache::new(cap)),
                details: Mutex::new(LruCache::new(cap)),
            }),
        })
    }

    pub fn platforms(&self) -> &[String] {
        &self.inner.platforms
    }

    /// Search one platform. Cached per (platform, keyword, page, page size).
    pub async fn search_platform(
        &self,
        keyword: &str,
        platform: &str,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<Vec<Track>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }
        let key = format!("{platform}:{keyword}:{page}:{page_size}");
        if let Some(hit) = self.inner.searches.lock().await.get(&key) {
            return Ok(hit.clone());
        }

        let config = self.method_config(platform, "search").await?;
        let raw = self
            .send_templated(&config, keyword, page, page_size)
            .await
            .with_context(|| format!("{platform} search"))?;
        let tracks = transform::tracks_from_search(&raw, platform);
        tracing::debug!(%platform, %keyword, results = tracks.len(), "search done");

        self.inner.searches.lock().await.put(key, tracks.clone());
        Ok(tracks)
    }

    /// First page of every configured platform, concatenated in platform order.
    /// A platform that fails contributes nothing.
    pub async fn aggregate_search(&self, keyword: &str) -> Vec<Track> {
        let mut set = JoinSet::new();
        for (i, platform) in self.inner.platforms.iter().enumerate() {
            let this = self.clone();
            let platform = platform.clone();
            let keyword = keyword.to_string();
            set.spawn(async move {
                let found = this
                    .search_platform(&keyword, &platform, 1, AGGREGATE_PAGE_SIZE)
                    .await;
                (i, platform, found)
            });
        }

        let mut per_platform = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((i, _, Ok(tracks))) => per_platform.push((i, tracks)),
                Ok((_, platform, Err(e))) => {
                    tracing::warn!(%platform, "search failed: {e:#}");
                }
                Err(e) => tracing::warn!("search task failed: {e}"),
            }
        }
        per_platform.sort_by_key(|(i, _)| *i);
        per_platform.into_iter().flat_map(|(_, t)| t).collect()
    }

    pub async fn song_detail(&self, track: &Track, fresh: bool) -> anyhow::Result<SongDetail> {
        let song_id = if track.song_id.is_empty() {
            track
                .id
                .split_once('-')
                .map(|(_, id)| id.to_string())
                .unwrap_or_default()
        } else {
            track.song_id.clone()
        };
        if song_id.is_empty() {
            bail!("track {} has no platform id", track.id);
        }

        let key = format!("{}-{song_id}", track.platform);
        if !fresh && let Some(hit) = self.inner.details.lock().await.get(&key) {
            return Ok(hit.clone());
        }

        let body = json!({
            "platform": track.platform,
            "ids": song_id,
            "quality": self.inner.quality,
        });
        let env: Envelope<Vec<ParsedSong>> = self
            .inner
            .http
            .post(format!("{}/v1/parse", self.inner.base_url))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .context("send parse request")?
            .error_for_status()
            .context("parse http status")?
            .json()
            .await
            .context("decode parse json")?;

        if env.code != 0 {
            bail!(
                "parse rejected ({}): {}",
                env.code,
                env.message.unwrap_or_default()
            );
        }
        let Some(song) = env.data.and_then(|d| d.into_iter().next()) else {
            return Ok(SongDetail::default());
        };

        let detail = SongDetail {
            url: song.url,
            cover: song.pic,
            lyric: song.lrc,
        };
        self.inner.details.lock().await.put(key, detail.clone());
        Ok(detail)
    }

    /// Plain text behind a lyric URL. HTML error pages and failures come back empty.
    pub async fn lyric_text(&self, url: &str) -> String {
        let res = async {
            self.inner
                .http
                .get(url)
                .send()
                .await
                .context("send lyric request")?
                .error_for_status()
                .context("lyric http status")?
                .text()
                .await
                .context("read lyric body")
        }
        .await;

        match res {
            Ok(text) if text.trim_start().starts_with('<') => {
                tracing::info!(%url, "lyric url returned html");
                String::new()
            }
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(%url, "lyric fetch failed: {e:#}");
                String::new()
            }
        }
    }

    async fn method_config(&self, platform: &str, method: &str) -> anyhow::Result<MethodConfig> {
        let env: Envelope<MethodConfig> = self
            .inner
            .http
            .get(format!(
                "{}/v1/methods/{}/{}",
                self.inner.base_url,
                urlencoding::encode(platform),
                method
            ))
            .send()
            .await
            .context("send method request")?
            .error_for_status()
            .context("method http status")?
            .json()
            .await
            .context("decode method json")?;

        if env.code != 0 {
            bail!(
                "no {method} method for {platform}: {}",
                env.message.unwrap_or_default()
            );
        }
        env.data
            .with_context(|| format!("empty {method} method for {platform}"))
    }

    async fn send_templated(
        &self,
        config: &MethodConfig,
        keyword: &str,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<Value> {
        let query = config
            .params
            .iter()
            .map(|(k, v)| {
                let v = transform::fill_template(v, keyword, page, page_size);
                format!("{}={}", urlencoding::encode(k), urlencoding::encode(&v))
            })
            .collect::<Vec<_>>()
            .join("&");
        let sep = if config.url.contains('?') { '&' } else { '?' };
        let url = if query.is_empty() {
            config.url.clone()
        } else {
            format!("{}{sep}{query}", config.url)
        };

        let method = config.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .with_context(|| format!("bad http method {method}"))?;

        let mut req = self.inner.http.request(method, &url);
        for (k, v) in &config.headers {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) else {
                tracing::debug!(header = %k, "skipping unusable header");
                continue;
            };
            req = req.header(name, value);
        }

        // Some platforms answer JSON with a text/plain content type.
        let body = req
            .send()
            .await
            .context("send platform request")?
            .error_for_status()
            .context("platform http status")?
            .text()
            .await
            .context("read platform body")?;
        serde_json::from_str(&body).context("decode platform json")
    }
}

impl Resolver for TuneHubClient {
    async fn resolve(&self, track: &Track, fresh: bool) -> anyhow::Result<SongDetail> {
        self.song_detail(track, fresh).await
    }

    async fn search(
        &self,
        query: &str,
        platform: &str,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<Vec<Track>> {
        self.search_platform(query, platform, page, page_size).await
    }

    async fn fetch_lyric_text(&self, url: &str) -> String {
        self.lyric_text(url).await
    }
}
