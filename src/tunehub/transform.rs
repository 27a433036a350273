//! Platform search responses come back in whatever shape the platform uses.
//! These helpers pull a track list out of them without a schema.

use crate::models::Track;
use serde_json::Value;

const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Find the result list (`data.list`, `list`, `results`, or a bare array) and map each item.
/// Items without a usable id are dropped.
pub fn tracks_from_search(v: &Value, platform: &str) -> Vec<Track> {
    let list = v
        .pointer("/data/list")
        .and_then(Value::as_array)
        .or_else(|| v.get("list").and_then(Value::as_array))
        .or_else(|| v.get("results").and_then(Value::as_array))
        .or_else(|| v.as_array());

    list.map(|items| {
        items
            .iter()
            .filter_map(|item| track_from_item(item, platform))
            .collect()
    })
    .unwrap_or_default()
}

fn track_from_item(item: &Value, platform: &str) -> Option<Track> {
    let song_id = ["id", "songid", "mid"]
        .iter()
        .find_map(|k| item.get(*k).and_then(scalar_string))?;

    let title = first_text(item, &["name", "title"]).unwrap_or_else(|| UNKNOWN_TITLE.into());
    let artist = first_text(item, &["artist", "author"]).unwrap_or_else(|| UNKNOWN_ARTIST.into());

    let mut track = Track::new(platform, &song_id, &title, &artist);
    track.album = first_text(item, &["album"]).unwrap_or_else(|| "-".into());
    track.cover = first_text(item, &["pic", "cover"]).unwrap_or_default();
    track.duration_secs = item.get("interval").and_then(duration_secs).unwrap_or(0);
    Some(track)
}

/// Non-empty string or number, as text.
fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() && s != "undefined" => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First key holding text. Arrays (several artists) are joined; objects contribute their `name`.
fn first_text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        let v = item.get(*k)?;
        let text = match v {
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    Value::Object(_) => p.get("name").and_then(scalar_string),
                    _ => scalar_string(p),
                })
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(_) => v.get("name").and_then(scalar_string)?,
            _ => scalar_string(v)?,
        };
        (!text.is_empty()).then_some(text)
    })
}

/// Seconds as a number, a numeric string, or "m:ss".
fn duration_secs(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_f64().map(|s| s.max(0.0) as u32),
        Value::String(s) => {
            let s = s.trim();
            if let Some((m, sec)) = s.split_once(':') {
                Some(m.parse::<u32>().ok()? * 60 + sec.parse::<u32>().ok()?)
            } else {
                s.parse::<f64>().ok().map(|x| x.max(0.0) as u32)
            }
        }
        _ => None,
    }
}

/// `"128"` and `"320"` are old spellings of `"128k"` / `"320k"`.
pub fn normalize_quality(q: &str) -> String {
    match q.trim() {
        "128" => "128k".into(),
        "320" => "320k".into(),
        "" => "320k".into(),
        other => other.to_string(),
    }
}

/// Substitute the `{{keyword}}` / `{{page}}` / `{{pageSize}}` placeholders of a method config value.
pub fn fill_template(value: &Value, keyword: &str, page: u32, page_size: u32) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.replace("{{keyword}}", keyword)
        .replace("{{page}}", &page.to_string())
        .replace("{{pageSize}}", &page_size.to_string())
}
