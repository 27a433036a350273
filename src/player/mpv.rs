use crate::effects::{EffectGraph, ImpulseResponse, Node};
use crate::events::{Event, PlayerEvent};
use crate::ports::MediaOutput;
use anyhow::{Context, anyhow};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::UnixStream,
    process::{Child, Command},
    sync::{mpsc, oneshot},
};

/// Sample rate mpv is told to output; the impulse response is generated to match.
const OUTPUT_SAMPLE_RATE: u32 = 48_000;
const REPLY_TIMEOUT: Duration = Duration::from_secs(3);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<(), String>>>>>;

/// A headless mpv process driven over its JSON IPC socket.
#[derive(Debug)]
pub struct MpvHandle {
    child: Child,
    socket_path: PathBuf,
    writer: tokio::sync::Mutex<tokio::io::WriteHalf<UnixStream>>,
    request_id: AtomicU64,
    pending: Pending,
    /// Where generated impulse responses are written.
    effects_dir: PathBuf,
}

impl MpvHandle {
    pub async fn spawn(
        event_tx: mpsc::Sender<Event>,
        audio_device: Option<&str>,
        log_file: Option<&Path>,
        effects_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let socket_path =
            std::env::temp_dir().join(format!("cadence-mpv-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&socket_path);

        let mut cmd = Command::new("mpv");
        cmd.args([
            "--no-video",
            "--idle=yes",
            "--input-terminal=no",
            "--really-quiet",
            "--audio-channels=stereo",
            "--audio-samplerate=48000",
        ]);
        if let Some(dev) = audio_device {
            cmd.arg(format!("--audio-device={dev}"));
        }
        if let Some(p) = log_file {
            cmd.arg(format!("--log-file={}", p.display()));
        }
        let child = cmd
            .arg(format!("--input-ipc-server={}", socket_path.display()))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .context("spawn mpv")?;

        let stream = connect_with_retry(&socket_path).await?;
        let (reader, writer) = tokio::io::split(stream);

        let pending: Pending = Arc::default();
        tokio::spawn(read_events_loop(reader, event_tx, Arc::clone(&pending)));

        let this = Self {
            child,
            socket_path,
            writer: tokio::sync::Mutex::new(writer),
            request_id: AtomicU64::new(1),
            pending,
            effects_dir,
        };

        this.command(json!(["request_log_messages", "warn"])).await?;
        this.command(json!(["observe_property", 1, "time-pos"])).await?;
        this.command(json!(["observe_property", 2, "duration"])).await?;
        this.command(json!(["observe_property", 3, "pause"])).await?;

        tracing::info!(socket = %this.socket_path.display(), "mpv ready");
        Ok(this)
    }

    /// Send one IPC command and wait for mpv's reply to it.
    async fn command(&self, args: serde_json::Value) -> anyhow::Result<()> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let v = json!({ "command": args.clone(), "request_id": id });
        let sent = async {
            let mut w = self.writer.lock().await;
            let mut line = serde_json::to_vec(&v).context("encode mpv json")?;
            line.push(b'\n');
            w.write_all(&line).await.context("write mpv ipc")?;
            w.flush().await.context("flush mpv ipc")?;
            anyhow::Ok(())
        }
        .await;
        if let Err(e) = sent {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(anyhow!("mpv rejected {args}: {err}")),
            Ok(Err(_)) => Err(anyhow!("mpv ipc closed")),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(anyhow!("mpv did not answer {args}"))
            }
        }
    }

    async fn set_property(&self, name: &str, value: serde_json::Value) -> anyhow::Result<()> {
        self.command(json!(["set_property", name, value])).await
    }

    /// Write the reverb impulse response for `decay_secs` once and return its path.
    async fn impulse_file(&self, decay_secs: f32) -> anyhow::Result<PathBuf> {
        let path = self
            .effects_dir
            .join(format!("impulse-{}ms.wav", (decay_secs * 1000.0).round() as u32));
        if path.exists() {
            return Ok(path);
        }
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            ImpulseResponse::synthesize(OUTPUT_SAMPLE_RATE, decay_secs, &mut rand::rng())
                .write_wav(&target)
        })
        .await
        .context("impulse task panicked")??;
        tracing::debug!(path = %path.display(), "wrote impulse response");
        Ok(path)
    }
}

impl MediaOutput for MpvHandle {
    async fn load(&self, url: &str) -> anyhow::Result<()> {
        self.command(json!(["loadfile", url, "replace"])).await?;
        self.set_property("pause", json!(false)).await
    }

    async fn play(&self) -> anyhow::Result<()> {
        self.set_property("pause", json!(false)).await
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.set_property("pause", json!(true)).await
    }

    async fn seek(&self, seconds: f64) -> anyhow::Result<()> {
        self.command(json!(["seek", seconds, "absolute"])).await
    }

    async fn set_volume(&self, volume_0_100: u8) -> anyhow::Result<()> {
        self.set_property("volume", json!(volume_0_100)).await
    }

    async fn apply_effects(&self, graph: &EffectGraph) -> anyhow::Result<()> {
        if !graph.is_complete() {
            return Err(anyhow!("{} graph is not connected", graph.topology().label()));
        }
        let impulse = match graph.reverb() {
            Some((decay, _)) => Some(self.impulse_file(decay).await?),
            None => None,
        };
        let af = render_filter_chain(graph, impulse.as_deref());
        tracing::debug!(%af, "installing audio filters");
        self.set_property("af", json!(af)).await
    }
}

impl Drop for MpvHandle {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// mpv `af` value for `graph`. Empty string means no filters.
pub fn render_filter_chain(graph: &EffectGraph, impulse: Option<&Path>) -> String {
    let shelves: Vec<String> = graph
        .shelves()
        .filter_map(|n| match n {
            Node::LowShelf {
                frequency_hz,
                gain_db,
            } => Some(format!("lowshelf=f={frequency_hz}:g={gain_db}")),
            Node::HighShelf {
                frequency_hz,
                gain_db,
            } => Some(format!("highshelf=f={frequency_hz}:g={gain_db}")),
            _ => None,
        })
        .collect();
    if shelves.is_empty() {
        return String::new();
    }
    let dry = shelves.join(",");

    match (graph.reverb(), impulse) {
        (Some((_, mix)), Some(ir)) => {
            let ir = ir.display().to_string().replace('\'', "");
            format!(
                "lavfi=[{dry},asplit=2[dry][wet];amovie='{ir}'[ir];[wet][ir]afir[rev];\
                 [rev]volume={mix}[mix];[dry][mix]amix=inputs=2:normalize=0]"
            )
        }
        _ => format!("lavfi=[{dry}]"),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn connect_with_retry(path: &Path) -> anyhow::Result<UnixStream> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match UnixStream::connect(path).await {
            Ok(s) => return Ok(s),
            Err(e) => {
                if tokio::time::Instant::now() > deadline {
                    return Err(e)
                        .with_context(|| format!("connect to mpv ipc {}", path.display()));
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

async fn read_events_loop(
    reader: tokio::io::ReadHalf<UnixStream>,
    event_tx: mpsc::Sender<Event>,
    pending: Pending,
) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(v) = serde_json::from_str::<serde_json::Value>(&line) else {
            continue;
        };
        // command replies: {"request_id": n, "error": "success" | "..."}
        if let Some(id) = v.get("request_id").and_then(|x| x.as_u64())
            && let Some(err) = v.get("error").and_then(|x| x.as_str())
        {
            let reply = if err == "success" {
                Ok(())
            } else {
                Err(err.to_string())
            };
            if let Some(tx) = lock(&pending).remove(&id) {
                let _ = tx.send(reply);
            }
            continue;
        }
        if let Some(pe) = map_mpv_event(&v) {
            let _ = event_tx.send(Event::Player(pe)).await;
        }
    }
    tracing::debug!("mpv ipc stream ended");
    lock(&pending).clear();
}

fn map_mpv_event(v: &serde_json::Value) -> Option<PlayerEvent> {
    match v.get("event")?.as_str()? {
        "property-change" => {
            let name = v.get("name")?.as_str()?;
            let data = v.get("data")?;
            match name {
                "time-pos" => Some(PlayerEvent::Position {
                    seconds: data.as_f64()?,
                }),
                "duration" => Some(PlayerEvent::Duration {
                    seconds: data.as_f64()?,
                }),
                "pause" => Some(if data.as_bool()? {
                    PlayerEvent::Paused
                } else {
                    PlayerEvent::Started
                }),
                _ => None,
            }
        }
        "end-file" => match v.get("reason").and_then(|x| x.as_str()).unwrap_or("") {
            "eof" => Some(PlayerEvent::Ended),
            "error" => {
                let err = v.get("file_error").or_else(|| v.get("error"));
                let err = err.and_then(|x| x.as_str()).unwrap_or("unknown");
                Some(PlayerEvent::Error(format!("mpv end-file error: {err}")))
            }
            // stop / quit / redirect: replaced or shut down on purpose
            _ => None,
        },
        "log-message" => {
            let level = v.get("level")?.as_str().unwrap_or("info");
            let text = v.get("text")?.as_str().unwrap_or("").trim();
            if text.is_empty() {
                None
            } else {
                Some(PlayerEvent::Warning(format!("mpv {level}: {text}")))
            }
        }
        _ => None,
    }
}
