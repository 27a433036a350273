//! Line-oriented control for the headless player.

use crate::effects::Topology;
use crate::events::{Command, Event, Notice};
use crate::lyrics::LyricTrack;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub const HELP: &str = "\
n            next
p            previous
t | <space>  play / pause
s <secs>     seek
l <line>     jump to lyric line
m            cycle mode
fx <name>    effect: original | headphone | speaker
v <0-100>    volume
mute         toggle mute
q            quit";

/// Forward parsed stdin lines to the engine until stdin closes or the engine goes away.
pub fn spawn_stdin_task(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some(cmd) = parse_command(&line) else {
                if !line.trim().is_empty() {
                    eprintln!("unknown command: {}\n{HELP}", line.trim());
                }
                continue;
            };
            let quit = matches!(cmd, Command::Quit);
            if tx.send(Event::Command(cmd)).await.is_err() || quit {
                break;
            }
        }
        let _ = tx.send(Event::Command(Command::Quit)).await;
    });
}

pub fn parse_command(line: &str) -> Option<Command> {
    // a lone space toggles playback
    if line == " " {
        return Some(Command::TogglePlayPause);
    }
    let mut parts = line.split_whitespace();
    let head = parts.next()?;
    let arg = parts.next();

    match (head, arg) {
        ("n", None) => Some(Command::Next),
        ("p", None) => Some(Command::Previous),
        ("t", None) => Some(Command::TogglePlayPause),
        ("m", None) => Some(Command::CycleMode),
        ("mute", None) => Some(Command::ToggleMute),
        ("q", None) => Some(Command::Quit),
        ("s", Some(secs)) => secs.parse::<f64>().ok().map(Command::Seek),
        ("l", Some(n)) => n.parse::<usize>().ok().map(Command::SeekToLine),
        ("v", Some(v)) => v.parse::<u8>().ok().map(|v| Command::SetVolume(v.min(100))),
        ("fx", Some(name)) => Topology::from_name(name).map(Command::SetEffect),
        _ => None,
    }
}

/// Prints engine notices to stdout. Keeps the loaded lyrics so line changes can be shown as text.
#[derive(Debug, Default)]
pub struct NoticePrinter {
    lyrics: Arc<LyricTrack>,
}

impl NoticePrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the notice is not worth a line of output.
    pub fn render(&mut self, notice: &Notice) -> Option<String> {
        match notice {
            Notice::TrackChanged(t) => Some(format!("▶ {} [{}]", t.display_name(), t.platform)),
            Notice::PlayState(playing) => Some(if *playing { "playing" } else { "paused" }.into()),
            Notice::LyricsLoaded(lyrics) => {
                self.lyrics = Arc::clone(lyrics);
                None
            }
            Notice::LyricLine(Some(i)) => self
                .lyrics
                .line(*i)
                .filter(|l| !l.text.is_empty())
                .map(|l| format!("  ♪ {}", l.text)),
            Notice::LyricLine(None) | Notice::Progress { .. } => None,
            Notice::ModeChanged(mode) => Some(mode.label().to_string()),
            Notice::EffectChanged(t) => Some(format!("effect: {}", t.label())),
            Notice::VolumeChanged(v) => Some(format!("volume: {v}")),
            Notice::Failure(e) => Some(format!("! {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Track;

    #[test]
    fn parses_line_commands() {
        assert!(matches!(parse_command("n"), Some(Command::Next)));
        assert!(matches!(parse_command(" p "), Some(Command::Previous)));
        assert!(matches!(parse_command(" "), Some(Command::TogglePlayPause)));
        assert!(matches!(parse_command("s 42.5"), Some(Command::Seek(s)) if s == 42.5));
        assert!(matches!(parse_command("l 3"), Some(Command::SeekToLine(3))));
        assert!(matches!(parse_command("v 250"), Some(Command::SetVolume(100))));
        assert!(matches!(parse_command("v 40"), Some(Command::SetVolume(40))));
        assert!(parse_command("v 300").is_none());
        assert!(matches!(
            parse_command("fx Speaker"),
            Some(Command::SetEffect(Topology::Speaker))
        ));
        assert!(parse_command("fx chorus").is_none());
        assert!(parse_command("s").is_none());
        assert!(parse_command("").is_none());
        assert!(parse_command("n extra").is_none());
    }

    #[test]
    fn prints_lyric_text_for_active_line() {
        let mut printer = NoticePrinter::new();
        let lyrics = Arc::new(LyricTrack::parse("[00:01]first\n[00:02]second"));
        assert!(printer.render(&Notice::LyricsLoaded(lyrics)).is_none());
        assert_eq!(
            printer.render(&Notice::LyricLine(Some(1))).as_deref(),
            Some("  ♪ second")
        );

        let t = Track::new("qq", "1", "Song", "Band");
        assert_eq!(
            printer.render(&Notice::TrackChanged(t)).as_deref(),
            Some("▶ Song - Band [qq]")
        );
    }
}
