//! LRC format parser
//!
//! Parses timestamp-tagged lyrics:
//! [mm:ss.fff] Lyrics line here
//!
//! Example:
//! [00:12.34] Hello world
//! [00:15.00][01:15.00] Repeated chorus

/// Untagged lines are only kept as a leading entry for short texts.
const UNTIMED_LINE_LIMIT: usize = 50;

/// Synthetic timestamps for lyrics without any timing are one millisecond apart.
const SYNTHETIC_STEPS_PER_SEC: f64 = 1000.0;

/// A single line of lyrics with timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct LyricLine {
    /// Seconds from start
    pub time: f64,
    pub text: String,
}

impl LyricLine {
    pub fn new(time: f64, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
        }
    }
}

/// Lyric lines sorted ascending by time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricTrack {
    lines: Vec<LyricLine>,
}

impl LyricTrack {
    /// Parse LRC formatted lyrics
    pub fn parse(content: &str) -> Self {
        if content.trim().is_empty() {
            return Self::default();
        }

        let total_lines = content.lines().count();
        let mut lines = Vec::new();
        let mut timed = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || Self::is_id_tag(line) {
                continue;
            }

            match Self::parse_timed_line(line) {
                Some((stamps, text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    timed = true;
                    lines.extend(stamps.into_iter().map(|t| LyricLine::new(t, text)));
                }
                None if lines.is_empty() && total_lines < UNTIMED_LINE_LIMIT => {
                    lines.push(LyricLine::new(0.0, line));
                }
                None => {}
            }
        }

        // Tags with no text count as nothing timed.
        if !timed {
            return Self::untimed(content);
        }

        lines.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { lines }
    }

    /// Every non-blank line, spaced by a synthetic millisecond so it still scrolls.
    fn untimed(content: &str) -> Self {
        let lines = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .enumerate()
            .map(|(i, l)| LyricLine::new(i as f64 / SYNTHETIC_STEPS_PER_SEC, l))
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Index of the last line whose time is `<= t`; `None` before the first line.
    pub fn active_index(&self, t: f64) -> Option<usize> {
        self.lines.partition_point(|l| l.time <= t).checked_sub(1)
    }

    /// ID tags like [ti:Title] or [offset:+200]
    fn is_id_tag(line: &str) -> bool {
        let Some(inner) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) else {
            return false;
        };
        match inner.split_once(':') {
            Some((tag, _)) => !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphabetic()),
            None => false,
        }
    }

    /// Parse [00:12.34]Lyrics or [00:12.34][00:15.00]Lyrics into its timestamps and text.
    fn parse_timed_line(line: &str) -> Option<(Vec<f64>, &str)> {
        let mut stamps = Vec::new();
        let mut rest = line;

        while let Some(inner) = rest.strip_prefix('[') {
            let Some(end) = inner.find(']') else {
                break;
            };
            let Some(t) = Self::parse_timestamp(&inner[..end]) else {
                break;
            };
            stamps.push(t);
            rest = &inner[end + 1..];
        }

        if stamps.is_empty() {
            None
        } else {
            Some((stamps, rest.trim()))
        }
    }

    /// Parse "mm:ss", "mm:ss.f" .. "mm:ss.ffff" into seconds.
    fn parse_timestamp(s: &str) -> Option<f64> {
        let (min, rest) = s.split_once(':')?;
        let (sec, frac) = match rest.split_once(['.', ':']) {
            Some((sec, frac)) => (sec, Some(frac)),
            None => (rest, None),
        };

        if !Self::digits(min, 3) || !Self::digits(sec, 2) {
            return None;
        }
        let millis: u32 = match frac {
            None => 0,
            Some(f) if Self::digits(f, 4) => {
                // right-pad to 3 digits, then keep 3
                let mut ms = format!("{f:0<3}");
                ms.truncate(3);
                ms.parse().ok()?
            }
            Some(_) => return None,
        };

        let min: u32 = min.parse().ok()?;
        let sec: u32 = sec.parse().ok()?;
        Some(f64::from((min * 60 + sec) * 1000 + millis) / 1000.0)
    }

    fn digits(s: &str, max: usize) -> bool {
        (1..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
    }
}
