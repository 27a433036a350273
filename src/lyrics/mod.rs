//! Lyrics module for parsing and following synchronized lyrics
//!
//! This module provides:
//! - LRC format parser for timestamp-tagged lyrics
//! - A cursor that tracks the active line against playback position

pub mod parser;
pub mod sync;

pub use parser::{LyricLine, LyricTrack};
pub use sync::LyricCursor;
