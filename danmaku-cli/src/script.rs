//! JSON-lines replay scripts.
//!
//! Each non-empty line is one event:
//!
//! ```text
//! {"type":"comment","id":"1","play_time_ms":1200,"text":"hello","location":"top","color":16711680}
//! {"type":"comment","id":"2","play_time_ms":1500,"text":"mine","is_self":true}
//! {"type":"seek","at_ms":8000,"to_ms":2000}
//! {"type":"pause","at_ms":9000}
//! {"type":"play","at_ms":10000}
//! {"type":"rate","at_ms":12000,"rate":2.0}
//! ```
//!
//! Comments are keyed by playback time and handed to the engine when the
//! playback position reaches them. Controls are keyed by simulated wall time
//! since the start of the run.

use danmaku::{Danmaku, DanmakuItem, DanmakuLocation, DEFAULT_COLOR};
use serde::Deserialize;
use std::io::BufRead;
use std::time::Duration;
use tracing::debug;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ScriptLine {
    Comment {
        id: String,
        #[serde(default)]
        provider_id: Option<String>,
        play_time_ms: u64,
        #[serde(default)]
        sender_id: String,
        #[serde(default)]
        location: DanmakuLocation,
        text: String,
        #[serde(default = "default_color")]
        color: u32,
        #[serde(default)]
        is_self: bool,
    },
    Seek {
        at_ms: u64,
        to_ms: u64,
    },
    Pause {
        at_ms: u64,
    },
    Play {
        at_ms: u64,
    },
    Rate {
        at_ms: u64,
        rate: f64,
    },
}

fn default_color() -> u32 {
    DEFAULT_COLOR
}

/// A playback control applied at a simulated wall time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    Seek(Duration),
    Pause,
    Play,
    Rate(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedControl {
    pub at: Duration,
    pub control: Control,
}

/// A parsed script.
#[derive(Debug, Default)]
pub struct Script {
    /// Comments sorted by play time, ties in file order
    comments: Vec<DanmakuItem>,
    /// Controls sorted by wall time, ties in file order
    controls: Vec<TimedControl>,
}

impl Script {
    pub fn parse(reader: impl BufRead) -> Result<Self> {
        let mut script = Script::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parsed: ScriptLine = serde_json::from_str(trimmed)
                .map_err(|e| AppError::script(line_no, e.to_string()))?;
            script.push(parsed, line_no)?;
        }

        script.comments.sort_by_key(|item| item.danmaku.play_time);
        script.controls.sort_by_key(|c| c.at);
        debug!(
            comments = script.comments.len(),
            controls = script.controls.len(),
            "Parsed replay script"
        );
        Ok(script)
    }

    fn push(&mut self, line: ScriptLine, line_no: usize) -> Result<()> {
        match line {
            ScriptLine::Comment {
                id,
                provider_id,
                play_time_ms,
                sender_id,
                location,
                text,
                color,
                is_self,
            } => {
                let danmaku = Danmaku::new(id, text)
                    .with_provider(provider_id.unwrap_or_else(|| "replay".to_string()))
                    .with_play_time(Duration::from_millis(play_time_ms))
                    .with_sender(sender_id)
                    .with_location(location)
                    .with_color(color);
                self.comments.push(if is_self {
                    DanmakuItem::own(danmaku)
                } else {
                    DanmakuItem::remote(danmaku)
                });
            }
            ScriptLine::Seek { at_ms, to_ms } => {
                self.push_control(at_ms, Control::Seek(Duration::from_millis(to_ms)))
            }
            ScriptLine::Pause { at_ms } => self.push_control(at_ms, Control::Pause),
            ScriptLine::Play { at_ms } => self.push_control(at_ms, Control::Play),
            ScriptLine::Rate { at_ms, rate } => {
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(AppError::script(
                        line_no,
                        format!("rate must be positive, got {rate}"),
                    ));
                }
                self.push_control(at_ms, Control::Rate(rate))
            }
        }
        Ok(())
    }

    fn push_control(&mut self, at_ms: u64, control: Control) {
        self.controls.push(TimedControl {
            at: Duration::from_millis(at_ms),
            control,
        });
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    /// Play time of the last comment.
    pub fn last_play_time(&self) -> Duration {
        self.comments
            .last()
            .map(|item| item.danmaku.play_time)
            .unwrap_or_default()
    }

    pub fn into_parts(self) -> (ReplaySource, Vec<TimedControl>) {
        (
            ReplaySource {
                comments: self.comments,
                cursor: 0,
            },
            self.controls,
        )
    }
}

/// Offset-based replay: releases comments as the playback position passes
/// their play time.
#[derive(Debug)]
pub struct ReplaySource {
    comments: Vec<DanmakuItem>,
    cursor: usize,
}

impl ReplaySource {
    /// Comments whose play time is at or before `position` and that have not
    /// been released yet.
    pub fn due(&mut self, position: Duration) -> &[DanmakuItem] {
        let start = self.cursor;
        let end = start
            + self.comments[start..].partition_point(|item| item.danmaku.play_time <= position);
        self.cursor = end;
        &self.comments[start..end]
    }

    /// Restart the replay at `position`. Comments before it are skipped.
    pub fn reposition(&mut self, position: Duration) {
        self.cursor = self
            .comments
            .partition_point(|item| item.danmaku.play_time < position);
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.comments.len()
    }

    pub fn remaining(&self) -> usize {
        self.comments.len() - self.cursor
    }
}
