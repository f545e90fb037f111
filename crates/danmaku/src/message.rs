//! Danmaku comment types.
//!
//! A [`Danmaku`] is the immutable value handed to the engine by a comment
//! source. The engine never mutates it; presentation state lives in
//! [`crate::presentation::Presentation`].

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// Default comment color (white).
pub const DEFAULT_COLOR: u32 = 0xFF_FF_FF;

/// Where a comment is shown on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanmakuLocation {
    /// Travels from the right edge to the left edge
    #[default]
    Scroll,
    /// Pinned to a slot counted from the top edge
    Top,
    /// Pinned to a slot counted from the bottom edge
    Bottom,
}

impl DanmakuLocation {
    /// Whether the comment is pinned instead of scrolling.
    pub fn is_fixed(self) -> bool {
        !matches!(self, Self::Scroll)
    }
}

/// A single danmaku comment.
///
/// Identity is the `id`: two values with the same id compare equal even if
/// another field differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Danmaku {
    /// Unique comment ID
    pub id: String,
    /// Source that produced the comment
    #[serde(default)]
    pub provider_id: String,
    /// Offset since content start. Provenance only, never used for layout.
    #[serde(rename = "play_time_ms", with = "millis", default)]
    pub play_time: Duration,
    /// Sender of the comment
    #[serde(default)]
    pub sender_id: String,
    /// Display location
    #[serde(default)]
    pub location: DanmakuLocation,
    /// Comment text
    pub text: String,
    /// Packed `0xRRGGBB` color
    #[serde(default = "default_color")]
    pub color: u32,
}

fn default_color() -> u32 {
    DEFAULT_COLOR
}

impl Danmaku {
    /// Create a new scrolling comment with the default color.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_id: String::new(),
            play_time: Duration::ZERO,
            sender_id: String::new(),
            location: DanmakuLocation::Scroll,
            text: text.into(),
            color: DEFAULT_COLOR,
        }
    }

    /// Set the display location.
    pub fn with_location(mut self, location: DanmakuLocation) -> Self {
        self.location = location;
        self
    }

    /// Set the packed RGB color. Bits above the low 24 are discarded.
    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color & 0xFF_FF_FF;
        self
    }

    /// Set the sender.
    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = sender_id.into();
        self
    }

    /// Set the provider.
    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    /// Set the play time offset.
    pub fn with_play_time(mut self, play_time: Duration) -> Self {
        self.play_time = play_time;
        self
    }

    /// Split the packed color into `(r, g, b)`.
    pub fn rgb(&self) -> (u8, u8, u8) {
        (
            ((self.color >> 16) & 0xFF) as u8,
            ((self.color >> 8) & 0xFF) as u8,
            (self.color & 0xFF) as u8,
        )
    }
}

impl PartialEq for Danmaku {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Danmaku {}

impl Hash for Danmaku {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A comment on its way into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanmakuItem {
    pub danmaku: Arc<Danmaku>,
    /// Sent by the local user
    pub is_self: bool,
}

impl DanmakuItem {
    /// A comment from a remote feed.
    pub fn remote(danmaku: Danmaku) -> Self {
        Self {
            danmaku: Arc::new(danmaku),
            is_self: false,
        }
    }

    /// A comment sent by the local user.
    pub fn own(danmaku: Danmaku) -> Self {
        Self {
            danmaku: Arc::new(danmaku),
            is_self: true,
        }
    }
}

/// Serde helpers for durations stored as integer milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
