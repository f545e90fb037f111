//! Engine configuration and text style.
//!
//! A [`DanmakuConfig`] is an immutable snapshot. The host reads the snapshot
//! that is current when a comment is allocated; replacing it later does not
//! move comments already in flight unless a re-layout is requested (or the
//! new snapshot has `is_debug` set).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{DanmakuError, Result};

/// Shortest travel or hold time the engine will schedule.
const MIN_SCHEDULED: Duration = Duration::from_millis(1);

/// Largest accepted `queue_capacity`.
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Visual style of comment text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DanmakuStyle {
    /// Font size in pixels
    pub font_size: f64,
    /// CSS-style font weight (100..=900)
    pub font_weight: u16,
    /// Opacity applied to every rendered comment, in `[0, 1]`
    pub alpha: f64,
    /// Outline width in pixels
    pub stroke_width: f64,
    /// Outline color, packed `0xRRGGBB`
    pub stroke_color: u32,
    /// Extra vertical space between rows in pixels
    pub line_spacing: f64,
    /// Color used for every comment when colors are disabled
    pub default_color: u32,
}

impl Default for DanmakuStyle {
    fn default() -> Self {
        Self {
            font_size: 18.0,
            font_weight: 600,
            alpha: 0.8,
            stroke_width: 4.0,
            stroke_color: 0x00_00_00,
            line_spacing: 4.0,
            default_color: crate::message::DEFAULT_COLOR,
        }
    }
}

impl DanmakuStyle {
    /// Height of one lane or slot in pixels.
    pub fn row_height(&self) -> f64 {
        self.font_size + 2.0 * self.stroke_width + self.line_spacing
    }
}

/// How fast scrolling comments travel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScrollSpeed {
    /// Cross the viewport width at a fixed pixel speed
    PixelsPerSecond { px: f64 },
    /// Cross the viewport in a fixed time regardless of its width
    CrossingDuration { duration_ms: u64 },
}

impl Default for ScrollSpeed {
    fn default() -> Self {
        Self::CrossingDuration {
            duration_ms: 10_000,
        }
    }
}

impl ScrollSpeed {
    /// Create a pixel-speed config.
    pub fn pixels_per_second(px: f64) -> Self {
        Self::PixelsPerSecond { px }
    }

    /// Create a crossing-duration config.
    pub fn crossing(duration: Duration) -> Self {
        Self::CrossingDuration {
            duration_ms: duration.as_millis() as u64,
        }
    }

    fn is_valid(&self) -> bool {
        match *self {
            Self::PixelsPerSecond { px } => px.is_finite() && px > 0.0,
            Self::CrossingDuration { duration_ms } => duration_ms > 0,
        }
    }
}

/// What to do with a scrolling or fixed comment when no lane or slot is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverloadPolicy {
    /// Reserve the lane that frees first and hold the comment back until then
    #[default]
    Delay,
    /// Discard the comment
    Drop,
}

/// When a lane becomes available to the next scrolling comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanePacking {
    /// Only once the previous occupant has fully left the viewport
    #[default]
    ExitClear,
    /// As soon as the newcomer can no longer catch up with the previous
    /// occupant, keeping `safe_separation` pixels between them
    CatchUpSafe,
}

/// How long top and bottom comments stay on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixedHold {
    /// Same hold for every comment
    Constant { hold_ms: u64 },
    /// `base_ms + per_char_ms * chars`, capped at `max_ms`
    ScaleWithText {
        base_ms: u64,
        per_char_ms: u64,
        max_ms: u64,
    },
}

impl Default for FixedHold {
    fn default() -> Self {
        Self::Constant { hold_ms: 5_000 }
    }
}

impl FixedHold {
    /// Hold duration for a comment with the given text.
    pub fn hold_for(&self, text: &str) -> Duration {
        let ms = match *self {
            Self::Constant { hold_ms } => hold_ms,
            Self::ScaleWithText {
                base_ms,
                per_char_ms,
                max_ms,
            } => {
                let chars = text.chars().count() as u64;
                base_ms
                    .saturating_add(per_char_ms.saturating_mul(chars))
                    .min(max_ms)
            }
        };
        Duration::from_millis(ms).max(MIN_SCHEDULED)
    }

    fn is_valid(&self) -> bool {
        match *self {
            Self::Constant { hold_ms } => hold_ms > 0,
            Self::ScaleWithText {
                base_ms, max_ms, ..
            } => max_ms > 0 && base_ms <= max_ms,
        }
    }
}

/// Engine configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DanmakuConfig {
    /// Text style
    pub style: DanmakuStyle,
    /// Fraction of the viewport height usable by lanes and slots, in `(0, 1]`
    pub display_area: f64,
    /// Base scroll speed
    pub speed: ScrollSpeed,
    /// Multiplier applied on top of `speed`
    pub speed_multiplier: f64,
    /// Pixel gap kept between consecutive comments in a lane
    pub safe_separation: f64,
    /// Lane reuse rule
    pub lane_packing: LanePacking,
    /// Delay-or-drop tie-break when every lane or slot is busy
    pub overload_policy: OverloadPolicy,
    /// Longest hold-back accepted under [`OverloadPolicy::Delay`]; a comment
    /// that would wait longer is dropped. `None` means unbounded.
    pub max_entry_delay_ms: Option<u64>,
    /// Hold duration of top and bottom comments
    pub fixed_hold: FixedHold,
    /// Show scrolling comments
    pub enable_scroll: bool,
    /// Show top comments
    pub enable_top: bool,
    /// Show bottom comments
    pub enable_bottom: bool,
    /// Render comment colors; otherwise `style.default_color`
    pub enable_color: bool,
    /// Re-layout live comments on every config change and attach debug info
    pub is_debug: bool,
    /// Ingestion queue capacity. Read once when the host is built.
    pub queue_capacity: usize,
}

impl Default for DanmakuConfig {
    fn default() -> Self {
        Self {
            style: DanmakuStyle::default(),
            display_area: 0.25,
            speed: ScrollSpeed::default(),
            speed_multiplier: 1.0,
            safe_separation: 36.0,
            lane_packing: LanePacking::default(),
            overload_policy: OverloadPolicy::default(),
            max_entry_delay_ms: Some(5_000),
            fixed_hold: FixedHold::default(),
            enable_scroll: true,
            enable_top: true,
            enable_bottom: true,
            enable_color: true,
            is_debug: false,
            queue_capacity: 256,
        }
    }
}

impl DanmakuConfig {
    /// Check every field against its domain.
    pub fn validate(&self) -> Result<()> {
        if !(self.display_area > 0.0 && self.display_area <= 1.0) {
            return Err(DanmakuError::config(format!(
                "display_area must be in (0, 1], got {}",
                self.display_area
            )));
        }
        if !self.speed.is_valid() {
            return Err(DanmakuError::config(format!(
                "speed must be positive, got {:?}",
                self.speed
            )));
        }
        if !(self.speed_multiplier.is_finite() && self.speed_multiplier > 0.0) {
            return Err(DanmakuError::config(format!(
                "speed_multiplier must be positive, got {}",
                self.speed_multiplier
            )));
        }
        if !(self.style.font_size.is_finite() && self.style.font_size > 0.0) {
            return Err(DanmakuError::config(format!(
                "font_size must be positive, got {}",
                self.style.font_size
            )));
        }
        if !(0.0..=1.0).contains(&self.style.alpha) {
            return Err(DanmakuError::config(format!(
                "alpha must be in [0, 1], got {}",
                self.style.alpha
            )));
        }
        if !(self.style.stroke_width >= 0.0 && self.style.line_spacing >= 0.0) {
            return Err(DanmakuError::config(
                "stroke_width and line_spacing must not be negative",
            ));
        }
        if !(self.safe_separation >= 0.0 && self.safe_separation.is_finite()) {
            return Err(DanmakuError::config(format!(
                "safe_separation must not be negative, got {}",
                self.safe_separation
            )));
        }
        if !self.fixed_hold.is_valid() {
            return Err(DanmakuError::config(format!(
                "fixed_hold must be positive, got {:?}",
                self.fixed_hold
            )));
        }
        if !(1..=MAX_QUEUE_CAPACITY).contains(&self.queue_capacity) {
            return Err(DanmakuError::config(format!(
                "queue_capacity must be in [1, {MAX_QUEUE_CAPACITY}], got {}",
                self.queue_capacity
            )));
        }
        Ok(())
    }

    /// Time a scrolling comment takes to cross a viewport of the given width.
    pub fn travel_duration(&self, viewport_width: f64) -> Duration {
        let secs = match self.speed {
            ScrollSpeed::PixelsPerSecond { px } => {
                viewport_width.max(0.0) / (px * self.speed_multiplier)
            }
            ScrollSpeed::CrossingDuration { duration_ms } => {
                duration_ms as f64 / 1000.0 / self.speed_multiplier
            }
        };
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MIN_SCHEDULED)
            .max(MIN_SCHEDULED)
    }

    /// Hold duration of a fixed comment.
    pub fn hold_duration(&self, text: &str) -> Duration {
        self.fixed_hold.hold_for(text)
    }

    /// Longest accepted hold-back, if bounded.
    pub fn max_entry_delay(&self) -> Option<Duration> {
        self.max_entry_delay_ms.map(Duration::from_millis)
    }

    /// Whether comments at this location are shown at all.
    pub fn is_enabled(&self, location: crate::DanmakuLocation) -> bool {
        use crate::DanmakuLocation::*;
        match location {
            Scroll => self.enable_scroll,
            Top => self.enable_top,
            Bottom => self.enable_bottom,
        }
    }

    /// Whether switching from `self` to `next` changes the geometry of
    /// comments already placed.
    pub(crate) fn affects_layout(&self, next: &DanmakuConfig) -> bool {
        self.style != next.style
            || self.display_area != next.display_area
            || self.speed != next.speed
            || self.speed_multiplier != next.speed_multiplier
            || self.fixed_hold != next.fixed_hold
    }
}

/// Cloneable handle that publishes new configuration snapshots to a host.
///
/// Snapshots are validated here, so the host only ever observes valid ones.
/// The host applies the latest snapshot at the start of its next tick.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<DanmakuConfig>>>,
}

impl ConfigHandle {
    /// Create a handle and the receiving side for a host.
    pub(crate) fn channel(
        initial: Arc<DanmakuConfig>,
    ) -> (Self, watch::Receiver<Arc<DanmakuConfig>>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Arc<DanmakuConfig> {
        self.tx.borrow().clone()
    }

    /// Replace the configuration wholesale.
    pub fn update(&self, config: DanmakuConfig) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Rejected danmaku config update");
            return Err(e);
        }
        debug!(is_debug = config.is_debug, "Publishing danmaku config");
        self.tx.send_replace(Arc::new(config));
        Ok(())
    }

    /// Derive a new snapshot from the current one.
    pub fn modify(&self, f: impl FnOnce(&mut DanmakuConfig)) -> Result<()> {
        let mut next = (*self.current()).clone();
        f(&mut next);
        self.update(next)
    }
}
