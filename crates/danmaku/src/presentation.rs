//! Per-comment presentation state.
//!
//! A [`Presentation`] is created when a comment leaves the ingestion queue and
//! lives until the clock passes its exit time. Everything the renderer needs
//! at time `t` is a pure function of `t` and the values fixed at placement.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::message::{Danmaku, DanmakuItem, DanmakuLocation};

/// Lifecycle of a presentation. Variants are ordered: a clock advance only
/// ever moves a presentation to a later variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationState {
    /// Waiting for its width and lane
    Measuring,
    /// Placed, not yet on screen
    Queued,
    /// On screen
    Visible,
    /// Off screen for good
    Retired,
}

/// Where a presentation was put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Placement {
    /// Scrolling lane, counted from the top
    Lane(usize),
    /// Fixed slot counted from the top edge
    Top(usize),
    /// Fixed slot counted from the bottom edge
    Bottom(usize),
}

impl Placement {
    /// Row index within its anchor.
    pub fn index(self) -> usize {
        match self {
            Self::Lane(i) | Self::Top(i) | Self::Bottom(i) => i,
        }
    }

    /// Top edge of the row in pixels.
    pub fn y(self, row_height: f64, viewport_height: f64) -> f64 {
        match self {
            Self::Lane(i) | Self::Top(i) => i as f64 * row_height,
            Self::Bottom(i) => viewport_height - (i as f64 + 1.0) * row_height,
        }
    }
}

/// Geometry fixed when a presentation is scheduled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Schedule {
    pub placement: Placement,
    pub enter_time: Duration,
    /// Travel time for scrolling comments, hold time for fixed ones
    pub duration: Duration,
    /// How far `enter_time` was pushed back from the requested time
    pub delay: Duration,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct Presentation {
    danmaku: Arc<Danmaku>,
    is_self: bool,
    seq: u64,
    width: f64,
    font_size: f64,
    schedule: Option<Schedule>,
    state: PresentationState,
}

impl Presentation {
    /// A freshly dequeued comment, still being measured.
    pub(crate) fn new(item: DanmakuItem, seq: u64) -> Self {
        Self {
            danmaku: item.danmaku,
            is_self: item.is_self,
            seq,
            width: 0.0,
            font_size: 0.0,
            schedule: None,
            state: PresentationState::Measuring,
        }
    }

    pub fn danmaku(&self) -> &Arc<Danmaku> {
        &self.danmaku
    }

    pub fn is_self(&self) -> bool {
        self.is_self
    }

    pub fn location(&self) -> DanmakuLocation {
        self.danmaku.location
    }

    /// Arrival order at the engine.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Font size the width was measured with.
    pub fn font_size(&self) -> f64 {
        self.font_size
    }

    pub fn state(&self) -> PresentationState {
        self.state
    }

    pub fn placement(&self) -> Option<Placement> {
        self.schedule.map(|s| s.placement)
    }

    pub fn enter_time(&self) -> Option<Duration> {
        self.schedule.map(|s| s.enter_time)
    }

    /// Travel or hold duration.
    pub fn duration(&self) -> Option<Duration> {
        self.schedule.map(|s| s.duration)
    }

    pub fn exit_time(&self) -> Option<Duration> {
        self.schedule.map(|s| s.enter_time + s.duration)
    }

    /// Hold-back applied by the allocator.
    pub fn entry_delay(&self) -> Option<Duration> {
        self.schedule.map(|s| s.delay)
    }

    /// The entry time asked for before any hold-back.
    pub(crate) fn requested_time(&self) -> Option<Duration> {
        self.schedule.map(|s| s.enter_time - s.delay)
    }

    pub(crate) fn set_measurement(&mut self, width: f64, font_size: f64) {
        self.width = width;
        self.font_size = font_size;
    }

    /// Measuring → Queued.
    pub(crate) fn schedule(&mut self, schedule: Schedule) {
        debug_assert_eq!(self.state, PresentationState::Measuring);
        self.schedule = Some(schedule);
        self.state = PresentationState::Queued;
    }

    /// Drop the placement so the presentation can be laid out again.
    pub(crate) fn unschedule(&mut self) {
        self.schedule = None;
        self.state = PresentationState::Measuring;
    }

    /// State implied by the clock reading `t`.
    pub fn state_at(&self, t: Duration) -> PresentationState {
        match self.schedule {
            None => PresentationState::Measuring,
            Some(s) if t < s.enter_time => PresentationState::Queued,
            Some(s) if t < s.enter_time + s.duration => PresentationState::Visible,
            Some(_) => PresentationState::Retired,
        }
    }

    /// Move forward to the state implied by `t`. Never moves backward.
    /// Returns the new state if it changed.
    pub(crate) fn advance(&mut self, t: Duration) -> Option<PresentationState> {
        let next = self.state_at(t);
        if next > self.state {
            self.state = next;
            Some(next)
        } else {
            None
        }
    }

    /// Re-derive the state after the clock jumped backward.
    pub(crate) fn rewind(&mut self, t: Duration) {
        self.state = self.state_at(t);
    }

    /// Whether the presentation is on screen at `t`.
    pub fn is_visible_at(&self, t: Duration) -> bool {
        self.state_at(t) == PresentationState::Visible
    }

    /// Left edge in pixels at time `t`.
    ///
    /// Scrolling comments move linearly from just off the right edge at the
    /// enter time to just off the left edge at the exit time. Fixed comments
    /// are centered.
    pub fn x_at(&self, t: Duration, viewport_width: f64) -> f64 {
        let Some(s) = self.schedule else {
            return viewport_width;
        };
        match s.placement {
            Placement::Lane(_) => {
                scroll_x(t, s.enter_time, s.duration, viewport_width, self.width)
            }
            Placement::Top(_) | Placement::Bottom(_) => (viewport_width - self.width) / 2.0,
        }
    }

    /// Top edge in pixels, fixed at placement.
    pub fn y(&self) -> Option<f64> {
        self.schedule.map(|s| s.y)
    }
}

/// Left edge of a scrolling comment at `t`, clamped to its travel interval.
pub fn scroll_x(
    t: Duration,
    enter_time: Duration,
    travel: Duration,
    viewport_width: f64,
    width: f64,
) -> f64 {
    let elapsed = t.saturating_sub(enter_time).as_secs_f64();
    let progress = (elapsed / travel.as_secs_f64()).clamp(0.0, 1.0);
    viewport_width - (viewport_width + width) * progress
}
