//! Lane and slot allocation.
//!
//! Scrolling comments go into horizontal lanes. Each lane only remembers its
//! tail: the most recently placed comment. A newcomer may enter a lane once
//! it can no longer overlap that tail, which keeps every pair of comments in
//! the lane apart for as long as both are on screen.
//!
//! Top and bottom comments take vertical slots that free up when the
//! occupant's hold time has elapsed.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::{DanmakuConfig, LanePacking, OverloadPolicy};
use crate::message::{Danmaku, DanmakuLocation};
use crate::presentation::{Placement, Presentation, Schedule};

/// Drawable area in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Number of rows that fit in the usable part of the viewport.
    pub fn rows(&self, config: &DanmakuConfig) -> usize {
        let row_height = config.style.row_height();
        if row_height <= 0.0 {
            return 0;
        }
        let usable = self.height * config.display_area;
        let rows = (usable / row_height).floor() as usize;
        // A viewport tall enough for one row always gets a lane, even when
        // the display area fraction alone would round it away.
        if rows == 0 && self.height >= row_height {
            1
        } else {
            rows
        }
    }
}

/// The most recently placed comment of a lane.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LaneTail {
    enter_time: Duration,
    travel: Duration,
    width: f64,
    viewport_width: f64,
}

impl LaneTail {
    fn exit_time(&self) -> Duration {
        self.enter_time + self.travel
    }

    /// Pixel speed of the tail.
    fn speed(&self) -> f64 {
        (self.viewport_width + self.width) / self.travel.as_secs_f64()
    }

    /// Earliest time a comment of `width` travelling for `travel` may enter
    /// behind this tail.
    fn free_at(&self, packing: LanePacking, width: f64, travel: Duration, gap: f64) -> Duration {
        match packing {
            LanePacking::ExitClear => self.exit_time(),
            LanePacking::CatchUpSafe => {
                let enter = self.enter_time.as_secs_f64();
                let exit = self.exit_time().as_secs_f64();
                let own_speed = (self.viewport_width + width) / travel.as_secs_f64();
                // The tail must have cleared the right edge by `gap` pixels...
                let cleared = enter + (self.width + gap) / self.speed();
                // ...and the newcomer must still be `gap` pixels short of the
                // left edge when the tail leaves the screen.
                let no_catch_up = exit - (self.viewport_width - gap) / own_speed;
                let at = cleared.max(no_catch_up).max(enter);
                Duration::try_from_secs_f64(at).unwrap_or(self.exit_time())
            }
        }
    }
}

/// Why a comment was not placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Every lane was busy and the policy is to drop
    Overloaded,
    /// The required hold-back exceeded `max_entry_delay_ms`
    DelayTooLong,
    /// The viewport has no rows at all
    NoRoom,
}

/// A successful placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneAssignment {
    pub placement: Placement,
    pub enter_time: Duration,
    /// Travel time for scrolling comments, hold time for fixed ones
    pub duration: Duration,
    /// Hold-back relative to the requested entry time
    pub delay: Duration,
    /// Top edge in pixels
    pub y: f64,
}

impl LaneAssignment {
    pub(crate) fn schedule(&self) -> Schedule {
        Schedule {
            placement: self.placement,
            enter_time: self.enter_time,
            duration: self.duration,
            delay: self.delay,
            y: self.y,
        }
    }
}

/// Outcome of [`TrackAllocator::allocate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Allocation {
    Placed(LaneAssignment),
    Dropped(DropReason),
}

/// Lane and slot bookkeeping: one record per row, nothing per comment.
#[derive(Debug, Clone)]
pub struct TrackAllocator {
    lanes: Vec<Option<LaneTail>>,
    top: Vec<Duration>,
    bottom: Vec<Duration>,
    viewport: Viewport,
    row_height: f64,
}

impl TrackAllocator {
    pub fn new(viewport: Viewport, config: &DanmakuConfig) -> Self {
        let mut allocator = Self {
            lanes: Vec::new(),
            top: Vec::new(),
            bottom: Vec::new(),
            viewport,
            row_height: config.style.row_height(),
        };
        allocator.resize(viewport, config);
        allocator
    }

    /// Number of scrolling lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Number of slots per fixed anchor.
    pub fn slot_count(&self) -> usize {
        self.top.len()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Adapt the row tables to a new viewport or style. Records of rows that
    /// still exist are kept.
    pub fn resize(&mut self, viewport: Viewport, config: &DanmakuConfig) {
        let rows = viewport.rows(config);
        self.viewport = viewport;
        self.row_height = config.style.row_height();
        self.lanes.resize(rows, None);
        self.top.resize(rows, Duration::ZERO);
        self.bottom.resize(rows, Duration::ZERO);
        debug!(
            rows,
            width = viewport.width,
            height = viewport.height,
            "Resized danmaku tracks"
        );
    }

    /// Forget every lane tail and slot hold.
    pub fn reset(&mut self) {
        self.lanes.iter_mut().for_each(|lane| *lane = None);
        self.top.iter_mut().for_each(|slot| *slot = Duration::ZERO);
        self.bottom.iter_mut().for_each(|slot| *slot = Duration::ZERO);
    }

    /// Rebuild the row tables from the presentations that are still live.
    pub fn rebuild<'a>(&mut self, live: impl IntoIterator<Item = &'a Presentation>) {
        self.reset();
        for p in live {
            let (Some(placement), Some(enter_time), Some(duration)) =
                (p.placement(), p.enter_time(), p.duration())
            else {
                continue;
            };
            match placement {
                Placement::Lane(i) => {
                    let Some(lane) = self.lanes.get_mut(i) else {
                        continue;
                    };
                    if lane.is_none_or(|tail| tail.enter_time <= enter_time) {
                        *lane = Some(LaneTail {
                            enter_time,
                            travel: duration,
                            width: p.width(),
                            viewport_width: self.viewport.width,
                        });
                    }
                }
                Placement::Top(i) => {
                    if let Some(slot) = self.top.get_mut(i) {
                        *slot = (*slot).max(enter_time + duration);
                    }
                }
                Placement::Bottom(i) => {
                    if let Some(slot) = self.bottom.get_mut(i) {
                        *slot = (*slot).max(enter_time + duration);
                    }
                }
            }
        }
    }

    /// Place a measured comment that wants to enter at `now`.
    ///
    /// `must_place` comments ignore the drop policy and the delay ceiling;
    /// they are held back as long as needed.
    pub fn allocate(
        &mut self,
        danmaku: &Danmaku,
        width: f64,
        config: &DanmakuConfig,
        now: Duration,
        must_place: bool,
    ) -> Allocation {
        match danmaku.location {
            DanmakuLocation::Scroll => self.allocate_lane(width, config, now, must_place),
            location => {
                let hold = config.hold_duration(&danmaku.text);
                self.allocate_slot(location, hold, config, now, must_place)
            }
        }
    }

    fn allocate_lane(
        &mut self,
        width: f64,
        config: &DanmakuConfig,
        now: Duration,
        must_place: bool,
    ) -> Allocation {
        if self.lanes.is_empty() {
            return Allocation::Dropped(DropReason::NoRoom);
        }
        let travel = config.travel_duration(self.viewport.width);

        // First lane, top to bottom, that is free at `now`; otherwise the
        // lane that frees first.
        let mut best: Option<(usize, Duration)> = None;
        for (i, lane) in self.lanes.iter().enumerate() {
            let free_at = lane.map_or(Duration::ZERO, |tail| {
                tail.free_at(config.lane_packing, width, travel, config.safe_separation)
            });
            if free_at <= now {
                best = Some((i, now));
                break;
            }
            if best.is_none_or(|(_, at)| free_at < at) {
                best = Some((i, free_at));
            }
        }
        let Some((lane, enter_time)) = best else {
            return Allocation::Dropped(DropReason::NoRoom);
        };

        let delay = enter_time - now;
        if let Some(reason) = self.reject_delay(delay, config, must_place) {
            return Allocation::Dropped(reason);
        }

        self.lanes[lane] = Some(LaneTail {
            enter_time,
            travel,
            width,
            viewport_width: self.viewport.width,
        });
        trace!(lane, delay_ms = delay.as_millis() as u64, "Placed scrolling danmaku");

        let placement = Placement::Lane(lane);
        Allocation::Placed(LaneAssignment {
            placement,
            enter_time,
            duration: travel,
            delay,
            y: placement.y(self.row_height, self.viewport.height),
        })
    }

    fn allocate_slot(
        &mut self,
        location: DanmakuLocation,
        hold: Duration,
        config: &DanmakuConfig,
        now: Duration,
        must_place: bool,
    ) -> Allocation {
        let slots = match location {
            DanmakuLocation::Bottom => &self.bottom,
            _ => &self.top,
        };

        let mut best: Option<(usize, Duration)> = None;
        for (i, &free_at) in slots.iter().enumerate() {
            if free_at <= now {
                best = Some((i, now));
                break;
            }
            if best.is_none_or(|(_, at)| free_at < at) {
                best = Some((i, free_at));
            }
        }
        let Some((slot, enter_time)) = best else {
            return Allocation::Dropped(DropReason::NoRoom);
        };

        let delay = enter_time - now;
        if let Some(reason) = self.reject_delay(delay, config, must_place) {
            return Allocation::Dropped(reason);
        }

        let placement = match location {
            DanmakuLocation::Bottom => {
                self.bottom[slot] = enter_time + hold;
                Placement::Bottom(slot)
            }
            _ => {
                self.top[slot] = enter_time + hold;
                Placement::Top(slot)
            }
        };
        trace!(?placement, delay_ms = delay.as_millis() as u64, "Placed fixed danmaku");

        Allocation::Placed(LaneAssignment {
            placement,
            enter_time,
            duration: hold,
            delay,
            y: placement.y(self.row_height, self.viewport.height),
        })
    }

    fn reject_delay(
        &self,
        delay: Duration,
        config: &DanmakuConfig,
        must_place: bool,
    ) -> Option<DropReason> {
        if delay.is_zero() || must_place {
            return None;
        }
        match config.overload_policy {
            OverloadPolicy::Drop => Some(DropReason::Overloaded),
            OverloadPolicy::Delay => match config.max_entry_delay() {
                Some(max) if delay > max => Some(DropReason::DelayTooLong),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DanmakuStyle, FixedHold, ScrollSpeed};

    fn secs(v: f64) -> Duration {
        Duration::from_secs_f64(v)
    }

    /// 30 px rows, 1000x90 viewport with the full height usable: three lanes.
    fn config() -> DanmakuConfig {
        DanmakuConfig {
            style: DanmakuStyle {
                font_size: 30.0,
                stroke_width: 0.0,
                line_spacing: 0.0,
                ..Default::default()
            },
            display_area: 1.0,
            speed: ScrollSpeed::crossing(Duration::from_secs(10)),
            safe_separation: 0.0,
            max_entry_delay_ms: None,
            fixed_hold: FixedHold::Constant { hold_ms: 4_000 },
            ..Default::default()
        }
    }

    fn viewport() -> Viewport {
        Viewport::new(1000.0, 90.0)
    }

    fn scroll(id: &str) -> Danmaku {
        Danmaku::new(id, "text")
    }

    fn placed(allocation: Allocation) -> LaneAssignment {
        match allocation {
            Allocation::Placed(a) => a,
            Allocation::Dropped(reason) => panic!("expected placement, got {reason:?}"),
        }
    }

    #[test]
    fn test_rows_follow_display_area() {
        let mut c = config();
        assert_eq!(viewport().rows(&c), 3);
        c.display_area = 0.5;
        assert_eq!(viewport().rows(&c), 1);
        c.display_area = 0.1;
        // Still one lane while the viewport fits a row
        assert_eq!(viewport().rows(&c), 1);
        assert_eq!(Viewport::new(1000.0, 10.0).rows(&c), 0);
    }

    #[test]
    fn test_lanes_fill_top_to_bottom() {
        let c = config();
        let mut alloc = TrackAllocator::new(viewport(), &c);

        let a = placed(alloc.allocate(&scroll("1"), 100.0, &c, secs(0.0), false));
        let b = placed(alloc.allocate(&scroll("2"), 100.0, &c, secs(0.0), false));
        let d = placed(alloc.allocate(&scroll("3"), 100.0, &c, secs(0.1), false));

        assert_eq!(a.placement, Placement::Lane(0));
        assert_eq!(b.placement, Placement::Lane(1));
        assert_eq!(d.placement, Placement::Lane(2));
        assert_eq!(d.enter_time, secs(0.1));
        assert_eq!(d.delay, Duration::ZERO);
        assert_eq!(a.duration, Duration::from_secs(10));
        assert_eq!(b.y, 30.0);
    }

    #[test]
    fn test_overload_delays_into_earliest_lane() {
        let c = config();
        let mut alloc = TrackAllocator::new(viewport(), &c);
        for (i, at) in [0.0, 1.0, 2.0].into_iter().enumerate() {
            placed(alloc.allocate(&scroll(&i.to_string()), 100.0, &c, secs(at), false));
        }

        let late = placed(alloc.allocate(&scroll("late"), 100.0, &c, secs(3.0), false));
        assert_eq!(late.placement, Placement::Lane(0));
        assert_eq!(late.enter_time, Duration::from_secs(10));
        assert_eq!(late.delay, Duration::from_secs(7));

        // The reservation is visible to the next comment
        let next = placed(alloc.allocate(&scroll("next"), 100.0, &c, secs(3.0), false));
        assert_eq!(next.placement, Placement::Lane(1));
        assert_eq!(next.enter_time, Duration::from_secs(11));
    }

    #[test]
    fn test_drop_policy_and_delay_ceiling() {
        let mut c = config();
        c.overload_policy = OverloadPolicy::Drop;
        let mut alloc = TrackAllocator::new(viewport(), &c);
        for i in 0..3 {
            placed(alloc.allocate(&scroll(&i.to_string()), 100.0, &c, secs(0.0), false));
        }
        assert_eq!(
            alloc.allocate(&scroll("x"), 100.0, &c, secs(1.0), false),
            Allocation::Dropped(DropReason::Overloaded)
        );
        // Comments that must be shown bypass the drop policy
        let forced = placed(alloc.allocate(&scroll("self"), 100.0, &c, secs(1.0), true));
        assert_eq!(forced.enter_time, Duration::from_secs(10));

        c.overload_policy = OverloadPolicy::Delay;
        c.max_entry_delay_ms = Some(2_000);
        assert_eq!(
            alloc.allocate(&scroll("y"), 100.0, &c, secs(1.0), false),
            Allocation::Dropped(DropReason::DelayTooLong)
        );
        // Within the ceiling the comment is held back
        let held = placed(alloc.allocate(&scroll("z"), 100.0, &c, secs(8.5), false));
        assert_eq!(held.enter_time, Duration::from_secs(10));
    }

    #[test]
    fn test_catch_up_safe_packing_reuses_lane_early() {
        let mut c = config();
        c.lane_packing = LanePacking::CatchUpSafe;
        c.safe_separation = 50.0;
        let vp = Viewport::new(1000.0, 30.0);
        let mut alloc = TrackAllocator::new(vp, &c);

        // 100 px wide at 1100 px / 10 s = 110 px/s
        placed(alloc.allocate(&scroll("a"), 100.0, &c, secs(0.0), false));

        // Same width: free once the tail has cleared the edge by 50 px,
        // i.e. after 150 / 110 s.
        let b = placed(alloc.allocate(&scroll("b"), 100.0, &c, secs(0.0), false));
        let expected = 150.0 / 110.0;
        assert!((b.enter_time.as_secs_f64() - expected).abs() < 1e-6);
        assert!(b.enter_time < Duration::from_secs(10));

        // A much wider comment moves faster and must wait until it can no
        // longer catch up: 1000 - 50 px before the tail exits.
        let wide = placed(alloc.allocate(&scroll("c"), 1000.0, &c, secs(0.0), false));
        let tail_exit = b.enter_time.as_secs_f64() + 10.0;
        let expected = tail_exit - 950.0 / (2000.0 / 10.0);
        assert!((wide.enter_time.as_secs_f64() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_fixed_slots_expire() {
        let c = config();
        let mut alloc = TrackAllocator::new(viewport(), &c);
        let top = Danmaku::new("t", "top").with_location(DanmakuLocation::Top);
        let bottom = Danmaku::new("b", "bottom").with_location(DanmakuLocation::Bottom);

        let t0 = placed(alloc.allocate(&top, 50.0, &c, secs(0.0), false));
        let t1 = placed(alloc.allocate(&top, 50.0, &c, secs(1.0), false));
        assert_eq!(t0.placement, Placement::Top(0));
        assert_eq!(t1.placement, Placement::Top(1));
        assert_eq!(t0.duration, Duration::from_secs(4));

        // Slot 0 is free again once its hold has elapsed
        let t2 = placed(alloc.allocate(&top, 50.0, &c, secs(4.0), false));
        assert_eq!(t2.placement, Placement::Top(0));

        let b0 = placed(alloc.allocate(&bottom, 50.0, &c, secs(0.0), false));
        assert_eq!(b0.placement, Placement::Bottom(0));
        assert_eq!(b0.y, 60.0);
    }

    #[test]
    fn test_no_rows_drops() {
        let c = config();
        let mut alloc = TrackAllocator::new(Viewport::new(1000.0, 5.0), &c);
        assert_eq!(alloc.lane_count(), 0);
        assert_eq!(
            alloc.allocate(&scroll("1"), 10.0, &c, secs(0.0), true),
            Allocation::Dropped(DropReason::NoRoom)
        );
    }

    #[test]
    fn test_resize_keeps_surviving_rows() {
        let c = config();
        let mut alloc = TrackAllocator::new(viewport(), &c);
        placed(alloc.allocate(&scroll("1"), 100.0, &c, secs(0.0), false));

        alloc.resize(Viewport::new(1000.0, 150.0), &c);
        assert_eq!(alloc.lane_count(), 5);
        // Lane 0 is still taken
        let next = placed(alloc.allocate(&scroll("2"), 100.0, &c, secs(1.0), false));
        assert_eq!(next.placement, Placement::Lane(1));

        alloc.reset();
        let after_reset = placed(alloc.allocate(&scroll("3"), 100.0, &c, secs(1.0), false));
        assert_eq!(after_reset.placement, Placement::Lane(0));
    }
}
