//! Frame driver.
//!
//! [`DanmakuHost`] owns every live presentation, the lane table and the
//! consuming side of the ingestion queue. It is driven by the render loop:
//! one [`DanmakuHost::tick`] per frame with the current playback time.
//! Producers talk to it only through [`DanmakuSender`] and [`ConfigHandle`].

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::config::{ConfigHandle, DanmakuConfig};
use crate::error::Result;
use crate::measure::{TextMeasurer, measured_width};
use crate::message::{Danmaku, DanmakuItem, millis};
use crate::presentation::{Placement, Presentation, PresentationState};
use crate::queue::{DanmakuSender, IngestQueue};
use crate::statistics::{EngineStatistics, StatisticsAggregator};
use crate::track::{Allocation, TrackAllocator, Viewport};

/// Layout details attached to render items in debug mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DebugInfo {
    pub placement: Placement,
    pub state: PresentationState,
    #[serde(rename = "enter_time_ms", with = "millis")]
    pub enter_time: Duration,
    #[serde(rename = "exit_time_ms", with = "millis")]
    pub exit_time: Duration,
    pub width: f64,
}

/// One comment to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderItem {
    pub danmaku: Arc<Danmaku>,
    /// Color to draw with, after the color toggle is applied
    pub color: u32,
    pub is_self: bool,
    /// Left edge in pixels
    pub x: f64,
    /// Top edge in pixels
    pub y: f64,
    pub opacity: f64,
    pub font_size: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

/// Everything visible at one playback time, in entry order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    #[serde(rename = "time_ms", with = "millis")]
    pub time: Duration,
    pub items: Vec<RenderItem>,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

pub struct DanmakuHost {
    config: Arc<DanmakuConfig>,
    config_rx: watch::Receiver<Arc<DanmakuConfig>>,
    config_handle: ConfigHandle,
    queue: IngestQueue,
    allocator: TrackAllocator,
    measurer: Box<dyn TextMeasurer>,
    /// Live presentations, in admission order
    live: Vec<Presentation>,
    next_seq: u64,
    now: Duration,
    stats: StatisticsAggregator,
}

impl std::fmt::Debug for DanmakuHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DanmakuHost")
            .field("viewport", &self.allocator.viewport())
            .field("lanes", &self.allocator.lane_count())
            .field("live", &self.live.len())
            .field("queued", &self.queue.len())
            .field("now", &self.now)
            .finish()
    }
}

impl DanmakuHost {
    /// Create a host for the given viewport. Fails if `config` is invalid.
    pub fn new(
        config: DanmakuConfig,
        viewport: Viewport,
        measurer: impl TextMeasurer + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let (config_handle, config_rx) = ConfigHandle::channel(Arc::clone(&config));
        let allocator = TrackAllocator::new(viewport, &config);

        debug!(
            lanes = allocator.lane_count(),
            capacity = config.queue_capacity,
            "Created danmaku host"
        );

        Ok(Self {
            queue: IngestQueue::new(config.queue_capacity),
            config,
            config_rx,
            config_handle,
            allocator,
            measurer: Box::new(measurer),
            live: Vec::new(),
            next_seq: 0,
            now: Duration::ZERO,
            stats: StatisticsAggregator::new(),
        })
    }

    /// A producer handle for the ingestion queue.
    pub fn sender(&self) -> DanmakuSender {
        self.queue.sender()
    }

    /// A handle for publishing configuration from other threads.
    pub fn config_handle(&self) -> ConfigHandle {
        self.config_handle.clone()
    }

    /// The snapshot the host is currently laying out with.
    pub fn config(&self) -> Arc<DanmakuConfig> {
        Arc::clone(&self.config)
    }

    /// Publish and apply a new configuration right away.
    pub fn set_config(&mut self, config: DanmakuConfig) -> Result<()> {
        self.config_handle.update(config)?;
        self.apply_config_changes();
        Ok(())
    }

    pub fn viewport(&self) -> Viewport {
        self.allocator.viewport()
    }

    pub fn lane_count(&self) -> usize {
        self.allocator.lane_count()
    }

    /// Playback time of the last tick.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Admitted comments waiting for the next tick.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Live presentations in admission order.
    pub fn presentations(&self) -> &[Presentation] {
        &self.live
    }

    pub fn statistics(&self) -> EngineStatistics {
        self.stats.snapshot(self.queue.counters())
    }

    /// Resize the drawable area and lay every live comment out again.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport == self.allocator.viewport() {
            return;
        }
        self.allocator.resize(viewport, &self.config);
        self.relayout();
    }

    /// Re-measure and re-place every live comment under the current config.
    /// Each comment asks for the entry time it originally asked for; those
    /// that no longer fit are dropped.
    pub fn relayout(&mut self) {
        let mut items = std::mem::take(&mut self.live);
        items.sort_by_key(|p| (p.requested_time(), p.seq()));
        self.allocator.reset();

        let before = items.len();
        for mut p in items {
            let requested = p.requested_time().unwrap_or(self.now);
            p.unschedule();
            if self.place(&mut p, requested).is_some() {
                p.rewind(self.now);
                self.live.push(p);
            }
        }
        self.live.sort_by_key(Presentation::seq);
        debug!(before, after = self.live.len(), "Re-laid out danmaku");
    }

    /// Drop every live and queued comment and free all lanes.
    pub fn clear(&mut self) {
        let queued = self.queue.clear();
        let live = self.live.len();
        self.live.clear();
        self.allocator.reset();
        debug!(live, queued, "Cleared danmaku");
    }

    /// Stop accepting comments and wake pending submitters.
    pub fn shutdown(&mut self) {
        self.queue.close();
    }

    /// Advance to playback time `now` and return what is visible.
    ///
    /// Admits everything queued, promotes and retires presentations, and
    /// purges retired ones. A `now` earlier than the previous tick is
    /// treated as a seek.
    pub fn tick(&mut self, now: Duration) -> Frame {
        self.apply_config_changes();

        if now < self.now {
            self.rewind_to(now);
        }
        self.now = now;

        for item in self.queue.drain() {
            self.admit(item, now);
        }

        for p in &mut self.live {
            p.advance(now);
        }
        let before = self.live.len();
        self.live
            .retain(|p| p.state() != PresentationState::Retired);
        let retired = before - self.live.len();
        if retired > 0 {
            self.stats.record_retired(retired);
        }
        self.stats.observe_live(self.live.len());

        let frame = self.frame(now);
        trace!(
            now_ms = now.as_millis() as u64,
            live = self.live.len(),
            visible = frame.len(),
            retired,
            "Danmaku tick"
        );
        frame
    }

    /// Jump to playback time `t` in either direction, then tick.
    ///
    /// Presentations already purged stay gone; a source that needs them back
    /// after a long backward seek should [`clear`](Self::clear) and
    /// repopulate.
    pub fn seek(&mut self, t: Duration) -> Frame {
        self.rewind_to(t);
        self.now = t;
        self.tick(t)
    }

    /// What is visible at `t`, without changing any state.
    pub fn frame(&self, t: Duration) -> Frame {
        let config = &self.config;
        let viewport_width = self.allocator.viewport().width;

        let mut visible: Vec<&Presentation> =
            self.live.iter().filter(|p| p.is_visible_at(t)).collect();
        visible.sort_by_key(|p| (p.enter_time(), p.seq()));

        let items = visible
            .into_iter()
            .map(|p| {
                let danmaku = p.danmaku();
                let color = if config.enable_color {
                    danmaku.color
                } else {
                    config.style.default_color
                };
                let debug = config.is_debug.then(|| DebugInfo {
                    placement: p.placement().unwrap_or(Placement::Lane(0)),
                    state: p.state_at(t),
                    enter_time: p.enter_time().unwrap_or_default(),
                    exit_time: p.exit_time().unwrap_or_default(),
                    width: p.width(),
                });
                RenderItem {
                    danmaku: Arc::clone(danmaku),
                    color,
                    is_self: p.is_self(),
                    x: p.x_at(t, viewport_width),
                    y: p.y().unwrap_or_default(),
                    opacity: config.style.alpha,
                    font_size: p.font_size(),
                    debug,
                }
            })
            .collect();

        Frame { time: t, items }
    }

    fn apply_config_changes(&mut self) {
        if !self.config_rx.has_changed().unwrap_or(false) {
            return;
        }
        let next = self.config_rx.borrow_and_update().clone();
        let relayout = next.is_debug && self.config.affects_layout(&next);
        self.config = next;
        self.allocator.resize(self.allocator.viewport(), &self.config);
        debug!(relayout, lanes = self.allocator.lane_count(), "Applied danmaku config");
        if relayout {
            self.relayout();
        } else {
            // Rows cut by a shrink come back empty when the table grows again
            self.allocator.rebuild(self.live.iter());
        }
    }

    fn rewind_to(&mut self, t: Duration) {
        for p in &mut self.live {
            p.rewind(t);
        }
        self.allocator.rebuild(
            self.live
                .iter()
                .filter(|p| p.state() != PresentationState::Retired),
        );
        debug!(
            from_ms = self.now.as_millis() as u64,
            to_ms = t.as_millis() as u64,
            "Seeked danmaku"
        );
    }

    fn admit(&mut self, item: DanmakuItem, now: Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if !self.config.is_enabled(item.danmaku.location) {
            trace!(id = %item.danmaku.id, location = ?item.danmaku.location, "Filtered danmaku");
            self.stats.record_filtered();
            return;
        }

        let mut p = Presentation::new(item, seq);
        if let Some(delay) = self.place(&mut p, now) {
            self.stats.record_placed(now, delay);
            self.live.push(p);
        }
    }

    /// Measure and allocate `p` for entry at `requested`. Returns the
    /// hold-back if it was placed.
    fn place(&mut self, p: &mut Presentation, requested: Duration) -> Option<Duration> {
        let style = &self.config.style;
        let width = measured_width(self.measurer.as_ref(), &p.danmaku().text, style);
        p.set_measurement(width, style.font_size);

        match self
            .allocator
            .allocate(p.danmaku(), width, &self.config, requested, p.is_self())
        {
            Allocation::Placed(assignment) => {
                if !assignment.delay.is_zero() {
                    debug!(
                        id = %p.danmaku().id,
                        delay_ms = assignment.delay.as_millis() as u64,
                        placement = ?assignment.placement,
                        "Delayed danmaku entry"
                    );
                }
                p.schedule(assignment.schedule());
                Some(assignment.delay)
            }
            Allocation::Dropped(reason) => {
                warn!(id = %p.danmaku().id, ?reason, "Dropped danmaku");
                self.stats.record_dropped();
                None
            }
        }
    }
}

impl Drop for DanmakuHost {
    fn drop(&mut self) {
        debug!(live = self.live.len(), "Dropping danmaku host");
    }
}
