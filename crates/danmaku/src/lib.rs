//! Danmaku: real-time overlay engine for timestamped comments (弾幕).
//!
//! Ingests a possibly bursty stream of comments and lays them out over video
//! playback so that scrolling comments never overlap, everything appears and
//! disappears in sync with a seekable playback clock, and overload degrades
//! into delayed or dropped comments instead of stalls.
//!
//! ## Core Types
//!
//! - [`Danmaku`] - An immutable comment
//! - [`DanmakuConfig`] / [`DanmakuStyle`] - Layout and style snapshot
//! - [`ConfigHandle`] - Publishes new snapshots to a running host
//!
//! ## Engine
//!
//! - [`DanmakuHost`] - Frame driver: one [`DanmakuHost::tick`] per frame
//! - [`TrackAllocator`] - Lane and slot assignment
//! - [`Presentation`] - Per-comment lifecycle and position
//! - [`IngestQueue`] / [`DanmakuSender`] - Bounded admission with `offer`
//!   and backpressured `submit`
//!
//! ## Host integration
//!
//! - [`TextMeasurer`] - Width of rendered text, supplied by the host
//! - [`PlaybackClock`] - Playback position with pause, rate and seek
//! - [`EngineStatistics`] - Counters for admission, placement and retirement
//!
//! ```no_run
//! use danmaku::{CellWidthMeasurer, Danmaku, DanmakuConfig, DanmakuHost, Viewport};
//! use std::time::Duration;
//!
//! let mut host = DanmakuHost::new(
//!     DanmakuConfig::default(),
//!     Viewport::new(1920.0, 1080.0),
//!     CellWidthMeasurer::default(),
//! )?;
//! let sender = host.sender();
//! sender.offer(Danmaku::new("1", "hello"));
//!
//! let frame = host.tick(Duration::from_millis(16));
//! for item in &frame.items {
//!     println!("{} at ({}, {})", item.danmaku.text, item.x, item.y);
//! }
//! # Ok::<(), danmaku::DanmakuError>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod measure;
pub mod message;
pub mod presentation;
pub mod queue;
pub mod statistics;
pub mod track;

pub use clock::PlaybackClock;
pub use config::{
    ConfigHandle, DanmakuConfig, DanmakuStyle, FixedHold, LanePacking, MAX_QUEUE_CAPACITY,
    OverloadPolicy, ScrollSpeed,
};
pub use error::{DanmakuError, Result};
pub use host::{DanmakuHost, DebugInfo, Frame, RenderItem};
pub use measure::{CellWidthMeasurer, TextMeasurer};
pub use message::{DEFAULT_COLOR, Danmaku, DanmakuItem, DanmakuLocation};
pub use presentation::{Placement, Presentation, PresentationState, scroll_x};
pub use queue::{DanmakuSender, IngestQueue, QueueCounters};
pub use statistics::{EngineStatistics, RateDataPoint, StatisticsAggregator};
pub use track::{Allocation, DropReason, LaneAssignment, TrackAllocator, Viewport};
