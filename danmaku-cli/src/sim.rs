//! Fixed-rate render loop over a replay script.
//!
//! Wall time is simulated: frame `n` happens `n / fps` seconds after the
//! start, and the playback clock is derived from it, so runs are
//! reproducible and take no real time.

use danmaku::{CellWidthMeasurer, DanmakuHost, DanmakuItem, DanmakuSender, PlaybackClock};
use std::collections::VecDeque;
use std::io::Write;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::error::Result;
use crate::output::{OutputManager, SimReport};
use crate::script::{Control, ReplaySource, Script, TimedControl};

pub struct Simulator {
    host: DanmakuHost,
    sender: DanmakuSender,
    source: ReplaySource,
    controls: VecDeque<TimedControl>,
    clock: PlaybackClock,
    start: Instant,
    fps: u32,
    resync_threshold: Duration,
    max_wall: Option<Duration>,
    submits: Vec<JoinHandle<danmaku::Result<()>>>,
}

impl Simulator {
    pub fn new(config: &SimConfig, script: Script) -> Result<Self> {
        let host = DanmakuHost::new(
            config.engine.clone(),
            config.viewport(),
            CellWidthMeasurer::default(),
        )?;
        let sender = host.sender();
        let (source, controls) = script.into_parts();

        let start = Instant::now();
        let mut clock = PlaybackClock::new(start);
        clock.play(start);

        Ok(Self {
            host,
            sender,
            source,
            controls: controls.into(),
            clock,
            start,
            fps: config.fps.max(1),
            resync_threshold: Duration::from_millis(config.resync_threshold_ms),
            max_wall: None,
            submits: Vec::new(),
        })
    }

    /// Stop after this much simulated wall time even if comments remain.
    pub fn with_max_wall(mut self, max_wall: Option<Duration>) -> Self {
        self.max_wall = max_wall;
        self
    }

    pub async fn run<W: Write>(mut self, output: &mut OutputManager<W>) -> Result<SimReport> {
        info!(
            comments = self.source.remaining(),
            controls = self.controls.len(),
            fps = self.fps,
            lanes = self.host.lane_count(),
            "Starting simulation"
        );

        let mut frame_no: u64 = 0;
        let mut wall;
        loop {
            wall = Duration::from_secs_f64(frame_no as f64 / self.fps as f64);
            let now = self.start + wall;

            self.apply_controls(wall, now)?;
            let position = self.clock.position(now);
            self.feed(position);
            // Let pending submissions reach the queue before the tick
            tokio::task::yield_now().await;

            let frame = self.host.tick(position);
            output.frame(frame_no, &frame, self.host.live_count())?;
            frame_no += 1;

            if self.is_finished() {
                break;
            }
            if self.max_wall.is_some_and(|max| wall >= max) {
                warn!(
                    wall_ms = wall.as_millis() as u64,
                    remaining = self.source.remaining(),
                    "Wall time limit reached"
                );
                break;
            }
            if !self.clock.is_playing() && self.controls.is_empty() {
                warn!("Playback paused with no further controls, stopping");
                break;
            }
        }

        self.host.shutdown();
        let mut failed_submits = 0;
        for handle in self.submits.drain(..) {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(error = %e, "Self comment was not admitted");
                    failed_submits += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Submit task failed");
                    failed_submits += 1;
                }
            }
        }

        let report = SimReport {
            frames: frame_no,
            wall_ms: wall.as_millis() as u64,
            position_ms: self.host.now().as_millis() as u64,
            failed_submits,
            statistics: self.host.statistics(),
        };
        info!(
            frames = report.frames,
            placed = report.statistics.placed,
            dropped = report.statistics.dropped,
            "Simulation finished"
        );
        Ok(report)
    }

    fn apply_controls(&mut self, wall: Duration, now: Instant) -> Result<()> {
        while self.controls.front().is_some_and(|c| c.at <= wall) {
            let Some(TimedControl { control, .. }) = self.controls.pop_front() else {
                break;
            };
            match control {
                Control::Seek(to) => {
                    let from = self.clock.position(now);
                    self.clock.seek(now, to);
                    let resync = to.abs_diff(from) > self.resync_threshold;
                    if resync {
                        self.host.clear();
                        self.source.reposition(to);
                    } else if to > from {
                        self.source.reposition(to);
                    }
                    // A short backward seek keeps the released comments live
                    // in the host, so the source must not hand them out again.
                    info!(
                        from_ms = from.as_millis() as u64,
                        to_ms = to.as_millis() as u64,
                        resync,
                        "Seek"
                    );
                }
                Control::Pause => {
                    self.clock.pause(now);
                    debug!("Pause");
                }
                Control::Play => {
                    self.clock.play(now);
                    debug!("Play");
                }
                Control::Rate(rate) => {
                    self.clock.set_rate(now, rate)?;
                    debug!(rate, "Rate change");
                }
            }
        }
        Ok(())
    }

    fn feed(&mut self, position: Duration) {
        for item in self.source.due(position) {
            if item.is_self {
                let sender = self.sender.clone();
                let item: DanmakuItem = item.clone();
                self.submits
                    .push(tokio::spawn(async move { sender.submit_item(item).await }));
            } else if !self.sender.offer_item(item.clone()) {
                debug!(id = %item.danmaku.id, "Queue full, comment not admitted");
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.controls.is_empty()
            && self.source.is_exhausted()
            && self.submits.iter().all(JoinHandle::is_finished)
            && self.host.queued() == 0
            && self.host.live_count() == 0
    }
}
