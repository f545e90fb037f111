use danmaku::{EngineStatistics, Frame, Placement};
#[cfg(feature = "colored-output")]
use colored::*;
use serde::Serialize;
use std::io::Write;

use crate::{cli::OutputFormat, error::Result};

/// Outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub frames: u64,
    pub wall_ms: u64,
    pub position_ms: u64,
    /// Self comments that never made it into the queue
    pub failed_submits: usize,
    pub statistics: EngineStatistics,
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    frame: u64,
    live: usize,
    #[serde(flatten)]
    frame_data: &'a Frame,
}

#[derive(Debug, Clone, Copy)]
enum Tone {
    Header,
    Key,
    Value,
    Own,
}

pub struct OutputManager<W: Write> {
    format: OutputFormat,
    every: u64,
    #[cfg_attr(not(feature = "colored-output"), allow(dead_code))]
    colored: bool,
    writer: W,
}

impl<W: Write> OutputManager<W> {
    pub fn new(format: OutputFormat, every: u64, colored: bool, writer: W) -> Self {
        Self {
            format,
            every: every.max(1),
            colored,
            writer,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write a frame if it is one of the sampled ones.
    pub fn frame(&mut self, frame_no: u64, frame: &Frame, live: usize) -> Result<()> {
        if frame_no % self.every != 0 {
            return Ok(());
        }
        match self.format {
            OutputFormat::Summary => Ok(()),
            OutputFormat::Json => {
                let record = FrameRecord {
                    frame: frame_no,
                    live,
                    frame_data: frame,
                };
                serde_json::to_writer(&mut self.writer, &record)?;
                writeln!(self.writer)?;
                Ok(())
            }
            OutputFormat::Pretty => self.frame_pretty(frame_no, frame, live),
        }
    }

    fn frame_pretty(&mut self, frame_no: u64, frame: &Frame, live: usize) -> Result<()> {
        let header = self.paint(
            &format!(
                "[frame {frame_no}] t={:.3}s live={live} visible={}",
                frame.time.as_secs_f64(),
                frame.len()
            ),
            Tone::Header,
        );
        writeln!(self.writer, "{header}")?;

        for item in &frame.items {
            let row = item
                .debug
                .map(|d| match d.placement {
                    Placement::Lane(i) => format!("lane {i}"),
                    Placement::Top(i) => format!("top {i}"),
                    Placement::Bottom(i) => format!("bottom {i}"),
                })
                .unwrap_or_else(|| "-".to_string());
            let text = if item.is_self {
                self.paint(&item.danmaku.text, Tone::Own)
            } else {
                self.paint(&item.danmaku.text, Tone::Value)
            };
            writeln!(
                self.writer,
                "  {:<9} x={:>8.1} y={:>7.1} #{:06X}  {}",
                row, item.x, item.y, item.color, text
            )?;
        }
        Ok(())
    }

    pub fn summary(&mut self, report: &SimReport) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.writer, &serde_json::json!({ "summary": report }))?;
                writeln!(self.writer)?;
            }
            OutputFormat::Summary => {
                serde_json::to_writer_pretty(&mut self.writer, report)?;
                writeln!(self.writer)?;
            }
            OutputFormat::Pretty => self.summary_pretty(report)?,
        }
        self.writer.flush()?;
        Ok(())
    }

    fn summary_pretty(&mut self, report: &SimReport) -> Result<()> {
        let s = &report.statistics;
        let title = self.paint("Simulation Summary:", Tone::Header);
        writeln!(self.writer)?;
        writeln!(self.writer, "{title}")?;

        let rows: [(&str, String); 14] = [
            ("Frames", report.frames.to_string()),
            ("Wall time", format!("{:.3}s", report.wall_ms as f64 / 1000.0)),
            ("Position", format!("{:.3}s", report.position_ms as f64 / 1000.0)),
            ("Offered", s.offered.to_string()),
            ("Rejected", s.rejected.to_string()),
            ("Submitted", s.submitted.to_string()),
            ("Cancelled", s.cancelled.to_string()),
            ("Placed", s.placed.to_string()),
            ("Delayed", s.delayed.to_string()),
            ("Dropped", s.dropped.to_string()),
            ("Filtered", s.filtered.to_string()),
            ("Retired", s.retired.to_string()),
            ("Peak live", s.peak_live.to_string()),
            (
                "Max delay",
                format!("{}ms", s.max_entry_delay.as_millis()),
            ),
        ];
        for (key, value) in rows {
            let key = self.paint(key, Tone::Key);
            let value = self.paint(&value, Tone::Value);
            writeln!(self.writer, "  {key}: {value}")?;
        }

        if !s.rate_timeseries.is_empty() {
            let key = self.paint("Placed per bucket", Tone::Key);
            writeln!(self.writer, "  {key}:")?;
            for point in &s.rate_timeseries {
                writeln!(
                    self.writer,
                    "    {:>8.1}s  {}",
                    point.start.as_secs_f64(),
                    point.count
                )?;
            }
        }
        Ok(())
    }

    #[cfg(feature = "colored-output")]
    fn paint(&self, text: &str, tone: Tone) -> String {
        if !self.colored {
            return text.to_string();
        }
        match tone {
            Tone::Header => text.green().bold().to_string(),
            Tone::Key => text.yellow().to_string(),
            Tone::Value => text.cyan().to_string(),
            Tone::Own => text.magenta().bold().to_string(),
        }
    }

    #[cfg(not(feature = "colored-output"))]
    fn paint(&self, text: &str, _tone: Tone) -> String {
        text.to_string()
    }
}
