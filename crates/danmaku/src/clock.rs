//! Playback clock.
//!
//! Maps host instants to a playback position that can be paused, sped up and
//! seeked. The frame driver only ever sees the resulting position.

use std::time::{Duration, Instant};

use crate::error::{DanmakuError, Result};

#[derive(Debug, Clone)]
pub struct PlaybackClock {
    anchor: Instant,
    anchor_position: Duration,
    rate: f64,
    playing: bool,
}

impl PlaybackClock {
    /// A paused clock at position zero.
    pub fn new(now: Instant) -> Self {
        Self {
            anchor: now,
            anchor_position: Duration::ZERO,
            rate: 1.0,
            playing: false,
        }
    }

    /// Playback position at `now`.
    pub fn position(&self, now: Instant) -> Duration {
        if !self.playing {
            return self.anchor_position;
        }
        let elapsed = now.saturating_duration_since(self.anchor);
        let scaled = Duration::try_from_secs_f64(elapsed.as_secs_f64() * self.rate)
            .unwrap_or(Duration::MAX);
        self.anchor_position.saturating_add(scaled)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn play(&mut self, now: Instant) {
        self.rebase(now);
        self.playing = true;
    }

    pub fn pause(&mut self, now: Instant) {
        self.rebase(now);
        self.playing = false;
    }

    /// Jump to `position`, keeping the play/pause state.
    pub fn seek(&mut self, now: Instant, position: Duration) {
        self.anchor = now;
        self.anchor_position = position;
    }

    /// Change the playback rate. The position does not jump.
    pub fn set_rate(&mut self, now: Instant, rate: f64) -> Result<()> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(DanmakuError::config(format!(
                "playback rate must be positive, got {rate}"
            )));
        }
        self.rebase(now);
        self.rate = rate;
        Ok(())
    }

    fn rebase(&mut self, now: Instant) {
        self.anchor_position = self.position(now);
        self.anchor = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_clock_starts_paused() {
        let t0 = Instant::now();
        let clock = PlaybackClock::new(t0);
        assert!(!clock.is_playing());
        assert_eq!(clock.position(t0 + ms(500)), Duration::ZERO);
    }

    #[test]
    fn test_play_pause_resume() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::new(t0);

        clock.play(t0);
        assert_eq!(clock.position(t0 + ms(1_000)), ms(1_000));

        clock.pause(t0 + ms(1_000));
        assert_eq!(clock.position(t0 + ms(5_000)), ms(1_000));

        clock.play(t0 + ms(5_000));
        assert_eq!(clock.position(t0 + ms(5_500)), ms(1_500));
    }

    #[test]
    fn test_rate_change_keeps_position_continuous() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::new(t0);
        clock.play(t0);

        clock.set_rate(t0 + ms(1_000), 2.0).unwrap();
        assert_eq!(clock.position(t0 + ms(1_000)), ms(1_000));
        assert_eq!(clock.position(t0 + ms(2_000)), ms(3_000));

        assert!(clock.set_rate(t0, 0.0).is_err());
        assert!(clock.set_rate(t0, f64::NAN).is_err());
        assert_eq!(clock.rate(), 2.0);
    }

    #[test]
    fn test_huge_rate_saturates() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::new(t0);
        clock.play(t0);
        clock.set_rate(t0, 1e300).unwrap();

        assert_eq!(clock.position(t0), Duration::ZERO);
        assert_eq!(clock.position(t0 + ms(1_000)), Duration::MAX);

        clock.pause(t0 + ms(2_000));
        assert_eq!(clock.position(t0 + ms(3_000)), Duration::MAX);
    }

    #[test]
    fn test_seek_both_directions() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::new(t0);
        clock.play(t0);

        clock.seek(t0 + ms(1_000), ms(60_000));
        assert_eq!(clock.position(t0 + ms(1_500)), ms(60_500));

        clock.seek(t0 + ms(2_000), ms(10_000));
        assert_eq!(clock.position(t0 + ms(2_000)), ms(10_000));

        clock.pause(t0 + ms(3_000));
        clock.seek(t0 + ms(4_000), ms(5_000));
        assert_eq!(clock.position(t0 + ms(9_000)), ms(5_000));
    }
}
