//! Simulator configuration.

use danmaku::{DanmakuConfig, LanePacking, OverloadPolicy, Viewport};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::cli::Args;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Frames per second of the simulated render loop
    pub fps: u32,
    /// Seeks longer than this clear the overlay and restart the replay at
    /// the new position; shorter ones let the engine rewind in place
    pub resync_threshold_ms: u64,
    pub viewport: ViewportConfig,
    pub engine: DanmakuConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            resync_threshold_ms: 5_000,
            viewport: ViewportConfig::default(),
            engine: DanmakuConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "Loaded simulator config");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides on top of the file.
    pub fn apply_args(&mut self, args: &Args) -> Result<()> {
        if let Some(fps) = args.fps {
            self.fps = fps;
        }
        if let Some(width) = args.width {
            self.viewport.width = width;
        }
        if let Some(height) = args.height {
            self.viewport.height = height;
        }
        if args.dense {
            self.engine.lane_packing = LanePacking::CatchUpSafe;
        }
        if args.drop {
            self.engine.overload_policy = OverloadPolicy::Drop;
        }
        if args.debug {
            self.engine.is_debug = true;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(AppError::config("fps must be at least 1"));
        }
        if !(self.viewport.width > 0.0 && self.viewport.height > 0.0) {
            return Err(AppError::config(format!(
                "viewport must be positive, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }
        self.engine.validate()?;
        Ok(())
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.viewport.width, self.viewport.height)
    }

    pub fn show(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use danmaku::ScrollSpeed;

    #[test]
    fn test_partial_toml() {
        let config = SimConfig::from_toml(
            r#"
            fps = 30

            [viewport]
            width = 1280.0

            [engine]
            display_area = 0.5
            overload_policy = "drop"

            [engine.speed]
            type = "pixels_per_second"
            px = 200.0

            [engine.style]
            font_size = 24.0
            "#,
        )
        .unwrap();

        assert_eq!(config.fps, 30);
        assert_eq!(config.viewport.width, 1280.0);
        assert_eq!(config.viewport.height, 1080.0);
        assert_eq!(config.engine.display_area, 0.5);
        assert_eq!(config.engine.overload_policy, OverloadPolicy::Drop);
        assert_eq!(config.engine.speed, ScrollSpeed::pixels_per_second(200.0));
        assert_eq!(config.engine.style.font_size, 24.0);
        assert_eq!(config.resync_threshold_ms, 5_000);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            SimConfig::from_toml("fps = 0"),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            SimConfig::from_toml("[engine]\ndisplay_area = 3.0"),
            Err(AppError::Engine(_))
        ));
        assert!(matches!(
            SimConfig::from_toml("fps = \"fast\""),
            Err(AppError::Toml(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = SimConfig::load(Some(Path::new("/nonexistent/danmaku-sim.toml"))).unwrap();
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn test_args_override_file() {
        let args = Args::parse_from([
            "danmaku-sim",
            "-",
            "--fps",
            "24",
            "--height",
            "720",
            "--dense",
            "--drop",
            "--debug",
        ]);
        let mut config = SimConfig::default();
        config.apply_args(&args).unwrap();

        assert_eq!(config.fps, 24);
        assert_eq!(config.viewport.height, 720.0);
        assert_eq!(config.engine.lane_packing, LanePacking::CatchUpSafe);
        assert_eq!(config.engine.overload_policy, OverloadPolicy::Drop);
        assert!(config.engine.is_debug);
    }

    #[test]
    fn test_show_round_trips() {
        let config = SimConfig::default();
        let shown = config.show().unwrap();
        assert_eq!(SimConfig::from_toml(&shown).unwrap(), config);
    }
}
