use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON-lines replay script, or `-` for stdin
    pub script: PathBuf,

    /// Simulator config file (TOML)
    #[arg(short, long, env = "DANMAKU_SIM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub output: OutputFormat,

    /// Print one frame out of every N (default: one per second)
    #[arg(long)]
    pub every: Option<u64>,

    /// Frames per second of the simulated render loop
    #[arg(long)]
    pub fps: Option<u32>,

    /// Viewport width in pixels
    #[arg(long)]
    pub width: Option<f64>,

    /// Viewport height in pixels
    #[arg(long)]
    pub height: Option<f64>,

    /// Reuse lanes as soon as the next comment can not catch up
    #[arg(long)]
    pub dense: bool,

    /// Drop comments instead of delaying them when every lane is busy
    #[arg(long)]
    pub drop: bool,

    /// Attach layout details to every rendered comment
    #[arg(long)]
    pub debug: bool,

    /// Stop after this much simulated wall time, in milliseconds
    #[arg(long)]
    pub max_wall_ms: Option<u64>,

    /// Print the effective config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable frames and a summary
    Pretty,
    /// One JSON object per printed frame
    Json,
    /// Final statistics only
    Summary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_overrides() {
        let args = Args::parse_from([
            "danmaku-sim",
            "replay.jsonl",
            "--output",
            "json",
            "--fps",
            "30",
            "--dense",
            "--every",
            "5",
        ]);
        assert_eq!(args.script, PathBuf::from("replay.jsonl"));
        assert_eq!(args.output, OutputFormat::Json);
        assert_eq!(args.fps, Some(30));
        assert_eq!(args.every, Some(5));
        assert!(args.dense);
        assert!(!args.drop);
    }
}
