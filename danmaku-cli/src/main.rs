mod cli;
mod config;
mod error;
mod output;
mod script;
mod sim;

use crate::{
    cli::{Args, OutputFormat},
    config::SimConfig,
    error::Result,
    output::OutputManager,
    script::Script,
    sim::Simulator,
};
use anyhow::Context;
use clap::Parser;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, IsTerminal},
    path::Path,
    time::Duration,
};
use tracing::{Level, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let mut config = SimConfig::load(args.config.as_deref())
        .with_context(|| format!("Failed to load config {:?}", args.config))?;
    config
        .apply_args(&args)
        .context("Invalid command line overrides")?;

    if args.show_config {
        println!("{}", config.show()?);
        return Ok(());
    }

    let script = load_script(&args.script)
        .with_context(|| format!("Failed to read script {}", args.script.display()))?;
    info!(
        comments = script.comment_count(),
        last_ms = script.last_play_time().as_millis() as u64,
        "Loaded replay script"
    );

    let every = args.every.unwrap_or(config.fps as u64);
    let colored = args.output == OutputFormat::Pretty && io::stdout().is_terminal();
    let mut output = OutputManager::new(args.output, every, colored, io::stdout().lock());

    let report = Simulator::new(&config, script)?
        .with_max_wall(args.max_wall_ms.map(Duration::from_millis))
        .run(&mut output)
        .await?;
    output.summary(&report)?;
    Ok(())
}

fn load_script(path: &Path) -> Result<Script> {
    let reader: Box<dyn BufRead> = if path == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(path)?))
    };
    Script::parse(reader)
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .init();
}
