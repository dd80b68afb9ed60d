use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use firedrill_cli::logging::init_logging;
use firedrill_cli::replay::{replay_duration, run_replay, ReplayOptions, ReplayScript};
use firedrill_cli::EXAMPLE_SCENARIO;
use firedrill_sequencer::{ScenarioConfig, Session, TriggerMode};

#[derive(Parser)]
#[command(version = env!("VERSION_STRING"), about, long_about = None)]
pub struct Cli {
    /// Enables debug mode (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    debug: u8,

    /// Also write logs to the data directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a scenario's script against its scene
    Run(RunArgs),
    /// Validate a scenario file
    Check {
        /// Scenario file
        scenario: PathBuf,
    },
    /// Write the example scenario
    Init {
        /// Where to write it (default: the config directory)
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario file (default: the one written by `init`)
    scenario: Option<PathBuf>,

    /// Frame length in milliseconds
    #[arg(long, default_value_t = 50)]
    frame_ms: u64,

    /// Seconds to run for (default: until shortly after the last scripted input)
    #[arg(short, long)]
    seconds: Option<f32>,

    /// Pace frames at wall-clock speed
    #[arg(long)]
    realtime: bool,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,
}

fn default_scenario_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "firedrill")
        .ok_or_else(|| anyhow!("Failed to find home directory"))?;
    Ok(dirs.config_dir().join("scenario.toml"))
}

fn create_example_scenario(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => default_scenario_path()?,
    };

    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&path, EXAMPLE_SCENARIO)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Created example scenario at {}", path.display());
    eprintln!("Scenario file created at: {}", path.display());
    eprintln!("Run it with: firedrill run {}", path.display());

    Ok(())
}

fn load_scenario(path: &Path) -> Result<(ScenarioConfig, ReplayScript)> {
    let config = ScenarioConfig::load(path)
        .with_context(|| format!("Failed to load scenario {}", path.display()))?;
    let script = ReplayScript::load(path)?;
    Ok((config, script))
}

fn check(path: &Path) -> Result<()> {
    let (config, script) = load_scenario(path)?;
    let catalog = config.catalog()?;

    println!("{}: ok", path.display());
    println!("  packages: {}", catalog.len());
    for mode in [
        TriggerMode::OnSessionStart,
        TriggerMode::KeyPoll,
        TriggerMode::Collision,
        TriggerMode::TriggerVolume,
        TriggerMode::Manual,
    ] {
        let count = catalog.iter().filter(|(_, p)| p.trigger.mode() == mode).count();
        if count > 0 {
            println!("    {:?}: {}", mode, count);
        }
    }
    println!(
        "  countdown: {}",
        if config.countdown.is_some() { "yes" } else { "no" }
    );
    println!(
        "  dialogue: {}",
        if config.dialogue.is_some() { "yes" } else { "no" }
    );
    println!("  fire zones: {}", config.fire_zones.len());
    println!("  scripted inputs: {}", script.script.len());

    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let path = match args.scenario {
        Some(path) => path,
        None => default_scenario_path()?,
    };
    let (mut config, script) = load_scenario(&path)?;
    if let Some(seed) = args.seed {
        config.session.seed = Some(seed);
    }

    if args.frame_ms == 0 {
        bail!("--frame-ms must be at least 1");
    }
    let duration = replay_duration(args.seconds, &script)?;
    let options = ReplayOptions {
        frame: Duration::from_millis(args.frame_ms),
        duration,
        realtime: args.realtime,
    };

    let mut session = Session::from_config(&config, config.scene.clone())?;
    let summary = run_replay(&mut session, &script, &options).await;

    println!(
        "Replayed {} frames ({} events) to t={:.2}s",
        summary.frames,
        summary.events,
        summary.elapsed.as_secs_f32()
    );
    println!("  completed: {}", summary.completed.join(", "));
    if !summary.running.is_empty() {
        println!("  still running: {}", summary.running.join(", "));
    }
    for zone in &config.fire_zones {
        if let Some(state) = session.fire_zone(&zone.name) {
            println!(
                "  {}: {}",
                zone.name,
                if state.is_extinguished() {
                    "extinguished".to_string()
                } else {
                    format!(
                        "burning ({:.1}s of {:.1}s sprayed)",
                        state.progress(),
                        zone.seconds_to_extinguish
                    )
                }
            );
        }
    }
    match &summary.failure {
        Some(reason) => println!("  result: FAILED ({})", reason),
        None => println!("  result: passed"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = init_logging("firedrill", cli.log_file, cli.debug)?;
    info!("firedrill {}", env!("VERSION_STRING"));

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Check { scenario } => check(&scenario),
        Command::Init { path, force } => create_example_scenario(path, force),
    }
}
