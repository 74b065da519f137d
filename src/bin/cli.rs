//! Bacpoll CLI - Command-line interface
//!
//! Discovers, reads and polls a controller. Without a protocol stack
//! attached the controller is answered by a simulated one loaded from a
//! fixture file.

use anyhow::{bail, Context};
use bacpoll_core::cli::{self, logging, CliResult, OutputFormat};
use bacpoll_core::config::AppConfig;
use bacpoll_core::{ControllerFixture, Device, SimulatedController};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Bacpoll CLI
#[derive(Parser, Debug)]
#[command(
    name = "bacpoll",
    version,
    about = "Discover, read and poll building-automation controllers",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Which controller to talk to
#[derive(Args, Debug, Clone)]
struct Target {
    /// Controller profile from the configuration file
    #[arg(short, long)]
    profile: Option<String>,

    /// Simulated controller fixture
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Controller address (defaults to the fixture's)
    #[arg(short, long)]
    address: Option<String>,

    /// Device instance (defaults to the fixture's)
    #[arg(short, long)]
    device_id: Option<u32>,

    /// Fail instead of reporting an empty device when the controller does not answer
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover a controller and list its points
    Discover {
        #[command(flatten)]
        target: Target,
    },

    /// Read points (all points when no name is given)
    Read {
        #[command(flatten)]
        target: Target,

        /// Point names
        names: Vec<String>,

        /// Points per request
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Read each point on its own, refreshing its cached value
        #[arg(long)]
        single: bool,
    },

    /// Poll a controller until interrupted
    Poll {
        #[command(flatten)]
        target: Target,

        /// Seconds between polls (0 stops), defaults to the configured interval
        #[arg(short, long)]
        interval: Option<String>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Show device information
    Info {
        #[command(flatten)]
        target: Target,
    },

    /// List exit codes
    ExitCodes,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(cli::ExitCodes::CONFIG_ERROR);
        }
    };

    let _guard = match logging::init(&config.logging, cli.verbose, cli.quiet) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(cli::ExitCodes::CONFIG_ERROR);
        }
    };

    let result = match run(&cli, &config).await {
        Ok(()) => CliResult::success(),
        Err(e) => CliResult::from(&e),
    };

    if let CliResult::Error(_, msg) = &result {
        eprintln!("Error: {}", msg);
    }
    result.to_exit_code()
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path).with_context(|| format!("Could not load {}", path.display())),
        None => AppConfig::load().context("Could not load configuration"),
    }
}

async fn run(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Discover { target } => {
            let device = connect(config, target).await?;
            println!("{}", cli::format_points(device.catalog().points(), cli.format));
        }
        Commands::Read {
            target,
            names,
            batch_size,
            single,
        } => {
            let device = connect(config, target).await?;
            read(cli, &device, names, *batch_size, *single).await?;
        }
        Commands::Poll {
            target,
            interval,
            duration,
        } => {
            let device = connect(config, target).await?;
            poll(cli, &device, interval.as_deref(), *duration).await?;
        }
        Commands::Info { target } => {
            let device = connect(config, target).await?;
            println!("{}", cli::format_device(&device, cli.format));
        }
        Commands::ExitCodes => cli::print_exit_codes(),
    }
    Ok(())
}

async fn connect(config: &AppConfig, target: &Target) -> anyhow::Result<Device> {
    let profile = target.profile.as_deref().map(|name| config.profile(name)).transpose()?;

    let Some(fixture_path) = target
        .fixture
        .clone()
        .or_else(|| profile.and_then(|p| p.fixture.clone()))
    else {
        bail!("No controller fixture given (use --fixture or a profile with one)");
    };
    let fixture = ControllerFixture::load(&fixture_path)
        .with_context(|| format!("Could not load fixture {}", fixture_path.display()))?;

    let address = target
        .address
        .clone()
        .or_else(|| profile.map(|p| p.address.clone()))
        .unwrap_or_else(|| fixture.address.clone());
    let device_id = target
        .device_id
        .or_else(|| profile.map(|p| p.device_id))
        .unwrap_or(fixture.device_id);

    let mut device_config = config.device_config(&address, device_id);
    device_config.discovery.fail_on_unreachable |= target.strict;

    info!("Connecting to {} (device {})", address, device_id);
    let network = Arc::new(SimulatedController::new(fixture));
    Ok(Device::connect_with_config(device_config, network).await?)
}

async fn read(
    cli: &Cli,
    device: &Device,
    names: &[String],
    batch_size: Option<usize>,
    single: bool,
) -> anyhow::Result<()> {
    let names = if names.is_empty() {
        device.catalog().names()
    } else {
        names.to_vec()
    };

    let mut points = Vec::with_capacity(names.len());
    if single {
        for name in &names {
            points.push(device.get(name).await?);
        }
    } else {
        let report = device
            .read_multiple_with(&names, batch_size.unwrap_or(device.batch_size()))
            .await?;
        if !cli.quiet {
            eprintln!("{}", cli::format_report(&report, OutputFormat::Text));
        }
        for name in &names {
            points.push(device.point(name)?.clone());
        }
    }

    println!("{}", cli::format_points(&points, cli.format));
    Ok(())
}

async fn poll(cli: &Cli, device: &Device, interval: Option<&str>, duration: Option<u64>) -> anyhow::Result<()> {
    let state = match interval {
        Some(command) => device.poll(command.parse::<bacpoll_core::PollCommand>()?)?,
        None => device.poll(true)?,
    };
    if !state.is_running() {
        info!("Polling not started");
        return Ok(());
    }
    if !cli.quiet {
        eprintln!("Polling {} ({}), Ctrl+C to stop", device, state);
    }

    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await.context("Could not listen for Ctrl+C")?;
        }
    }

    device.stop_polling();
    println!("{}", cli::format_points(device.catalog().points(), cli.format));
    if !cli.quiet {
        eprintln!("{}", cli::format_poll_stats(&device.poll_stats(), OutputFormat::Text));
    }
    Ok(())
}
