mod config;
mod replay;

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use wavedbg_core::library::{DebugLibrary, LogLevel};
use wavedbg_core::target::{SUPPORTED_VERSION_MAJOR, SUPPORTED_VERSION_MINOR, check_library_version};
use wavedbg_sim::SimLibrary;

use config::{CliOverrides, WavedbgConfig};

#[derive(Parser)]
#[command(name = "wavedbg", about = "GPU wave debugging target adapter")]
struct Cli {
    /// Request precise memory-violation reporting (overrides WAVEDBG_PRECISE_MEMORY)
    #[arg(long, global = true)]
    precise_memory: Option<bool>,

    /// Vendor library log level: off, error, warning, info, trace, verbose
    /// (overrides WAVEDBG_LIB_LOG_LEVEL)
    #[arg(long, global = true)]
    lib_log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved settings
    Config,
    /// Print the debug library version and the supported range
    Version,
    /// Replay a scenario against the simulated GPU
    Replay {
        /// Path to the scenario TOML file
        scenario: PathBuf,
        /// Print one JSON object per step
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

/// Execute the `wavedbg init` command: write config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile::default();
    config::save_config_to(&path, &cfg)?;

    println!("Config written to {}", path.display());
    println!("  adapter.precise_memory = {}", cfg.adapter.precise_memory);
    println!("  adapter.library_log_level = {}", cfg.adapter.library_log_level);
    println!(
        "  adapter.reset_library_on_last_detach = {}",
        cfg.adapter.reset_library_on_last_detach
    );

    Ok(())
}

/// Execute the `wavedbg config` command: print resolved settings.
fn cmd_config(cli: &CliOverrides) -> anyhow::Result<()> {
    let resolved = WavedbgConfig::resolve(cli)?;
    match &resolved.file {
        Some(path) => println!("config file: {}", path.display()),
        None => println!("config file: none ({} not found)", config::config_path().display()),
    }
    println!("precise_memory = {}", resolved.adapter.precise_memory);
    println!("library_log_level = {}", resolved.adapter.library_log_level);
    println!(
        "reset_library_on_last_detach = {}",
        resolved.adapter.reset_library_on_last_detach
    );
    Ok(())
}

/// Execute the `wavedbg version` command.
fn cmd_version() {
    let version = SimLibrary::new().version();
    let verdict = match check_library_version(version) {
        Ok(()) => "supported".to_string(),
        Err(e) => format!("unsupported: {e}"),
    };
    println!("wavedbg {}", env!("CARGO_PKG_VERSION"));
    println!("debug library {version} (simulated), {verdict}");
    println!("requires {SUPPORTED_VERSION_MAJOR}.{SUPPORTED_VERSION_MINOR} or a later {SUPPORTED_VERSION_MAJOR}.x");
}

/// Execute the `wavedbg replay` command.
fn cmd_replay(cli: &CliOverrides, path: &std::path::Path, json: bool) -> anyhow::Result<()> {
    let resolved = WavedbgConfig::resolve(cli)?;
    let scenario = replay::Scenario::load(path)?;
    let reports = replay::run(&scenario, resolved.adapter)
        .with_context(|| format!("replay of {} failed", path.display()))?;

    let mut out = std::io::stdout().lock();
    for report in &reports {
        if json {
            let line = serde_json::to_string(report).context("failed to serialize step report")?;
            writeln!(out, "{line}")?;
        } else {
            writeln!(out, "{report}")?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = CliOverrides {
        precise_memory: cli.precise_memory,
        lib_log_level: cli.lib_log_level,
    };

    match cli.command {
        Commands::Init { force } => cmd_init(force)?,
        Commands::Config => cmd_config(&overrides)?,
        Commands::Version => cmd_version(),
        Commands::Replay { scenario, json } => cmd_replay(&overrides, &scenario, json)?,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "wavedbg", &mut std::io::stdout());
        }
    }

    Ok(())
}
