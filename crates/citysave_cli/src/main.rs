use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use citysave_core::scenario::has_version_tag;
use citysave_core::{
    EngineConfig, FileSummary, LoadReport, SaveEngine, SavegameState, ScenarioState,
};
use clap::{Parser, Subcommand};
use log::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// JSON engine configuration.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Current map grid edge length, overriding the config file.
    #[arg(long = "grid-size", value_name = "N", global = true)]
    grid_size: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the version and piece layout of a file.
    Inspect {
        path: PathBuf,
        #[arg(long)]
        scenario: bool,
        /// Byte offset of the save image inside the file.
        #[arg(long, default_value_t = 0, conflicts_with = "scenario")]
        offset: u64,
        #[arg(long)]
        json: bool,
    },
    /// Load any supported version and write it in the current format.
    Upgrade {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        scenario: bool,
    },
    /// Delete a saved game.
    Delete { path: PathBuf },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.grid_size) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            process::exit(2);
        }
    };
    let mut engine = match SaveEngine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    match cli.command {
        Command::Inspect {
            path,
            scenario,
            offset,
            json,
        } => {
            let summary = if scenario {
                engine.inspect_scenario(&path)
            } else {
                engine.inspect_savegame(&path, offset)
            };
            match summary {
                Ok(summary) if json => print_json(&summary),
                Ok(summary) => print_summary(&summary),
                Err(e) => {
                    eprintln!("Error inspecting {}: {e}", path.display());
                    process::exit(1);
                }
            }
        }
        Command::Upgrade {
            input,
            output,
            scenario,
        } => {
            let result = if scenario {
                upgrade_scenario(&mut engine, &input, &output)
            } else {
                upgrade_savegame(&mut engine, &input, &output)
            };
            match result {
                Ok(report) => println!(
                    "upgraded {} ({} {:#x}{}) -> {}",
                    input.display(),
                    report.family,
                    report.version,
                    if report.migrated { ", migrated" } else { "" },
                    output.display()
                ),
                Err(e) => {
                    eprintln!("Error upgrading {}: {e}", input.display());
                    process::exit(1);
                }
            }
        }
        Command::Delete { path } => {
            if let Err(e) = engine.delete_savegame(&path) {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            println!("deleted {}", path.display());
        }
    }
}

fn load_config(path: Option<&Path>, grid_size: Option<usize>) -> Result<EngineConfig, String> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("Error reading config {}: {e}", path.display()))?;
            serde_json::from_str::<EngineConfig>(&text)
                .map_err(|e| format!("Error parsing config {}: {e}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(grid_size) = grid_size {
        config = config.with_grid_size(grid_size);
    }
    info!("engine config: {config:?}");
    Ok(config)
}

fn upgrade_scenario(
    engine: &mut SaveEngine,
    input: &Path,
    output: &Path,
) -> citysave_core::Result<LoadReport> {
    if !has_version_tag(output) {
        warn!(
            "{} has no .mpx extension and will be read back as a legacy map",
            output.display()
        );
    }
    let mut state = ScenarioState::new();
    let report = engine.load_scenario(input, &mut state)?;
    engine.save_scenario(output, &state)?;
    Ok(report)
}

fn upgrade_savegame(
    engine: &mut SaveEngine,
    input: &Path,
    output: &Path,
) -> citysave_core::Result<LoadReport> {
    let mut state = SavegameState::new();
    let report = engine.load_savegame(input, &mut state)?;
    engine.save_savegame(output, &state)?;
    Ok(report)
}

fn print_json(summary: &FileSummary) {
    match serde_json::to_string_pretty(summary) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("Error serializing summary: {e}");
            process::exit(1);
        }
    }
}

fn print_summary(summary: &FileSummary) {
    println!("family={}", summary.family);
    println!("version={:#x}", summary.version);
    println!("label={}", summary.label);
    println!("current_version={:#x}", summary.current_version);
    println!("needs_migration={}", summary.needs_migration);
    println!("grid_size={}", summary.grid_size);
    println!("decompressed_size={}", summary.decompressed_size);
    println!("pieces={}", summary.layout.pieces.len());
    for piece in &summary.layout.pieces {
        let storage = match (piece.compressed, piece.stored_raw) {
            (false, _) => "raw",
            (true, true) => "chunk/uncompressed",
            (true, false) => "chunk/compressed",
        };
        println!(
            "  {:<32} {:>9} bytes  {:>9} on disk  {storage}",
            piece.name,
            piece.size,
            piece.range.len()
        );
    }
}
