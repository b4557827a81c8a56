//! `ucfs` command-line tool.
//!
//! Usage:
//!   ucfs encode '[🕉️]music[🕉️]chants[🕉️]108.mp3'
//!   ucfs encode --json '[a]Home[a]Docs'
//!   ucfs map 🕉️ /mnt/sacred
//!   ucfs unmap 🕉️
//!   ucfs list
//!   echo hi | ucfs put '[a]notes'
//!   ucfs cat '[a]notes'
//!   ucfs stat '[a]notes'
//!
//! Set `RUST_LOG=debug` to trace each request through the overlay.

mod commands;

use std::ffi::OsString;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing_subscriber::{EnvFilter, fmt};

use commands::Status;
use ucfs_core::{Overlay, UcfsConfig};

/// Unicode Character File System tools.
#[derive(Parser, Debug)]
#[command(name = "ucfs", version)]
#[command(about = "Inspect UCFS paths, manage delimiter mappings, and do I/O through the overlay")]
struct Cli {
    /// Config file (default: <config dir>/ucfs/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Registry file, overriding the config
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show how a path parses and where it lands
    Encode {
        path: OsString,
        /// Print a JSON object instead of text
        #[arg(long)]
        json: bool,
    },
    /// Map a delimiter token to a backing root
    Map { token: String, root: String },
    /// Remove a delimiter mapping
    Unmap { token: String },
    /// Print every mapping in registry file syntax
    List,
    /// Write a file's contents to stdout
    Cat { path: OsString },
    /// Show a file's attributes
    Stat { path: OsString },
    /// Replace a file's contents with stdin
    Put { path: OsString },
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("{}", commands::error_line(&e));
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<UcfsConfig> {
    let mut config = match cli.config.clone().or_else(UcfsConfig::default_path) {
        Some(path) => UcfsConfig::load(&path)?,
        None => UcfsConfig::default(),
    };
    if let Some(registry) = &cli.registry {
        config.registry = Some(registry.display().to_string());
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<Status> {
    let config = load_config(&cli)?;
    let overlay: Overlay = config.build_overlay()?;
    tracing::debug!(?config, "overlay ready");

    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr();

    match cli.command {
        Command::Encode { path, json } => {
            commands::encode(&overlay, path.as_bytes(), json, &mut stdout)?;
        }
        Command::Map { token, root } => return commands::map(&overlay, &token, &root, &mut stderr),
        Command::Unmap { token } => return commands::unmap(&overlay, &token, &mut stderr),
        Command::List => commands::list(&overlay, &mut stdout)?,
        Command::Cat { path } => commands::cat(&overlay, path.as_bytes(), &mut stdout).await?,
        Command::Stat { path } => commands::stat(&overlay, path.as_bytes(), &mut stdout).await?,
        Command::Put { path } => {
            let mut data = Vec::new();
            tokio::io::stdin().read_to_end(&mut data).await?;
            let written = commands::put(&overlay, path.as_bytes(), &data).await?;
            tracing::info!(bytes = written, "wrote file");
        }
    }

    stdout.flush()?;
    Ok(Status::Ok)
}
