use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "imgmerge", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch two images and composite the foreground over the background.
    Merge(MergeArgs),
    /// Report whether a URL passes the scheme check.
    CheckUrl {
        url: String,
    },
}

#[derive(Parser, Debug)]
struct MergeArgs {
    /// Foreground image URL (drawn on top).
    #[arg(long)]
    foreground: String,

    /// Background image URL.
    #[arg(long)]
    background: String,

    /// JSON config file; missing fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for output images (overrides config and env).
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Public base URL used to build the retrieval link.
    #[arg(long)]
    base_url: Option<String>,

    /// Download both images at the same time.
    #[arg(long)]
    concurrent: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("imgmerge=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Merge(args) => cmd_merge(args),
        Command::CheckUrl { url } => {
            let ok = imgmerge::is_valid_url(&url);
            println!("{}", serde_json::json!({ "url": url, "valid": ok }));
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}

fn load_config(args: &MergeArgs) -> anyhow::Result<imgmerge::MergeConfig> {
    let mut cfg = match &args.config {
        Some(path) => imgmerge::MergeConfig::from_json_file(path)?,
        None => imgmerge::MergeConfig::default(),
    };
    cfg.apply_env().context("apply IMGMERGE_* environment")?;

    if let Some(dir) = &args.storage_dir {
        cfg.storage_dir = dir.clone();
    }
    if let Some(url) = &args.base_url {
        cfg.public_base_url = Some(url.clone());
    }
    if args.concurrent {
        cfg.concurrent_fetch = true;
    }
    Ok(cfg)
}

fn cmd_merge(args: MergeArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_config(&args)?;

    match imgmerge::merge(&args.foreground, &args.background, &cfg) {
        Ok(result) => {
            let body = serde_json::json!({
                "output_image": result.response(cfg.public_base_url.as_deref()),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let body = serde_json::json!({
                "error": err.message(),
                "kind": err.kind().as_str(),
                "status": err.kind().http_status(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::FAILURE)
        }
    }
}
