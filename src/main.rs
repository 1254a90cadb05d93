use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use portfolio_thumbs_lib::config::load_config;
use portfolio_thumbs_lib::generator::run_backfill;
use portfolio_thumbs_lib::state::AppState;
use portfolio_thumbs_lib::{init_tracing, keys, run_lambda};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file; environment variables override it
    #[arg(long, env = "THUMBS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve Lambda invocations
    Lambda,
    /// Generate the thumbnail for one object
    Generate {
        key: String,
        #[arg(long)]
        bucket: Option<String>,
    },
    /// Print a signed URL for a stored path
    Resolve {
        path: String,
        /// resolve the original instead of the thumbnail
        #[arg(long)]
        original: bool,
    },
    /// Generate every missing thumbnail under a prefix
    Backfill {
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Print the thumbnail key for a source key
    Derive { key: String },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(matches!(args.command, Command::Lambda));

    if let Command::Derive { key } = &args.command {
        let thumbnail_key = keys::derive_thumbnail_key(key)?;
        return print_json(&serde_json::json!({
            "sourceKey": key,
            "thumbnailKey": thumbnail_key,
        }));
    }

    let config = load_config(args.config.as_deref())?;
    let state = AppState::from_config(config).await;

    match args.command {
        Command::Lambda => run_lambda(state).await.map_err(|e| anyhow::anyhow!(e)),
        Command::Generate { key, bucket } => {
            let bucket = match bucket {
                Some(b) => b,
                None => state.config.require_bucket()?.to_string(),
            };
            let outcome = state
                .generator
                .generate(&bucket, &key)
                .await
                .with_context(|| format!("thumbnail generation failed for {}", key))?;
            print_json(&outcome)
        }
        Command::Resolve { path, original } => {
            state.config.require_bucket()?;
            let resolved = state.resolver.resolve(&path, !original).await?;
            print_json(&resolved)
        }
        Command::Backfill {
            prefix,
            concurrency,
        } => {
            let bucket = state.config.require_bucket()?;
            let concurrency = concurrency.unwrap_or(state.config.backfill_concurrency);
            let stats = run_backfill(&state.generator, bucket, &prefix, concurrency).await;
            print_json(&stats)
        }
        Command::Derive { .. } => Ok(()),
    }
}
