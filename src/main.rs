use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scenefinder_relay::cli::{Cli, Commands};
use scenefinder_relay::config::Config;
use scenefinder_relay::extractors::SourceKind;
use scenefinder_relay::pipeline::Pipeline;
use scenefinder_relay::retry::gate::BackoffGate;
use scenefinder_relay::{api, utils};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is the normal case outside local development
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let mut config = Config::load(cli.config.as_deref()).await?;

    match cli.command() {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            // Check for required external tools (non-fatal, they may appear on PATH later)
            for missing in utils::check_dependencies(&config.tools.yt_dlp, &config.tools.ffmpeg).await {
                tracing::warn!(tool = %missing, "External tool not available");
            }

            let gate = Arc::new(BackoffGate::new(config.backoff_cooldown()));
            let pipeline = Arc::new(Pipeline::from_config(&config, gate)?);

            tracing::info!(
                forward_url = %config.forward.url,
                sources = ?pipeline.fetchers().sources(),
                "Starting relay"
            );
            api::serve(pipeline, config.server.port).await?;
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = Config::default().save().await?;
                println!("Default configuration written to: {}", path.display());
            }
        }
        Commands::Sources => {
            println!("Supported platforms:");
            for (source, hosts, enabled) in [
                (SourceKind::YouTube, "youtube.com, youtu.be", config.youtube.enabled),
                (SourceKind::Instagram, "instagram.com posts and reels", config.instagram.enabled),
            ] {
                println!(
                    "  • {} ({}) - {}",
                    source,
                    hosts,
                    if enabled { "enabled" } else { "disabled" }
                );
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "scenefinder_relay=debug,tower_http=debug"
    } else {
        "scenefinder_relay=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
