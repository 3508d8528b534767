use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playback_resilience::{
    candidates::CandidateResolver,
    config::Config,
    live::favorite_key,
    playlist::PlaylistFilterEngine,
    storage::{JsonFilePlaybackStore, PlaybackStore},
    utils::UrlUtils,
};

#[derive(Parser)]
#[command(name = "playback-resilience")]
#[command(version)]
#[command(about = "HLS ad filtering and playback candidate tooling")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a playlist, strip ad markers and write the filtered copy to the cache
    Filter {
        url: String,
    },
    /// Print the ordered playback candidates for a stream URL
    Candidates {
        url: String,

        /// Backend base URL (overrides config file)
        #[arg(long)]
        backend: Option<String>,

        #[arg(long)]
        source_key: Option<String>,

        /// Prefer the raw URL over the proxy routes
        #[arg(long)]
        no_ad_block: bool,
    },
    /// Print the favorite key of a live channel
    LiveKey {
        source: String,
        channel_id: String,

        #[arg(long)]
        tvg_id: Option<String>,
    },
    /// Toggle a live channel favorite in the configured store
    Favorite {
        source: String,
        channel_id: String,

        #[arg(long)]
        tvg_id: Option<String>,
    },
    /// Print the saved resume record of a title as JSON
    Resume {
        source: String,
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("playback_resilience={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Filter { url } => {
            let config = Config::load_from_file(&cli.config)?;
            info!("Configuration loaded from: {}", cli.config);

            let engine = PlaylistFilterEngine::from_config(&config.playlist_filter)?;
            match engine.create_discontinuity_filtered_playlist(&url).await {
                Some(filtered) => println!("{}", filtered.file_url),
                None => bail!(
                    "no filtered playlist could be produced for {}",
                    UrlUtils::obfuscate_credentials(&url)
                ),
            }
        }
        Command::Candidates {
            url,
            backend,
            source_key,
            no_ad_block,
        } => {
            let config = Config::load_from_file(&cli.config)?;
            let resolver = CandidateResolver::new(&config.proxy);
            let backend = backend.or(config.proxy.backend_url.clone());
            let ad_block = config.proxy.ad_block_enabled && !no_ad_block;

            let candidates = resolver.get_playback_url_candidates(
                &url,
                backend.as_deref(),
                source_key.as_deref(),
                ad_block,
            );
            if candidates.is_empty() {
                bail!("no playback candidates for an empty URL");
            }
            for candidate in candidates {
                println!("{candidate}");
            }
        }
        Command::LiveKey {
            source,
            channel_id,
            tvg_id,
        } => {
            println!("{}", favorite_key(&source, tvg_id.as_deref(), &channel_id));
        }
        Command::Favorite {
            source,
            channel_id,
            tvg_id,
        } => {
            let config = Config::load_from_file(&cli.config)?;
            let store = JsonFilePlaybackStore::from_config(&config.storage).await?;
            let key = favorite_key(&source, tvg_id.as_deref(), &channel_id);
            let favorite = store.toggle_favorite(&key).await?;
            info!(path = %store.path().display(), "favorites updated");
            println!("{key}: {}", if favorite { "added" } else { "removed" });
        }
        Command::Resume { source, id } => {
            let config = Config::load_from_file(&cli.config)?;
            let store = JsonFilePlaybackStore::from_config(&config.storage).await?;
            match store.get_resume_record(&source, &id).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => bail!("no resume record for {source}+{id}"),
            }
        }
    }

    Ok(())
}
