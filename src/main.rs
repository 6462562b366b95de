use clap::{Parser, Subcommand};
use crawl_service::{CrawlOrchestrator, CrawlService, FeedScanner};
use database::{open_store, DedupStore};
use fingerprint_engine::fingerprinter::DEFAULT_THUMBNAIL_SIZE;
use fingerprint_engine::{PerceptualHasher, PostFingerprinter};
use imgur_client::{ImgurApiClient, ImgurOAuth2Config, RateLimitConfig, RateLimitedClient};
use reposter_core::{AppConfig, CoreError, Fingerprint, Section};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "reposter=info,crawl_service=info,imgur_client=info,fingerprint_engine=info,database=info";

/// Replays the top comment of a known image on its reposts
#[derive(Parser, Debug)]
#[command(name = "reposter", version, about)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config/reposter.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl gallery sections until interrupted
    Run {
        /// Only crawl these sections (hot, user); defaults to every enabled one
        #[arg(short, long)]
        section: Vec<Section>,
    },

    /// Print the hash of each image file and their combined fingerprint
    Hash {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Mark a fingerprint so posts matching it are never commented on
    Blacklist { fingerprint: String },

    /// Show the stored value for a post id or fingerprint
    Inspect { key: String },
}

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { section } => {
            let config = AppConfig::load(&cli.config)?;
            run(config, section).await
        }
        Command::Hash { files } => hash_files(&files),
        Command::Blacklist { fingerprint } => {
            let config = AppConfig::load(&cli.config)?;
            let fingerprint = Fingerprint::parse(&fingerprint).ok_or_else(|| {
                CoreError::InvalidInput {
                    message: format!("not a fingerprint: {}", fingerprint),
                }
            })?;
            let store = open_store(&config.store).await?;
            store.blacklist_fingerprint(&fingerprint).await?;
            tracing::info!("Blacklisted {}", fingerprint);
            Ok(())
        }
        Command::Inspect { key } => {
            let config = AppConfig::load(&cli.config)?;
            let store = open_store(&config.store).await?;
            match store.get(&key).await? {
                Some(value) => println!("{}\t{}", key, value),
                None => println!("{}\t(absent)", key),
            }
            Ok(())
        }
    }
}

async fn run(config: AppConfig, requested: Vec<Section>) -> Result<(), CoreError> {
    tracing::info!("Starting reposter");

    let sections = if requested.is_empty() {
        config.sections.enabled()
    } else {
        requested
    };
    if sections.is_empty() {
        return Err(CoreError::InvalidInput {
            message: "no gallery section enabled".to_string(),
        });
    }

    let store = open_store(&config.store).await?;
    let shutdown = CancellationToken::new();
    let mut service = CrawlService::new(shutdown.clone());

    let oauth = ImgurOAuth2Config::new(
        config.credentials.client_id.clone(),
        config.credentials.client_secret.clone(),
        config.credentials.refresh_token.clone(),
    );
    let limits = RateLimitConfig {
        credit_floor: config.budget.credit_floor,
        cooldown: config.budget.cooldown(),
    };
    let thumbnail_size = config
        .client
        .thumbnail_size
        .chars()
        .next()
        .unwrap_or(DEFAULT_THUMBNAIL_SIZE);

    for section in sections {
        // One client per section; a client serves a single caller
        let api = ImgurApiClient::new(
            &oauth,
            &config.client.user_agent,
            config.client.request_timeout(),
        )?;
        let client = RateLimitedClient::new(api, limits.clone(), shutdown.clone());
        let section_config = config.sections.get(section);
        let scanner = FeedScanner::new(
            section,
            section_config.pages_per_cycle,
            section_config.poll_interval(),
            shutdown.clone(),
        );
        let orchestrator = CrawlOrchestrator::new(
            section,
            client,
            store.clone(),
            PostFingerprinter::new(thumbnail_size),
        );
        service.spawn_section(orchestrator, scanner);
    }

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Quitting");
            signal_token.cancel();
        }
    });

    service.wait().await
}

fn hash_files(files: &[PathBuf]) -> Result<(), CoreError> {
    let hasher = PerceptualHasher::new();
    let mut hashes = Vec::with_capacity(files.len());

    for path in files {
        let bytes = std::fs::read(path)?;
        match hasher.hash(&bytes) {
            Ok(hash) => {
                println!("{}\t{}", path.display(), hash);
                hashes.push(hash);
            }
            Err(error) => tracing::warn!("Skipping {}: {}", path.display(), error),
        }
    }

    match Fingerprint::from_hashes(&hashes) {
        Some(fingerprint) => {
            println!("{}", fingerprint);
            Ok(())
        }
        None => Err(CoreError::InvalidInput {
            message: "none of the files could be hashed".to_string(),
        }),
    }
}
