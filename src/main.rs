use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedboard::aggregate::aggregate_sources;
use feedboard::config::Config;
use feedboard::dashboard::build_dashboard;
use feedboard::error::StoreError;
use feedboard::fetcher::Fetcher;
use feedboard::registry::{normalize_url, prepare_source, validate_feed, SourceDraft, SourceRegistry};
use feedboard::render::HtmlDashboard;
use feedboard::store::{open_store, SourceStore};

/// Feed dashboard builder and source list admin
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Config file path
    #[arg(short = 'C', long, global = true, default_value = "feedboard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch every panel and render the dashboard
    Build {
        /// Output directory (overrides the config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge all registered sources into per-category RSS files
    Aggregate,

    /// Check that a URL serves a feed with at least one entry
    Validate { url: String },

    /// Manage the source list
    #[command(subcommand)]
    Sources(SourcesCommand),
}

#[derive(Subcommand, Debug)]
enum SourcesCommand {
    /// Print the registered sources
    List,

    /// Validate and register a new source
    Add {
        #[arg(long)]
        url: String,
        /// Defaults to the feed's own title
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        category: String,
    },

    /// Replace fields of the source at INDEX
    Edit {
        index: usize,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },

    /// Remove the source at INDEX
    Delete { index: usize },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("cannot load {}", cli.config.display()))?;
    let fetcher = Fetcher::new(config.proxy_url.clone())?;

    match cli.command {
        Commands::Build { output } => build(&config, &fetcher, output).await,
        Commands::Aggregate => aggregate(&config, &fetcher).await,
        Commands::Validate { url } => validate(&fetcher, &url).await,
        Commands::Sources(command) => sources(&config, &fetcher, command).await,
    }
}

async fn build(config: &Config, fetcher: &Fetcher, output: Option<PathBuf>) -> anyhow::Result<()> {
    info!("Loading {} panels", config.panels.len());

    let mut dashboard = HtmlDashboard::new(&config.aggregate.channel_title, config.panels.len());
    let summary = build_dashboard(fetcher, config, &mut dashboard).await;

    let dir = output.unwrap_or_else(|| config.output_dir.clone());
    let written = dashboard.write_to(&dir).await?;
    info!(
        "Dashboard written to {} ({} loaded, {} empty, {} unavailable, {} failed)",
        dir.display(),
        summary.loaded,
        summary.empty,
        summary.unavailable,
        summary.failed
    );
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn open_configured_store(config: &Config, fetcher: &Fetcher) -> anyhow::Result<Box<dyn SourceStore>> {
    let registry = config
        .registry
        .as_ref()
        .context("no [registry] section in the configuration")?;
    Ok(open_store(registry, fetcher.client().clone())?)
}

async fn aggregate(config: &Config, fetcher: &Fetcher) -> anyhow::Result<()> {
    let store = open_configured_store(config, fetcher)?;
    let registry = SourceRegistry::load(store.as_ref()).await?;

    let report = aggregate_sources(fetcher, registry.sources(), &config.aggregate).await?;
    for name in &report.failed_sources {
        warn!("Source '{}' was skipped", name);
    }
    for path in &report.written {
        println!("{}", path.display());
    }
    Ok(())
}

async fn validate(fetcher: &Fetcher, url: &str) -> anyhow::Result<()> {
    let url = normalize_url(url)?;
    let summary = validate_feed(fetcher, &url).await?;
    match summary.title {
        Some(title) => println!("valid feed: {} ({} entries) - {}", url, summary.entries, title),
        None => println!("valid feed: {} ({} entries)", url, summary.entries),
    }
    Ok(())
}

async fn sources(config: &Config, fetcher: &Fetcher, command: SourcesCommand) -> anyhow::Result<()> {
    let store = open_configured_store(config, fetcher)?;
    let mut registry = SourceRegistry::load(store.as_ref()).await?;

    match command {
        SourcesCommand::List => {
            for (index, source) in registry.sources().iter().enumerate() {
                println!(
                    "{:>3}  {:<30} {:<12} {}",
                    index, source.name, source.category, source.url
                );
            }
            return Ok(());
        }
        SourcesCommand::Add {
            url,
            name,
            category,
        } => {
            let source = prepare_source(fetcher, SourceDraft { name, url, category }).await?;
            println!("adding {} ({})", source.name, source.url);
            registry.add(source);
        }
        SourcesCommand::Edit {
            index,
            url,
            name,
            category,
        } => {
            let current = registry
                .get(index)
                .cloned()
                .with_context(|| format!("no source at index {}", index))?;
            let draft = SourceDraft {
                name: name.unwrap_or(current.name),
                url: url.unwrap_or(current.url),
                category: category.unwrap_or(current.category),
            };
            let mut source = prepare_source(fetcher, draft).await?;
            source.favicon = current.favicon;
            println!("updating #{}: {} ({})", index, source.name, source.url);
            registry.edit(index, source)?;
        }
        SourcesCommand::Delete { index } => {
            let removed = registry.delete(index)?;
            println!("removing {} ({})", removed.name, removed.url);
        }
    }

    match registry.persist(store.as_ref()).await {
        Ok(()) => {
            info!("Source list saved");
            Ok(())
        }
        Err(e @ StoreError::Conflict { .. }) => {
            Err(e).context("the source list was modified elsewhere; run the command again")
        }
        Err(e) => Err(e.into()),
    }
}
