//! rustwos - resumable bibliographic enrichment pipeline
//!
//! ## Usage
//!
//! ```bash
//! rustwos harvest "Franco Nori"
//! rustwos enrich "Franco Nori" --output ./out
//! rustwos run "Franco Nori" --config rustwos.toml
//! rustwos cookies import cookies.json
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rustwos::checkpoint::{load_table, CheckpointStore};
use rustwos::config::AppConfig;
use rustwos::cookies::CookieManager;
use rustwos::harvest::Harvester;
use rustwos::paths::OutputPaths;
use rustwos::pipeline::Enricher;
use rustwos::source::wos::WosSource;
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Resumable bibliographic enrichment pipeline
#[derive(Parser)]
#[command(name = "rustwos")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for all tables
    #[arg(short, long, global = true, default_value = ".")]
    output: PathBuf,

    /// Last name used to pick the author's address (default: last word of the author name)
    #[arg(long, global = true)]
    last_name: Option<String>,

    /// Portal base URL (overrides config)
    #[arg(long, global = true)]
    portal_url: Option<String>,

    /// Proxy URL for all requests (e.g., http://127.0.0.1:7890)
    #[arg(long, global = true)]
    proxy: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest the author's publication list into *_original.csv
    Harvest {
        /// Author full name
        author: String,
    },

    /// Enrich an existing table, resuming from *_all.csv when present
    Enrich {
        /// Author full name
        author: String,

        /// Input table (default: *_all.csv if it exists, else *_original.csv)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Harvest, then enrich
    Run {
        /// Author full name
        author: String,
    },

    /// Manage cookies
    Cookies {
        #[command(subcommand)]
        action: CookieAction,
    },
}

#[derive(Subcommand)]
enum CookieAction {
    /// Show cookie file path
    Path,
    /// Clear stored cookies
    Clear,
    /// Import a JSON cookie array exported from the browser
    Import {
        /// JSON file (reads stdin when omitted)
        file: Option<PathBuf>,
    },
}

/// Settings shared by the pipeline commands.
struct RunContext {
    config: AppConfig,
    output: PathBuf,
    last_name: Option<String>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let started = Local::now();
    info!("Started at {}", started.format("%Y-%m-%d %H:%M:%S"));

    let result = match &cli.command {
        Commands::Cookies { action } => handle_cookies(action),
        command => run_command(&cli, command).await,
    };

    info!("Total runtime: {}", format_runtime(Local::now() - started));
    result
}

async fn run_command(cli: &Cli, command: &Commands) -> Result<()> {
    let ctx = RunContext {
        config: load_config(cli)?,
        output: cli.output.clone(),
        last_name: cli.last_name.clone(),
    };

    match command {
        Commands::Harvest { author } => run_harvest(author, &ctx).await.map(|_| ()),
        Commands::Enrich { author, input } => run_enrich(author, input.clone(), &ctx).await,
        Commands::Run { author } => {
            run_harvest(author, &ctx).await?;
            run_enrich(author, None, &ctx).await
        }
        Commands::Cookies { action } => handle_cookies(action),
    }
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;

    if let Some(url) = &cli.portal_url {
        config.portal.base_url = url.clone();
    }
    if let Some(proxy) = &cli.proxy {
        config.portal.proxy = Some(proxy.clone());
        config.harvest.proxy = Some(proxy.clone());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

// ============================================================================
// Pipeline Commands
// ============================================================================

async fn run_harvest(author: &str, ctx: &RunContext) -> Result<PathBuf> {
    println!("\n--- Harvest: {} ---", author);

    let paths = OutputPaths::for_author(&ctx.output, author);
    let cookies = CookieManager::default().load();
    let harvester = Harvester::new(&ctx.config.harvest, &cookies)?;

    let table = harvester
        .harvest(author, &paths)
        .await
        .context("Publication harvest failed")?;

    println!("Harvested {} publications -> {}", table.len(), paths.original.display());
    Ok(paths.original)
}

async fn run_enrich(author: &str, input: Option<PathBuf>, ctx: &RunContext) -> Result<()> {
    println!("\n--- Enrich: {} ---", author);

    let paths = OutputPaths::for_author(&ctx.output, author);
    paths.ensure_dir().context("Failed to create output directory")?;

    let input = input.unwrap_or_else(|| {
        if paths.all.exists() {
            paths.all.clone()
        } else {
            paths.original.clone()
        }
    });
    let table = load_table(&input).with_context(|| format!("Failed to load {}", input.display()))?;
    let store = CheckpointStore::new(&paths.all);

    let cookies = CookieManager::default().load();
    let source = WosSource::new(&ctx.config.portal, &cookies)?;
    let last_name = ctx
        .last_name
        .clone()
        .unwrap_or_else(|| default_last_name(author));
    info!(last_name = %last_name, input = %input.display(), "Enrichment input");

    let mut enricher = Enricher::new(source, &ctx.config.enrich, last_name);
    let outcome = enricher.run(table, &store).await.context("Enrichment aborted")?;
    let split = outcome
        .write_outputs(&paths)
        .context("Failed to write result tables")?;

    println!("\n=== Summary ===");
    println!("Processed: {}", outcome.stats.processed);
    println!("Enriched:  {}", outcome.stats.succeeded);
    println!("Failed:    {}", outcome.stats.failed);
    println!("Clean:     {} -> {}", split.clean.len(), paths.clean.display());
    println!("Abandoned: {} -> {}", split.abandon.len(), paths.abandon.display());
    Ok(())
}

/// Last whitespace-separated word of the author name.
fn default_last_name(author: &str) -> String {
    author
        .split_whitespace()
        .last()
        .unwrap_or(author)
        .to_string()
}

/// `HH:MM:SS`, hours unbounded.
fn format_runtime(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

// ============================================================================
// Cookie Management
// ============================================================================

fn handle_cookies(action: &CookieAction) -> Result<()> {
    let manager = CookieManager::new()?;

    match action {
        CookieAction::Path => {
            println!("Cookie file: {:?}", manager.path());
        }
        CookieAction::Clear => {
            manager.clear()?;
            println!("Cookies cleared.");
        }
        CookieAction::Import { file } => {
            let json = match file {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    println!("Paste cookies as JSON, then end input with Ctrl-D:");
                    println!("Format: [{{\"name\":\"SID\",\"value\":\"xxx\",\"domain\":\".clarivate.cn\"}},...]");
                    let mut input = String::new();
                    std::io::stdin().read_to_string(&mut input)?;
                    input
                }
            };
            let count = manager
                .import_json(json.trim())
                .context("Failed to parse cookies")?;
            println!("Saved {} cookies to {:?}", count, manager.path());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_last_name() {
        assert_eq!(default_last_name("Franco Nori"), "Nori");
        assert_eq!(default_last_name("  Cheng-Wei   Qiu "), "Qiu");
        assert_eq!(default_last_name("Plato"), "Plato");
    }

    #[test]
    fn test_format_runtime() {
        assert_eq!(format_runtime(chrono::Duration::seconds(3725)), "01:02:05");
        assert_eq!(format_runtime(chrono::Duration::seconds(59)), "00:00:59");
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "rustwos",
            "enrich",
            "Franco Nori",
            "--last-name",
            "Nori",
            "--output",
            "out",
        ])
        .expect("valid arguments");
        assert_eq!(cli.last_name.as_deref(), Some("Nori"));
        assert_eq!(cli.output, PathBuf::from("out"));
        assert!(matches!(cli.command, Commands::Enrich { input: None, .. }));
    }
}
