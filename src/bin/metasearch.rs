//! CLI binary for metasearch.
//!
//! All tracing output goes to stderr so that stdout carries only results
//! (or bridge protocol lines).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use metasearch::bridge::{BridgeHandler, run_stdio_bridge};
use metasearch::{OutputFormat, SearchRequest, Settings, logging};
use tracing::{Instrument as _, info};

/// Metasearch: query many search engines at once and merge the results.
#[derive(Parser)]
#[command(name = "metasearch", version, about)]
struct Cli {
    /// Path to TOML settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run one search and print the merged results.
    Search {
        /// Query words; `!engine`, `!category` and `:lang` selectors allowed.
        #[arg(required = true)]
        words: Vec<String>,

        /// Category to search (repeatable).
        #[arg(short = 'c', long = "category")]
        categories: Vec<String>,

        /// Language code, e.g. `en` or `de-CH`.
        #[arg(long)]
        lang: Option<String>,

        /// Result page, starting at 1.
        #[arg(long)]
        page: Option<u32>,

        /// Safe-search level: 0 off, 1 moderate, 2 strict.
        #[arg(long)]
        safe_search: Option<u8>,

        /// Overall time limit in seconds.
        #[arg(long)]
        timeout: Option<f64>,

        /// Output format: json or text.
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List configured engines and their ban state.
    Engines,

    /// Validate the settings file and exit.
    CheckConfig,

    /// Write an example settings file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Serve newline-delimited JSON commands on stdin/stdout.
    Bridge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings_path = cli.config.clone();

    if let Command::InitConfig { force } = cli.command {
        let path = settings_path.unwrap_or_else(Settings::default_config_path);
        return init_config(&path, force);
    }

    let settings = Settings::load(settings_path.as_deref())
        .with_context(|| match &settings_path {
            Some(path) => format!("failed to load settings from {}", path.display()),
            None => "failed to load settings".to_owned(),
        })?;
    let _log_guard = logging::init(&settings.logging)?;

    match cli.command {
        Command::Search {
            words,
            categories,
            lang,
            page,
            safe_search,
            timeout,
            format,
        } => {
            let request = SearchRequest {
                q: words.join(" "),
                categories,
                language: lang,
                page,
                safe_search,
                timeout_limit: timeout,
            };
            run_search(&settings, request, &format).await
        }
        Command::Engines => list_engines(&settings),
        Command::CheckConfig => check_config(&settings),
        Command::Bridge => run_bridge(&settings).await,
        Command::InitConfig { .. } => Ok(()),
    }
}

async fn run_search(settings: &Settings, request: SearchRequest, format: &str) -> anyhow::Result<()> {
    let format = OutputFormat::enabled(format, &settings.search)?;
    let metasearch = settings.build()?;
    let query = request.resolve(&metasearch, &settings.search)?;

    let search_id = uuid::Uuid::new_v4();
    let response = metasearch
        .search(&query)
        .instrument(tracing::info_span!("search", id = %search_id))
        .await;
    info!(
        results = response.results.len(),
        elapsed_ms = response.elapsed_ms,
        "search finished"
    );
    println!("{}", format.render(&response)?);
    Ok(())
}

fn list_engines(settings: &Settings) -> anyhow::Result<()> {
    let metasearch = Arc::new(settings.build()?);
    let handler = BridgeHandler::new(
        metasearch,
        settings.search.clone(),
        &settings.general.instance_name,
    );
    let status = handler.status(chrono::Utc::now());
    for (engine, health) in handler.engines().iter().zip(&status) {
        let state = if !engine.enabled {
            "disabled"
        } else if health.suspended {
            "suspended"
        } else {
            "active"
        };
        println!(
            "{:<20} !{:<8} {:<10} {:>6} ms  weight {:.1}  [{}]",
            engine.name,
            engine.shortcut,
            state,
            engine.timeout_ms,
            engine.weight,
            engine.categories.join(", ")
        );
    }
    Ok(())
}

fn check_config(settings: &Settings) -> anyhow::Result<()> {
    settings.validate()?;
    let enabled = settings.engines.iter().filter(|e| !e.disabled).count();
    println!(
        "settings OK: {} engine(s), {} enabled, {} categories",
        settings.engines.len(),
        enabled,
        settings.categories.len()
    );
    if enabled == 0 {
        tracing::warn!("no enabled engines; every search will report no eligible engines");
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    Settings::example().save_to_file(path)?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn run_bridge(settings: &Settings) -> anyhow::Result<()> {
    let metasearch = Arc::new(settings.build()?);
    let handler = BridgeHandler::new(
        metasearch,
        settings.search.clone(),
        &settings.general.instance_name,
    );
    info!(instance = %settings.general.instance_name, "bridge starting");

    tokio::select! {
        result = run_stdio_bridge(handler) => {
            result.map_err(|e| {
                tracing::error!(error = %e, "bridge exited with error");
                anyhow::anyhow!("bridge failed: {e}")
            })?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; shutting down bridge");
        }
    }

    info!("bridge shut down cleanly");
    Ok(())
}
