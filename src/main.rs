//! # Sector Desk
//!
//! Turns the crawler's per-sector news snapshots into generated artifacts
//! with a Gemini-compatible LLM service, and keeps a dated history of both
//! the raw inputs and everything generated.
//!
//! ## Jobs
//!
//! - `boardroom` (default): Markdown strategy report per sector
//! - `editor`: structured JSON analysis per sector, with source links
//! - `comments`: simulated persona comment section per sector
//!
//! ## Usage
//!
//! ```sh
//! KEY_1=... KEY_2=... sector_desk --root-dir ./site boardroom
//! ```
//!
//! ## Architecture
//!
//! Each run is strictly sequential:
//! 1. **Archive**: copy the raw snapshots into `history/<date>/`
//! 2. **Dispatch**: per sector, try credentials in priority order, rotating
//!    only when a key's quota is exhausted
//! 3. **Persist**: write a permanent dated copy and a latest copy
//! 4. **Index**: rebuild `history_index.json` from the history tree

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod cli;
mod comments;
mod config;
mod credentials;
mod dispatch;
mod editor;
mod models;
mod outputs;
mod pipeline;
mod prompts;
mod snapshot;
mod utils;

use api::GeminiClient;
use cli::Cli;
use config::{load_config, CredentialSource};
use pipeline::{PipelineRunner, SectorStatus};
use utils::today;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("sector_desk starting up");

    let args = Cli::parse();
    debug!(?args.config, %args.root_dir, ?args.sectors, "Parsed CLI arguments");

    let mut config = match load_config(args.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            error!(path = ?args.config, error = %e, "Failed to load configuration");
            return Err(e);
        }
    };
    if let Some(api_base) = &args.api_base {
        config.api_base = api_base.clone();
    }
    config.retain_sectors(&args.sectors);
    if config.sectors.is_empty() {
        warn!(filter = ?args.sectors, "No sectors selected; only archiving and indexing will run");
    }

    let job = args.job();
    let client = GeminiClient::new(config.api_base.clone());
    let runner = PipelineRunner::new(config, CredentialSource::from_env(), client, &args.root_dir);
    let summary = runner.run(job, today()).await?;

    for (sector, status) in &summary.sectors {
        match status {
            SectorStatus::Saved(path) => info!(%sector, path = %path.display(), "Saved"),
            other => info!(%sector, status = ?other, "Not saved"),
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        job = %summary.job,
        date = %summary.date,
        saved = summary.saved(),
        dates = summary.index.dates.len(),
        "Execution complete"
    );

    let lost = summary.persist_failures();
    if !lost.is_empty() {
        error!(sectors = ?lost, "Generated output could not be saved");
        return Err(format!("failed to persist output for: {}", lost.join(", ")).into());
    }
    Ok(())
}
