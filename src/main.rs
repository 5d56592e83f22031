//! # Story Compiler
//!
//! Builds e-books from a card game publisher's web story archive. For each
//! release it locates the release in the archive UI, fetches and sanitizes
//! every story article, and packages them into an EPUB with the release's
//! marketing artwork as cover, optionally converting it to more formats.
//!
//! ## Usage
//!
//! ```sh
//! story_compiler -r mkm -o ./books -F epub,mobi
//! story_compiler -f releases.yaml -o ./books
//! ```
//!
//! ## Architecture
//!
//! 1. **Metadata**: name from the card catalog, cover from marketing assets
//! 2. **Navigation**: find the release in the archive and collect links
//! 3. **Fetching**: load and sanitize each article
//! 4. **Change detection**: skip releases whose content digest is unchanged
//! 5. **Output**: EPUB, article manifest and converted formats

use clap::Parser;
use std::error::Error as StdError;
use std::path::PathBuf;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod digest;
mod error;
mod metadata;
mod models;
mod outputs;
mod pipeline;
mod sanitize;
mod scrapers;
mod session;
mod utils;

use api::ReqwestClient;
use cli::Cli;
use config::Config;
use digest::FsDigestStore;
use error::Error;
use pipeline::{Pipeline, PipelineOptions, ReleaseOutcome};
use session::chrome::ChromeSession;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn StdError>> {
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
    info!(version = env!("CARGO_PKG_VERSION"), "story_compiler starting up");

    // Parse and validate everything before touching the network
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");
    args.validate()?;
    let formats = args.output_formats()?;
    let releases = args.releases()?;
    let config = Config::load(args.config.as_deref())?;
    info!(count = releases.len(), ?formats, "Releases queued");

    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let client = ReqwestClient::new(&config.http)?;
    let store = FsDigestStore::new(args.output_dir.join(&config.digest_dir));
    let options = PipelineOptions {
        output_dir: args.output_dir.clone(),
        formats,
        force: args.force,
    };

    let mut browser_settings = config.browser.clone();
    browser_settings.headless &= !args.headed;
    let mut session = ChromeSession::launch(&browser_settings).await?;

    // ---- Build releases one at a time ----
    let mut built: Vec<(String, Vec<PathBuf>)> = Vec::new();
    let mut unchanged: Vec<String> = Vec::new();
    let mut failed: Vec<(String, Error)> = Vec::new();

    for descriptor in &releases {
        let mut pipeline = Pipeline {
            session: &mut session,
            client: &client,
            store: &store,
            config: &config,
            options: &options,
        };
        match pipeline.process_release(descriptor).await {
            Ok(outcome) => {
                info!(release = %descriptor.code, %outcome, "Release done");
                match outcome {
                    ReleaseOutcome::Built { paths } => built.push((descriptor.code.clone(), paths)),
                    ReleaseOutcome::Unchanged => unchanged.push(descriptor.code.clone()),
                }
            }
            Err(e) if e.is_fatal_for_batch() => {
                error!(release = %descriptor.code, error = %e, "Fatal error; stopping batch");
                failed.push((descriptor.code.clone(), e));
                break;
            }
            Err(e) => {
                error!(release = %descriptor.code, error = %e, "Release failed; continuing with batch");
                failed.push((descriptor.code.clone(), e));
            }
        }
    }

    if let Err(e) = session.close().await {
        warn!(error = %e, "Browser did not shut down cleanly");
    }

    for (code, paths) in &built {
        for path in paths {
            info!(release = %code, path = %path.display(), "Wrote");
        }
    }
    for (code, e) in &failed {
        error!(release = %code, error = %e, "Failed");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        built = built.len(),
        unchanged = unchanged.len(),
        failed = failed.len(),
        "Execution complete"
    );

    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} of {} release(s) failed", failed.len(), releases.len()).into())
    }
}
