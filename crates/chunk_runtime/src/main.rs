//! Chunk Bridge Runtime
//!
//! Minimal host binary: boots an engine thread per chunk and evaluates the
//! given files through the bridge.

use anyhow::{Context, Result};
use chunk_script::{CompletionToken, EngineThread, ScriptLoader};
use chunk_services::{ScriptLocator, Settings};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "chunk", version, about = "Evaluate JavaScript chunks through the bridge")]
struct Cli {
    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Use the asynchronous bridge path instead of synchronous evaluation on the engine thread
    #[arg(long = "async")]
    use_async: bool,

    /// Chunk files to evaluate
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Chunk Bridge v{}", chunk_services::VERSION);

    let mut failures = 0;
    for file in &cli.files {
        match run_file(file, &settings, cli.use_async) {
            Ok(()) => tracing::info!(file = %file.display(), "chunk evaluated"),
            Err(err) => {
                failures += 1;
                tracing::error!(file = %file.display(), "{err:#}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} chunks failed", cli.files.len());
    }
    Ok(())
}

fn run_file(path: &Path, settings: &Settings, use_async: bool) -> Result<()> {
    let code = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let url = format!("file://{}", path.display());
    let script_id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| url.clone());
    let locator = ScriptLocator::new(&script_id, &url);

    let engine = EngineThread::spawn(settings)?;
    let loader =
        ScriptLoader::new(engine.handle()).with_dispatch(engine.dispatch_context().clone());
    let (token, settlement) = CompletionToken::channel();

    if use_async {
        loader.load(&locator, &code, Some(token))?;
    } else {
        // Synchronous loads have to happen on the thread that owns the engine.
        engine.dispatch_context().invoke_async(move || {
            token.settle_with(loader.load(&locator, &code, None));
        })?;
    }

    let outcome = settlement.wait();
    engine.shutdown();
    outcome.map_err(|err| anyhow::anyhow!("{}: {err}", err.code()))
}
