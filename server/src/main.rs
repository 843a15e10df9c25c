//! Crop Disease Inference Server
//!
//! Loads the best checkpoint once at startup and serves ranked predictions
//! for images referenced by URL.

mod error;
mod fetch;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crop_disease::backend::{backend_name, default_device, DefaultBackend};
use crop_disease::inference::Predictor;
use crop_disease::model::checkpoint_path;
use crop_disease::utils::logging::{init_logging, LogConfig};

use crate::fetch::ImageFetcher;
use crate::state::AppState;

/// Crop Disease Inference Server
#[derive(Parser, Debug)]
#[command(name = "crop-disease-server")]
#[command(version)]
#[command(about = "HTTP API serving crop disease predictions")]
struct Cli {
    /// Host to bind to
    #[arg(long, env = "CROP_DISEASE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "CROP_DISEASE_PORT", default_value = "8000")]
    port: u16,

    /// Directory holding model_best.mpk (a burn record written by
    /// `crop_disease train`; PyTorch model_best.pt files are not read)
    #[arg(long, env = "CROP_DISEASE_MODELS_DIR", default_value = "models")]
    models_dir: PathBuf,

    /// Timeout for fetching the image URL, in seconds
    #[arg(long, env = "CROP_DISEASE_FETCH_TIMEOUT_SECS", default_value = "10")]
    fetch_timeout_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_verbose_flag(cli.verbose);
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    info!("Crop Disease Inference Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Models dir:    {:?}", cli.models_dir);
    info!("  Backend:       {}", backend_name());
    info!("  Fetch timeout: {}s", cli.fetch_timeout_secs);

    // A missing or incompatible checkpoint is fatal
    let checkpoint = checkpoint_path(&cli.models_dir);
    let device = default_device();
    let predictor = Predictor::<DefaultBackend>::from_checkpoint(&checkpoint, &device)
        .with_context(|| format!("failed to load checkpoint {}", checkpoint.display()))?;
    info!(
        "Loaded {} with {} classes",
        checkpoint.display(),
        predictor.num_classes()
    );

    let fetcher = ImageFetcher::new(Duration::from_secs(cli.fetch_timeout_secs))
        .context("failed to build HTTP client")?;
    let state = Arc::new(AppState::new(predictor, fetcher));
    let app = routes::app(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
