mod api;
mod config;
mod error;
mod runtime;
mod service;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use docproc_core::BlobStore;
use docproc_storage::{FsBlobStore, MetadataStore};
use docproc_worker::TesseractExtractor;

use config::Config;
use runtime::Runtime;

#[derive(Parser)]
#[command(name = "docproc")]
#[command(about = "Document upload and OCR processing service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and OCR workers
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind the HTTP server to
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Check whether a local server is up
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    logging::init_logger(config.log_dir.as_deref(), &config.log_level);

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, bind } => {
            let config = Config {
                port: port.unwrap_or(config.port),
                bind_address: bind.unwrap_or(config.bind_address),
                ..config
            };
            run_server(config).await?;
        }
        Commands::Status => {
            let client = reqwest::Client::new();
            match client
                .get(format!("http://localhost:{}/health", config.port))
                .send()
                .await
            {
                Ok(resp) => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => {
                    println!("docproc is not running on port {}", config.port);
                }
            }
        }
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    info!(
        port = config.port,
        bind = %config.bind_address,
        db = %config.db_path,
        blob_dir = %config.blob_dir.display(),
        "Starting document processor"
    );

    let store = Arc::new(
        MetadataStore::open(&config.db_path)
            .with_context(|| format!("failed to open metadata store at {}", config.db_path))?,
    );

    let fs_blobs = FsBlobStore::new(&config.blob_dir);
    fs_blobs
        .ensure_root()
        .await
        .with_context(|| format!("failed to create blob directory {}", config.blob_dir.display()))?;
    info!(root = %fs_blobs.root().display(), "Blob store ready");
    let blobs: Arc<dyn BlobStore> = Arc::new(fs_blobs);

    let extractor = Arc::new(TesseractExtractor::new(&config.tesseract_bin, &config.ocr_lang));
    let runtime = Runtime::start(&config, store, blobs, extractor)?;

    let app = api::build_router(runtime.state.clone(), config.max_upload_bytes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "HTTP server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        error!(error = %e, "HTTP server stopped with an error");
    }

    runtime.shutdown().await;
    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
