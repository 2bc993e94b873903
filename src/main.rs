use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use feed_registry::{
    build_state, create_router,
    models::{DeleteFeedResponse, FeedEntry, FeedListResponse, FeedRequest, ImageInput, PipelineResponse},
    storage::parse_owner_address,
    AppState, Config,
};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "feed-registry", version, about = "Turn an image and a prompt into a feed recorded on-chain")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Run the feed pipeline once for a local image
    Create {
        /// Path to the image file
        #[arg(long)]
        image: PathBuf,
        /// Optional prompt steering the generated text
        #[arg(long)]
        prompt: Option<String>,
    },
    /// List an owner's feeds
    List {
        /// Owner address (defaults to the configured signer)
        #[arg(long)]
        owner: Option<String>,
    },
    /// Soft-delete one of the signer's feeds by its index
    Delete {
        index: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feed_registry=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    let state = build_state(config).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(state).await,
        Commands::Create { image, prompt } => create(state, image, prompt).await,
        Commands::List { owner } => list(state, owner).await,
        Commands::Delete { index } => delete(state, index).await,
    }
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let host: std::net::IpAddr = state
        .config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid HOST '{}'", state.config.server.host))?;
    let addr = SocketAddr::from((host, state.config.server.port));

    let app = create_router(state);

    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}

async fn create(state: AppState, image_path: PathBuf, prompt: Option<String>) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&image_path)
        .await
        .with_context(|| format!("Failed to read {}", image_path.display()))?;
    let mime_type = mime_guess::from_path(&image_path).first_or_octet_stream().to_string();
    let original_name = image_path.file_name().map(|n| n.to_string_lossy().into_owned());

    let request = FeedRequest {
        prompt,
        image: Some(ImageInput {
            bytes: Bytes::from(bytes),
            mime_type,
            original_name,
        }),
    };

    let mut events = state.orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(attempt = %event.attempt, state = ?event.state, "Pipeline progress");
        }
    });

    let result = state.orchestrator.create_feed(request).await;
    progress.abort();

    let receipt = result?;
    let response = PipelineResponse {
        success: true,
        cid: receipt.upload.cid,
        bucket: receipt.upload.bucket,
        tx_hash: format!("{:?}", receipt.receipt.hash),
        content: receipt.content,
        feeds: receipt.feeds.as_deref().map(FeedEntry::from_records),
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn list(state: AppState, owner: Option<String>) -> anyhow::Result<()> {
    let owner = match owner {
        Some(raw) => parse_owner_address(&raw)?,
        None => state
            .orchestrator
            .ledger()
            .signer()
            .ok_or_else(|| anyhow!("No owner given and no PRIVATE_KEY configured"))?,
    };

    let records = state.orchestrator.list_feeds(owner).await?;
    let response = FeedListResponse {
        success: true,
        owner,
        feeds: FeedEntry::from_records(&records),
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn delete(state: AppState, index: u64) -> anyhow::Result<()> {
    let receipt = state.orchestrator.delete_feed(index).await?;
    let response = DeleteFeedResponse {
        success: true,
        index: receipt.index,
        tx_hash: format!("{:?}", receipt.receipt.hash),
        feeds: receipt.feeds.as_deref().map(FeedEntry::from_records),
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
