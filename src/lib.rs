// Feed Registry - image-to-feed relay and on-chain feed pipeline

pub mod agents;
pub mod config;
pub mod ledger;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod storage;
pub mod types;
pub mod utils;

use std::sync::Arc;

use tracing::info;

use crate::agents::{ContentGenerator, FeedGenerator, FeedOrchestrator};
use crate::storage::StorageGateway;
use crate::types::AppResult;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

/// Wire the inference client, storage gateway and ledger into shared state
pub async fn build_state(config: Config) -> AppResult<AppState> {
    let adapter = llm::adapter_from_config(&config.inference)?;
    let generator: Arc<dyn ContentGenerator> = Arc::new(FeedGenerator::new(
        adapter,
        &config.inference,
        config.server.max_image_bytes,
    ));

    let store = Arc::new(StorageGateway::new(&config.storage)?);
    let ledger = ledger::connect(&config.ledger).await?;
    info!(ledger = ledger.backend(), signer = ?ledger.signer(), "Ledger ready");

    let orchestrator = FeedOrchestrator::new(
        generator.clone(),
        store,
        ledger,
        config.storage.short_content_policy,
    );

    Ok(AppState {
        config,
        generator,
        orchestrator: Arc::new(orchestrator),
    })
}

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
