//! API Routes
//!
//! - `POST /create-feed` - relay an image + prompt to the vision model
//! - `POST /api/feeds` - run the full feed pipeline with the server's signer
//! - `GET /api/feeds/{owner}` - list an owner's feeds with their indexes
//! - `DELETE /api/feeds/{index}` - soft-delete one of the signer's feeds
//! - `GET /api/health` - health check

pub mod feeds;
pub mod health;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

/// Room for the multipart framing and the prompt on top of the image itself
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let body_limit = state.config.server.max_image_bytes + FORM_OVERHEAD_BYTES;
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(feeds::router())
        .merge(health::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use ethers::types::Address;

    use crate::agents::{ContentGenerator, FeedOrchestrator};
    use crate::config::{Config, InferenceConfig, LedgerConfig, LedgerMode, ServerConfig, StorageConfig};
    use crate::ledger::MemoryLedger;
    use crate::models::{AppState, GeneratedContent, ImageInput, UploadedObject};
    use crate::storage::{ObjectStore, ShortContentPolicy};
    use crate::types::{AppError, AppResult, LLMProvider};

    pub const OWNER: &str = "0x45e762afa6178b82efbcb3d685bebf023e2ef6b1";

    pub struct CountingGenerator {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentGenerator for CountingGenerator {
        async fn generate_content(&self, prompt: Option<&str>, image: &ImageInput) -> AppResult<GeneratedContent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GeneratedContent {
                text: format!(
                    "Feed for {}: {}",
                    prompt.unwrap_or("an image"),
                    "golden light over calm water, long shadows, the day winding down slowly. ".repeat(2)
                ),
                source_image: image.bytes.clone(),
                mime_type: image.mime_type.clone(),
            })
        }
    }

    /// Fails every call the way an upstream model outage would
    pub struct FailingGenerator {
        pub calls: AtomicUsize,
    }

    pub const UPSTREAM_FAILURE: &str = "Rate limit exceeded, retry in 20s";

    #[async_trait]
    impl ContentGenerator for FailingGenerator {
        async fn generate_content(&self, _prompt: Option<&str>, _image: &ImageInput) -> AppResult<GeneratedContent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Inference(UPSTREAM_FAILURE.to_string()))
        }
    }

    /// Accepts every upload and hands back the same CID
    pub struct CidStore;

    #[async_trait]
    impl ObjectStore for CidStore {
        async fn ensure_bucket(&self, _name: &str) -> AppResult<()> {
            Ok(())
        }

        async fn upload(&self, bucket: &str, content: Bytes, filename: &str, _description: &str) -> AppResult<UploadedObject> {
            Ok(UploadedObject {
                cid: "bafytestcid".to_string(),
                bucket: bucket.to_string(),
                original_filename: filename.to_string(),
                size_bytes: content.len() as u64,
            })
        }
    }

    pub fn test_config(upload_dir: &Path) -> Config {
        Config {
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
                cors_allowed_origins: vec!["*".to_string()],
                upload_dir: upload_dir.to_path_buf(),
                max_image_bytes: 64 * 1024,
            },
            inference: InferenceConfig {
                provider: LLMProvider::OpenAI,
                api_key: String::new(),
                model: "gpt-4o".to_string(),
                max_tokens: 500,
                base_url: None,
                timeout: Duration::from_secs(5),
            },
            storage: StorageConfig {
                api_url: "http://localhost:8000".to_string(),
                timeout: Duration::from_secs(5),
                short_content_policy: ShortContentPolicy::Reject,
            },
            ledger: LedgerConfig {
                mode: LedgerMode::Memory,
                rpc_url: String::new(),
                chain_id: 314159,
                contract_address: String::new(),
                private_key: None,
                confirmations: 1,
                confirmation_timeout: Duration::from_secs(5),
                rpc_timeout: Duration::from_secs(5),
            },
        }
    }

    pub fn test_state(upload_dir: &Path) -> (AppState, Arc<CountingGenerator>) {
        let generator = Arc::new(CountingGenerator { calls: AtomicUsize::new(0) });
        let owner: Address = OWNER.parse().unwrap();
        let orchestrator = FeedOrchestrator::new(
            generator.clone(),
            Arc::new(CidStore),
            Arc::new(MemoryLedger::with_signer(owner)),
            ShortContentPolicy::Reject,
        );
        let state = AppState {
            config: test_config(upload_dir),
            generator: generator.clone(),
            orchestrator: Arc::new(orchestrator),
        };
        (state, generator)
    }

    pub fn failing_state(upload_dir: &Path) -> (AppState, Arc<FailingGenerator>) {
        let generator = Arc::new(FailingGenerator { calls: AtomicUsize::new(0) });
        let owner: Address = OWNER.parse().unwrap();
        let orchestrator = FeedOrchestrator::new(
            generator.clone(),
            Arc::new(CidStore),
            Arc::new(MemoryLedger::with_signer(owner)),
            ShortContentPolicy::Reject,
        );
        let state = AppState {
            config: test_config(upload_dir),
            generator: generator.clone(),
            orchestrator: Arc::new(orchestrator),
        };
        (state, generator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_reports_ledger_and_signer() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_support::test_state(dir.path());

        let response = create_router(state)
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["ledger"], "memory");
        assert_eq!(body["signer"], "0x45E762AFA6178b82Efbcb3d685bEBF023E2ef6b1");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_support::test_state(dir.path());

        let response = create_router(state)
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
