//! Feed Orchestrator
//!
//! Runs one feed attempt through `Generating -> Uploading -> Recording -> Done`.
//! Any active state can end in `Failed(stage, reason)`. Each transition is sent
//! on a broadcast channel so callers can follow progress.
//!
//! There is no retry and no compensation: a feed uploaded to storage whose
//! ledger write fails stays orphaned in the bucket.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use ethers::types::Address;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use super::generator::ContentGenerator;
use crate::ledger::FeedLedger;
use crate::models::{DeleteReceipt, FeedReceipt, FeedRecord, FeedRequest};
use crate::storage::{self, ObjectStore, ShortContentPolicy};
use crate::types::{AppError, AppResult, LedgerFailure};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Generating,
    Uploading,
    Recording,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Generating => write!(f, "generating"),
            Stage::Uploading => write!(f, "uploading"),
            Stage::Recording => write!(f, "recording"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Generating,
    Uploading,
    Recording,
    Done,
    Failed { stage: Stage, reason: String },
}

impl From<Stage> for PipelineState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Generating => PipelineState::Generating,
            Stage::Uploading => PipelineState::Uploading,
            Stage::Recording => PipelineState::Recording,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub attempt: Uuid,
    pub state: PipelineState,
}

/// Terminal failure of an attempt, tagged with the stage it happened in
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: AppError,
}

impl StageFailure {
    pub fn status_code(&self) -> StatusCode {
        match &self.error {
            AppError::Validation(_) | AppError::Busy(_) | AppError::Internal(_) => self.error.status_code(),
            AppError::Inference(_) | AppError::Storage(_) | AppError::Ledger(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for StageFailure {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "stage": self.stage,
            "error": self.error.to_string(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Marks an owner as having an operation in flight until dropped
struct BusyGuard<'a> {
    busy: &'a Mutex<HashSet<Address>>,
    owner: Address,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.remove(&self.owner);
    }
}

/// Publishes the transitions of one attempt
struct Attempt<'a> {
    id: Uuid,
    events: &'a broadcast::Sender<PipelineEvent>,
}

impl Attempt<'_> {
    fn publish(&self, state: PipelineState) {
        // No subscribers is fine
        let _ = self.events.send(PipelineEvent { attempt: self.id, state });
    }

    fn enter(&self, stage: Stage) {
        info!(attempt = %self.id, stage = %stage, "Entering stage");
        self.publish(stage.into());
    }

    fn fail(&self, stage: Stage, error: AppError) -> StageFailure {
        warn!(attempt = %self.id, stage = %stage, error = %error, "Feed attempt failed");
        self.publish(PipelineState::Failed {
            stage,
            reason: error.to_string(),
        });
        StageFailure { stage, error }
    }
}

pub struct FeedOrchestrator {
    generator: Arc<dyn ContentGenerator>,
    store: Arc<dyn ObjectStore>,
    ledger: Arc<dyn FeedLedger>,
    short_content: ShortContentPolicy,
    events: broadcast::Sender<PipelineEvent>,
    busy: Mutex<HashSet<Address>>,
}

impl FeedOrchestrator {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        store: Arc<dyn ObjectStore>,
        ledger: Arc<dyn FeedLedger>,
        short_content: ShortContentPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            generator,
            store,
            ledger,
            short_content,
            events,
            busy: Mutex::new(HashSet::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn ledger(&self) -> &Arc<dyn FeedLedger> {
        &self.ledger
    }

    fn acquire(&self, owner: Address) -> AppResult<BusyGuard<'_>> {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if !busy.insert(owner) {
            return Err(AppError::Busy(format!("{:?}", owner)));
        }
        Ok(BusyGuard { busy: &self.busy, owner })
    }

    pub async fn list_feeds(&self, owner: Address) -> AppResult<Vec<FeedRecord>> {
        self.ledger.feeds_by_owner(owner).await
    }

    /// Re-read the owner's feeds after a write. A failed refresh is logged and
    /// leaves the write's outcome untouched.
    async fn refresh(&self, owner: Address) -> Option<Vec<FeedRecord>> {
        match self.ledger.feeds_by_owner(owner).await {
            Ok(feeds) => Some(feeds),
            Err(e) => {
                warn!(owner = ?owner, error = %e, "Failed to refresh feeds");
                None
            }
        }
    }

    /// Generate, upload and record one feed for the connected signer
    pub async fn create_feed(&self, request: FeedRequest) -> Result<FeedReceipt, StageFailure> {
        let run = Attempt {
            id: Uuid::new_v4(),
            events: &self.events,
        };
        run.publish(PipelineState::Idle);

        let owner = self
            .ledger
            .signer()
            .ok_or_else(|| run.fail(Stage::Generating, AppError::validation("Wallet not connected")))?;
        let _busy = self.acquire(owner).map_err(|e| run.fail(Stage::Generating, e))?;

        let image = match &request.image {
            Some(image) if !image.bytes.is_empty() => image,
            _ => return Err(run.fail(Stage::Generating, AppError::validation("No image uploaded"))),
        };
        let prompt = request.prompt_text();

        run.enter(Stage::Generating);
        let generated = self
            .generator
            .generate_content(prompt, image)
            .await
            .map_err(|e| run.fail(Stage::Generating, e))?;

        if generated.text.trim().is_empty() {
            return Err(run.fail(Stage::Uploading, AppError::validation("Generated content is empty")));
        }

        run.enter(Stage::Uploading);
        let body = Bytes::from(self.short_content.apply(generated.text.clone()));
        let upload = storage::store_feed_content(self.store.as_ref(), owner, body, prompt)
            .await
            .map_err(|e| run.fail(Stage::Uploading, e))?;

        if upload.cid.is_empty() {
            return Err(run.fail(Stage::Recording, AppError::validation("Upload returned no CID")));
        }

        run.enter(Stage::Recording);
        let handle = self
            .ledger
            .create_feed(&upload.cid)
            .await
            .map_err(|e| run.fail(Stage::Recording, e))?;
        let receipt = self
            .ledger
            .await_confirmation(handle)
            .await
            .map_err(|e| run.fail(Stage::Recording, e))?;

        run.publish(PipelineState::Done);
        info!(
            attempt = %run.id,
            cid = %upload.cid,
            bucket = %upload.bucket,
            tx = ?receipt.hash,
            "Feed recorded"
        );

        let feeds = self.refresh(owner).await;
        Ok(FeedReceipt {
            content: generated.text,
            upload,
            receipt,
            feeds,
        })
    }

    /// Soft-delete the signer's feed at `index`
    pub async fn delete_feed(&self, index: u64) -> AppResult<DeleteReceipt> {
        let owner = self.ledger.signer().ok_or(LedgerFailure::NoSigner)?;
        let _busy = self.acquire(owner)?;

        let handle = self.ledger.delete_feed(index).await?;
        let receipt = self.ledger.await_confirmation(handle).await?;
        info!(index, tx = ?receipt.hash, "Feed deleted");

        let feeds = self.refresh(owner).await;
        Ok(DeleteReceipt { index, receipt, feeds })
    }
}
