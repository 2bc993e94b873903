use std::sync::Arc;

use bytes::Bytes;
use ethers::types::{Address, H256};
use serde::Serialize;

use crate::agents::{ContentGenerator, FeedOrchestrator};
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub generator: Arc<dyn ContentGenerator>,
    pub orchestrator: Arc<FeedOrchestrator>,
}

// Pipeline data model

/// Image received from the user, held in memory after the spool file is read
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Bytes,
    pub mime_type: String,
    pub original_name: Option<String>,
}

/// One user submission. Discarded once the pipeline finishes either way.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub prompt: Option<String>,
    pub image: Option<ImageInput>,
}

impl FeedRequest {
    /// The prompt, if it carries anything besides whitespace
    pub fn prompt_text(&self) -> Option<&str> {
        self.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// Text produced by the inference gateway together with the image it describes
#[derive(Debug, Clone)]
pub struct GeneratedContent {
    pub text: String,
    pub source_image: Bytes,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageBucket {
    pub name: String,
    pub owner: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedObject {
    pub cid: String,
    pub bucket: String,
    pub original_filename: String,
    pub size_bytes: u64,
}

/// A feed entry as the registry contract stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    pub cid: String,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    pub is_deleted: bool,
    pub owner: Address,
}

/// Submission handle for a ledger write. Inclusion is awaited separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHandle {
    pub hash: H256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub hash: H256,
    pub block_number: Option<u64>,
}

/// Result of a pipeline run that reached `Done`
#[derive(Debug, Clone)]
pub struct FeedReceipt {
    pub content: String,
    pub upload: UploadedObject,
    pub receipt: TransactionReceipt,
    /// Owner's feeds after the refresh; `None` when the refresh itself failed
    pub feeds: Option<Vec<FeedRecord>>,
}

#[derive(Debug, Clone)]
pub struct DeleteReceipt {
    pub index: u64,
    pub receipt: TransactionReceipt,
    pub feeds: Option<Vec<FeedRecord>>,
}

// API Request/Response types

/// Response of `POST /create-feed`
#[derive(Debug, Serialize)]
pub struct CreateFeedResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImagePayload {
    /// Base64 of the uploaded bytes
    pub data: String,
    pub mimetype: String,
    #[serde(rename = "originalName")]
    pub original_name: String,
}

/// A feed record with its positional index, which `deleteFeed` addresses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub index: u64,
    pub cid: String,
    pub timestamp: u64,
    pub is_deleted: bool,
    pub owner: Address,
}

impl FeedEntry {
    pub fn from_records(records: &[FeedRecord]) -> Vec<FeedEntry> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| FeedEntry {
                index: index as u64,
                cid: record.cid.clone(),
                timestamp: record.timestamp,
                is_deleted: record.is_deleted,
                owner: record.owner,
            })
            .collect()
    }
}

/// Response of `POST /api/feeds`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub success: bool,
    pub cid: String,
    pub bucket: String,
    pub tx_hash: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feeds: Option<Vec<FeedEntry>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedListResponse {
    pub success: bool,
    pub owner: Address,
    pub feeds: Vec<FeedEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFeedResponse {
    pub success: bool,
    pub index: u64,
    pub tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feeds: Option<Vec<FeedEntry>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub ledger: String,
    pub signer: Option<String>,
}
