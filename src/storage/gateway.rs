// HTTP client for the object-storage gateway
//
// Gateway contract:
//   GET  /buckets                -> { "data": [ { "Name": "..." }, ... ] }
//   POST /buckets                -> body { "bucketName": "..." }
//   POST /buckets/{name}/files   -> multipart (file, description), { "data": { "RootCID": "..." } }

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ObjectStore, MIN_UPLOAD_BYTES};
use crate::config::StorageConfig;
use crate::models::UploadedObject;
use crate::types::{AppResult, StorageFailure};

const SERVER_ERROR_MESSAGE: &str =
    "Server error: Failed to process request. Check server logs or contact support.";

pub struct StorageGateway {
    client: Client,
    base_url: String,
    timeout: Option<Duration>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBucketRequest<'a> {
    bucket_name: &'a str,
}

#[derive(Deserialize)]
struct ListBucketsResponse {
    #[serde(default)]
    data: Option<Vec<BucketInfo>>,
}

#[derive(Deserialize)]
struct BucketInfo {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    data: Option<UploadData>,
}

#[derive(Deserialize)]
struct UploadData {
    #[serde(rename = "RootCID", default)]
    root_cid: Option<String>,
}

#[derive(Deserialize)]
struct GatewayErrorBody {
    error: String,
}

impl StorageGateway {
    pub fn new(config: &StorageConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageFailure::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            timeout: Some(config.timeout),
        })
    }

    /// Client without an explicit timeout, pointed at `base_url`
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: None,
        }
    }

    fn transport_failure(&self, e: reqwest::Error) -> StorageFailure {
        if e.is_timeout() {
            let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
            StorageFailure::Transport(format!("request timed out after {}s", secs))
        } else {
            StorageFailure::Transport(e.to_string())
        }
    }

    /// Names of all buckets the gateway knows about
    pub async fn list_buckets(&self) -> AppResult<Vec<String>> {
        let url = format!("{}/buckets", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(gateway_failure(status, &body).into());
        }

        let listing: ListBucketsResponse = response
            .json()
            .await
            .map_err(|e| self.transport_failure(e))?;

        Ok(listing
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|b| b.name)
            .collect())
    }

    /// Create `name`. A bucket that already exists counts as created.
    pub async fn create_bucket(&self, name: &str) -> AppResult<()> {
        let url = format!("{}/buckets", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&CreateBucketRequest { bucket_name: name })
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        let status = response.status();
        if status.is_success() {
            info!(bucket = %name, "Bucket created");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if is_already_exists(status, &body) {
            debug!(bucket = %name, status = %status, "Bucket already exists");
            return Ok(());
        }

        warn!(bucket = %name, status = %status, "Bucket creation failed");
        Err(gateway_failure(status, &body).into())
    }
}

#[async_trait]
impl ObjectStore for StorageGateway {
    async fn ensure_bucket(&self, name: &str) -> AppResult<()> {
        let existing = self.list_buckets().await?;
        if existing.iter().any(|b| b == name) {
            debug!(bucket = %name, "Bucket already listed");
            return Ok(());
        }

        // Another caller may create it between the listing and this call.
        self.create_bucket(name).await
    }

    async fn upload(
        &self,
        bucket: &str,
        content: Bytes,
        filename: &str,
        description: &str,
    ) -> AppResult<UploadedObject> {
        if content.len() < MIN_UPLOAD_BYTES {
            return Err(StorageFailure::ContentTooSmall {
                len: content.len(),
                min: MIN_UPLOAD_BYTES,
            }
            .into());
        }

        let size_bytes = content.len() as u64;
        let file = multipart::Part::bytes(content.to_vec())
            .file_name(filename.to_string())
            .mime_str("text/plain")
            .map_err(|e| self.transport_failure(e))?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("description", description.to_string());

        let url = format!("{}/buckets/{}/files", self.base_url, bucket);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(gateway_failure(status, &body).into());
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| self.transport_failure(e))?;

        let cid = body
            .data
            .and_then(|d| d.root_cid)
            .filter(|cid| !cid.is_empty())
            .ok_or(StorageFailure::MissingCid)?;

        info!(bucket = %bucket, filename = %filename, cid = %cid, size_bytes, "File uploaded");

        Ok(UploadedObject {
            cid,
            bucket: bucket.to_string(),
            original_filename: filename.to_string(),
            size_bytes,
        })
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<GatewayErrorBody>(body)
        .ok()
        .map(|b| b.error)
}

fn is_already_exists(status: StatusCode, body: &str) -> bool {
    status == StatusCode::CONFLICT
        || error_message(body)
            .unwrap_or_else(|| body.to_string())
            .to_lowercase()
            .contains("already exists")
}

fn gateway_failure(status: StatusCode, body: &str) -> StorageFailure {
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        SERVER_ERROR_MESSAGE.to_string()
    } else {
        error_message(body).unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                trimmed.to_string()
            }
        })
    };

    StorageFailure::Gateway {
        status: status.as_u16(),
        message,
    }
}
