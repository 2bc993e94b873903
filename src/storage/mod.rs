//! Content-addressable storage layer
//!
//! Generated feed text is stored on a remote object-storage gateway that hands
//! back a content identifier (CID). Each owner gets one bucket, created lazily
//! on first upload and never deleted.
//!
//! ## Upload sequence
//!
//! ```text
//! owner address ──► bucket name "feed" + first 8 chars of the address
//!        │
//!        ▼
//!  GET /buckets ── listed? ──yes──┐
//!        │ no                     │
//!        ▼                        │
//!  POST /buckets (409 / "already exists" = success)
//!        │                        │
//!        ▼                        ▼
//!  POST /buckets/{name}/files ──► data.RootCID
//! ```
//!
//! The bucket name uses only an 8-character address prefix (`0x` plus six hex
//! digits). Two owners can collide on it; that is a known limitation.
//!
//! ## Short content
//!
//! The gateway refuses objects under [`MIN_UPLOAD_BYTES`]. The policy is
//! [`ShortContentPolicy::Reject`]: short generated text fails the Uploading
//! stage with `ContentTooSmall` and nothing is sent. Padding with spaces
//! ([`ShortContentPolicy::Pad`]) only happens when a deployment opts in with
//! `SHORT_CONTENT_POLICY=pad`. [`ObjectStore::upload`] itself never pads.

pub mod gateway;

pub use gateway::*;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use ethers::types::Address;
use tracing::debug;

use crate::models::{StorageBucket, UploadedObject};
use crate::types::{AppError, AppResult};

/// The gateway refuses objects smaller than this
pub const MIN_UPLOAD_BYTES: usize = 127;

/// Description attached to an upload when the user gave no prompt
pub const DEFAULT_DESCRIPTION: &str = "Generated feed content";

const BUCKET_PREFIX: &str = "feed";
const OWNER_PREFIX_LEN: usize = 8;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Make sure `name` exists. Succeeds if someone else created it first.
    async fn ensure_bucket(&self, name: &str) -> AppResult<()>;

    /// Upload `content` into `bucket`. Content under [`MIN_UPLOAD_BYTES`] is rejected.
    async fn upload(
        &self,
        bucket: &str,
        content: Bytes,
        filename: &str,
        description: &str,
    ) -> AppResult<UploadedObject>;
}

/// What to do with generated text shorter than [`MIN_UPLOAD_BYTES`].
/// `Reject` unless `SHORT_CONTENT_POLICY` says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortContentPolicy {
    /// Leave the text alone; the upload fails with `ContentTooSmall`
    #[default]
    Reject,
    /// Opt-in: append ASCII spaces until the text is exactly `MIN_UPLOAD_BYTES` long
    Pad,
}

impl std::str::FromStr for ShortContentPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(ShortContentPolicy::Reject),
            "pad" => Ok(ShortContentPolicy::Pad),
            other => Err(anyhow::anyhow!(
                "Unknown SHORT_CONTENT_POLICY '{}' (expected reject or pad)",
                other
            )),
        }
    }
}

impl ShortContentPolicy {
    pub fn apply(self, text: String) -> String {
        match self {
            ShortContentPolicy::Reject => text,
            ShortContentPolicy::Pad => pad_to_minimum(text),
        }
    }
}

/// Pad with trailing spaces up to [`MIN_UPLOAD_BYTES`]. Longer text is returned untouched.
pub fn pad_to_minimum(mut text: String) -> String {
    if text.len() < MIN_UPLOAD_BYTES {
        let missing = MIN_UPLOAD_BYTES - text.len();
        text.extend(std::iter::repeat(' ').take(missing));
    }
    text
}

/// Parse a `0x`-prefixed, 40 hex digit wallet address
pub fn parse_owner_address(raw: &str) -> AppResult<Address> {
    let raw = raw.trim();
    let well_formed = raw.len() == 42
        && raw.starts_with("0x")
        && raw[2..].chars().all(|c| c.is_ascii_hexdigit());

    if !well_formed {
        return Err(AppError::validation("Invalid wallet address"));
    }

    raw.parse::<Address>()
        .map_err(|_| AppError::validation("Invalid wallet address"))
}

/// Derive the owner's bucket from the checksummed form of the address
pub fn bucket_for_owner(owner: Address) -> StorageBucket {
    let checksummed = ethers::utils::to_checksum(&owner, None);
    StorageBucket {
        name: format!("{}{}", BUCKET_PREFIX, &checksummed[..OWNER_PREFIX_LEN]),
        owner,
    }
}

/// Object name for an upload made at `now`
pub fn feed_filename(now: DateTime<Utc>) -> String {
    format!("feed-{}.txt", now.timestamp_millis())
}

/// Ensure the owner's bucket exists, then upload `content` into it
pub async fn store_feed_content(
    store: &dyn ObjectStore,
    owner: Address,
    content: Bytes,
    description: Option<&str>,
) -> AppResult<UploadedObject> {
    let bucket = bucket_for_owner(owner);
    let filename = feed_filename(Utc::now());
    let description = description.unwrap_or(DEFAULT_DESCRIPTION);

    debug!(bucket = %bucket.name, filename = %filename, len = content.len(), "Storing feed content");

    store.ensure_bucket(&bucket.name).await?;
    store.upload(&bucket.name, content, &filename, description).await
}
