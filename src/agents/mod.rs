//! Feed pipeline
//!
//! - **Content Generator**: image + optional prompt in, feed text out
//! - **Feed Orchestrator**: sequences generation, storage and the ledger write
//!
//! ## Pipeline Overview
//!
//! ```text
//! FeedRequest (prompt?, image)
//!      │
//!      ▼
//! ┌─────────────┐
//! │ Generating  │  → vision model writes the feed text
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Uploading  │  → owner bucket ensured, text stored, CID returned
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Recording  │  → createFeed(cid), wait for confirmation
//! └─────────────┘
//!      │
//!      ▼
//!    Done  (owner's feeds re-fetched)
//! ```
//!
//! Any stage may end the attempt in `Failed(stage, reason)`.

pub mod generator;
pub mod orchestrator;

pub use generator::{ContentGenerator, FeedGenerator};
pub use orchestrator::{FeedOrchestrator, PipelineEvent, PipelineState, Stage, StageFailure};
