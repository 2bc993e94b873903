use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, H256};
use tokio::sync::RwLock;
use tracing::debug;

use super::FeedLedger;
use crate::models::{FeedRecord, TransactionHandle, TransactionReceipt};
use crate::types::{AppResult, LedgerFailure};

#[derive(Default)]
struct LedgerState {
    feeds: HashMap<Address, Vec<FeedRecord>>,
    /// Submitted transactions and the block they were included in
    blocks: HashMap<H256, u64>,
    height: u64,
}

impl LedgerState {
    fn next_transaction(&mut self) -> TransactionHandle {
        self.height += 1;
        let hash = H256::from_low_u64_be(self.height);
        self.blocks.insert(hash, self.height);
        TransactionHandle { hash }
    }
}

/// Process-local registry with the contract's rules: append on create, soft delete
/// by position, reverts on a bad or already-deleted index. Every write is mined
/// into its own block immediately.
pub struct MemoryLedger {
    signer: Option<Address>,
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new(signer: Option<Address>) -> Self {
        Self {
            signer,
            state: RwLock::new(LedgerState::default()),
        }
    }

    pub fn with_signer(signer: Address) -> Self {
        Self::new(Some(signer))
    }

    pub fn read_only() -> Self {
        Self::new(None)
    }

    fn require_signer(&self) -> AppResult<Address> {
        self.signer.ok_or_else(|| LedgerFailure::NoSigner.into())
    }
}

#[async_trait]
impl FeedLedger for MemoryLedger {
    fn signer(&self) -> Option<Address> {
        self.signer
    }

    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_feed(&self, cid: &str) -> AppResult<TransactionHandle> {
        let owner = self.require_signer()?;
        let mut state = self.state.write().await;

        state.feeds.entry(owner).or_default().push(FeedRecord {
            cid: cid.to_string(),
            timestamp: Utc::now().timestamp().max(0) as u64,
            is_deleted: false,
            owner,
        });
        let handle = state.next_transaction();

        debug!(cid = %cid, tx = ?handle.hash, "Recorded feed");
        Ok(handle)
    }

    async fn delete_feed(&self, index: u64) -> AppResult<TransactionHandle> {
        let owner = self.require_signer()?;
        let mut state = self.state.write().await;

        let record = state
            .feeds
            .get_mut(&owner)
            .and_then(|feeds| feeds.get_mut(index as usize))
            .ok_or_else(|| LedgerFailure::Reverted("Invalid index".to_string()))?;

        if record.is_deleted {
            return Err(LedgerFailure::Reverted("Feed already deleted".to_string()).into());
        }
        record.is_deleted = true;

        let handle = state.next_transaction();
        debug!(index, tx = ?handle.hash, "Soft-deleted feed");
        Ok(handle)
    }

    async fn await_confirmation(&self, handle: TransactionHandle) -> AppResult<TransactionReceipt> {
        let state = self.state.read().await;
        match state.blocks.get(&handle.hash) {
            Some(block) => Ok(TransactionReceipt {
                hash: handle.hash,
                block_number: Some(*block),
            }),
            None => Err(LedgerFailure::Dropped(format!("{:?}", handle.hash)).into()),
        }
    }

    async fn feeds_by_owner(&self, owner: Address) -> AppResult<Vec<FeedRecord>> {
        let state = self.state.read().await;
        Ok(state.feeds.get(&owner).cloned().unwrap_or_default())
    }
}
