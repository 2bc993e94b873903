//! Ledger recorder
//!
//! Feed records live in the `FeedRegistry` contract. Writes go through a signer
//! that is established outside this module (a local wallet key); without one the
//! recorder is read-only.
//!
//! Writes return a [`TransactionHandle`] as soon as the transaction is submitted.
//! Inclusion is a separate step, [`FeedLedger::await_confirmation`].
//!
//! `delete_feed` addresses a record by its position in the owner's list, not by
//! CID. An index derived from a listing that has since grown (for example by
//! reversing a newest-first display) can point at the wrong feed.

pub mod contract;
pub mod memory;

pub use contract::ContractLedger;
pub use memory::MemoryLedger;

use std::sync::Arc;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use tracing::info;

use crate::config::{LedgerConfig, LedgerMode};
use crate::models::{FeedRecord, TransactionHandle, TransactionReceipt};
use crate::types::{AppError, AppResult};

/// Signer used by the in-memory ledger when no key is configured
/// (first account of the standard local development mnemonic)
pub const DEV_SIGNER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

#[async_trait]
pub trait FeedLedger: Send + Sync {
    /// Address writes are signed with, if a signer is connected
    fn signer(&self) -> Option<Address>;

    /// Short backend name for health output
    fn backend(&self) -> &'static str;

    async fn create_feed(&self, cid: &str) -> AppResult<TransactionHandle>;

    async fn delete_feed(&self, index: u64) -> AppResult<TransactionHandle>;

    async fn await_confirmation(&self, handle: TransactionHandle) -> AppResult<TransactionReceipt>;

    async fn feeds_by_owner(&self, owner: Address) -> AppResult<Vec<FeedRecord>>;
}

pub fn signer_address(private_key: &str) -> AppResult<Address> {
    private_key
        .parse::<LocalWallet>()
        .map(|wallet| wallet.address())
        .map_err(|_| AppError::validation("Invalid PRIVATE_KEY"))
}

/// Open the ledger backend selected by `LEDGER_MODE`
pub async fn connect(config: &LedgerConfig) -> AppResult<Arc<dyn FeedLedger>> {
    match config.mode {
        LedgerMode::Contract => {
            let ledger = ContractLedger::connect(config).await?;
            Ok(Arc::new(ledger))
        }
        LedgerMode::Memory => {
            let signer = match &config.private_key {
                Some(key) => signer_address(key)?,
                None => DEV_SIGNER
                    .parse::<Address>()
                    .map_err(|_| AppError::validation("Invalid development signer"))?,
            };
            info!(signer = ?signer, "Using in-memory feed ledger");
            Ok(Arc::new(MemoryLedger::with_signer(signer)))
        }
    }
}
