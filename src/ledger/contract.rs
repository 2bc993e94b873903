// FeedRegistry contract bindings over JSON-RPC

use std::convert::TryFrom;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::contract::{abigen, ContractError};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256, U64};
use tracing::{debug, info, warn};

use super::FeedLedger;
use crate::config::LedgerConfig;
use crate::models::{FeedRecord, TransactionHandle, TransactionReceipt};
use crate::types::{AppError, AppResult, LedgerFailure};

abigen!(
    FeedRegistry,
    r#"[
        function createFeed(string cid)
        function deleteFeed(uint256 index)
        struct StoredFeed { string cid; uint256 timestamp; bool isDeleted; }
        function getFeedsByOwner(address owner) view returns (StoredFeed[])
    ]"#
);

type SigningClient = SignerMiddleware<Provider<Http>, LocalWallet>;

struct Writer {
    address: Address,
    contract: FeedRegistry<SigningClient>,
}

pub struct ContractLedger {
    provider: Provider<Http>,
    reader: FeedRegistry<Provider<Http>>,
    writer: Option<Writer>,
    confirmations: usize,
    confirmation_timeout: Duration,
    rpc_timeout: Duration,
}

impl ContractLedger {
    /// Connect to the RPC, check the chain ID and attach the signer if a key is configured
    pub async fn connect(config: &LedgerConfig) -> AppResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| LedgerFailure::Transport(format!("Invalid RPC URL: {}", e)))?;

        let actual = with_rpc_timeout(config.rpc_timeout, "eth_chainId", async {
            provider
                .get_chainid()
                .await
                .map_err(|e| LedgerFailure::Transport(format!("Failed to get chain ID: {}", e)))
        })
        .await?
        .as_u64();
        if actual != config.chain_id {
            return Err(LedgerFailure::WrongNetwork {
                expected: config.chain_id,
                actual,
            }
            .into());
        }

        let contract_address = config
            .contract_address
            .parse::<Address>()
            .map_err(|_| AppError::validation(format!("Invalid contract address '{}'", config.contract_address)))?;

        let reader = FeedRegistry::new(contract_address, Arc::new(provider.clone()));

        let writer = match &config.private_key {
            Some(key) => {
                let wallet = key
                    .parse::<LocalWallet>()
                    .map_err(|_| AppError::validation("Invalid PRIVATE_KEY"))?
                    .with_chain_id(config.chain_id);
                let address = wallet.address();
                let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet));
                Some(Writer {
                    address,
                    contract: FeedRegistry::new(contract_address, client),
                })
            }
            None => {
                warn!("No PRIVATE_KEY configured, ledger is read-only");
                None
            }
        };

        info!(
            chain_id = actual,
            contract = ?contract_address,
            signer = ?writer.as_ref().map(|w| w.address),
            "Connected to FeedRegistry"
        );

        Ok(Self {
            provider,
            reader,
            writer,
            confirmations: config.confirmations,
            confirmation_timeout: config.confirmation_timeout,
            rpc_timeout: config.rpc_timeout,
        })
    }

    fn writer(&self) -> AppResult<&Writer> {
        self.writer.as_ref().ok_or_else(|| LedgerFailure::NoSigner.into())
    }
}

#[async_trait]
impl FeedLedger for ContractLedger {
    fn signer(&self) -> Option<Address> {
        self.writer.as_ref().map(|w| w.address)
    }

    fn backend(&self) -> &'static str {
        "contract"
    }

    async fn create_feed(&self, cid: &str) -> AppResult<TransactionHandle> {
        let writer = self.writer()?;
        let call = writer.contract.create_feed(cid.to_string());
        let hash = with_rpc_timeout(self.rpc_timeout, "createFeed submission", async {
            call.send()
                .await
                .map(|pending| pending.tx_hash())
                .map_err(classify_contract_error)
        })
        .await?;

        info!(cid = %cid, tx = ?hash, "createFeed submitted");
        Ok(TransactionHandle { hash })
    }

    async fn delete_feed(&self, index: u64) -> AppResult<TransactionHandle> {
        let writer = self.writer()?;
        let call = writer.contract.delete_feed(U256::from(index));
        let hash = with_rpc_timeout(self.rpc_timeout, "deleteFeed submission", async {
            call.send()
                .await
                .map(|pending| pending.tx_hash())
                .map_err(classify_contract_error)
        })
        .await?;

        info!(index, tx = ?hash, "deleteFeed submitted");
        Ok(TransactionHandle { hash })
    }

    async fn await_confirmation(&self, handle: TransactionHandle) -> AppResult<TransactionReceipt> {
        let hash = handle.hash;
        let pending = PendingTransaction::new(hash, &self.provider).confirmations(self.confirmations);

        let receipt = tokio::time::timeout(self.confirmation_timeout, pending)
            .await
            .map_err(|_| LedgerFailure::Timeout {
                what: format!("transaction {:?}", hash),
                secs: self.confirmation_timeout.as_secs(),
            })?
            .map_err(|e| LedgerFailure::Transport(e.to_string()))?
            .ok_or_else(|| LedgerFailure::Dropped(format!("{:?}", hash)))?;

        if receipt.status == Some(U64::zero()) {
            return Err(LedgerFailure::Reverted(format!("transaction {:?} failed on-chain", hash)).into());
        }

        let block_number = receipt.block_number.map(|b| b.as_u64());
        debug!(tx = ?hash, block = ?block_number, "Transaction confirmed");

        Ok(TransactionReceipt { hash, block_number })
    }

    async fn feeds_by_owner(&self, owner: Address) -> AppResult<Vec<FeedRecord>> {
        let call = self.reader.get_feeds_by_owner(owner);
        let raw = with_rpc_timeout(self.rpc_timeout, "getFeedsByOwner", async {
            call.call().await.map_err(classify_contract_error)
        })
        .await?;

        let raw = raw
            .into_iter()
            .map(|(cid, timestamp, is_deleted)| StoredFeed {
                cid,
                timestamp,
                is_deleted,
            })
            .collect();
        Ok(records_from_raw(owner, raw))
    }
}

/// Convert the contract's `StoredFeed` structs into records, keeping their order
pub fn records_from_raw(owner: Address, raw: Vec<StoredFeed>) -> Vec<FeedRecord> {
    raw.into_iter()
        .map(|feed| FeedRecord {
            cid: feed.cid,
            timestamp: feed.timestamp.low_u64(),
            is_deleted: feed.is_deleted,
            owner,
        })
        .collect()
}

async fn with_rpc_timeout<T, F>(limit: Duration, what: &str, call: F) -> Result<T, LedgerFailure>
where
    F: Future<Output = Result<T, LedgerFailure>>,
{
    tokio::time::timeout(limit, call).await.map_err(|_| {
        warn!(call = what, secs = limit.as_secs_f64(), "Ledger RPC timed out");
        LedgerFailure::Timeout {
            what: what.to_string(),
            secs: limit.as_secs(),
        }
    })?
}

fn classify_contract_error<M: Middleware>(err: ContractError<M>) -> LedgerFailure {
    if let Some(reason) = err.decode_revert::<String>() {
        return LedgerFailure::Reverted(reason);
    }
    if err.is_revert() {
        return LedgerFailure::Reverted(err.to_string());
    }
    LedgerFailure::Rejected(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use tokio::net::TcpListener;

    const CONTRACT: &str = "0x45E762AFA6178b82Efbcb3d685bEBF023E2ef6b1";
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn config(rpc_url: String) -> LedgerConfig {
        LedgerConfig {
            mode: crate::config::LedgerMode::Contract,
            rpc_url,
            chain_id: 314159,
            contract_address: CONTRACT.to_string(),
            private_key: None,
            confirmations: 1,
            confirmation_timeout: Duration::from_secs(1),
            rpc_timeout: Duration::from_secs(1),
        }
    }

    /// RPC endpoint that accepts connections and never answers
    async fn silent_rpc() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    fn ledger_at(rpc_url: &str, private_key: Option<&str>, rpc_timeout: Duration) -> ContractLedger {
        let provider = Provider::<Http>::try_from(rpc_url).unwrap();
        let contract_address: Address = CONTRACT.parse().unwrap();
        let writer = private_key.map(|key| {
            let wallet = key.parse::<LocalWallet>().unwrap().with_chain_id(314159u64);
            let address = wallet.address();
            let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet));
            Writer {
                address,
                contract: FeedRegistry::new(contract_address, client),
            }
        });
        ContractLedger {
            reader: FeedRegistry::new(contract_address, Arc::new(provider.clone())),
            provider,
            writer,
            confirmations: 1,
            confirmation_timeout: Duration::from_secs(1),
            rpc_timeout,
        }
    }

    #[test]
    fn test_records_keep_contract_order() {
        let owner = Address::repeat_byte(0xab);
        let raw = vec![
            StoredFeed {
                cid: "bafyA".to_string(),
                timestamp: U256::from(1_700_000_000u64),
                is_deleted: false,
            },
            StoredFeed {
                cid: "bafyB".to_string(),
                timestamp: U256::from(1_700_000_100u64),
                is_deleted: true,
            },
        ];

        let records = records_from_raw(owner, raw);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cid, "bafyA");
        assert_eq!(records[0].timestamp, 1_700_000_000);
        assert!(!records[0].is_deleted);
        assert!(records[1].is_deleted);
        assert!(records.iter().all(|r| r.owner == owner));
    }

    #[tokio::test]
    async fn test_feeds_by_owner_decodes_record_array() {
        let mut server = mockito::Server::new_async().await;
        let _chain = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::Regex("eth_chainId".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x4cb2f"}"#)
            .create_async()
            .await;

        let returned = encode(&[Token::Array(vec![
            Token::Tuple(vec![
                Token::String("bafyA".to_string()),
                Token::Uint(U256::from(1u64)),
                Token::Bool(false),
            ]),
            Token::Tuple(vec![
                Token::String("bafyB".to_string()),
                Token::Uint(U256::from(2u64)),
                Token::Bool(true),
            ]),
        ])]);
        let _call = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::Regex("eth_call".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"jsonrpc":"2.0","id":2,"result":"{}"}}"#,
                ethers::types::Bytes::from(returned)
            ))
            .create_async()
            .await;

        let ledger = ContractLedger::connect(&config(server.url())).await.unwrap();
        let owner = Address::repeat_byte(0xab);
        let records = ledger.feeds_by_owner(owner).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cid, "bafyA");
        assert_eq!(records[0].timestamp, 1);
        assert!(!records[0].is_deleted);
        assert_eq!(records[1].cid, "bafyB");
        assert_eq!(records[1].timestamp, 2);
        assert!(records[1].is_deleted);
        assert!(records.iter().all(|r| r.owner == owner));
    }

    #[tokio::test]
    async fn test_unreachable_rpc_is_transport_failure() {
        match ContractLedger::connect(&config("http://127.0.0.1:1".to_string())).await {
            Err(AppError::Ledger(LedgerFailure::Transport(_))) => {}
            Err(other) => panic!("expected transport failure, got {:?}", other),
            Ok(_) => panic!("expected connection to fail"),
        }
    }

    #[tokio::test]
    async fn test_chain_id_mismatch_is_wrong_network() {
        let mut server = mockito::Server::new_async().await;
        let _rpc = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::Regex("eth_chainId".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#)
            .create_async()
            .await;

        match ContractLedger::connect(&config(server.url())).await {
            Err(AppError::Ledger(LedgerFailure::WrongNetwork { expected, actual })) => {
                assert_eq!(expected, 314159);
                assert_eq!(actual, 1);
            }
            Err(other) => panic!("expected wrong network, got {:?}", other),
            Ok(_) => panic!("expected chain mismatch"),
        }
    }

    #[tokio::test]
    async fn test_silent_rpc_times_out_on_connect() {
        let mut config = config(silent_rpc().await);
        config.rpc_timeout = Duration::from_millis(300);

        let result = tokio::time::timeout(Duration::from_secs(5), ContractLedger::connect(&config))
            .await
            .expect("connect must not hang");
        assert!(matches!(result, Err(AppError::Ledger(LedgerFailure::Timeout { .. }))));
    }

    #[tokio::test]
    async fn test_silent_rpc_times_out_on_reads_and_writes() {
        let url = silent_rpc().await;
        let ledger = ledger_at(&url, Some(DEV_KEY), Duration::from_millis(300));
        let limit = Duration::from_secs(5);

        let read = tokio::time::timeout(limit, ledger.feeds_by_owner(Address::repeat_byte(0xab)))
            .await
            .expect("getFeedsByOwner must not hang");
        match read {
            Err(AppError::Ledger(LedgerFailure::Timeout { what, .. })) => assert_eq!(what, "getFeedsByOwner"),
            other => panic!("expected timeout, got {:?}", other),
        }

        let create = tokio::time::timeout(limit, ledger.create_feed("bafyA"))
            .await
            .expect("createFeed must not hang");
        assert!(matches!(create, Err(AppError::Ledger(LedgerFailure::Timeout { .. }))));

        let delete = tokio::time::timeout(limit, ledger.delete_feed(0))
            .await
            .expect("deleteFeed must not hang");
        assert!(matches!(delete, Err(AppError::Ledger(LedgerFailure::Timeout { .. }))));
    }
}
