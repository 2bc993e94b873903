use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::ShortContentPolicy;
use crate::types::LLMProvider;

/// Default ceiling for an uploaded image (5 MiB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
    pub upload_dir: PathBuf,
    pub max_image_bytes: usize,
}

#[derive(Clone)]
pub struct InferenceConfig {
    pub provider: LLMProvider,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("provider", &self.provider)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub api_url: String,
    pub timeout: Duration,
    pub short_content_policy: ShortContentPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    Contract,
    Memory,
}

impl std::str::FromStr for LedgerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "contract" => Ok(LedgerMode::Contract),
            "memory" => Ok(LedgerMode::Memory),
            other => Err(anyhow!("Unknown LEDGER_MODE '{}' (expected contract or memory)", other)),
        }
    }
}

#[derive(Clone)]
pub struct LedgerConfig {
    pub mode: LedgerMode,
    pub rpc_url: String,
    pub chain_id: u64,
    pub contract_address: String,
    pub private_key: Option<String>,
    pub confirmations: usize,
    pub confirmation_timeout: Duration,
    /// Bound on each RPC round trip (chain ID, submission, reads)
    pub rpc_timeout: Duration,
}

impl std::fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("mode", &self.mode)
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("contract_address", &self.contract_address)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("confirmations", &self.confirmations)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .field("rpc_timeout", &self.rpc_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let provider_id = env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = LLMProvider::from_id(&provider_id)
            .ok_or_else(|| anyhow!("Unsupported LLM_PROVIDER '{}'", provider_id))?;

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "*".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                upload_dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("uploads")),
                max_image_bytes: env::var("MAX_IMAGE_BYTES")
                    .map(|v| v.parse::<usize>())
                    .unwrap_or(Ok(DEFAULT_MAX_IMAGE_BYTES))?,
            },
            inference: InferenceConfig {
                provider,
                api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
                max_tokens: env::var("LLM_MAX_TOKENS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()?,
                base_url: env::var("LLM_BASE_URL").ok().filter(|s| !s.is_empty()),
                timeout: Duration::from_secs(
                    env::var("LLM_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "60".to_string())
                        .parse()?,
                ),
            },
            storage: StorageConfig {
                api_url: env::var("STORAGE_API_URL")
                    .unwrap_or_else(|_| "http://localhost:8000".to_string()),
                timeout: Duration::from_secs(
                    env::var("STORAGE_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()?,
                ),
                short_content_policy: short_content_policy(env::var("SHORT_CONTENT_POLICY").ok().as_deref())?,
            },
            ledger: LedgerConfig {
                mode: env::var("LEDGER_MODE")
                    .unwrap_or_else(|_| "contract".to_string())
                    .parse()?,
                rpc_url: env::var("RPC_URL")
                    .unwrap_or_else(|_| "https://api.calibration.node.glif.io/rpc/v1".to_string()),
                chain_id: env::var("CHAIN_ID")
                    .unwrap_or_else(|_| "314159".to_string())
                    .parse()?,
                contract_address: env::var("CONTRACT_ADDRESS")
                    .unwrap_or_else(|_| "0x45E762AFA6178b82Efbcb3d685bEBF023E2ef6b1".to_string()),
                private_key: env::var("PRIVATE_KEY").ok().filter(|s| !s.is_empty()),
                confirmations: env::var("CONFIRMATIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
                confirmation_timeout: Duration::from_secs(
                    env::var("CONFIRMATION_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "120".to_string())
                        .parse()?,
                ),
                rpc_timeout: Duration::from_secs(
                    env::var("LEDGER_RPC_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()?,
                ),
            },
        })
    }
}

/// Unset or blank means the default `Reject` policy
fn short_content_policy(raw: Option<&str>) -> Result<ShortContentPolicy> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value.parse(),
        None => Ok(ShortContentPolicy::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_mode_parsing() {
        assert_eq!("contract".parse::<LedgerMode>().unwrap(), LedgerMode::Contract);
        assert_eq!(" Memory ".parse::<LedgerMode>().unwrap(), LedgerMode::Memory);
        assert!("sqlite".parse::<LedgerMode>().is_err());
    }

    #[test]
    fn test_short_content_policy_defaults_to_reject() {
        assert_eq!(short_content_policy(None).unwrap(), ShortContentPolicy::Reject);
        assert_eq!(short_content_policy(Some("  ")).unwrap(), ShortContentPolicy::Reject);
        assert_eq!(short_content_policy(Some("pad")).unwrap(), ShortContentPolicy::Pad);
        assert!(short_content_policy(Some("truncate")).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let ledger = LedgerConfig {
            mode: LedgerMode::Memory,
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 31337,
            contract_address: "0x0000000000000000000000000000000000000000".to_string(),
            private_key: Some("deadbeef".to_string()),
            confirmations: 1,
            confirmation_timeout: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(5),
        };
        let rendered = format!("{:?}", ledger);
        assert!(!rendered.contains("deadbeef"));
        assert!(rendered.contains("<redacted>"));
    }
}
