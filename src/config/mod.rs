//! Process configuration, read once at startup from the environment.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;

use crate::error::ConfigError;

pub mod contracts;

pub use contracts::ContractsConfig;

/// Environment accessor, swapped out in tests.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub const OPERATOR_KEY_VAR: &str = "OPERATOR_PRIVATE_KEY";
pub const CREATOR_KEY_VAR: &str = "PRIVATE_KEY";

/// Classification model settings.
#[derive(Clone, Debug)]
pub struct OracleConfig {
    pub host: String,
    pub model: String,
    pub timeout: Duration,
}

/// Event watcher settings.
#[derive(Clone, Debug)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub max_block_range: u64,
    pub confirmations: u64,
    pub resubscribe_overlap_blocks: u64,
    pub max_resubscribe_attempts: u32,
    pub rpc_timeout: Duration,
    pub state_file: Option<PathBuf>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
            max_block_range: 500,
            confirmations: 0,
            resubscribe_overlap_blocks: 2,
            max_resubscribe_attempts: 10,
            rpc_timeout: Duration::from_secs(30),
            state_file: None,
        }
    }
}

/// Response submitter settings.
#[derive(Clone, Debug)]
pub struct SubmitterConfig {
    pub rpc_timeout: Duration,
    pub receipt_timeout: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(30),
            receipt_timeout: Duration::from_secs(120),
        }
    }
}

/// Everything the operator process needs.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    pub contracts: ContractsConfig,
    pub operator_signer: PrivateKeySigner,
    pub oracle: OracleConfig,
    pub watcher: WatcherConfig,
    pub submitter: SubmitterConfig,
    pub seen_task_capacity: usize,
    pub status_port: u16,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name: &str| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let operator_signer = signer_from_lookup(lookup, OPERATOR_KEY_VAR)?;
        let rpc_timeout = Duration::from_secs(lookup_or(lookup, "RPC_TIMEOUT_SECONDS", 30u64)?);

        let oracle = OracleConfig {
            host: lookup("OLLAMA_HOST").unwrap_or_else(|| "http://127.0.0.1:11434".to_string()),
            model: lookup("OLLAMA_MODEL").unwrap_or_else(|| "llama-guard3:1b".to_string()),
            timeout: Duration::from_secs(lookup_or(lookup, "ORACLE_TIMEOUT_SECONDS", 60u64)?),
        };

        let max_block_range = lookup_or(lookup, "MAX_BLOCK_RANGE", 500u64)?;
        if max_block_range == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_BLOCK_RANGE",
                reason: "must be at least 1".to_string(),
            });
        }

        let watcher = WatcherConfig {
            poll_interval: Duration::from_millis(lookup_or(lookup, "POLL_INTERVAL_MS", 1_000u64)?),
            max_block_range,
            confirmations: lookup_or(lookup, "CONFIRMATIONS", 0u64)?,
            resubscribe_overlap_blocks: lookup_or(lookup, "RESUBSCRIBE_OVERLAP_BLOCKS", 2u64)?,
            max_resubscribe_attempts: lookup_or(lookup, "MAX_RESUBSCRIBE_ATTEMPTS", 10u32)?,
            rpc_timeout,
            state_file: lookup("OPERATOR_STATE_FILE")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        };

        let submitter = SubmitterConfig {
            rpc_timeout,
            receipt_timeout: Duration::from_secs(lookup_or(
                lookup,
                "RECEIPT_TIMEOUT_SECONDS",
                120u64,
            )?),
        };

        Ok(Self {
            contracts: ContractsConfig::from_lookup(lookup)?,
            operator_signer,
            oracle,
            watcher,
            submitter,
            seen_task_capacity: lookup_or(lookup, "SEEN_TASK_CAPACITY", 4_096usize)?,
            status_port: lookup_or(lookup, "STATUS_PORT", 3001u16)?,
        })
    }
}

/// Load a hex-encoded secp256k1 key (with or without `0x`) from `name`.
pub fn signer_from_lookup(
    lookup: Lookup<'_>,
    name: &'static str,
) -> Result<PrivateKeySigner, ConfigError> {
    let raw = lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))?;
    parse_private_key(name, &raw)
}

fn parse_private_key(name: &'static str, raw: &str) -> Result<PrivateKeySigner, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { name, reason };

    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(hex_part).map_err(|e| invalid(format!("not hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(invalid(format!("expected 32 bytes, got {}", bytes.len())));
    }

    PrivateKeySigner::from_slice(&bytes).map_err(|e| invalid(e.to_string()))
}

pub(crate) fn lookup_or<T>(lookup: Lookup<'_>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}
