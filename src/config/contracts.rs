use alloy::primitives::{address, Address};

use super::{lookup_or, Lookup};
use crate::error::ConfigError;

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_TASK_CONTRACT: Address = address!("e3e4631D734e4b3F900AfcC396440641Ed0df339");

/// Ledger endpoint and the contract the operator serves.
#[derive(Clone, Debug)]
pub struct ContractsConfig {
    pub rpc_url: String,
    pub task_contract_address: Address,
}

impl ContractsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name: &str| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let rpc_url = lookup("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        if rpc_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: "RPC_URL",
                reason: "empty".to_string(),
            });
        }

        Ok(Self {
            rpc_url,
            task_contract_address: lookup_or(lookup, "TASK_CONTRACT_ADDRESS", DEFAULT_TASK_CONTRACT)?,
        })
    }
}
