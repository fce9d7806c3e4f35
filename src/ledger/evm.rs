use std::time::Duration;

use alloy::network::{EthereumWallet, ReceiptResponse};
use alloy::primitives::{Address, TxHash};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolEvent;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use tracing::{debug, info};

use super::{ResponseLedger, TaskLogSource};
use crate::contract::TaskManager;
use crate::error::LedgerError;
use crate::models::{ResponseReceipt, Task, TaskResponse};

/// HTTP JSON-RPC client bound to one account and one task contract.
#[derive(Clone)]
pub struct EvmLedger {
    provider: DynProvider,
    contract: TaskManager::TaskManagerInstance<DynProvider>,
    account: Address,
    receipt_timeout: Duration,
}

impl EvmLedger {
    /// Build a wallet-backed provider for `signer`. No request is sent until
    /// the first call.
    pub fn connect(
        rpc_url: &str,
        contract_address: Address,
        signer: PrivateKeySigner,
        receipt_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| LedgerError::Transport(format!("invalid RPC url {rpc_url}: {e}")))?;

        let account = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();
        let contract = TaskManager::new(contract_address, provider.clone());

        info!(
            rpc_url = %rpc_url,
            account = %account,
            contract = %contract_address,
            "Ledger client ready"
        );

        Ok(Self {
            provider,
            contract,
            account,
            receipt_timeout,
        })
    }

    /// Account that signs outgoing transactions.
    pub fn account(&self) -> Address {
        self.account
    }

    /// Address of the task contract.
    pub fn contract_address(&self) -> Address {
        *self.contract.address()
    }

    /// Simulate, broadcast and confirm `createNewTask(contents)`.
    ///
    /// Returns the task the contract reported during simulation together
    /// with the receipt of the mined transaction.
    pub async fn create_task(&self, contents: &str) -> Result<(Task, ResponseReceipt), LedgerError> {
        let call = self
            .contract
            .createNewTask(contents.to_string())
            .from(self.account);

        let preview = call.call().await.map_err(call_error)?;
        let tx_hash = self.send_transaction(call.into_transaction_request()).await?;
        let receipt = self.wait_for_receipt(tx_hash).await?;

        Ok((Task::from(preview), receipt))
    }
}

#[async_trait]
impl TaskLogSource for EvmLedger {
    async fn latest_block(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }

    async fn task_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, LedgerError> {
        let filter = Filter::new()
            .address(self.contract_address())
            .event_signature(TaskManager::NewTaskCreated::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        debug!(from_block, to_block, count = logs.len(), "Fetched task logs");
        Ok(logs)
    }
}

#[async_trait]
impl ResponseLedger for EvmLedger {
    async fn simulate_response(
        &self,
        response: &TaskResponse,
    ) -> Result<TransactionRequest, LedgerError> {
        let call = self
            .contract
            .respondToTask(
                TaskManager::Task::from(&response.task),
                response.task_index,
                response.is_safe,
                response.signature.clone(),
            )
            .from(self.account);

        call.call().await.map_err(call_error)?;
        Ok(call.into_transaction_request())
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash, LedgerError> {
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ResponseReceipt, LedgerError> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Receipt(e.to_string()))?;

        Ok(ResponseReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
        })
    }
}

/// Node error responses to `eth_call` are reverts; anything else is transport.
fn call_error(err: alloy::contract::Error) -> LedgerError {
    match err {
        alloy::contract::Error::TransportError(e) if e.as_error_resp().is_none() => {
            LedgerError::Transport(e.to_string())
        }
        other => LedgerError::Reverted(other.to_string()),
    }
}
