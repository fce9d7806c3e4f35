//! Error types for the task-guard operator.
//!
//! Each pipeline component owns its error enum; [`PipelineError`] wraps the
//! per-task ones and reports the stage that failed.

use std::fmt;

use thiserror::Error;

/// Startup configuration errors. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("{0} is not set")]
    Missing(&'static str),

    /// An environment variable is set but cannot be used.
    #[error("invalid {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Errors returned by the ledger capability traits.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// RPC transport failed (connection refused, dropped, bad response).
    #[error("ledger transport error: {0}")]
    Transport(String),

    /// The contract call reverted.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// Waiting for the receipt failed.
    #[error("receipt unavailable: {0}")]
    Receipt(String),

    /// The call did not finish in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },
}

/// Errors from the task event watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// A log could not be decoded as a `NewTaskCreated` event.
    #[error("event decoding failed: {0}")]
    Decode(String),

    /// Fetching logs or the chain head failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Resubscription failed too many times in a row.
    #[error("subscription lost after {attempts} consecutive failures: {last_error}")]
    SubscriptionLost {
        /// Consecutive failed attempts.
        attempts: u32,
        /// Last error observed.
        last_error: String,
    },

    /// The pipeline stopped receiving task records.
    #[error("task channel closed")]
    PipelineClosed,

    /// Reading or writing the cursor file failed.
    #[error("cursor state error: {0}")]
    State(String),
}

/// Errors from the classification oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The model endpoint could not be reached.
    #[error("oracle request failed: {0}")]
    Request(String),

    /// The model endpoint answered with a non-success status.
    #[error("oracle returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response body did not match the chat response shape.
    #[error("malformed oracle response: {0}")]
    Malformed(String),

    /// The model did not answer in time.
    #[error("oracle timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },
}

/// Signing the attestation digest failed.
#[derive(Debug, Error)]
#[error("signing failed: {0}")]
pub struct SigningError(pub String);

/// Errors from the two-phase response submission.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The dry run reverted or could not be executed.
    #[error("simulation failed: {0}")]
    Simulation(#[source] LedgerError),

    /// Broadcasting the transaction failed.
    #[error("broadcast failed: {0}")]
    Broadcast(#[source] LedgerError),

    /// No receipt could be obtained for the broadcast transaction.
    #[error("confirmation failed for {tx_hash}: {source}")]
    Confirmation {
        /// Hash of the broadcast transaction.
        tx_hash: String,
        /// Underlying ledger error.
        #[source]
        source: LedgerError,
    },

    /// The transaction was mined but reverted.
    #[error("transaction {tx_hash} reverted on chain")]
    Reverted {
        /// Hash of the reverted transaction.
        tx_hash: String,
    },
}

/// Pipeline stage names, used when logging per-task failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Oracle classification.
    Classify,
    /// Attestation signing.
    Sign,
    /// Dry-run against chain state.
    Simulate,
    /// Transaction broadcast.
    Submit,
    /// Receipt wait.
    Confirm,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Classify => "classify",
            Stage::Sign => "sign",
            Stage::Simulate => "simulate",
            Stage::Submit => "submit",
            Stage::Confirm => "confirm",
        };
        f.write_str(name)
    }
}

/// A single task's processing failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Classification failed.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// Signing failed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// Simulation, broadcast or confirmation failed.
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

impl PipelineError {
    /// Stage at which the task was abandoned.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Oracle(_) => Stage::Classify,
            PipelineError::Signing(_) => Stage::Sign,
            PipelineError::Submission(SubmissionError::Simulation(_)) => Stage::Simulate,
            PipelineError::Submission(SubmissionError::Broadcast(_)) => Stage::Submit,
            PipelineError::Submission(SubmissionError::Confirmation { .. })
            | PipelineError::Submission(SubmissionError::Reverted { .. }) => Stage::Confirm,
        }
    }
}
