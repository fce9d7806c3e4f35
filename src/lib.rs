//! Task-guard operator
//!
//! Watches a task contract for `NewTaskCreated` events, classifies each
//! task's contents with a local model, signs the verdict and submits it back
//! with `respondToTask`.
//!
//! ```text
//! EvmLedger → TaskWatcher → TaskPipeline (Classifier → AttestationSigner → ResponseSubmitter) → EvmLedger
//! ```

pub mod app_state;
pub mod config;
pub mod contract;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod services;
