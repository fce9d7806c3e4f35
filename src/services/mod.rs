//! Task-response pipeline services

pub mod attestation;
pub mod checkpoint;
pub mod oracle_service;
pub mod pipeline;
pub mod response_submitter;
pub mod task_watcher;

pub use attestation::AttestationSigner;
pub use checkpoint::Checkpoint;
pub use oracle_service::{Classifier, OllamaClassifier};
pub use pipeline::{TaskOutcome, TaskPipeline};
pub use response_submitter::ResponseSubmitter;
pub use task_watcher::TaskWatcher;
