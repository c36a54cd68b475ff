//! Worker error types.
//!
//! Stage-level failures are folded into project deltas by the processors;
//! only pre-claim and persistence failures surface through this enum.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Firestore error: {0}")]
    Firestore(#[from] rpilot_firestore::FirestoreError),

    #[error("Generation error: {0}")]
    GenAi(#[from] rpilot_genai::GenAiError),
}
