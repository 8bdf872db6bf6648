use thiserror::Error;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("store error: {0}")]
    Store(#[from] recordstore::StoreError),
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error("no active schema found for {0}")]
    NoActiveSchema(String),
    #[error("extraction returned unparseable JSON: {0}")]
    UnparseableJson(String),
    #[error("stage1 row not found: {0}")]
    Stage1NotFound(String),
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;
