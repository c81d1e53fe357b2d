//! Engine error types

use crate::provider::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error(transparent)]
    Stack(#[from] loam_core::StackError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("state file error: {0}")]
    State(String),

    #[error("lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
