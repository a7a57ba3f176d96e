use std::path::PathBuf;

use thiserror::Error;

use crate::validate::ValidationReport;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid session parameters: {0}")]
    InvalidParams(ValidationReport),

    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("model path is not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("invalid parameters file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
