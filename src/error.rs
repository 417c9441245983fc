use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not a reddit post url: {0}")]
    InvalidUrl(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("reddit request failed: {0}")]
    Reddit(String),
    /// Mux stage failed; carries the encoder diagnostics
    #[error("video assembly failed: {0}")]
    Assembly(String),
    #[error("video compression failed: {0}")]
    Compression(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            source,
            path: path.into(),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(error: reqwest::Error) -> Self {
        PipelineError::Reddit(error.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(source: std::io::Error) -> Self {
        PipelineError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
