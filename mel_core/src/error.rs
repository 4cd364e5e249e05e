use std::path::PathBuf;

use thiserror::Error;

/// Configuration problems detected before any batch is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Vocabulary mismatch: dataset has {dataset} symbols, model expects {model}")]
    VocabularyMismatch { dataset: usize, model: usize },

    #[error("Reduction factor mismatch: dataset pads to r={dataset}, model decodes r={model}")]
    ReductionFactorMismatch { dataset: usize, model: usize },

    #[error("Failed to load model config {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// Fatal errors that abort an export run.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[source] anyhow::Error),

    #[error("Model failure on batch {batch}: {source}")]
    Model {
        batch: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write id list: {0}")]
    Pickle(#[from] serde_pickle::Error),
}

impl ExportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExportError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Per-item failures. These are counted and reported, never fatal.
#[derive(Debug, Clone, Error)]
pub enum ItemError {
    #[error("Unreadable source waveform: {0}")]
    Unreadable(String),

    #[error("Feature extraction failed: {0}")]
    Features(String),

    #[error("Transcript has no known symbols: {0:?}")]
    UnknownSymbols(String),

    #[error("Failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("Base name '{name}' already exported from {first}")]
    DuplicateBaseName { name: String, first: PathBuf },

    #[error("Source path has no usable file name")]
    NoBaseName,
}

/// One item that did not make it into the manifest.
#[derive(Debug)]
pub struct ItemFailure {
    pub source: PathBuf,
    pub error: ItemError,
}
