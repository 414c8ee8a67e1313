//! Error types for mosaic-align.
//!
//! Alignment-level failures (no model found, disconnected graph,
//! non-convergence, unlinked section pair) are not errors; they are carried
//! in result types and logged. Only unrecoverable I/O surfaces here.

use thiserror::Error;

/// mosaic-align error type
#[derive(Error, Debug)]
pub enum AlignError {
    #[error("descriptor extraction failed for patch {patch_id}: {source}")]
    Extraction {
        patch_id: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for AlignError {
    fn from(e: toml::de::Error) -> Self {
        AlignError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AlignError>;
