use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the coverage engine and its supporting types.
///
/// `BadRegion` is constructed internally but never escapes [`crate::region::BedRegions::load`];
/// malformed rows are logged and skipped rather than propagated, per the non-fatal recovery
/// policy for BED parsing.
#[derive(Debug, Error)]
pub enum CovError {
    #[error("alignment stream is not sorted by coordinate (SO tag missing or not 'coordinate')")]
    UnsortedInput,

    #[error("output directory already exists: {0}")]
    OutputExists(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed BED region: {0}")]
    BadRegion(String),

    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),
}

pub type CovResult<T> = Result<T, CovError>;
