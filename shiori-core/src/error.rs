use thiserror::Error;

/// Unified error type for the scan pipeline.
///
/// Remote clients retry internally; by the time an error surfaces here it
/// is final for the operation that produced it. Only `CatalogUnreachable`
/// and `NoLocalFiles` abort a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("no local files found after filtering")]
    NoLocalFiles,

    #[error("catalog unreachable: {0}")]
    CatalogUnreachable(String),

    #[error("transient remote failure: {0}")]
    TransientRemote(String),

    #[error("could not build media tree for media {media_id}: {reason}")]
    TreeFetchFailure { media_id: i32, reason: String },

    #[error("no candidate matched file: {0}")]
    UnmatchedFile(String),

    #[error("internal panic: {0}")]
    InternalPanic(String),

    #[error("scan cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ScanError>;
