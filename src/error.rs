use std::path::PathBuf;

/// Failures surfaced by the catalog, the transform cache and the rescan
/// machinery.
///
/// Only `Catalog` is fatal at mount time. Every per-asset variant degrades
/// that asset's node and the scan continues.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("source unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("malformed transform descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("cache write failed for {path}: {source}")]
    CacheWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("change notification stream failed: {0}")]
    NotificationStreamFailure(String),

    #[error("invalid template {template:?}: {reason}")]
    Template { template: String, reason: String },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
