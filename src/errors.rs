use std::io;

use thiserror::Error;

use crate::types::PathString;

/// Error type for pairing, packaging, store, and loader failures.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// An image could not be decoded or its dimensions probed.
    #[error("image codec failure for '{path}': {reason}")]
    Codec {
        /// File path or stored basename of the offending image.
        path: PathString,
        /// Underlying codec failure.
        reason: String,
    },
    /// The record store rejected an operation or holds corrupt data.
    #[error("record store failure: {0}")]
    Store(String),
    /// A stored record is missing fields or carries ill-typed values.
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    /// Filesystem failure while scanning folders or reading images.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A caller-supplied option or pattern is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
}
