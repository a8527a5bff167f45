//! Error types for manifest loading and lookup.

use std::path::PathBuf;
use thiserror::Error;

/// Manifest operation result type.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Manifest errors. All of them are deployment problems rather than
/// transient failures.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file could not be read
    #[error("Failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest file is not valid manifest JSON
    #[error("Failed to parse manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No compute matches this node
    #[error("No compute in manifest matches node {node} (serial {serial})")]
    ComputeNotFound { node: String, serial: String },
}
