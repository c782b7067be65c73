// Error taxonomy for index construction and loading.
//
// Runtime queries never return errors; bad bases and short reads are
// expressed through result kinds on the query APIs instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// A loaded file's size or header disagrees with what it advertises.
    /// Fatal: the index cannot be used.
    #[error("malformed index component `{suffix}` at {path}: {detail}")]
    Format {
        suffix: &'static str,
        path: PathBuf,
        detail: String,
    },

    /// Memory mapping, shared-segment creation or hugepage reservation
    /// failed after the downgrade chain was exhausted.
    #[error("resource failure for `{what}`: {source}")]
    Resource {
        what: String,
        #[source]
        source: std::io::Error,
    },

    /// The shared-segment fingerprint changed while a reader was attached.
    /// Handled inside the mapping layer by re-entering the init protocol;
    /// surfacing this above shm.rs is a bug.
    #[error("shared segment `{segment}` fingerprint mismatch")]
    Concurrency { segment: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn format(suffix: &'static str, path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        IndexError::Format {
            suffix,
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn resource(what: impl Into<String>, source: std::io::Error) -> Self {
        IndexError::Resource {
            what: what.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
