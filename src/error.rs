//! Failures of a single reduce task. Every variant is fatal to the task.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReduceError {
    /// A shard could not be opened or read.
    #[error("shard {path} is unavailable: {source}")]
    ShardUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A shard contains bytes that do not decode as a record.
    #[error("malformed record #{record} in shard {path}: {source}")]
    MalformedRecord {
        path: PathBuf,
        record: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write reduce output {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReduceError {
    /// True when the intermediate data, not the output side, is at fault.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ReduceError::ShardUnavailable { .. } | ReduceError::MalformedRecord { .. }
        )
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            ReduceError::ShardUnavailable { path, .. }
            | ReduceError::MalformedRecord { path, .. }
            | ReduceError::OutputWrite { path, .. } => path,
        }
    }
}
