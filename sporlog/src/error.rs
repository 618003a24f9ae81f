//! Error types for log reading and decoding.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LogError>;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("cannot open log file {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid log format: {0}")]
    Format(String),

    #[error("unsupported log version {0}")]
    UnsupportedVersion(String),

    #[error("failed to decode {module} module record (schema version {version})")]
    Decode { module: &'static str, version: u32 },

    #[error("the {0} module contains incomplete data")]
    PartialModuleData(String),

    #[error("record rank {rank} outside job size {nprocs}")]
    MalformedRank { rank: i64, nprocs: u64 },
}
