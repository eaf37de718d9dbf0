use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which side of the mirror a root path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootRole {
    Source,
    Destination,
}

impl fmt::Display for RootRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootRole::Source => write!(f, "source"),
            RootRole::Destination => write!(f, "destination"),
        }
    }
}

/// Fatal scan problems. Raised before any task is dispatched.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{role} root does not exist: {}", path.display())]
    RootNotFound { role: RootRole, path: PathBuf },

    #[error("{role} root is not a directory: {}", path.display())]
    NotADirectory { role: RootRole, path: PathBuf },

    #[error("cannot read {role} root {}: {source}", path.display())]
    Unreadable {
        role: RootRole,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("{0}")]
    UnsafeLayout(String),
}

/// Invalid run configuration, detected before the scan starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown format '{0}'")]
    UnknownFormat(String),

    #[error("format '{name}' is not supported: {reason}")]
    UnsupportedFormat { name: String, reason: String },

    #[error("quality must not be empty")]
    EmptyQuality,

    #[error("parallelism must be at least 1")]
    ZeroParallelism,

    #[error("render interval must be greater than zero")]
    ZeroRenderInterval,

    #[error("codec unavailable: {0}")]
    CodecUnavailable(String),

    #[error("{codec} does not recognise format '{format}'")]
    FormatNotRecognized { codec: String, format: String },
}

/// Per-task failure. Recorded and reported; never stops the run.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    #[error("source file vanished before conversion")]
    SourceMissing,

    #[error("cannot create directory {}: {reason}", path.display())]
    DirectoryCreate { path: PathBuf, reason: String },

    #[error("transcode failed: {0}")]
    Transcode(String),
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("failed to start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
