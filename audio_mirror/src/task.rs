use crate::error::TaskError;
use crate::format::FormatSpec;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// A path relative to a library root. Orders component-wise, which is the
/// order the scan visits files in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryPath(PathBuf);

impl LibraryPath {
    pub fn new(relative: impl Into<PathBuf>) -> Self {
        Self(relative.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Same relative location under `root`, with the extension replaced.
    pub fn mirrored_under(&self, root: &Path, extension: &str) -> PathBuf {
        root.join(&self.0).with_extension(extension)
    }
}

impl fmt::Display for LibraryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl Serialize for LibraryPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One unit of work: convert `source_path` into `dest_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionTask {
    pub source: LibraryPath,
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub format: FormatSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Converted,
    Failed(TaskError),
}

impl TaskOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, TaskOutcome::Converted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub source: LibraryPath,
    pub error: TaskError,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}
