//! audio_mirror: keep a converted copy of an audio library in sync.
//!
//! The source tree is diffed against the destination tree; every source file
//! without a counterpart in the target format becomes a conversion task. Tasks
//! run on a bounded worker pool while a render loop draws progress.

pub mod artwork;
pub mod config;
pub mod error;
pub mod format;
pub mod path_mirror;
pub mod progress;
pub mod renderer;
pub mod report;
pub mod runner;
pub mod task;
pub mod transcoder;
pub mod worker_pool;

#[cfg(test)]
mod test_support;

pub use artwork::{copy_missing_artwork, CopyResult, ARTWORK_EXTENSIONS};
pub use config::{RunConfig, DEFAULT_RENDER_INTERVAL};
pub use error::{ConfigError, MirrorError, ScanError, TaskError};
pub use format::{AudioFormat, FormatSpec};
pub use path_mirror::{diff, MirrorDiff, PathMirror, ScanWarning, SourceFilter, AUDIO_EXTENSIONS};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use renderer::{LogRenderer, Renderer, SilentRenderer, TerminalRenderer};
pub use report::{plan_report, print_summary_report, summary_report};
pub use runner::{run_library_conversion, ConversionRunner, RunResult};
pub use task::{ConversionTask, LibraryPath, TaskFailure, TaskOutcome};
pub use transcoder::{sweep_partial_outputs, FfmpegTranscoder, TranscodeError, Transcoder};
pub use worker_pool::{CancelFlag, PoolOutcome, WorkerPool};
