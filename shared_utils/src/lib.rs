//! Shared Utilities for the audio_mirror tools
//!
//! Infrastructure that is not specific to audio libraries:
//! - Logging setup and external tool records
//! - Thread budgeting for parallel encoder processes
//! - FFmpeg process wrapper (deadlock-free stderr capture)
//! - Progress bar styles and formatting helpers
//! - Safety checks for output directories

pub mod ffmpeg_process;
pub mod logging;
pub mod progress;
pub mod safety;
pub mod thread_manager;

pub use ffmpeg_process::{find_ffmpeg, format_ffmpeg_error, FfmpegProcess};
pub use progress::{
    create_active_line, create_batch_bar, format_duration, truncate_filename,
};
pub use safety::{check_dangerous_directory, check_not_nested};
pub use thread_manager::{allocate, default_parallelism, ThreadAllocation, ThreadConfig};
