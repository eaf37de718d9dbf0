//! FFmpeg process management
//!
//! Piping stderr without reading it deadlocks once FFmpeg fills the pipe
//! buffer (64KB on most systems). `FfmpegProcess` drains stderr on its own
//! thread so the caller can simply wait for the exit status.
//!
//! ```ignore
//! use shared_utils::ffmpeg_process::FfmpegProcess;
//! use std::process::Command;
//!
//! let mut cmd = Command::new("ffmpeg");
//! cmd.arg("-i").arg("input.flac").arg("output.opus");
//!
//! let process = FfmpegProcess::spawn(&mut cmd)?;
//! let (status, stderr) = process.wait_with_output()?;
//! ```

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error};

/// Locates the `ffmpeg` binary on `PATH`.
pub fn find_ffmpeg() -> Result<PathBuf> {
    which::which("ffmpeg").context("ffmpeg not found in PATH")
}

/// FFmpeg child process whose stderr is consumed in the background.
pub struct FfmpegProcess {
    child: Child,
    stderr_thread: Option<JoinHandle<String>>,
    started: Instant,
    command: String,
}

impl FfmpegProcess {
    /// Spawns `cmd` with stdin closed, stdout discarded and stderr captured.
    ///
    /// On unix the child gets its own process group, so a terminal Ctrl-C
    /// reaches only this process and running encodes are left to finish.
    pub fn spawn(cmd: &mut Command) -> Result<Self> {
        let command = format!("{:?}", cmd);
        debug!(command = %command, "Executing FFmpeg command");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().context("Failed to spawn FFmpeg process")?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture FFmpeg stderr"))?;

        let stderr_thread = thread::spawn(move || {
            let mut buf = String::new();
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(std::result::Result::ok) {
                buf.push_str(&line);
                buf.push('\n');
            }
            buf
        });

        Ok(Self {
            child,
            stderr_thread: Some(stderr_thread),
            started: Instant::now(),
            command,
        })
    }

    /// Waits for the process and returns its exit status with the full stderr text.
    pub fn wait_with_output(mut self) -> Result<(ExitStatus, String)> {
        let status = self.child.wait().context("Failed to wait for FFmpeg")?;
        let stderr = self
            .stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();

        if status.success() {
            debug!(
                command = %self.command,
                duration_secs = self.started.elapsed().as_secs_f64(),
                "FFmpeg process completed successfully"
            );
        } else {
            error!(
                command = %self.command,
                exit_code = status.code(),
                stderr_output = %stderr,
                "FFmpeg process failed"
            );
        }

        Ok((status, stderr))
    }
}

/// Picks the most meaningful line out of FFmpeg's stderr.
///
/// Prefers the last line mentioning an error, then the last non-progress line.
pub fn format_ffmpeg_error(stderr: &str) -> String {
    if let Some(error_line) = stderr
        .lines()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return error_line.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("frame=")
                && !trimmed.starts_with("fps=")
                && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown FFmpeg error".to_string())
}
