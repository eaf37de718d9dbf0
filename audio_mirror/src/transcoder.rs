//! Transcoder seam and the FFmpeg implementation.
//!
//! Output is written to a hidden `.part` file beside the destination and
//! renamed into place only after the encoder exits successfully, so an
//! interrupted conversion never leaves a file that the next scan would
//! mistake for a finished one.

use crate::error::ConfigError;
use crate::format::{AudioFormat, FormatSpec};
use shared_utils::logging::execute_external_command;
use shared_utils::{find_ffmpeg, format_ffmpeg_error, FfmpegProcess};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Name pattern of in-progress outputs: `.audio-mirror-<random>.part`.
pub const PARTIAL_PREFIX: &str = ".audio-mirror-";
pub const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct TranscodeError {
    pub reason: String,
}

impl TranscodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Converts one file. Must be safe to call from many workers at once.
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &str;

    /// Rejects formats this transcoder cannot produce. Called once per run,
    /// before the scan.
    fn validate(&self, format: &FormatSpec) -> Result<(), ConfigError>;

    /// Writes `dest` from `source`. The parent of `dest` already exists.
    fn transcode(&self, source: &Path, dest: &Path, format: &FormatSpec)
        -> Result<(), TranscodeError>;
}

pub struct FfmpegTranscoder {
    binary: PathBuf,
    child_threads: usize,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>, child_threads: usize) -> Self {
        Self {
            binary: binary.into(),
            child_threads: child_threads.max(1),
        }
    }

    /// Finds `ffmpeg` on `PATH`.
    pub fn locate(child_threads: usize) -> Result<Self, ConfigError> {
        let binary =
            find_ffmpeg().map_err(|e| ConfigError::CodecUnavailable(format!("{:#}", e)))?;
        debug!(binary = %binary.display(), child_threads, "Using ffmpeg");
        Ok(Self::new(binary, child_threads))
    }

    fn query(&self, listing: &str) -> Result<String, ConfigError> {
        let binary = self.binary.to_string_lossy();
        let result = execute_external_command(&binary, &["-hide_banner", listing])
            .map_err(|e| ConfigError::CodecUnavailable(format!("{:#}", e)))?;
        if result.exit_code != Some(0) {
            return Err(ConfigError::CodecUnavailable(format!(
                "{} {} exited with {:?}",
                binary, listing, result.exit_code
            )));
        }
        Ok(result.stdout)
    }

    /// Full argument list for one conversion into `output`.
    pub fn build_args(&self, source: &Path, output: &Path, spec: &FormatSpec) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            source.to_string_lossy().into_owned(),
            "-map".into(),
            "0:a:0".into(),
            "-map_metadata".into(),
            "0".into(),
        ];

        if let Some(codec) = encoder_for(&spec.format) {
            args.push("-c:a".into());
            args.push(codec.into());
        }

        if let Some(quality) = &spec.quality {
            match quality_args(&spec.format, quality) {
                Some((flag, value)) => {
                    args.push(flag.into());
                    args.push(value);
                }
                None => warn!(format = %spec.format, quality = %quality, "Quality ignored for PCM output"),
            }
        }

        args.push("-threads".into());
        args.push(self.child_threads.to_string());
        args.push("-f".into());
        args.push(muxer_for(&spec.format).into());
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn validate(&self, format: &FormatSpec) -> Result<(), ConfigError> {
        let (listing, wanted) = match encoder_for(&format.format) {
            Some(encoder) => ("-encoders", encoder),
            None => ("-muxers", muxer_for(&format.format)),
        };
        let output = self.query(listing)?;
        if listing_contains(&output, wanted) {
            Ok(())
        } else {
            Err(ConfigError::FormatNotRecognized {
                codec: self.name().to_string(),
                format: wanted.to_string(),
            })
        }
    }

    fn transcode(
        &self,
        source: &Path,
        dest: &Path,
        format: &FormatSpec,
    ) -> Result<(), TranscodeError> {
        let parent = dest
            .parent()
            .ok_or_else(|| TranscodeError::new("destination has no parent directory"))?;

        let partial = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| TranscodeError::new(format!("cannot create temporary file: {}", e)))?
            .into_temp_path();

        let mut cmd = Command::new(&self.binary);
        cmd.args(self.build_args(source, &partial, format));

        let process = FfmpegProcess::spawn(&mut cmd).map_err(|e| TranscodeError::new(format!("{:#}", e)))?;
        let (status, stderr) = process
            .wait_with_output()
            .map_err(|e| TranscodeError::new(format!("{:#}", e)))?;

        if !status.success() {
            return Err(TranscodeError::new(format_ffmpeg_error(&stderr)));
        }

        if let Some(permissions) = output_permissions(source) {
            fs::set_permissions(&partial, permissions)
                .map_err(|e| TranscodeError::new(format!("cannot set output permissions: {}", e)))?;
        }

        partial
            .persist(dest)
            .map_err(|e| TranscodeError::new(format!("cannot move output into place: {}", e.error)))?;
        Ok(())
    }
}

fn is_partial_output(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PARTIAL_PREFIX) && n.ends_with(PARTIAL_SUFFIX))
}

/// Removes in-progress outputs left under `dest_root` by a run that was killed
/// before it could clean up. Returns how many were removed.
///
/// Must not run while another conversion writes into the same tree.
pub fn sweep_partial_outputs(dest_root: &Path) -> usize {
    if !dest_root.is_dir() {
        return 0;
    }

    let mut removed = 0;
    for entry in WalkDir::new(dest_root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Cannot inspect destination entry for leftovers");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_partial_output(entry.path()) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Cannot remove leftover partial output"),
        }
    }

    if removed > 0 {
        info!(removed, dest = %dest_root.display(), "Removed partial outputs from an interrupted run");
    }
    removed
}

/// Temporary files are created owner-only; converted tracks take the source's
/// read bits instead, always keeping the owner able to read and write.
fn output_permissions(source: &Path) -> Option<fs::Permissions> {
    let mut permissions = fs::metadata(source).ok()?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode((permissions.mode() & 0o666) | 0o600);
    }
    #[cfg(not(unix))]
    permissions.set_readonly(false);
    Some(permissions)
}

fn encoder_for(format: &AudioFormat) -> Option<&'static str> {
    let encoder = match format {
        AudioFormat::Aiff | AudioFormat::Au => "pcm_s16be",
        AudioFormat::Alac => "alac",
        AudioFormat::Flac => "flac",
        AudioFormat::M4a => "aac",
        AudioFormat::Mp2 => "mp2",
        AudioFormat::Mp3 => "libmp3lame",
        AudioFormat::Opus => "libopus",
        AudioFormat::Speex => "libspeex",
        AudioFormat::Vorbis => "libvorbis",
        AudioFormat::Wav => "pcm_s16le",
        AudioFormat::WavPack => "wavpack",
        AudioFormat::Other(_) => return None,
    };
    Some(encoder)
}

fn muxer_for(format: &AudioFormat) -> &str {
    match format {
        AudioFormat::Aiff => "aiff",
        AudioFormat::Alac | AudioFormat::M4a => "ipod",
        AudioFormat::Au => "au",
        AudioFormat::Flac => "flac",
        AudioFormat::Mp2 => "mp2",
        AudioFormat::Mp3 => "mp3",
        AudioFormat::Opus => "opus",
        AudioFormat::Speex => "spx",
        AudioFormat::Vorbis => "ogg",
        AudioFormat::Wav => "wav",
        AudioFormat::WavPack => "wv",
        AudioFormat::Other(name) => name,
    }
}

/// Maps a quality preset onto an encoder flag.
///
/// Values ending in `k` are bitrates for every format. Otherwise lossless
/// encoders take a compression level, VBR encoders a quality scale and the
/// rest a bitrate. PCM output has no quality knob.
fn quality_args(format: &AudioFormat, quality: &str) -> Option<(&'static str, String)> {
    let value = quality.to_string();
    match format {
        AudioFormat::Aiff | AudioFormat::Au | AudioFormat::Wav => None,
        _ if quality.ends_with(['k', 'K']) => Some(("-b:a", value)),
        AudioFormat::Flac | AudioFormat::WavPack | AudioFormat::Alac => {
            Some(("-compression_level", value))
        }
        AudioFormat::Mp3 | AudioFormat::Vorbis | AudioFormat::Speex | AudioFormat::Other(_) => {
            Some(("-q:a", value))
        }
        AudioFormat::Opus | AudioFormat::M4a | AudioFormat::Mp2 => Some(("-b:a", value)),
    }
}

/// True when an `ffmpeg -encoders`/`-muxers` listing has an entry named `name`.
fn listing_contains(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("--"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|names| names.split(',').any(|n| n == name))
}
