//! Fakes shared by the unit tests.

use crate::error::ConfigError;
use crate::format::FormatSpec;
use crate::progress::ProgressSnapshot;
use crate::renderer::Renderer;
use crate::transcoder::{TranscodeError, Transcoder};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

pub fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"audio").unwrap();
}

/// Writes the source file name into the destination. Fails for sources
/// whose file name is in `failing`.
#[derive(Default)]
pub struct FakeTranscoder {
    failing: Vec<String>,
    rejected_format: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.failing.push(file_name.to_string());
        self
    }

    pub fn rejecting(mut self, format: &str) -> Self {
        self.rejected_format = Some(format.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl Transcoder for FakeTranscoder {
    fn name(&self) -> &str {
        "fake"
    }

    fn validate(&self, format: &FormatSpec) -> Result<(), ConfigError> {
        match &self.rejected_format {
            Some(rejected) if *rejected == format.format.name() => {
                Err(ConfigError::FormatNotRecognized {
                    codec: "fake".into(),
                    format: rejected.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn transcode(
        &self,
        source: &Path,
        dest: &Path,
        _format: &FormatSpec,
    ) -> Result<(), TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = if self.failing.contains(&name) {
            Err(TranscodeError::new(format!("cannot decode {}", name)))
        } else {
            fs::write(dest, name.as_bytes()).map_err(|e| TranscodeError::new(e.to_string()))
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Keeps every frame it is asked to draw.
#[derive(Default)]
pub struct RecordingRenderer {
    frames: Mutex<Vec<ProgressSnapshot>>,
    finished: Mutex<Option<ProgressSnapshot>>,
}

impl RecordingRenderer {
    pub fn frames(&self) -> Vec<ProgressSnapshot> {
        self.frames.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Option<ProgressSnapshot> {
        self.finished.lock().unwrap().clone()
    }
}

impl Renderer for RecordingRenderer {
    fn render_frame(&self, snapshot: &ProgressSnapshot) {
        self.frames.lock().unwrap().push(snapshot.clone());
    }

    fn finish(&self, snapshot: &ProgressSnapshot) {
        *self.finished.lock().unwrap() = Some(snapshot.clone());
    }
}
