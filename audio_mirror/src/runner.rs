//! One conversion run: validate, scan, convert, report.

use crate::artwork::{copy_missing_artwork, CopyResult, ARTWORK_EXTENSIONS};
use crate::config::RunConfig;
use crate::error::{Result, ScanError};
use crate::format::FormatSpec;
use crate::path_mirror::{MirrorDiff, PathMirror, ScanWarning};
use crate::progress::ProgressTracker;
use crate::renderer::Renderer;
use crate::task::{TaskFailure, TaskOutcome};
use crate::transcoder::{sweep_partial_outputs, Transcoder};
use crate::worker_pool::{CancelFlag, PoolOutcome, WorkerPool};
use serde::Serialize;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub total_tasks: usize,
    pub converted: usize,
    pub skipped: usize,
    pub failures: Vec<TaskFailure>,
    /// Tasks never started because the run was cancelled.
    pub undispatched: usize,
    pub scan_warnings: Vec<ScanWarning>,
    pub artwork: Option<CopyResult>,
    pub elapsed: Duration,
}

impl RunResult {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn was_interrupted(&self) -> bool {
        self.undispatched > 0
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.was_interrupted()
    }

    fn from_scan(diff: &MirrorDiff, artwork: Option<CopyResult>) -> Self {
        Self {
            total_tasks: diff.tasks.len(),
            converted: 0,
            skipped: diff.skipped(),
            failures: Vec::new(),
            undispatched: 0,
            scan_warnings: diff.warnings.clone(),
            artwork,
            elapsed: Duration::ZERO,
        }
    }
}

pub struct ConversionRunner<'a> {
    config: RunConfig,
    transcoder: &'a dyn Transcoder,
    renderer: &'a dyn Renderer,
    cancel: CancelFlag,
}

impl<'a> ConversionRunner<'a> {
    pub fn new(config: RunConfig, transcoder: &'a dyn Transcoder, renderer: &'a dyn Renderer) -> Self {
        Self {
            config,
            transcoder,
            renderer,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Checks everything that can be checked without touching the library.
    pub fn preflight(&self) -> Result<()> {
        self.config.validate()?;
        self.transcoder.validate(&self.config.format)?;

        shared_utils::check_not_nested(&self.config.source_root, &self.config.dest_root)
            .map_err(ScanError::UnsafeLayout)?;
        shared_utils::check_dangerous_directory(&self.config.dest_root)
            .map_err(ScanError::UnsafeLayout)?;
        Ok(())
    }

    pub fn mirror(&self) -> PathMirror {
        let mirror = PathMirror::new(
            &self.config.source_root,
            &self.config.dest_root,
            self.config.format.target_extension(),
        )
        .with_filter(self.config.filter);
        if self.config.copy_artwork {
            mirror.excluding(ARTWORK_EXTENSIONS)
        } else {
            mirror
        }
    }

    /// Scans without converting anything.
    pub fn plan(&self) -> Result<MirrorDiff> {
        self.preflight()?;
        Ok(self.mirror().diff(&self.config.format)?)
    }

    pub fn run(&self) -> Result<RunResult> {
        let started = Instant::now();
        let diff = self.plan()?;
        sweep_partial_outputs(&self.config.dest_root);

        let artwork = self
            .config
            .copy_artwork
            .then(|| copy_missing_artwork(&self.config.source_root, &self.config.dest_root));

        let mut result = RunResult::from_scan(&diff, artwork);
        if diff.tasks.is_empty() {
            info!(skipped = result.skipped, "Nothing to convert");
            result.elapsed = started.elapsed();
            return Ok(result);
        }

        info!(
            tasks = diff.tasks.len(),
            skipped = result.skipped,
            parallelism = self.config.parallelism,
            format = %self.config.format,
            "Starting conversion"
        );

        let tracker = ProgressTracker::new();
        tracker.start(diff.tasks.len());

        let pool = WorkerPool::new(self.transcoder, self.config.parallelism)
            .with_cancel(self.cancel.clone());

        let outcome = thread::scope(|scope| {
            let (done_tx, done_rx) = mpsc::channel::<()>();
            let tracker = &tracker;
            let renderer = self.renderer;
            let interval = self.config.render_interval;

            scope.spawn(move || {
                loop {
                    renderer.render_frame(&tracker.snapshot());
                    match done_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let last = tracker.snapshot();
                renderer.render_frame(&last);
                renderer.finish(&last);
            });

            let outcome = pool.run_observed(
                &diff.tasks,
                |task| tracker.record_start(task),
                |task, outcome: &TaskOutcome| tracker.record_completion(task, outcome),
            );
            drop(done_tx);
            outcome
        })?;

        result.converted = outcome.converted();
        result.undispatched = outcome.undispatched();
        result.failures = match outcome {
            PoolOutcome::AllSucceeded { .. } => Vec::new(),
            PoolOutcome::CompletedWithFailures { failures, .. }
            | PoolOutcome::Interrupted { failures, .. } => failures,
        };
        result.elapsed = started.elapsed();

        info!(
            converted = result.converted,
            failed = result.failed(),
            undispatched = result.undispatched,
            elapsed_secs = result.elapsed.as_secs_f64(),
            "Conversion finished"
        );

        Ok(result)
    }
}

/// Runs one conversion with default filtering and no artwork copy.
pub fn run_library_conversion(
    source_root: &Path,
    dest_root: &Path,
    format: FormatSpec,
    parallelism: usize,
    render_interval: Duration,
    transcoder: &dyn Transcoder,
    renderer: &dyn Renderer,
) -> Result<RunResult> {
    let config = RunConfig::new(source_root, dest_root, format)
        .with_parallelism(parallelism)
        .with_render_interval(render_interval);
    ConversionRunner::new(config, transcoder, renderer).run()
}
