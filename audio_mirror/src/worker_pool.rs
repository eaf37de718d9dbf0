//! Bounded worker pool.
//!
//! `parallelism` workers pull tasks from a shared cursor until the list is
//! drained. A failed task is recorded and the worker moves on; nothing a
//! single task does can stop the others.

use crate::error::{MirrorError, TaskError};
use crate::task::{ConversionTask, TaskFailure, TaskOutcome};
use crate::transcoder::Transcoder;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Stops dispatch of new tasks. Tasks already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolOutcome {
    AllSucceeded {
        converted: usize,
    },
    CompletedWithFailures {
        converted: usize,
        failures: Vec<TaskFailure>,
    },
    /// Cancelled before every task was dispatched.
    Interrupted {
        converted: usize,
        failures: Vec<TaskFailure>,
        undispatched: usize,
    },
}

impl PoolOutcome {
    pub fn converted(&self) -> usize {
        match self {
            PoolOutcome::AllSucceeded { converted }
            | PoolOutcome::CompletedWithFailures { converted, .. }
            | PoolOutcome::Interrupted { converted, .. } => *converted,
        }
    }

    pub fn failures(&self) -> &[TaskFailure] {
        match self {
            PoolOutcome::AllSucceeded { .. } => &[],
            PoolOutcome::CompletedWithFailures { failures, .. }
            | PoolOutcome::Interrupted { failures, .. } => failures,
        }
    }

    pub fn undispatched(&self) -> usize {
        match self {
            PoolOutcome::Interrupted { undispatched, .. } => *undispatched,
            _ => 0,
        }
    }
}

pub struct WorkerPool<'a> {
    transcoder: &'a dyn Transcoder,
    parallelism: usize,
    cancel: CancelFlag,
}

impl<'a> WorkerPool<'a> {
    pub fn new(transcoder: &'a dyn Transcoder, parallelism: usize) -> Self {
        Self {
            transcoder,
            parallelism: parallelism.max(1),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs every task, calling `on_complete` once per finished task from
    /// whichever worker ran it.
    pub fn run<F>(&self, tasks: &[ConversionTask], on_complete: F) -> Result<PoolOutcome, MirrorError>
    where
        F: Fn(&ConversionTask, &TaskOutcome) + Sync,
    {
        self.run_observed(tasks, |_| {}, on_complete)
    }

    /// Like [`WorkerPool::run`], also calling `on_start` as each task is picked up.
    pub fn run_observed<S, F>(
        &self,
        tasks: &[ConversionTask],
        on_start: S,
        on_complete: F,
    ) -> Result<PoolOutcome, MirrorError>
    where
        S: Fn(&ConversionTask) + Sync,
        F: Fn(&ConversionTask, &TaskOutcome) + Sync,
    {
        let workers = self.parallelism.min(tasks.len()).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("audio-mirror-worker-{}", i))
            .build()?;

        let cursor = AtomicUsize::new(0);
        let converted = AtomicUsize::new(0);
        let failures: Mutex<Vec<TaskFailure>> = Mutex::new(Vec::new());

        debug!(tasks = tasks.len(), workers, "Starting worker pool");

        pool.scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| loop {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(task) = tasks.get(index) else {
                        break;
                    };

                    on_start(task);
                    let outcome = self.execute(task);
                    match &outcome {
                        TaskOutcome::Converted => {
                            converted.fetch_add(1, Ordering::Relaxed);
                        }
                        TaskOutcome::Failed(error) => {
                            failures
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .push(TaskFailure {
                                    source: task.source.clone(),
                                    error: error.clone(),
                                });
                        }
                    }
                    on_complete(task, &outcome);
                });
            }
        });

        let converted = converted.into_inner();
        let mut failures = failures.into_inner().unwrap_or_else(|e| e.into_inner());
        failures.sort_by(|a, b| a.source.cmp(&b.source));
        let dispatched = cursor.into_inner().min(tasks.len());

        let outcome = if dispatched < tasks.len() {
            PoolOutcome::Interrupted {
                converted,
                failures,
                undispatched: tasks.len() - dispatched,
            }
        } else if failures.is_empty() {
            PoolOutcome::AllSucceeded { converted }
        } else {
            PoolOutcome::CompletedWithFailures {
                converted,
                failures,
            }
        };
        Ok(outcome)
    }

    fn execute(&self, task: &ConversionTask) -> TaskOutcome {
        if !task.source_path.is_file() {
            warn!(source = %task.source, "Source disappeared before conversion");
            return TaskOutcome::Failed(TaskError::SourceMissing);
        }

        if let Some(parent) = task.dest_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(dir = %parent.display(), error = %e, "Cannot create destination directory");
                return TaskOutcome::Failed(TaskError::DirectoryCreate {
                    path: parent.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }

        match self
            .transcoder
            .transcode(&task.source_path, &task.dest_path, &task.format)
        {
            Ok(()) => {
                info!(source = %task.source, dest = %task.dest_path.display(), "Converted");
                TaskOutcome::Converted
            }
            Err(e) => {
                warn!(source = %task.source, reason = %e, "Conversion failed");
                TaskOutcome::Failed(TaskError::Transcode(e.reason))
            }
        }
    }
}
