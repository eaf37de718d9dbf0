//! Shared progress state.
//!
//! Workers write, the render loop reads. Every access goes through one
//! mutex, so a snapshot never mixes counts from different moments.

use crate::task::{ConversionTask, LibraryPath, TaskOutcome};
use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub total_tasks: usize,
    pub remaining_tasks: usize,
    pub latest_completed: Option<LibraryPath>,
    /// Tasks currently being converted, in dispatch order.
    pub in_flight: Vec<LibraryPath>,
    pub elapsed: Duration,
    pub estimated_remaining: Duration,
}

impl ProgressSnapshot {
    pub fn completed(&self) -> usize {
        self.total_tasks - self.remaining_tasks
    }

    pub fn is_finished(&self) -> bool {
        self.remaining_tasks == 0
    }
}

#[derive(Debug, Default)]
struct ProgressState {
    started: Option<Instant>,
    total: usize,
    remaining: usize,
    latest: Option<LibraryPath>,
    in_flight: Vec<LibraryPath>,
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the tracker for a run of `total` tasks and starts the clock.
    pub fn start(&self, total: usize) {
        let mut state = self.lock();
        *state = ProgressState {
            started: Some(Instant::now()),
            total,
            remaining: total,
            latest: None,
            in_flight: Vec::new(),
        };
    }

    pub fn record_start(&self, task: &ConversionTask) {
        self.lock().in_flight.push(task.source.clone());
    }

    /// Counts one finished task, successful or not.
    pub fn record_completion(&self, task: &ConversionTask, _outcome: &TaskOutcome) {
        let mut state = self.lock();
        state.remaining = state.remaining.saturating_sub(1);
        state.latest = Some(task.source.clone());
        if let Some(pos) = state.in_flight.iter().position(|p| *p == task.source) {
            state.in_flight.remove(pos);
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_at(Instant::now())
    }

    fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let state = self.lock();
        let elapsed = state
            .started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        let completed = state.total - state.remaining;

        ProgressSnapshot {
            total_tasks: state.total,
            remaining_tasks: state.remaining,
            latest_completed: state.latest.clone(),
            in_flight: state.in_flight.clone(),
            elapsed,
            estimated_remaining: estimate_remaining(elapsed, completed, state.remaining),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Linear extrapolation from the average time per completed task.
fn estimate_remaining(elapsed: Duration, completed: usize, remaining: usize) -> Duration {
    if completed == 0 {
        return Duration::ZERO;
    }
    elapsed.mul_f64(remaining as f64 / completed as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::format::FormatSpec;
    use proptest::prelude::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;

    fn task(name: &str) -> ConversionTask {
        ConversionTask {
            source: LibraryPath::new(name),
            source_path: PathBuf::from("/in").join(name),
            dest_path: PathBuf::from("/out").join(name).with_extension("opus"),
            format: FormatSpec::parse("opus", None).unwrap(),
        }
    }

    #[test]
    fn test_fresh_tracker_is_empty() {
        let snapshot = ProgressTracker::new().snapshot();
        assert_eq!(snapshot.total_tasks, 0);
        assert_eq!(snapshot.remaining_tasks, 0);
        assert_eq!(snapshot.elapsed, Duration::ZERO);
        assert_eq!(snapshot.estimated_remaining, Duration::ZERO);
        assert!(snapshot.latest_completed.is_none());
    }

    #[test]
    fn test_start_then_complete() {
        let tracker = ProgressTracker::new();
        tracker.start(3);

        let before = tracker.snapshot();
        assert_eq!(before.remaining_tasks, 3);
        assert_eq!(before.estimated_remaining, Duration::ZERO);

        let a = task("a.flac");
        tracker.record_start(&a);
        assert_eq!(tracker.snapshot().in_flight, vec![a.source.clone()]);

        tracker.record_completion(&a, &TaskOutcome::Converted);
        let after = tracker.snapshot();
        assert_eq!(after.remaining_tasks, 2);
        assert_eq!(after.completed(), 1);
        assert_eq!(after.latest_completed, Some(a.source));
        assert!(after.in_flight.is_empty());
    }

    #[test]
    fn test_failures_count_as_progress() {
        let tracker = ProgressTracker::new();
        tracker.start(1);
        tracker.record_completion(
            &task("a.flac"),
            &TaskOutcome::Failed(TaskError::Transcode("boom".into())),
        );
        assert!(tracker.snapshot().is_finished());
    }

    #[test]
    fn test_remaining_never_underflows() {
        let tracker = ProgressTracker::new();
        tracker.start(1);
        tracker.record_completion(&task("a.flac"), &TaskOutcome::Converted);
        tracker.record_completion(&task("b.flac"), &TaskOutcome::Converted);
        assert_eq!(tracker.snapshot().remaining_tasks, 0);
    }

    #[test]
    fn test_eta_extrapolates_linearly() {
        let tracker = ProgressTracker::new();
        tracker.start(4);
        let started = tracker.lock().started.unwrap();
        tracker.record_completion(&task("a.flac"), &TaskOutcome::Converted);

        let snapshot = tracker.snapshot_at(started + Duration::from_secs(10));
        assert_eq!(snapshot.elapsed, Duration::from_secs(10));
        assert_eq!(snapshot.estimated_remaining, Duration::from_secs(30));
    }

    #[test]
    fn test_estimate_remaining() {
        assert_eq!(
            estimate_remaining(Duration::from_secs(5), 0, 10),
            Duration::ZERO
        );
        assert_eq!(
            estimate_remaining(Duration::from_secs(8), 4, 0),
            Duration::ZERO
        );
        assert_eq!(
            estimate_remaining(Duration::from_secs(6), 2, 1),
            Duration::from_secs(3)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Concurrent completions only ever move `remaining` down, and it ends at zero.
        #[test]
        fn prop_remaining_is_monotonic(total in 1usize..60, workers in 1usize..6) {
            let tracker = Arc::new(ProgressTracker::new());
            tracker.start(total);

            let handles: Vec<_> = (0..workers)
                .map(|w| {
                    let tracker = Arc::clone(&tracker);
                    thread::spawn(move || {
                        for i in (w..total).step_by(workers) {
                            let t = task(&format!("{}.flac", i));
                            tracker.record_start(&t);
                            tracker.record_completion(&t, &TaskOutcome::Converted);
                        }
                    })
                })
                .collect();

            let mut last = total;
            let mut observed = Vec::new();
            while handles.iter().any(|h| !h.is_finished()) {
                observed.push(tracker.snapshot().remaining_tasks);
            }
            for handle in handles {
                handle.join().unwrap();
            }
            observed.push(tracker.snapshot().remaining_tasks);

            for remaining in observed {
                prop_assert!(remaining <= last);
                last = remaining;
            }
            prop_assert_eq!(last, 0);
            prop_assert!(tracker.snapshot().in_flight.is_empty());
        }
    }
}
