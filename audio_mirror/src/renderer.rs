use crate::progress::ProgressSnapshot;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};
use shared_utils::{create_active_line, create_batch_bar, format_duration, truncate_filename};
use std::sync::{Mutex, OnceLock};
use tracing::info;

const ACTIVE_NAME_WIDTH: usize = 60;

/// Draws progress frames. Called from the render loop only, never from workers.
pub trait Renderer: Send + Sync {
    fn render_frame(&self, snapshot: &ProgressSnapshot);

    /// Called once after the final frame.
    fn finish(&self, _snapshot: &ProgressSnapshot) {}
}

/// Draws nothing. Used for `--json` and quiet runs.
pub struct SilentRenderer;

impl Renderer for SilentRenderer {
    fn render_frame(&self, _snapshot: &ProgressSnapshot) {}
}

/// Emits a log line whenever the completed count changes.
#[derive(Default)]
pub struct LogRenderer {
    last_remaining: Mutex<Option<usize>>,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for LogRenderer {
    fn render_frame(&self, snapshot: &ProgressSnapshot) {
        let mut last = self.last_remaining.lock().unwrap_or_else(|e| e.into_inner());
        if *last == Some(snapshot.remaining_tasks) {
            return;
        }
        *last = Some(snapshot.remaining_tasks);

        info!(
            completed = snapshot.completed(),
            total = snapshot.total_tasks,
            remaining = snapshot.remaining_tasks,
            eta_secs = snapshot.estimated_remaining.as_secs(),
            latest = snapshot
                .latest_completed
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            "Progress"
        );
    }
}

/// Batch bar plus one line per running conversion.
///
/// Nothing is drawn until the first frame, so a run with no work leaves the
/// terminal untouched.
pub struct TerminalRenderer {
    slots: usize,
    bars: OnceLock<TerminalBars>,
}

struct TerminalBars {
    _multi: MultiProgress,
    bar: ProgressBar,
    active: Vec<ProgressBar>,
}

impl TerminalRenderer {
    /// `slots` is the number of in-flight lines to reserve, normally the parallelism.
    pub fn new(slots: usize) -> Self {
        Self {
            slots: slots.max(1),
            bars: OnceLock::new(),
        }
    }

    fn bars(&self) -> &TerminalBars {
        self.bars.get_or_init(|| {
            let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(20));
            let bar = multi.add(create_batch_bar(0, "Converting"));
            let active = (0..self.slots)
                .map(|i| multi.add(create_active_line(&format!("[{}]", i + 1))))
                .collect();
            TerminalBars {
                _multi: multi,
                bar,
                active,
            }
        })
    }
}

impl Renderer for TerminalRenderer {
    fn render_frame(&self, snapshot: &ProgressSnapshot) {
        let bars = self.bars();
        bars.bar.set_length(snapshot.total_tasks as u64);
        bars.bar.set_position(snapshot.completed() as u64);
        bars.bar
            .set_message(format_duration(snapshot.estimated_remaining));

        for (i, line) in bars.active.iter().enumerate() {
            match snapshot.in_flight.get(i) {
                Some(path) => {
                    line.set_message(truncate_filename(&path.to_string(), ACTIVE_NAME_WIDTH));
                    line.tick();
                }
                None => line.set_message(String::new()),
            }
        }
    }

    fn finish(&self, snapshot: &ProgressSnapshot) {
        let bars = self.bars();
        for line in &bars.active {
            line.finish_and_clear();
        }
        bars.bar.set_position(snapshot.completed() as u64);
        bars.bar.finish_with_message("done");
    }
}
