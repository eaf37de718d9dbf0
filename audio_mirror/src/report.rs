//! Human-readable summaries printed after a run or a plan.

use crate::path_mirror::MirrorDiff;
use crate::runner::RunResult;
use shared_utils::format_duration;
use std::fmt::Write;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

pub fn summary_report(result: &RunResult, operation_name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "╔══════════════════════════════════════════════════════════╗");
    let _ = writeln!(out, "║  📊 {:<53}║", format!("{} Summary", operation_name));
    let _ = writeln!(out, "╠══════════════════════════════════════════════════════════╣");
    let _ = writeln!(out, "║  🎵 To Convert:         {:>10}                       ║", result.total_tasks);
    let _ = writeln!(out, "║  ✅ Converted:          {:>10}                       ║", result.converted);
    let _ = writeln!(out, "║  ❌ Failed:             {:>10}                       ║", result.failed());
    let _ = writeln!(out, "║  ⏭️  Skipped:            {:>10}                       ║", result.skipped);
    if result.was_interrupted() {
        let _ = writeln!(out, "║  ⏸️  Not Started:        {:>10}                       ║", result.undispatched);
    }
    if let Some(artwork) = &result.artwork {
        let _ = writeln!(out, "║  🖼️  Artwork Copied:     {:>10}                       ║", artwork.copied);
    }
    let _ = writeln!(out, "╠══════════════════════════════════════════════════════════╣");
    let _ = writeln!(
        out,
        "║  ⏱️  Total Time:         {:>10}                       ║",
        format_duration(result.elapsed)
    );
    let _ = writeln!(out, "╚══════════════════════════════════════════════════════════╝");

    if !result.failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "❌ Failed conversions:");
        let _ = writeln!(out, "{}", RULE);
        for failure in &result.failures {
            let _ = writeln!(out, "   {} → {}", failure.source, failure.error);
        }
    }

    let artwork_errors = result.artwork.iter().flat_map(|a| a.errors.iter());
    let mut header_written = false;
    for (path, error) in artwork_errors {
        if !header_written {
            let _ = writeln!(out);
            let _ = writeln!(out, "🖼️  Artwork not copied:");
            let _ = writeln!(out, "{}", RULE);
            header_written = true;
        }
        let _ = writeln!(out, "   {} → {}", path.display(), error);
    }

    if !result.scan_warnings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "⚠️  Unreadable during scan:");
        let _ = writeln!(out, "{}", RULE);
        for warning in &result.scan_warnings {
            let _ = writeln!(out, "   {} → {}", warning.path.display(), warning.message);
        }
    }

    out
}

pub fn print_summary_report(result: &RunResult, operation_name: &str) {
    print!("{}", summary_report(result, operation_name));
}

/// Lists pending conversions, at most `limit` of them.
pub fn plan_report(diff: &MirrorDiff, limit: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} to convert, {} already converted, {} already in target format",
        diff.tasks.len(),
        diff.already_converted,
        diff.in_target_format
    );
    for task in diff.tasks.iter().take(limit) {
        let _ = writeln!(out, "   {} → {}", task.source, task.dest_path.display());
    }
    if diff.tasks.len() > limit {
        let _ = writeln!(out, "   … and {} more", diff.tasks.len() - limit);
    }
    for source in &diff.collisions {
        let _ = writeln!(out, "   ⚠️  {} skipped: destination claimed by another source", source);
    }
    for warning in &diff.warnings {
        let _ = writeln!(out, "   ⚠️  {}: {}", warning.path.display(), warning.message);
    }
    out
}
