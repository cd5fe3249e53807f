//! Text rendering for command output.

use std::fmt::Write as _;

use kinship_analyze::SearchHit;
use kinship_ops::{ApplyReport, LedgerInfo, OperationProgress, UndoReport};

/// Format size in human-readable form.
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

/// One-line progress for a terminal, meant to be redrawn with `\r`.
pub fn progress_line(progress: &OperationProgress) -> String {
    let current = progress
        .current_file
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        "{} [{:>5.1}%] {}/{} {}",
        progress.operation_type,
        progress.percentage(),
        progress.files_completed,
        progress.files_total,
        truncate(&current, 40)
    )
}

pub fn apply_report(report: &ApplyReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "─".repeat(60));
    let _ = writeln!(out, " {}", report.summary());
    let _ = writeln!(
        out,
        " {} moved, {} directories created, {:.2}s",
        format_size(report.bytes_moved),
        report.directories_created,
        report.duration_ms as f64 / 1000.0
    );
    let _ = writeln!(out, " Run {} (undo with `kinship undo {}`)", report.run_id, report.run_id);
    let _ = writeln!(out, " Ledger: {}", report.ledger_path.display());
    let _ = writeln!(out, "{}", "─".repeat(60));
    if !report.failures.is_empty() {
        let _ = writeln!(out, "Failures ({}):", report.failures.len());
        for failure in &report.failures {
            let _ = writeln!(out, "  {failure}");
        }
    }
    out
}

pub fn undo_report(report: &UndoReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "─".repeat(60));
    let _ = writeln!(out, " Run {}: {}", report.run_id, report.summary());
    if report.directories_kept > 0 {
        let _ = writeln!(
            out,
            " {} created directories were not empty and were kept",
            report.directories_kept
        );
    }
    let _ = writeln!(out, "{}", "─".repeat(60));
    if !report.inconsistencies.is_empty() {
        let _ = writeln!(out, "Inconsistencies ({}):", report.inconsistencies.len());
        for inconsistency in &report.inconsistencies {
            let _ = writeln!(out, "  {inconsistency}");
        }
    }
    out
}

pub fn ledger_table(ledgers: &[LedgerInfo]) -> String {
    if ledgers.is_empty() {
        return " No ledgers found.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        " {:<24} {:<20} {:>6}  {:<8} {}",
        "RUN", "CREATED", "MOVES", "STATUS", "DESTINATION"
    );
    for ledger in ledgers {
        let _ = writeln!(
            out,
            " {:<24} {:<20} {:>6}  {:<8} {}",
            ledger.run_id,
            ledger.created_at.format("%Y-%m-%d %H:%M:%S"),
            ledger.moves,
            if ledger.consumed { "undone" } else { "active" },
            ledger.destination_root.display()
        );
    }
    out
}

pub fn search_results(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!(" No files match \"{query}\".\n");
    }
    let mut out = String::new();
    for (rank, hit) in hits.iter().enumerate() {
        let _ = writeln!(out, " {:>3}. {:.4}  {}", rank + 1, hit.score, hit.path.display());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinship_core::FileId;
    use kinship_ops::OperationType;
    use std::path::PathBuf;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a_very_long_name.txt", 8), "a_very_…");
    }

    #[test]
    fn test_progress_line() {
        let mut progress = OperationProgress::new(OperationType::Apply, 2);
        progress.set_current_file(Some(PathBuf::from("/inbox/song.mp3")));
        progress.complete_file(10);
        assert_eq!(progress_line(&progress), "Apply [ 50.0%] 1/2 song.mp3");
    }

    #[test]
    fn test_search_results() {
        let hits = vec![
            SearchHit {
                file: FileId::new(3),
                path: PathBuf::from("/inbox/beach_sunset.txt"),
                score: 0.65827,
            },
            SearchHit {
                file: FileId::new(1),
                path: PathBuf::from("/inbox/beach_trip.txt"),
                score: 0.4082,
            },
        ];
        assert_eq!(
            search_results("sunset", &hits),
            "   1. 0.6583  /inbox/beach_sunset.txt\n   2. 0.4082  /inbox/beach_trip.txt\n"
        );
        assert_eq!(search_results("volcano", &[]), " No files match \"volcano\".\n");
    }
}
