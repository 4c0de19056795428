//! Formatted terminal output for stage summaries.

use crate::report::{ParameterSummary, StageSummary};

/// Format a stage summary: header, failure tally, then one row per parameter.
pub fn format_summary(summary: &StageSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== calib - {} ===\n", summary.model));
    out.push_str(&format!(
        "Channels: n={} | fitted={} | failed={}\n",
        summary.n_channels,
        summary.fitted,
        summary.n_channels - summary.fitted
    ));
    for (reason, n) in &summary.failures {
        out.push_str(&format!("  ({reason}) {n}\n"));
    }
    out.push('\n');
    out.push_str(&format_table(&summary.parameters));
    out
}

fn format_table(rows: &[ParameterSummary]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<16} {:>6} {:>14} {:>12} {:>14} {:>14}",
            "parameter", "n", "mean", "std", "min", "max"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<16} {:-<6} {:-<14} {:-<12} {:-<14} {:-<14}", "", "", "", "", "", "").trim_end());
    out.push('\n');

    for r in rows {
        out.push_str(
            format!(
                "{:<16} {:>6} {:>14} {:>12} {:>14} {:>14}",
                truncate(&r.name, 16),
                r.count,
                fmt_value(r.mean),
                fmt_value(r.std),
                fmt_value(r.min),
                fmt_value(r.max),
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        return "-".to_string();
    }
    if v != 0.0 && (v.abs() >= 1e6 || v.abs() < 1e-3) {
        format!("{v:.4e}")
    } else {
        format!("{v:.4}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
