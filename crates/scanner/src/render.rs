use crate::controller::ScanView;
use crate::state::{ScanPhase, SearchState};
use recognition::FoodRecord;
use std::fmt::Write;

fn record_lines(out: &mut String, records: &[FoodRecord]) {
    for (index, record) in records.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {} ({}% confidence)\n     {}",
            index + 1,
            record.name(),
            record.confidence_percent(),
            record.macros_line()
        );
    }
}

/// Plain-text rendering of a controller snapshot.
pub fn render_view(view: &ScanView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "State: {}", view.phase);

    if let Some(preview) = &view.preview {
        let source = view.source.map(|s| s.as_str()).unwrap_or("unknown");
        let _ = writeln!(out, "Image: {preview} ({source})");
    }
    if let Some(readiness) = view.camera {
        let facing = view.facing.map(|f| f.as_str()).unwrap_or("-");
        let _ = writeln!(out, "Camera: {readiness:?} ({facing})");
    }

    match view.phase {
        ScanPhase::Analyzing => out.push_str("Analyzing...\n"),
        ScanPhase::HasResults if view.records.is_empty() => out.push_str("No food detected.\n"),
        ScanPhase::HasResults => {
            out.push_str("Detected foods:\n");
            record_lines(&mut out, &view.records);
            let _ = writeln!(out, "Total calories: {}", view.total_calories);
        }
        _ => {}
    }

    if let Some(error) = &view.error {
        let _ = writeln!(out, "Error: {error}");
    }
    if let Some(notice) = &view.notice {
        let _ = writeln!(out, "Note: {notice}");
    }

    out.push_str(&render_search(&view.search));
    out
}

pub fn render_search(search: &SearchState) -> String {
    let mut out = String::new();
    match search {
        SearchState::Idle => {}
        SearchState::Searching { query } => {
            let _ = writeln!(out, "Searching for \"{query}\"...");
        }
        SearchState::Results { query, records } if records.is_empty() => {
            let _ = writeln!(out, "No results for \"{query}\".");
        }
        SearchState::Results { query, records } => {
            let _ = writeln!(out, "Results for \"{query}\":");
            record_lines(&mut out, records);
        }
        SearchState::Failed { message, .. } => {
            let _ = writeln!(out, "Search error: {message}");
        }
    }
    out
}
