//! Text summary builder for CLI output.
//!
//! Formats a results snapshot into human-readable lines for text mode.

use live_script::ResultsSnapshot;

const PREVIEW_ROWS: usize = 5;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from the final results snapshot.
pub(crate) fn build_text_summary(script_id: &str, snapshot: &ResultsSnapshot) -> TextSummary {
    let mut lines = Vec::new();
    let results = &snapshot.results;

    lines.push(format!("Script: {script_id}"));

    if let Some(err) = results.error.as_ref() {
        lines.push(format!("Error: {err}"));
    }

    if let Some(info) = results.mutation_info.as_ref() {
        let message = if info.status.message.is_empty() {
            "-"
        } else {
            info.status.message.as_str()
        };
        lines.push(format!("Mutation: {:?} ({message})", info.status.code));
    }

    if let Some(stats) = results.stats.as_ref() {
        lines.push(format!(
            "Stats: {} records, {} bytes, exec {:.2} ms, compile {:.2} ms",
            stats.records_processed,
            stats.bytes_processed,
            stats.execution_time_ns as f64 / 1_000_000.0,
            stats.compilation_time_ns as f64 / 1_000_000.0
        ));
    }

    if results.tables.is_empty() && results.error.is_none() {
        lines.push("No tables.".to_string());
    }

    for (name, table) in &results.tables {
        lines.push(format!(
            "== {name} ({} rows, {} batches) ==",
            table.rows.len(),
            table.batch_count
        ));
        if !table.relation.is_empty() {
            let cols: Vec<&str> = table.relation.iter().map(|c| c.name.as_str()).collect();
            lines.push(cols.join(" | "));
        }
        for row in table.rows.iter().take(PREVIEW_ROWS) {
            lines.push(row.to_string());
        }
        if table.rows.len() > PREVIEW_ROWS {
            lines.push(format!("… {} more", table.rows.len() - PREVIEW_ROWS));
        }
    }

    if snapshot.loading || snapshot.streaming {
        lines.push(format!(
            "(still loading: {}, streaming: {})",
            snapshot.loading, snapshot.streaming
        ));
    }

    TextSummary { lines }
}
