//! Fire-and-forget usage analytics.

use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

pub const QUERY_EXECUTION_EVENT: &str = "Query Execution";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackProperties {
    pub status: TrackStatus,
    pub query: String,
    pub query_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Success,
    Failed,
}

pub trait Telemetry: Send + Sync {
    fn track(&self, event: &str, properties: &TrackProperties);
}

/// Emits events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn track(&self, event: &str, properties: &TrackProperties) {
        tracing::info!(
            target: "live_script::telemetry",
            event,
            status = ?properties.status,
            title = %properties.title,
            query_id = properties.query_id.as_deref().unwrap_or("-"),
            error = properties.error.as_deref().unwrap_or(""),
            "track"
        );
    }
}

#[derive(Serialize)]
struct TelemetryLine<'a> {
    event: &'a str,
    at: String,
    #[serde(flatten)]
    properties: &'a TrackProperties,
}

/// Appends one JSON object per event to a file from a blocking writer task.
#[derive(Debug, Clone)]
pub struct JsonlTelemetry {
    tx: mpsc::UnboundedSender<String>,
}

impl JsonlTelemetry {
    /// Start the writer. Must be called inside a tokio runtime.
    pub fn spawn(path: PathBuf) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let handle = tokio::task::spawn_blocking(move || {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() {
                    if let Err(err) = std::fs::create_dir_all(dir) {
                        tracing::warn!("telemetry: failed to create {}: {err}", dir.display());
                        return;
                    }
                }
            }
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
            {
                Ok(f) => f,
                Err(err) => {
                    tracing::warn!("telemetry: failed to open {}: {err}", path.display());
                    return;
                }
            };
            let mut out = std::io::LineWriter::new(file);
            while let Some(line) = rx.blocking_recv() {
                let _ = writeln!(out, "{line}");
            }
            let _ = out.flush();
        });
        (Self { tx }, handle)
    }
}

impl Telemetry for JsonlTelemetry {
    fn track(&self, event: &str, properties: &TrackProperties) {
        let at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into());
        let line = TelemetryLine {
            event,
            at,
            properties,
        };
        if let Ok(json) = serde_json::to_string(&line) {
            let _ = self.tx.send(json);
        }
    }
}
