//! Durable record of the selected script and arguments (URL/route in a browser).

use crate::model::{Arguments, EmbedState};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    pub cluster_name: Option<String>,
    pub script_id: String,
    pub args: Arguments,
    pub embed: EmbedState,
}

pub trait RouteSync: Send + Sync {
    fn push(
        &self,
        cluster_name: Option<&str>,
        script_id: &str,
        vis_args: &Arguments,
        embed: &EmbedState,
    );
}

/// Keeps every pushed route in memory.
#[derive(Debug, Default)]
pub struct MemoryRoute {
    history: Mutex<Vec<RouteEntry>>,
}

impl MemoryRoute {
    pub fn history(&self) -> Vec<RouteEntry> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    pub fn current(&self) -> Option<RouteEntry> {
        self.history.lock().ok().and_then(|h| h.last().cloned())
    }
}

impl RouteSync for MemoryRoute {
    fn push(
        &self,
        cluster_name: Option<&str>,
        script_id: &str,
        vis_args: &Arguments,
        embed: &EmbedState,
    ) {
        tracing::debug!(script_id, cluster = ?cluster_name, "route push");
        if let Ok(mut history) = self.history.lock() {
            history.push(RouteEntry {
                cluster_name: cluster_name.map(str::to_string),
                script_id: script_id.to_string(),
                args: vis_args.clone(),
                embed: embed.clone(),
            });
        }
    }
}
