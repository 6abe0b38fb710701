//! Shared result state read by presentation code and written by the controller.
//!
//! Every change publishes a fresh `Arc<ResultsSnapshot>` through a watch channel, so
//! readers always see a complete snapshot and never a half-applied update.

use crate::model::{ExecutionStats, MutationInfo, QueryError, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Table/error/stats portion of the result state; replaced as a unit by `set_results`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Results {
    pub tables: BTreeMap<String, Arc<Table>>,
    pub error: Option<QueryError>,
    pub stats: Option<ExecutionStats>,
    pub mutation_info: Option<MutationInfo>,
}

impl Results {
    pub fn with_error(error: QueryError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsSnapshot {
    #[serde(flatten)]
    pub results: Results,
    pub loading: bool,
    pub streaming: bool,
}

/// The result aggregator for one live view.
#[derive(Debug, Clone)]
pub struct ResultsStore {
    tx: Arc<watch::Sender<Arc<ResultsSnapshot>>>,
}

impl Default for ResultsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultsStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(ResultsSnapshot::default()));
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ResultsSnapshot>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<ResultsSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn streaming(&self) -> bool {
        self.tx.borrow().streaming
    }

    pub fn loading(&self) -> bool {
        self.tx.borrow().loading
    }

    pub fn error(&self) -> Option<QueryError> {
        self.tx.borrow().results.error.clone()
    }

    pub fn mutation_info(&self) -> Option<MutationInfo> {
        self.tx.borrow().results.mutation_info.clone()
    }

    /// Replace tables, error, stats and mutation info wholesale.
    pub fn set_results(&self, results: Results) {
        self.publish(|snap| snap.results = results);
    }

    /// Derive new results from the previous ones.
    pub fn update_results(&self, f: impl FnOnce(&mut Results)) {
        self.publish(|snap| f(&mut snap.results));
    }

    pub fn clear_results(&self) {
        self.set_results(Results::default());
    }

    pub fn set_loading(&self, loading: bool) {
        self.publish(|snap| snap.loading = loading);
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.publish(|snap| snap.streaming = streaming);
    }

    fn publish(&self, f: impl FnOnce(&mut ResultsSnapshot)) {
        let mut next = ResultsSnapshot::clone(&self.tx.borrow());
        f(&mut next);
        self.tx.send_replace(Arc::new(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QueryErrorKind, RowBatch};
    use serde_json::json;

    #[test]
    fn readers_keep_their_snapshot_across_updates() {
        let store = ResultsStore::new();
        let mut table = Table::new("1", "out", Vec::new());
        table.append_batch(RowBatch {
            rows: vec![json!({"a": 1})],
        });
        store.update_results(|r| {
            r.tables.insert("out".into(), Arc::new(table));
        });
        let before = store.snapshot();

        store.update_results(|r| {
            if let Some(t) = r.tables.get_mut("out") {
                Arc::make_mut(t).append_batch(RowBatch {
                    rows: vec![json!({"a": 2})],
                });
            }
        });

        assert_eq!(before.results.tables["out"].rows.len(), 1);
        assert_eq!(store.snapshot().results.tables["out"].rows.len(), 2);
    }

    #[test]
    fn flags_are_independent_of_results() {
        let store = ResultsStore::new();
        store.set_loading(true);
        store.set_streaming(true);
        store.set_results(Results::with_error(QueryError::new(
            QueryErrorKind::Server,
            "boom",
        )));
        assert!(store.loading());
        assert!(store.streaming());
        assert!(store.error().is_some());

        store.clear_results();
        assert!(store.error().is_none());
        assert!(store.loading());
    }

    #[tokio::test]
    async fn subscribers_are_notified() {
        let store = ResultsStore::new();
        let mut rx = store.subscribe();
        store.set_loading(true);
        rx.changed().await.unwrap();
        assert!(rx.borrow().loading);
    }
}
