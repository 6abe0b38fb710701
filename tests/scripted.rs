use live_script::catalog::{CatalogState, ClusterState};
use live_script::model::{ArgValue, StatusCode};
use live_script::notify::{Notification, Notifier};
use live_script::pxl::PxlClassifier;
use live_script::route::MemoryRoute;
use live_script::telemetry::LogTelemetry;
use live_script::transport::{Scenario, ScriptedTransport};
use live_script::{spawn_controller, ControllerConfig, ControllerHandle, Dependencies, ResultsStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Default)]
struct Collect(Mutex<Vec<Notification>>);

impl Notifier for Collect {
    fn show(&self, notification: Notification) {
        self.0.lock().unwrap().push(notification);
    }
}

struct Run {
    handle: ControllerHandle,
    transport: Arc<ScriptedTransport>,
    results: ResultsStore,
    notes: Arc<Collect>,
    scenario: Scenario,
}

fn start(raw: &str) -> Run {
    let scenario = Scenario::from_json(raw).expect("demo scenario parses");
    let transport = Arc::new(ScriptedTransport::new(scenario.runs.clone()));
    let results = ResultsStore::new();
    let notes = Arc::new(Collect::default());
    let (_cluster_tx, cluster) = watch::channel(ClusterState::connected(scenario.cluster.clone()));
    let (_catalog_tx, catalog) = watch::channel(CatalogState::loaded(scenario.scripts.clone()));
    let deps = Dependencies {
        transport: Some(transport.clone()),
        cluster,
        catalog,
        results: results.clone(),
        route: Arc::new(MemoryRoute::default()),
        telemetry: Arc::new(LogTelemetry),
        notifier: notes.clone(),
        classifier: Arc::new(PxlClassifier),
        embed: scenario.embed.clone(),
    };
    let (handle, _task) = spawn_controller(ControllerConfig::default(), deps);
    Run {
        handle,
        transport,
        results,
        notes,
        scenario,
    }
}

impl Run {
    fn select(&self, manual: bool) {
        let script = self
            .scenario
            .scripts
            .iter()
            .find(|s| s.id == self.scenario.script_id)
            .cloned()
            .expect("selected script is in the catalog");
        let args = Some(self.scenario.args.clone());
        if manual {
            self.handle.set_script_and_args_manually(script, args).unwrap();
        } else {
            self.handle.set_script_and_args(script, args).unwrap();
        }
    }

    async fn finished(&self, executions: u64) {
        let mut rx = self.handle.subscribe();
        let wait = async {
            loop {
                {
                    let view = rx.borrow_and_update();
                    if view.executions >= executions && !view.executing {
                        return;
                    }
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(120), wait)
            .await
            .expect("execution finishes");
    }
}

#[tokio::test(start_paused = true)]
async fn replays_batches_into_tables() {
    let run = start(include_str!("../demos/basic.json"));
    run.select(false);
    run.handle.execute().unwrap();
    run.finished(1).await;

    let snap = run.results.snapshot();
    let table = &snap.results.tables["http_stats"];
    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.batch_count, 2);
    assert_eq!(table.relation.len(), 2);
    assert_eq!(snap.results.stats.as_ref().map(|s| s.records_processed), Some(3));
    assert!(!snap.loading);

    let calls = run.transport.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].enable_e2e_encryption);
    let func = &calls[0].funcs[0];
    assert_eq!(func.output_table_prefix, "http_stats");
    assert_eq!(
        func.args,
        vec![
            ("start_time".to_string(), "-10m".to_string()),
            ("namespace".to_string(), "default".to_string()),
        ]
    );
    assert_eq!(
        run.handle.args().and_then(|a| a.get("namespace").cloned()),
        Some(ArgValue::from("default"))
    );
}

#[tokio::test(start_paused = true)]
async fn manual_mutation_survives_schema_warmup() {
    let run = start(include_str!("../demos/mutation.json"));
    run.select(true);
    run.handle.execute().unwrap();
    run.finished(1).await;

    let snap = run.results.snapshot();
    assert!(snap.results.error.is_none());
    assert_eq!(snap.results.tables["output"].rows.len(), 1);
    assert_eq!(
        snap.results.mutation_info.as_ref().map(|m| m.status.code),
        Some(StatusCode::Ok)
    );
    let view = run.handle.view();
    assert_eq!(view.attempts, 0);
    assert!(!view.has_mutation);
}

#[tokio::test(start_paused = true)]
async fn interrupted_stream_reports_error_and_retries() {
    let run = start(include_str!("../demos/streaming.json"));
    run.select(false);
    run.handle.execute().unwrap();
    run.finished(1).await;

    let snap = run.results.snapshot();
    assert_eq!(
        snap.results.error.as_ref().map(|e| e.message.as_str()),
        Some("stream interrupted: connection reset")
    );
    assert!(!snap.streaming);

    let action = run.notes.0.lock().unwrap()[0].action.clone();
    assert!(action.invoke());
    run.finished(2).await;
    assert_eq!(run.transport.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_stream_stops_replay() {
    let run = start(include_str!("../demos/streaming.json"));
    run.select(false);
    run.handle.execute().unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    let snap = run.results.snapshot();
    assert_eq!(snap.results.tables["logs"].rows.len(), 1);
    assert!(snap.streaming);
    assert!(!snap.loading);

    run.handle.cancel_execution().unwrap();
    run.finished(1).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snap = run.results.snapshot();
    assert_eq!(snap.results.tables["logs"].rows.len(), 1);
    assert!(snap.results.error.is_none());
    assert!(!snap.streaming);
    assert!(run.notes.0.lock().unwrap().is_empty());
}
