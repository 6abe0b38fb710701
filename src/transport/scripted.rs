//! Transport that replays pre-recorded lifecycle events.
//!
//! Each call to `execute_script` consumes the next entry of `runs`; once the list is
//! exhausted the last run is replayed again. Steps are emitted after their delay unless
//! the execution is cancelled first.

use super::{ExecutionControl, ExecutionHandle, ExecutionSink, ExecutionTransport};
use crate::model::{
    Arguments, ClusterConfig, EmbedState, ExecuteOptions, ExecutionEvent, ExecutionUpdate,
    QueryFunction, Script,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedStep {
    #[serde(default, with = "humantime_serde")]
    pub delay: Duration,
    #[serde(flatten)]
    pub update: ExecutionUpdate,
}

/// A self-contained replay: cluster, script catalog, initial selection and per-run events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub cluster: ClusterConfig,
    pub scripts: Vec<Script>,
    pub script_id: String,
    #[serde(default)]
    pub args: Arguments,
    #[serde(default)]
    pub embed: EmbedState,
    #[serde(default)]
    pub runs: Vec<Vec<ScriptedStep>>,
}

impl Scenario {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// What the transport was asked to run.
#[derive(Debug, Clone)]
pub struct StartRecord {
    pub execution_id: u64,
    pub cluster: ClusterConfig,
    pub code: String,
    pub enable_e2e_encryption: bool,
    pub funcs: Vec<QueryFunction>,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    runs: Vec<Vec<ScriptedStep>>,
    next_run: AtomicUsize,
    next_id: AtomicU64,
    calls: Mutex<Vec<StartRecord>>,
}

impl ScriptedTransport {
    pub fn new(runs: Vec<Vec<ScriptedStep>>) -> Self {
        Self {
            runs,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<StartRecord> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn steps_for_next_run(&self) -> Vec<ScriptedStep> {
        let idx = self.next_run.fetch_add(1, Ordering::Relaxed);
        self.runs
            .get(idx)
            .or_else(|| self.runs.last())
            .cloned()
            .unwrap_or_default()
    }
}

impl ExecutionTransport for ScriptedTransport {
    fn execute_script(
        &self,
        cluster: &ClusterConfig,
        code: &str,
        options: ExecuteOptions,
        funcs: Vec<QueryFunction>,
    ) -> ExecutionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(StartRecord {
                execution_id: id,
                cluster: cluster.clone(),
                code: code.to_string(),
                enable_e2e_encryption: options.enable_e2e_encryption,
                funcs,
            });
        }

        let (handle, sink) = ExecutionHandle::channel(id);
        let steps = self.steps_for_next_run();
        tokio::spawn(replay(id, gen_query_id(), steps, sink));
        handle
    }
}

async fn replay(id: u64, query_id: String, steps: Vec<ScriptedStep>, sink: ExecutionSink) {
    let ExecutionSink {
        events,
        mut control,
    } = sink;
    tracing::debug!(execution = id, steps = steps.len(), "replaying scripted execution");

    for step in steps {
        tokio::select! {
            _ = tokio::time::sleep(step.delay) => {}
            ctrl = control.recv() => {
                // A closed control channel means the handle was dropped; nobody is listening.
                if let Some(ExecutionControl::Cancel) = ctrl {
                    tracing::debug!(execution = id, "scripted execution cancelled");
                    let _ = events.send(ExecutionUpdate::new(ExecutionEvent::Cancel));
                }
                return;
            }
        }
        let mut update = step.update;
        if update.results.query_id.is_none() {
            update.results.query_id = Some(query_id.clone());
        }
        if events.send(update).is_err() {
            return;
        }
    }
}

fn gen_query_id() -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{:016x}", u64::from_le_bytes(b))
}
