//! Execution lifecycle controller.
//!
//! Owns start/cancel orchestration for one live view, reconciles transport events into
//! the shared [`ResultsStore`], and paces the mutation warm-up budget.

use crate::args::{args_for_vis, stable_serialize_args, validate_args};
use crate::catalog::{CatalogState, ClusterState, SCRATCH_SCRIPT_ID};
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::model::{
    Arguments, BatchUpdate, EmbedState, ExecuteOptions, ExecutionEvent, ExecutionResults,
    ExecutionUpdate, QueryError, QueryErrorKind, Script, Table,
};
use crate::notify::{Notification, Notifier, RetryAction};
use crate::pxl::ScriptClassifier;
use crate::results::{Results, ResultsStore};
use crate::route::RouteSync;
use crate::telemetry::{Telemetry, TrackProperties, TrackStatus, QUERY_EXECUTION_EVENT};
use crate::transport::{ExecutionHandle, ExecutionTransport};
use crate::vis::query_funcs;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::watch;
use tokio::time::Instant;

/// Commands accepted by the controller loop.
#[derive(Debug, Clone)]
pub enum Command {
    /// Select a script; `args: None` keeps the current arguments.
    SetScriptAndArgs {
        script: Script,
        args: Option<Arguments>,
        manual: bool,
    },
    /// The route changed underneath us (navigation, reload, shared link).
    RouteChanged {
        script_id: String,
        args: Arguments,
    },
    Execute,
    CancelExecution,
    /// The consuming view went away.
    Dispose,
}

/// Caller-visible controller state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptView {
    pub script: Option<Script>,
    pub args: Option<Arguments>,
    pub manual: bool,
    /// A start event has been seen, so `cancel_execution` stops a live execution.
    pub cancellable: bool,
    pub executing: bool,
    /// Executions started over the controller's lifetime.
    pub executions: u64,
    pub attempts: u32,
    pub has_mutation: bool,
    pub awaiting_execution: bool,
}

/// Collaborators the controller reads from and writes to.
pub struct Dependencies {
    pub transport: Option<Arc<dyn ExecutionTransport>>,
    pub cluster: watch::Receiver<ClusterState>,
    pub catalog: watch::Receiver<CatalogState>,
    pub results: ResultsStore,
    pub route: Arc<dyn RouteSync>,
    pub telemetry: Arc<dyn Telemetry>,
    pub notifier: Arc<dyn Notifier>,
    pub classifier: Arc<dyn ScriptClassifier>,
    pub embed: EmbedState,
}

/// Cloneable front door to a running controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    cmd_tx: UnboundedSender<Command>,
    view: watch::Receiver<ScriptView>,
}

impl ControllerHandle {
    fn send(&self, cmd: Command) -> Result<(), ControllerError> {
        self.cmd_tx.send(cmd).map_err(|_| ControllerError::Closed)
    }

    /// Select a script as a side effect of navigation or state sync.
    pub fn set_script_and_args(
        &self,
        script: Script,
        args: Option<Arguments>,
    ) -> Result<(), ControllerError> {
        self.send(Command::SetScriptAndArgs {
            script,
            args,
            manual: false,
        })
    }

    /// Select a script because the user asked to run it; enables mutation retries.
    pub fn set_script_and_args_manually(
        &self,
        script: Script,
        args: Option<Arguments>,
    ) -> Result<(), ControllerError> {
        self.send(Command::SetScriptAndArgs {
            script,
            args,
            manual: true,
        })
    }

    pub fn route_changed(&self, script_id: &str, args: Arguments) -> Result<(), ControllerError> {
        self.send(Command::RouteChanged {
            script_id: script_id.to_string(),
            args,
        })
    }

    pub fn execute(&self) -> Result<(), ControllerError> {
        self.send(Command::Execute)
    }

    pub fn cancel_execution(&self) -> Result<(), ControllerError> {
        self.send(Command::CancelExecution)
    }

    pub fn dispose(&self) -> Result<(), ControllerError> {
        self.send(Command::Dispose)
    }

    pub fn view(&self) -> ScriptView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScriptView> {
        self.view.clone()
    }

    pub fn script(&self) -> Option<Script> {
        self.view.borrow().script.clone()
    }

    pub fn args(&self) -> Option<Arguments> {
        self.view.borrow().args.clone()
    }

    pub fn manual(&self) -> bool {
        self.view.borrow().manual
    }
}

/// The execution currently considered live.
struct RunCtx {
    handle: ExecutionHandle,
    script: Script,
    cancellable: bool,
}

pub struct Controller {
    config: ControllerConfig,
    deps: Dependencies,
    cmd_rx: UnboundedReceiver<Command>,
    retry_tx: WeakUnboundedSender<Command>,
    view_tx: watch::Sender<ScriptView>,

    script: Option<Script>,
    args: Option<Arguments>,
    manual: bool,
    running: Option<RunCtx>,
    executions: u64,
    attempts: u32,
    has_mutation: bool,
    retry_deadline: Option<Instant>,
    /// Selection key captured when `execute` had to wait for readiness.
    awaiting: Option<String>,
    pending_route: Option<(String, Arguments)>,
    cluster_open: bool,
    catalog_open: bool,
}

/// Build a controller and spawn its loop on the current runtime.
pub fn spawn_controller(
    config: ControllerConfig,
    deps: Dependencies,
) -> (
    ControllerHandle,
    tokio::task::JoinHandle<Result<(), ControllerError>>,
) {
    let (controller, handle) = Controller::new(config, deps);
    let task = tokio::spawn(controller.run());
    (handle, task)
}

impl Controller {
    pub fn new(config: ControllerConfig, deps: Dependencies) -> (Self, ControllerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ScriptView::default());
        let controller = Self {
            config,
            deps,
            cmd_rx,
            retry_tx: cmd_tx.downgrade(),
            view_tx,
            script: None,
            args: None,
            manual: false,
            running: None,
            executions: 0,
            attempts: 0,
            has_mutation: false,
            retry_deadline: None,
            awaiting: None,
            pending_route: None,
            cluster_open: true,
            catalog_open: true,
        };
        (
            controller,
            ControllerHandle {
                cmd_tx,
                view: view_rx,
            },
        )
    }

    /// Run until every handle is dropped, `Dispose` arrives, or a wiring bug is detected.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        let res = loop {
            let retry_at = self.retry_deadline;
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Dispose) | None => break Ok(()),
                        Some(cmd) => {
                            if let Err(err) = self.handle_command(cmd) {
                                break Err(err);
                            }
                        }
                    }
                }
                update = next_update(&mut self.running) => {
                    match update {
                        Some(update) => self.reconcile(update),
                        None => self.stream_closed(),
                    }
                }
                _ = retry_timer(retry_at) => self.retry_timer_fired(),
                changed = self.deps.cluster.changed(), if self.cluster_open => {
                    if changed.is_err() {
                        self.cluster_open = false;
                    }
                    if let Err(err) = self.dependencies_changed() {
                        break Err(err);
                    }
                }
                changed = self.deps.catalog.changed(), if self.catalog_open => {
                    if changed.is_err() {
                        self.catalog_open = false;
                    }
                    if let Err(err) = self.dependencies_changed() {
                        break Err(err);
                    }
                }
            }
            self.publish_view();
        };

        self.teardown();
        self.publish_view();
        if let Err(err) = &res {
            tracing::error!("controller stopped: {err}");
        }
        res
    }

    fn handle_command(&mut self, cmd: Command) -> Result<(), ControllerError> {
        match cmd {
            Command::SetScriptAndArgs {
                script,
                args,
                manual,
            } => self.set_script_and_args(script, args, manual),
            Command::RouteChanged { script_id, args } => {
                self.pending_route = Some((script_id, args));
                self.apply_pending_route();
            }
            Command::Execute => self.execute()?,
            Command::CancelExecution => self.cancel_execution(),
            // Handled by the loop.
            Command::Dispose => {}
        }
        Ok(())
    }

    fn ready(&self) -> bool {
        !self.deps.catalog.borrow().loading && !self.deps.cluster.borrow().loading
    }

    fn selection_key(&self) -> String {
        let id = self.script.as_ref().map(|s| s.id.as_str()).unwrap_or("");
        let args = self
            .args
            .as_ref()
            .map(stable_serialize_args)
            .unwrap_or_default();
        format!("{id}\n{args}")
    }

    fn set_script_and_args(&mut self, script: Script, args: Option<Arguments>, manual: bool) {
        let args = args.or_else(|| self.args.clone()).unwrap_or_default();
        let vis_args = args_for_vis(&script.vis, &args);

        let unchanged = self.script.as_ref() == Some(&script)
            && self.args.as_ref().map(stable_serialize_args)
                == Some(stable_serialize_args(&vis_args));
        if unchanged {
            tracing::debug!(script = %script.id, manual, "selection unchanged");
        } else {
            let cluster_name = self.deps.cluster.borrow().selected_cluster_name.clone();
            self.deps.route.push(
                cluster_name.as_deref(),
                &script.id,
                &vis_args,
                &self.deps.embed,
            );
        }

        self.script = Some(script);
        self.args = Some(vis_args);
        self.manual = manual;
    }

    /// Adopt the route's script once the catalog can resolve it.
    fn apply_pending_route(&mut self) {
        let Some((script_id, args)) = self.pending_route.take() else {
            return;
        };
        let found = {
            let catalog = self.deps.catalog.borrow();
            if catalog.loading {
                None
            } else {
                Some(catalog.get(&script_id).cloned())
            }
        };
        match found {
            // Catalog still loading: try again when it changes.
            None => self.pending_route = Some((script_id, args)),
            Some(None) => {
                tracing::warn!(script_id = %script_id, "route names a script the catalog does not have");
            }
            Some(Some(script)) => {
                let script = match self.script.take() {
                    Some(current) if script.id == SCRATCH_SCRIPT_ID => {
                        tracing::debug!("keeping edited scratch script");
                        current
                    }
                    _ => script,
                };
                self.args = Some(args_for_vis(&script.vis, &args));
                self.script = Some(script);
            }
        }
    }

    fn dependencies_changed(&mut self) -> Result<(), ControllerError> {
        self.apply_pending_route();
        if !self.ready() {
            return Ok(());
        }
        let Some(requested) = self.awaiting.take() else {
            return Ok(());
        };
        if requested != self.selection_key() {
            tracing::debug!("selection changed while awaiting readiness; running the current one");
        }
        self.execute()
    }

    fn execute(&mut self) -> Result<(), ControllerError> {
        if !self.ready() {
            if self.awaiting.is_none() {
                tracing::debug!("dependencies still loading; deferring execution");
            }
            self.awaiting = Some(self.selection_key());
            return Ok(());
        }

        let transport = self
            .deps
            .transport
            .clone()
            .ok_or(ControllerError::ClientNotReady)?;
        let script = self.script.clone().ok_or(ControllerError::NotReady("script"))?;
        let cluster = self
            .deps
            .cluster
            .borrow()
            .config
            .clone()
            .ok_or(ControllerError::NotReady("cluster connection"))?;
        let args = self.args.clone().ok_or(ControllerError::NotReady("args"))?;

        if let Some(err) = validate_args(&script.vis, &args) {
            tracing::warn!(script = %script.id, "argument validation failed: {}", err.message);
            self.deps.results.set_results(Results::with_error(err));
            return Ok(());
        }

        self.teardown();

        let classifier = &self.deps.classifier;
        let has_mutation = classifier.contains_mutation(&script.code);
        let streaming = classifier.is_streaming(&script.code);
        let attempts = match (has_mutation, self.manual) {
            (true, true) => self.config.mutation_retries,
            // Run anyway so loading state resolves for direct navigation, but never retry.
            (true, false) => 0,
            (false, _) => 1,
        };

        let funcs = query_funcs(&script.vis, &args, self.deps.embed.widget.as_deref());
        let handle = transport.execute_script(
            &cluster,
            &script.code,
            ExecuteOptions {
                enable_e2e_encryption: self.config.enable_e2e_encryption,
            },
            funcs,
        );
        tracing::info!(
            execution = handle.id(),
            script = %script.id,
            cluster = %cluster.name,
            has_mutation,
            streaming,
            attempts,
            "execution started"
        );

        self.running = Some(RunCtx {
            handle,
            script,
            cancellable: false,
        });
        self.executions += 1;
        self.manual = false;
        self.deps.results.clear_results();
        self.deps.results.set_loading(true);
        self.deps.results.set_streaming(streaming);
        self.has_mutation = has_mutation;
        self.set_attempts(attempts);
        Ok(())
    }

    /// Full stop requested by the user: also resets loading, streaming and the retry budget.
    fn cancel_execution(&mut self) {
        let Some(ctx) = self.running.take() else {
            return;
        };
        tracing::info!(execution = ctx.handle.id(), "execution cancelled");
        ctx.handle.cancel();
        self.has_mutation = false;
        self.deps.results.set_streaming(false);
        self.deps.results.set_loading(false);
        self.set_attempts(0);
    }

    /// Per-handle cleanup: cancels and forgets the handle but leaves loading, streaming
    /// and mutation state alone so a replacement execution does not flicker the view.
    fn release_handle(&mut self) {
        if let Some(ctx) = self.running.take() {
            tracing::debug!(execution = ctx.handle.id(), "releasing execution");
            ctx.handle.cancel();
        }
    }

    fn teardown(&mut self) {
        self.retry_deadline = None;
        self.release_handle();
    }

    fn set_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
        if attempts == 0 {
            self.retry_deadline = None;
            self.deps.results.set_loading(false);
        } else {
            self.retry_deadline = Some(Instant::now() + self.config.mutation_retry_interval);
        }
    }

    fn retry_timer_fired(&mut self) {
        self.retry_deadline = None;
        if !self.has_mutation || self.attempts == 0 {
            return;
        }
        let remaining = self.attempts - 1;
        tracing::debug!(remaining, "mutation retry interval elapsed");
        self.set_attempts(remaining);
    }

    fn stream_closed(&mut self) {
        tracing::debug!("execution stream closed without a terminal event");
        self.release_handle();
    }

    fn reconcile(&mut self, update: ExecutionUpdate) {
        let ExecutionUpdate { event, results } = update;
        if let Some(ctx) = &self.running {
            tracing::trace!(execution = ctx.handle.id(), kind = event.kind(), "execution event");
        }
        match event {
            ExecutionEvent::Start => {
                if let Some(ctx) = self.running.as_mut() {
                    ctx.cancellable = true;
                }
            }
            ExecutionEvent::Data { data } => self.append_data(data),
            ExecutionEvent::Metadata
            | ExecutionEvent::MutationInfo
            | ExecutionEvent::Status
            | ExecutionEvent::Stats => self.reconcile_results(results),
            ExecutionEvent::Error { errors } => self.reconcile_error(errors, results.query_id),
            // Whoever cancelled has already updated state.
            ExecutionEvent::Cancel => {}
        }
    }

    fn append_data(&mut self, data: Vec<BatchUpdate>) {
        self.deps.results.update_results(|r| {
            for update in data {
                let BatchUpdate {
                    id,
                    name,
                    relation,
                    batch,
                } = update;
                let table = r
                    .tables
                    .entry(name.clone())
                    .or_insert_with(|| Arc::new(Table::new(id, name, relation)));
                Arc::make_mut(table).append_batch(batch);
            }
        });
        if self.deps.results.streaming() {
            self.deps.results.set_loading(false);
        }
    }

    /// Unavailable signals are expected while a mutation still has attempts left.
    fn suppress_unavailable(&self) -> bool {
        self.has_mutation && self.attempts > 0
    }

    fn reconcile_results(&mut self, results: ExecutionResults) {
        let unavailable = results
            .mutation_info
            .as_ref()
            .is_some_and(|info| info.is_unavailable());
        if self.has_mutation && unavailable {
            if self.suppress_unavailable() {
                tracing::debug!(attempts = self.attempts, "mutation schema not ready yet");
                self.deps.results.set_results(Results {
                    mutation_info: results.mutation_info,
                    ..Default::default()
                });
                return;
            }
            let message = results
                .mutation_info
                .as_ref()
                .map(|info| info.status.message.clone())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "mutation did not become ready before retries ran out".into());
            self.reconcile_error(
                vec![QueryError::new(QueryErrorKind::Unavailable, message)],
                results.query_id,
            );
            return;
        }

        let ExecutionResults {
            query_id,
            tables,
            execution_stats,
            mutation_info,
        } = results;

        if self.deps.results.streaming() || execution_stats.is_some() {
            let stats = execution_stats.clone();
            self.deps.results.update_results(|r| {
                // Events without tables leave accumulated data in place.
                if !tables.is_empty() {
                    r.tables = tables
                        .into_iter()
                        .map(|t| (t.name.clone(), Arc::new(t)))
                        .collect();
                }
                r.stats = stats;
                if mutation_info.is_some() {
                    r.mutation_info = mutation_info;
                }
            });
        }

        if execution_stats.is_none() {
            return;
        }

        let Some(mut ctx) = self.running.take() else {
            return;
        };
        ctx.cancellable = false;
        self.deps.results.set_loading(false);
        self.deps.results.set_streaming(false);
        self.has_mutation = false;
        self.set_attempts(0);
        tracing::info!(execution = ctx.handle.id(), script = %ctx.script.id, "execution completed");
        self.deps.telemetry.track(
            QUERY_EXECUTION_EVENT,
            &TrackProperties {
                status: TrackStatus::Success,
                query: ctx.script.code.clone(),
                query_id,
                title: ctx.script.id.clone(),
                error: None,
            },
        );
        ctx.handle.cancel();
    }

    fn reconcile_error(&mut self, errors: Vec<QueryError>, query_id: Option<String>) {
        let error = errors.into_iter().next().unwrap_or_else(|| QueryError {
            message: "execution failed".into(),
            kind: None,
        });

        if error.kind == Some(QueryErrorKind::Unavailable) && self.suppress_unavailable() {
            tracing::debug!(attempts = self.attempts, "ignoring unavailable error during mutation");
            return;
        }

        self.deps
            .results
            .set_results(Results::with_error(error.clone()));
        self.deps.results.set_loading(false);
        self.deps.results.set_streaming(false);
        if self.has_mutation {
            self.has_mutation = false;
            self.set_attempts(0);
        } else {
            self.set_attempts(self.attempts.saturating_sub(1));
        }

        let script = self
            .running
            .as_ref()
            .map(|ctx| ctx.script.clone())
            .or_else(|| self.script.clone());
        self.release_handle();

        tracing::warn!(kind = ?error.kind, "execution failed: {}", error.message);
        if let Some(script) = script.as_ref() {
            self.deps.telemetry.track(
                QUERY_EXECUTION_EVENT,
                &TrackProperties {
                    status: TrackStatus::Failed,
                    query: script.code.clone(),
                    query_id,
                    title: script.id.clone(),
                    error: Some(error.message.clone()),
                },
            );
        }

        if error.is_retryable() {
            self.deps.notifier.show(Notification {
                message: error.message,
                action_title: "Retry".into(),
                auto_hide: self.config.retry_notification_duration,
                action: RetryAction::new(self.retry_tx.clone()),
            });
        }
    }

    fn publish_view(&self) {
        let next = ScriptView {
            script: self.script.clone(),
            args: self.args.clone(),
            manual: self.manual,
            cancellable: self.running.as_ref().is_some_and(|ctx| ctx.cancellable),
            executing: self.running.is_some(),
            executions: self.executions,
            attempts: self.attempts,
            has_mutation: self.has_mutation,
            awaiting_execution: self.awaiting.is_some(),
        };
        self.view_tx.send_if_modified(|view| {
            if *view == next {
                return false;
            }
            *view = next;
            true
        });
    }
}

async fn next_update(running: &mut Option<RunCtx>) -> Option<ExecutionUpdate> {
    match running {
        Some(ctx) => ctx.handle.next_event().await,
        None => futures::future::pending().await,
    }
}

async fn retry_timer(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => futures::future::pending().await,
    }
}
