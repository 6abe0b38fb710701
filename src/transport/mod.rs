//! Remote execution transport seam.
//!
//! A transport turns a script into a running remote execution and hands back an
//! [`ExecutionHandle`]: a control sender for cancellation plus the receiver of
//! lifecycle events. The controller owns at most one handle at a time.

pub mod scripted;

use crate::model::{ClusterConfig, ExecuteOptions, ExecutionUpdate, QueryFunction};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub use scripted::{Scenario, ScriptedStep, ScriptedTransport, StartRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionControl {
    /// Stop the execution; the transport answers with a `cancel` event.
    Cancel,
}

/// Starts remote executions.
pub trait ExecutionTransport: Send + Sync {
    fn execute_script(
        &self,
        cluster: &ClusterConfig,
        code: &str,
        options: ExecuteOptions,
        funcs: Vec<QueryFunction>,
    ) -> ExecutionHandle;
}

/// Live reference to one remote execution.
#[derive(Debug)]
pub struct ExecutionHandle {
    id: u64,
    ctrl_tx: UnboundedSender<ExecutionControl>,
    events: UnboundedReceiver<ExecutionUpdate>,
}

/// Transport-side ends of an [`ExecutionHandle`].
#[derive(Debug)]
pub struct ExecutionSink {
    pub events: UnboundedSender<ExecutionUpdate>,
    pub control: UnboundedReceiver<ExecutionControl>,
}

impl ExecutionHandle {
    /// Create a handle and the channel ends the transport drives it through.
    pub fn channel(id: u64) -> (Self, ExecutionSink) {
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                ctrl_tx,
                events: event_rx,
            },
            ExecutionSink {
                events: event_tx,
                control: ctrl_rx,
            },
        )
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation. Safe to call repeatedly or after the execution finished.
    pub fn cancel(&self) {
        let _ = self.ctrl_tx.send(ExecutionControl::Cancel);
    }

    /// Next lifecycle event, or `None` once the transport has closed the stream.
    pub async fn next_event(&mut self) -> Option<ExecutionUpdate> {
        self.events.recv().await
    }
}
