//! User-facing notifications (snackbar in the browser UI, stderr in the CLI).

use crate::orchestrator::Command;
use std::time::Duration;
use tokio::sync::mpsc::WeakUnboundedSender;

/// One-click retry: re-issues `execute` on the controller that produced the notification.
#[derive(Debug, Clone)]
pub struct RetryAction {
    cmd_tx: WeakUnboundedSender<Command>,
}

impl RetryAction {
    pub(crate) fn new(cmd_tx: WeakUnboundedSender<Command>) -> Self {
        Self { cmd_tx }
    }

    /// Returns false if the controller has already shut down.
    pub fn invoke(&self) -> bool {
        self.cmd_tx
            .upgrade()
            .is_some_and(|tx| tx.send(Command::Execute).is_ok())
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub action_title: String,
    pub auto_hide: Duration,
    pub action: RetryAction,
}

pub trait Notifier: Send + Sync {
    fn show(&self, notification: Notification);
}

/// Logs notifications and drops the action.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, notification: Notification) {
        tracing::warn!(
            action = %notification.action_title,
            "{}",
            notification.message
        );
    }
}
