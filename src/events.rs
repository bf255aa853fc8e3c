use crate::models::AutomationTask;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

const EVENT_BUFFER: usize = 256;

/// Fire-and-forget lifecycle notifications for the dashboard and desktop shell.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunnerEvent {
    Log { message: String },
    TaskStarted { task: AutomationTask },
    TaskCompleted { task: AutomationTask },
    TaskFailed { task: AutomationTask, error: String },
}

/// Sending half shared by the runner and the adapters. Sends never block and
/// are dropped when nobody is subscribed.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<RunnerEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: RunnerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!(target = "reseller.runner", "{message}");
        self.emit(RunnerEvent::Log { message });
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}
