//! Polling loop that drains the remote task queue one task at a time.

use crate::config::RunnerConfig;
use crate::events::{EventSink, RunnerEvent};
use crate::metrics;
use crate::models::{
    ActionOutcome, AutomationTask, Platform, PlatformListingStatus, TaskAction, TaskStatus,
};
use crate::platforms::{AdapterError, Adapters};
use crate::session::{BrowserError, BrowserLauncher, SessionManager};
use crate::store::{StoreError, TaskStore};
use chrono::Utc;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, oneshot},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HISTORY_LIMIT: usize = 50;

/// Everything the runner needs from the outside world.
#[derive(Clone)]
pub struct RunnerContext {
    pub config: Arc<RunnerConfig>,
    pub store: Arc<dyn TaskStore>,
    pub launcher: Arc<dyn BrowserLauncher>,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("runner is not started")]
    NotRunning,
}

/// Why a task could not be carried out. The display text becomes the task's
/// `error_message`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Invalid task payload: {0}")]
    InvalidPayload(String),
    #[error("task carries no listing to post")]
    MissingListing,
    #[error("{action} is not supported on {platform}")]
    Unsupported {
        platform: Platform,
        action: TaskAction,
    },
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDisposition {
    Completed,
    Failed(String),
    /// Another runner got to the task first, or it was cancelled.
    Skipped,
}

type History = Arc<Mutex<VecDeque<AutomationTask>>>;

/// Runs single tasks to a terminal state. Cloned into the polling task.
#[derive(Clone)]
pub struct TaskExecutor {
    store: Arc<dyn TaskStore>,
    adapters: Arc<Adapters>,
    events: EventSink,
    history: History,
    paused: Arc<AtomicBool>,
    busy: Arc<Mutex<()>>,
}

impl TaskExecutor {
    /// One poll cycle: fetch the oldest pending task and run it. Does nothing
    /// while paused or while another cycle is still running.
    pub async fn run_cycle(&self) -> Option<TaskDisposition> {
        if self.paused.load(Ordering::SeqCst) {
            return None;
        }
        let Ok(_busy) = self.busy.try_lock() else {
            debug!(target = "reseller.runner", "cycle skipped, task in flight");
            return None;
        };
        match self.store.next_pending().await {
            Ok(Some(task)) => {
                metrics::poll_cycle(true);
                Some(self.execute(task).await)
            }
            Ok(None) => {
                metrics::poll_cycle(false);
                None
            }
            Err(err) => {
                warn!(target = "reseller.runner", error = %err, "failed to fetch pending tasks");
                None
            }
        }
    }

    pub async fn execute(&self, mut task: AutomationTask) -> TaskDisposition {
        let started_at = Utc::now();
        match self.store.claim(task.id, started_at).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(target = "reseller.runner", task_id = %task.id, "task no longer pending");
                return TaskDisposition::Skipped;
            }
            Err(err) => {
                warn!(target = "reseller.runner", task_id = %task.id, error = %err, "claim write failed, running anyway");
            }
        }
        task.status = TaskStatus::InProgress;
        task.started_at = Some(started_at);

        self.events
            .log(format!("Processing task: {} on {}", task.action, task.platform));
        self.events.emit(RunnerEvent::TaskStarted { task: task.clone() });

        let clock = Instant::now();
        let result = self.dispatch(&task).await;
        let finished_at = Utc::now();
        task.completed_at = Some(finished_at);

        let disposition = match result {
            Ok(outcome) => {
                self.record_listing(&task, &outcome).await;
                if let Err(err) = self.store.complete(task.id, finished_at).await {
                    warn!(target = "reseller.runner", task_id = %task.id, error = %err, "failed to record completion");
                }
                task.status = TaskStatus::Completed;
                self.events.log(format!("Task completed: {}", task.id));
                self.events.emit(RunnerEvent::TaskCompleted { task: task.clone() });
                TaskDisposition::Completed
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(store_err) = self.store.fail(task.id, finished_at, &message).await {
                    warn!(target = "reseller.runner", task_id = %task.id, error = %store_err, "failed to record failure");
                }
                error!(target = "reseller.runner", task_id = %task.id, error = %message, "task failed");
                task.status = TaskStatus::Failed;
                task.error_message = Some(message.clone());
                self.events.emit(RunnerEvent::TaskFailed {
                    task: task.clone(),
                    error: message.clone(),
                });
                TaskDisposition::Failed(message)
            }
        };

        metrics::task_finished(
            &task.platform,
            &task.action,
            task.status.as_str(),
            clock.elapsed().as_millis(),
        );
        self.remember(task).await;
        disposition
    }

    async fn dispatch(&self, task: &AutomationTask) -> Result<ActionOutcome, DispatchError> {
        let platform = Platform::parse(&task.platform)
            .ok_or_else(|| DispatchError::UnknownPlatform(task.platform.clone()))?;
        let action = TaskAction::parse(&task.action)
            .ok_or_else(|| DispatchError::UnknownAction(task.action.clone()))?;
        let adapter = self.adapters.get(platform);
        debug!(target = "reseller.runner", platform = %adapter.platform(), %action, "dispatching");
        let invalid = |err: serde_json::Error| DispatchError::InvalidPayload(err.to_string());
        let payload = task.decode_payload().map_err(invalid)?;
        let listing = task.listing(&payload).map_err(invalid)?;

        let outcome = match action {
            TaskAction::Post => {
                let listing = listing.as_ref().ok_or(DispatchError::MissingListing)?;
                adapter.post_listing(listing, &payload).await?
            }
            TaskAction::Update => adapter.update_listing(listing.as_ref(), &payload).await?,
            TaskAction::Delist => adapter.delist_listing(&payload).await?,
            TaskAction::MarkSold => adapter.mark_sold(&payload).await?,
        };
        if !outcome.success {
            return Err(DispatchError::Unsupported { platform, action });
        }
        Ok(outcome)
    }

    /// Mirrors a successful action onto the platform listing row. Failures
    /// here are logged; the task itself already succeeded.
    async fn record_listing(&self, task: &AutomationTask, outcome: &ActionOutcome) {
        let (Some(listing_id), Some(platform), Some(action)) = (
            task.listing_id,
            Platform::parse(&task.platform),
            TaskAction::parse(&task.action),
        ) else {
            return;
        };
        let now = Utc::now();
        let written = match (action, outcome.platform_url.as_deref()) {
            (TaskAction::Post, Some(url)) => {
                self.store.mark_listed(listing_id, platform, url, now).await
            }
            (TaskAction::Delist, _) => {
                self.store
                    .set_listing_status(listing_id, platform, PlatformListingStatus::Removed, now)
                    .await
            }
            (TaskAction::MarkSold, _) => {
                self.store
                    .set_listing_status(listing_id, platform, PlatformListingStatus::Sold, now)
                    .await
            }
            _ => return,
        };
        if let Err(err) = written {
            warn!(target = "reseller.runner", %listing_id, error = %err, "failed to update platform listing");
        }
    }

    async fn remember(&self, task: AutomationTask) {
        let mut history = self.history.lock().await;
        history.push_front(task);
        history.truncate(HISTORY_LIMIT);
    }
}

struct Running {
    session: Arc<SessionManager>,
    executor: TaskExecutor,
    stop_tx: oneshot::Sender<()>,
    poller: JoinHandle<()>,
}

/// Owns the browser session and the polling task for its lifetime.
pub struct TaskRunner {
    ctx: RunnerContext,
    events: EventSink,
    paused: Arc<AtomicBool>,
    history: History,
    running: Mutex<Option<Running>>,
}

impl TaskRunner {
    pub fn new(ctx: RunnerContext) -> Self {
        Self {
            ctx,
            events: EventSink::new(),
            paused: Arc::new(AtomicBool::new(false)),
            history: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT))),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.ctx.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.events.subscribe()
    }

    /// Launches the browser and starts polling. Calling it again while
    /// running is a no-op.
    pub async fn start(&self) -> Result<(), RunnerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!(target = "reseller.runner", "start ignored, already running");
            return Ok(());
        }

        let session = match SessionManager::launch(
            self.ctx.launcher.as_ref(),
            self.ctx.config.browser.user_agent.clone(),
        )
        .await
        {
            Ok(session) => Arc::new(session),
            Err(err) => {
                self.events.log(format!("Failed to start browser: {err}"));
                return Err(err.into());
            }
        };
        let adapters = Arc::new(Adapters::new(
            session.clone(),
            self.events.clone(),
            self.ctx.config.form_timeout,
        ));
        let executor = TaskExecutor {
            store: self.ctx.store.clone(),
            adapters,
            events: self.events.clone(),
            history: self.history.clone(),
            paused: self.paused.clone(),
            busy: Arc::new(Mutex::new(())),
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        let poller = tokio::spawn(poll_loop(
            executor.clone(),
            self.ctx.config.poll_interval,
            stop_rx,
        ));

        *running = Some(Running {
            session,
            executor,
            stop_tx,
            poller,
        });
        info!(
            target = "reseller.runner",
            interval_secs = self.ctx.config.poll_interval.as_secs(),
            "task runner started"
        );
        self.events.log("Task runner started");
        Ok(())
    }

    /// Stops polling, waits for the in-flight task, then closes the browser.
    pub async fn stop(&self) -> Result<(), RunnerError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        let _ = running.stop_tx.send(());
        if let Err(err) = running.poller.await {
            warn!(target = "reseller.runner", error = %err, "poller ended abnormally");
        }
        // A task started through `execute_task` still holds the busy lock.
        let _idle = running.executor.busy.lock().await;
        running.session.close().await?;
        self.events.log("Task runner stopped");
        Ok(())
    }

    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            self.events.log("Task runner paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            self.events.log("Task runner resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn executor(&self) -> Result<TaskExecutor, RunnerError> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| running.executor.clone())
            .ok_or(RunnerError::NotRunning)
    }

    /// Runs one poll cycle now instead of waiting for the next tick.
    pub async fn process_pending_tasks(&self) -> Result<Option<TaskDisposition>, RunnerError> {
        Ok(self.executor().await?.run_cycle().await)
    }

    /// Claims and runs a specific task outside the polling order.
    pub async fn execute_task(&self, task: AutomationTask) -> Result<TaskDisposition, RunnerError> {
        let executor = self.executor().await?;
        let _busy = executor.busy.lock().await;
        Ok(executor.execute(task).await)
    }

    pub async fn login_to_platform(&self, platform: Platform) -> Result<(), RunnerError> {
        let executor = self.executor().await?;
        executor.adapters.get(platform).open_login_page().await?;
        Ok(())
    }

    pub async fn check_session(&self, platform: Platform) -> Result<bool, RunnerError> {
        let executor = self.executor().await?;
        Ok(executor.adapters.get(platform).check_session().await)
    }

    /// Last observed login state per platform; `None` until checked.
    pub async fn session_states(&self) -> Vec<(Platform, Option<bool>)> {
        let session = self
            .running
            .lock()
            .await
            .as_ref()
            .map(|running| running.session.clone());
        let mut states = Vec::with_capacity(Platform::ALL.len());
        for platform in Platform::ALL {
            let logged_in = match &session {
                Some(session) => session.logged_in(platform).await,
                None => None,
            };
            states.push((platform, logged_in));
        }
        states
    }

    pub async fn pending_tasks(&self) -> Result<Vec<AutomationTask>, RunnerError> {
        Ok(self.ctx.store.list_pending().await?)
    }

    pub async fn cancel_task(&self, id: Uuid) -> Result<bool, RunnerError> {
        let cancelled = self.ctx.store.cancel_pending(id).await?;
        if cancelled {
            self.events.log(format!("Task cancelled: {id}"));
        }
        Ok(cancelled)
    }

    /// Most recent finished tasks, newest first.
    pub async fn history(&self) -> Vec<AutomationTask> {
        self.history.lock().await.iter().cloned().collect()
    }
}

async fn poll_loop(executor: TaskExecutor, every: Duration, mut stop_rx: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                executor.run_cycle().await;
            }
        }
    }
    debug!(target = "reseller.runner", "poller stopped");
}
