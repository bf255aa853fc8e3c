//! In-memory doubles for the task store and the browser.

use crate::models::{
    AutomationTask, ListingSnapshot, Platform, PlatformListingStatus, TaskPayload, TaskStatus,
};
use crate::session::{BrowserBackend, BrowserError, BrowserLauncher, FillResult, PageDriver};
use crate::store::{StoreError, TaskStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};
use uuid::Uuid;

pub fn listing(title: &str, base_price: f64) -> ListingSnapshot {
    ListingSnapshot {
        title: title.to_string(),
        description: None,
        brand: None,
        size: None,
        condition: "good".to_string(),
        category: None,
        tags: None,
        base_price,
        currency: "USD".to_string(),
        photos: None,
    }
}

#[derive(Default)]
struct StoreState {
    tasks: Vec<AutomationTask>,
    in_progress: usize,
    max_in_progress: usize,
    claimed: Vec<Uuid>,
    listed: Vec<(Uuid, Platform, String)>,
    listing_statuses: Vec<(Uuid, Platform, PlatformListingStatus)>,
    fail_writes: bool,
}

#[derive(Default)]
pub struct MemoryTaskStore {
    state: Mutex<StoreState>,
}

impl MemoryTaskStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends a pending task; each one is created a second after the last.
    pub fn enqueue(&self, platform: &str, action: &str, payload: TaskPayload) -> Uuid {
        self.enqueue_raw(platform, action, serde_json::to_value(&payload).unwrap())
    }

    /// Appends a pending task whose payload column holds arbitrary JSON.
    pub fn enqueue_raw(&self, platform: &str, action: &str, payload: serde_json::Value) -> Uuid {
        let mut state = self.state.lock().unwrap();
        let id = Uuid::new_v4();
        let base: DateTime<Utc> = "2026-01-01T10:00:00Z".parse().unwrap();
        let position = state.tasks.len() as i64;
        state.tasks.push(AutomationTask {
            id,
            user_id: None,
            listing_id: Some(Uuid::new_v4()),
            platform: platform.to_string(),
            action: action.to_string(),
            status: TaskStatus::Pending,
            payload: Some(payload),
            error_message: None,
            created_at: base + ChronoDuration::seconds(position),
            started_at: None,
            completed_at: None,
            listings: None,
        });
        id
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn task(&self, id: Uuid) -> AutomationTask {
        let state = self.state.lock().unwrap();
        state
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .unwrap()
    }

    pub fn claimed(&self) -> Vec<Uuid> {
        self.state.lock().unwrap().claimed.clone()
    }

    pub fn max_in_progress(&self) -> usize {
        self.state.lock().unwrap().max_in_progress
    }

    pub fn listed(&self) -> Vec<(Uuid, Platform, String)> {
        self.state.lock().unwrap().listed.clone()
    }

    pub fn listing_statuses(&self) -> Vec<(Uuid, Platform, PlatformListingStatus)> {
        self.state.lock().unwrap().listing_statuses.clone()
    }

    /// Flips a task straight to `in_progress`, as another runner would.
    pub fn steal(&self, id: Uuid) {
        let mut state = self.state.lock().unwrap();
        if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
            task.status = TaskStatus::InProgress;
        }
    }

    fn finish(
        &self,
        id: Uuid,
        status: TaskStatus,
        completed_at: DateTime<Utc>,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(StoreError::Status(503));
        }
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::Status(404))?;
        let was_running = task.status == TaskStatus::InProgress;
        task.status = status;
        task.completed_at = Some(completed_at);
        task.error_message = message.map(str::to_string);
        if was_running {
            state.in_progress -= 1;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn next_pending(&self) -> Result<Option<AutomationTask>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by_key(|t| (t.created_at, t.id))
            .cloned())
    }

    async fn list_pending(&self) -> Result<Vec<AutomationTask>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut pending: Vec<_> = state
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|t| (t.created_at, t.id));
        Ok(pending)
    }

    async fn claim(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(StoreError::Status(503));
        }
        let Some(task) = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.status == TaskStatus::Pending)
        else {
            return Ok(false);
        };
        task.status = TaskStatus::InProgress;
        task.started_at = Some(started_at);
        state.claimed.push(id);
        state.in_progress += 1;
        state.max_in_progress = state.max_in_progress.max(state.in_progress);
        Ok(true)
    }

    async fn complete(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.finish(id, TaskStatus::Completed, completed_at, None)
    }

    async fn fail(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
        message: &str,
    ) -> Result<(), StoreError> {
        self.finish(id, TaskStatus::Failed, completed_at, Some(message))
    }

    async fn mark_listed(
        &self,
        listing_id: Uuid,
        platform: Platform,
        platform_url: &str,
        _listed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .listed
            .push((listing_id, platform, platform_url.to_string()));
        Ok(())
    }

    async fn set_listing_status(
        &self,
        listing_id: Uuid,
        platform: Platform,
        status: PlatformListingStatus,
        _at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .listing_statuses
            .push((listing_id, platform, status));
        Ok(())
    }

    async fn cancel_pending(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.tasks.len();
        state
            .tasks
            .retain(|t| !(t.id == id && t.status == TaskStatus::Pending));
        Ok(state.tasks.len() < before)
    }
}

/// Interaction recorded by a [`MockPage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    Goto(String),
    Type { selector: String, text: String },
    Click(String),
    ClickText(String),
    Key(String),
}

#[derive(Default)]
struct SiteState {
    selectors: HashSet<String>,
    texts: HashSet<String>,
    redirects: Vec<(String, String)>,
    fail_navigation: bool,
    actions: Vec<PageAction>,
    pages_opened: usize,
    user_agents: Vec<String>,
    browser_closed: bool,
}

/// What every page of the fake browser "renders", plus a journal of what
/// was done to it.
#[derive(Default)]
pub struct MockSite {
    state: Mutex<SiteState>,
}

impl MockSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_selectors(self: Arc<Self>, selectors: &[&str]) -> Arc<Self> {
        self.state
            .lock()
            .unwrap()
            .selectors
            .extend(selectors.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_texts(self: Arc<Self>, texts: &[&str]) -> Arc<Self> {
        self.state
            .lock()
            .unwrap()
            .texts
            .extend(texts.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_redirect(self: Arc<Self>, from: &str, to: &str) -> Arc<Self> {
        self.state
            .lock()
            .unwrap()
            .redirects
            .push((from.to_string(), to.to_string()));
        self
    }

    pub fn failing_navigation(self: Arc<Self>) -> Arc<Self> {
        self.state.lock().unwrap().fail_navigation = true;
        self
    }

    pub fn actions(&self) -> Vec<PageAction> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                PageAction::Type { selector, text } => Some((selector, text)),
                _ => None,
            })
            .collect()
    }

    pub fn pages_opened(&self) -> usize {
        self.state.lock().unwrap().pages_opened
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.state.lock().unwrap().user_agents.clone()
    }

    pub fn browser_closed(&self) -> bool {
        self.state.lock().unwrap().browser_closed
    }

    fn has(&self, selector: &str) -> bool {
        self.state.lock().unwrap().selectors.contains(selector)
    }

    fn record(&self, action: PageAction) {
        self.state.lock().unwrap().actions.push(action);
    }
}

pub struct MockPage {
    site: Arc<MockSite>,
    url: Mutex<Option<String>>,
}

#[async_trait]
impl PageDriver for MockPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let landed = {
            let state = self.site.state.lock().unwrap();
            if state.fail_navigation {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_INTERNET_DISCONNECTED".into(),
                });
            }
            state
                .redirects
                .iter()
                .find(|(from, _)| url.starts_with(from.as_str()))
                .map(|(_, to)| to.clone())
                .unwrap_or_else(|| url.to_string())
        };
        self.site.record(PageAction::Goto(url.to_string()));
        *self.url.lock().unwrap() = Some(landed);
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>, BrowserError> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), BrowserError> {
        self.site
            .state
            .lock()
            .unwrap()
            .user_agents
            .push(user_agent.to_string());
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        if self.site.has(selector) {
            Ok(())
        } else {
            Err(BrowserError::Timeout {
                selector: selector.to_string(),
                timeout,
            })
        }
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<FillResult, BrowserError> {
        if !self.site.has(selector) {
            return Ok(FillResult::NotFound);
        }
        self.site.record(PageAction::Type {
            selector: selector.to_string(),
            text: text.to_string(),
        });
        Ok(FillResult::Filled)
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        if !self.site.has(selector) {
            return Err(BrowserError::NotFound(selector.to_string()));
        }
        self.site.record(PageAction::Click(selector.to_string()));
        Ok(())
    }

    async fn click_text(&self, text: &str) -> Result<(), BrowserError> {
        if !self.site.state.lock().unwrap().texts.contains(text) {
            return Err(BrowserError::NotFound(format!("text \"{text}\"")));
        }
        self.site.record(PageAction::ClickText(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), BrowserError> {
        self.site.record(PageAction::Key(key.to_string()));
        Ok(())
    }
}

pub struct MockBrowser {
    site: Arc<MockSite>,
    pages: Mutex<Vec<Arc<MockPage>>>,
}

impl MockBrowser {
    pub fn new(site: Arc<MockSite>) -> Self {
        Self {
            site,
            pages: Mutex::new(Vec::new()),
        }
    }

    /// Opens a tab that is already showing `url`, like one left over from a
    /// previous run.
    pub async fn open_at(&self, url: &str) {
        let page = self.spawn_page();
        *page.url.lock().unwrap() = Some(url.to_string());
    }

    fn spawn_page(&self) -> Arc<MockPage> {
        let page = Arc::new(MockPage {
            site: self.site.clone(),
            url: Mutex::new(None),
        });
        self.site.state.lock().unwrap().pages_opened += 1;
        self.pages.lock().unwrap().push(page.clone());
        page
    }
}

#[async_trait]
impl BrowserBackend for MockBrowser {
    async fn pages(&self) -> Result<Vec<Arc<dyn PageDriver>>, BrowserError> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .map(|page| page.clone() as Arc<dyn PageDriver>)
            .collect())
    }

    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, BrowserError> {
        Ok(self.spawn_page())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.pages.lock().unwrap().clear();
        self.site.state.lock().unwrap().browser_closed = true;
        Ok(())
    }
}

pub struct MockLauncher {
    site: Arc<MockSite>,
}

impl MockLauncher {
    pub fn new(site: Arc<MockSite>) -> Arc<Self> {
        Arc::new(Self { site })
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserBackend>, BrowserError> {
        Ok(Box::new(MockBrowser::new(self.site.clone())))
    }
}
