//! Browser process ownership and the per-platform page cache.

pub mod chromium;

use crate::models::Platform;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use chromium::ChromiumLauncher;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser configuration: {0}")]
    Config(String),
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("timed out after {timeout:?} waiting for `{selector}`")]
    Timeout { selector: String, timeout: Duration },
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("browser protocol error: {0}")]
    Protocol(String),
}

/// Outcome of a best-effort interaction with one form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillResult {
    Filled,
    NotFound,
}

/// One tab. Implementations must be cheap to share behind an `Arc`.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn current_url(&self) -> Result<Option<String>, BrowserError>;
    async fn set_user_agent(&self, user_agent: &str) -> Result<(), BrowserError>;
    /// Fails with [`BrowserError::Timeout`] once `timeout` elapses.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
    -> Result<(), BrowserError>;
    async fn type_into(&self, selector: &str, text: &str) -> Result<FillResult, BrowserError>;
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;
    /// Clicks the first visible control whose text is exactly `text`.
    async fn click_text(&self, text: &str) -> Result<(), BrowserError>;
    /// Sends a key press to the focused element.
    async fn press_key(&self, key: &str) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn pages(&self) -> Result<Vec<Arc<dyn PageDriver>>, BrowserError>;
    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, BrowserError>;
    async fn close(&self) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserBackend>, BrowserError>;
}

struct Session {
    page: Arc<dyn PageDriver>,
    logged_in: Option<bool>,
}

/// Sole owner of the browser. Adapters borrow pages through [`get_page`]
/// and never close them.
///
/// [`get_page`]: SessionManager::get_page
pub struct SessionManager {
    browser: Box<dyn BrowserBackend>,
    sessions: Mutex<HashMap<Platform, Session>>,
    user_agent: String,
}

impl SessionManager {
    pub fn new(browser: Box<dyn BrowserBackend>, user_agent: impl Into<String>) -> Self {
        Self {
            browser,
            sessions: Mutex::new(HashMap::new()),
            user_agent: user_agent.into(),
        }
    }

    pub async fn launch(
        launcher: &dyn BrowserLauncher,
        user_agent: impl Into<String>,
    ) -> Result<Self, BrowserError> {
        let browser = launcher.launch().await?;
        info!(target = "reseller.session", "browser initialized");
        Ok(Self::new(browser, user_agent))
    }

    /// Returns the platform's page, adopting an already open tab on the
    /// platform's domain or opening a new one on first use.
    pub async fn get_page(&self, platform: Platform) -> Result<Arc<dyn PageDriver>, BrowserError> {
        // Held across creation so two callers cannot both open a tab.
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&platform) {
            return Ok(session.page.clone());
        }

        let page = match self.find_open_page(platform).await? {
            Some(page) => {
                debug!(target = "reseller.session", platform = %platform, "adopted open tab");
                page
            }
            None => {
                let page = self.browser.new_page().await?;
                page.set_user_agent(&self.user_agent).await?;
                debug!(target = "reseller.session", platform = %platform, "opened new tab");
                page
            }
        };
        sessions.insert(
            platform,
            Session {
                page: page.clone(),
                logged_in: None,
            },
        );
        Ok(page)
    }

    async fn find_open_page(
        &self,
        platform: Platform,
    ) -> Result<Option<Arc<dyn PageDriver>>, BrowserError> {
        for page in self.browser.pages().await? {
            let url = page.current_url().await.ok().flatten().unwrap_or_default();
            if url.contains(platform.host_marker()) {
                return Ok(Some(page));
            }
        }
        Ok(None)
    }

    pub async fn record_login(&self, platform: Platform, logged_in: bool) {
        if let Some(session) = self.sessions.lock().await.get_mut(&platform) {
            session.logged_in = Some(logged_in);
        }
    }

    /// Last observed login state; `None` until a session check ran.
    pub async fn logged_in(&self, platform: Platform) -> Option<bool> {
        self.sessions
            .lock()
            .await
            .get(&platform)
            .and_then(|session| session.logged_in)
    }

    pub async fn close(&self) -> Result<(), BrowserError> {
        self.sessions.lock().await.clear();
        self.browser.close().await?;
        info!(target = "reseller.session", "browser closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBrowser, MockSite};

    #[tokio::test]
    async fn reuses_one_page_per_platform() {
        let site = MockSite::new();
        let manager = SessionManager::new(Box::new(MockBrowser::new(site.clone())), "agent/1");

        let first = manager.get_page(Platform::Vinted).await.unwrap();
        first.goto("https://www.google.com").await.unwrap();
        let second = manager.get_page(Platform::Vinted).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        manager.get_page(Platform::Plick).await.unwrap();
        assert_eq!(site.pages_opened(), 2);
        assert_eq!(site.user_agents(), vec!["agent/1", "agent/1"]);
    }

    #[tokio::test]
    async fn adopts_tab_already_on_platform_domain() {
        let site = MockSite::new();
        let browser = MockBrowser::new(site.clone());
        browser
            .open_at("https://www.grailed.com/sell")
            .await;
        let manager = SessionManager::new(Box::new(browser), "agent/1");

        let page = manager.get_page(Platform::Grailed).await.unwrap();
        assert_eq!(
            page.current_url().await.unwrap().as_deref(),
            Some("https://www.grailed.com/sell")
        );
        assert_eq!(site.pages_opened(), 1);
        assert!(site.user_agents().is_empty());
    }

    #[tokio::test]
    async fn login_state_is_tracked_per_platform() {
        let site = MockSite::new();
        let manager = SessionManager::new(Box::new(MockBrowser::new(site)), "agent/1");
        manager.get_page(Platform::Plick).await.unwrap();
        assert_eq!(manager.logged_in(Platform::Plick).await, None);
        manager.record_login(Platform::Plick, true).await;
        assert_eq!(manager.logged_in(Platform::Plick).await, Some(true));
        assert_eq!(manager.logged_in(Platform::Vinted).await, None);
    }

    #[tokio::test]
    async fn close_releases_pages_and_browser() {
        let site = MockSite::new();
        let manager = SessionManager::new(Box::new(MockBrowser::new(site.clone())), "agent/1");
        manager.get_page(Platform::Grailed).await.unwrap();
        manager.close().await.unwrap();
        assert!(site.browser_closed());
    }
}
