//! Marketplace adapters: each turns a listing into page interactions on
//! the platform's dedicated tab.

pub mod grailed;
pub mod plick;
pub mod vinted;

use crate::events::EventSink;
use crate::models::{ActionOutcome, Condition, ListingSnapshot, Platform, TaskAction, TaskPayload};
use crate::optimizer;
use crate::session::{BrowserError, FillResult, PageDriver, SessionManager};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

pub use grailed::GrailedAdapter;
pub use plick::PlickAdapter;
pub use vinted::VintedAdapter;

/// Pause between opening a picker and choosing from it.
const PICKER_PAUSE: Duration = Duration::from_millis(300);
/// Pause between typing into an autocomplete and accepting a suggestion.
const SUGGESTION_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("no platform URL recorded for {action} on {platform}; cannot locate the listing")]
    MissingPlatformUrl {
        platform: Platform,
        action: TaskAction,
    },
    #[error("Failed to {verb}: {source}")]
    Action {
        verb: &'static str,
        #[source]
        source: BrowserError,
    },
}

/// Capability set shared by every marketplace.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// The platform's dedicated tab, opened on first use.
    async fn page(&self) -> Result<Arc<dyn PageDriver>, AdapterError>;

    /// Navigates to the login entry point; the human completes the login.
    async fn open_login_page(&self) -> Result<(), AdapterError>;

    /// Best effort: any navigation failure reads as logged out.
    async fn check_session(&self) -> bool;

    /// Fills the listing form. Never submits it.
    async fn post_listing(
        &self,
        listing: &ListingSnapshot,
        payload: &TaskPayload,
    ) -> Result<ActionOutcome, AdapterError>;

    async fn update_listing(
        &self,
        listing: Option<&ListingSnapshot>,
        payload: &TaskPayload,
    ) -> Result<ActionOutcome, AdapterError>;

    async fn delist_listing(&self, payload: &TaskPayload) -> Result<ActionOutcome, AdapterError>;

    async fn mark_sold(&self, payload: &TaskPayload) -> Result<ActionOutcome, AdapterError>;
}

/// Closed adapter table, one entry per [`Platform`].
pub struct Adapters {
    grailed: GrailedAdapter,
    vinted: VintedAdapter,
    plick: PlickAdapter,
}

impl Adapters {
    pub fn new(session: Arc<SessionManager>, events: EventSink, form_timeout: Duration) -> Self {
        let core = |platform| AdapterCore::new(platform, session.clone(), events.clone(), form_timeout);
        Self {
            grailed: GrailedAdapter::new(core(Platform::Grailed)),
            vinted: VintedAdapter::new(core(Platform::Vinted)),
            plick: PlickAdapter::new(core(Platform::Plick)),
        }
    }

    pub fn get(&self, platform: Platform) -> &dyn PlatformAdapter {
        match platform {
            Platform::Grailed => &self.grailed,
            Platform::Vinted => &self.vinted,
            Platform::Plick => &self.plick,
        }
    }
}

/// How an autocomplete suggestion gets accepted after typing.
#[derive(Debug, Clone, Copy)]
pub enum Suggestion {
    /// The widget pre-highlights the best match; Enter takes it.
    Highlighted,
    /// Move onto the first entry of the list, then Enter.
    FirstInList,
}

/// One click of a confirm-guarded action.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Selector(&'static str),
    Text(&'static str),
}

/// Values that end up in the form, after the optimizer and any per-task
/// overrides carried in the payload.
#[derive(Debug, Clone)]
pub struct ListingFields {
    pub title: String,
    pub description: String,
    pub price: String,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub category: Option<String>,
    pub condition: Option<Condition>,
    pub photo_count: usize,
}

impl ListingFields {
    pub fn resolve(platform: Platform, listing: &ListingSnapshot, payload: &TaskPayload) -> Self {
        let content = optimizer::optimize(platform, listing);
        let price = payload
            .platform_price
            .map(|price| price.round() as i64)
            .unwrap_or(content.price);
        Self {
            title: non_blank(payload.optimized_title.as_deref()).unwrap_or(content.title),
            description: non_blank(payload.optimized_description.as_deref())
                .unwrap_or(content.description),
            price: price.to_string(),
            brand: non_blank(listing.brand.as_deref()),
            size: non_blank(listing.size.as_deref()),
            category: non_blank(listing.category.as_deref()),
            condition: Condition::parse(&listing.condition),
            photo_count: listing.photos.as_ref().map_or(0, Vec::len),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Looks up a site label, falling back to `default` for unmapped values.
pub fn condition_option(
    table: &[(Condition, &'static str)],
    condition: Option<Condition>,
    default: &'static str,
) -> &'static str {
    condition
        .and_then(|wanted| table.iter().find(|(c, _)| *c == wanted))
        .map(|(_, label)| *label)
        .unwrap_or(default)
}

/// Maps a canonical category to the site's wording; unmapped categories are
/// passed through so the picker can still match them verbatim.
pub fn category_option(table: &[(&str, &'static str)], category: &str) -> String {
    table
        .iter()
        .find(|(canonical, _)| canonical.eq_ignore_ascii_case(category))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| category.to_string())
}

pub fn require_platform_url(
    platform: Platform,
    action: TaskAction,
    payload: &TaskPayload,
) -> Result<String, AdapterError> {
    payload
        .platform_url()
        .map(str::to_string)
        .ok_or(AdapterError::MissingPlatformUrl { platform, action })
}

/// Page plumbing every adapter shares.
pub struct AdapterCore {
    platform: Platform,
    session: Arc<SessionManager>,
    events: EventSink,
    form_timeout: Duration,
}

impl AdapterCore {
    pub fn new(
        platform: Platform,
        session: Arc<SessionManager>,
        events: EventSink,
        form_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            session,
            events,
            form_timeout,
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        self.events.log(message);
    }

    fn skipped(&self, field: &str, reason: &str) {
        warn!(target = "reseller.platform", platform = %self.platform, field, reason, "field skipped");
        self.events.log(format!("Could not fill {field}: {reason}"));
    }

    pub async fn page(&self) -> Result<Arc<dyn PageDriver>, AdapterError> {
        Ok(self.session.get_page(self.platform).await?)
    }

    pub async fn open(&self, url: &str) -> Result<Arc<dyn PageDriver>, AdapterError> {
        let page = self.page().await?;
        page.goto(url).await?;
        Ok(page)
    }

    /// Navigates to `url` and judges the landing URL. Never fails.
    pub async fn check_landing(&self, url: &str, authenticated: fn(&str) -> bool) -> bool {
        let landed = async {
            let page = self.open(url).await?;
            Ok::<_, AdapterError>(page.current_url().await?.unwrap_or_default())
        }
        .await;
        let logged_in = match landed {
            Ok(current) => authenticated(&current),
            Err(err) => {
                warn!(target = "reseller.platform", platform = %self.platform, error = %err, "session check failed");
                false
            }
        };
        self.session.record_login(self.platform, logged_in).await;
        logged_in
    }

    /// Waits for the element that proves the form rendered. Bounded by the
    /// configured form timeout.
    pub async fn wait_for_form(
        &self,
        page: &Arc<dyn PageDriver>,
        selector: &str,
    ) -> Result<(), AdapterError> {
        page.wait_for_selector(selector, self.form_timeout).await?;
        Ok(())
    }

    pub async fn fill(
        &self,
        page: &Arc<dyn PageDriver>,
        field: &str,
        selector: &str,
        value: &str,
    ) -> FillResult {
        match page.type_into(selector, value).await {
            Ok(FillResult::Filled) => {
                self.log(format!("Entered {field}: {}", preview(value)));
                FillResult::Filled
            }
            Ok(FillResult::NotFound) => {
                self.skipped(field, &format!("`{selector}` not on page"));
                FillResult::NotFound
            }
            Err(err) => {
                self.skipped(field, &err.to_string());
                FillResult::NotFound
            }
        }
    }

    /// Types into an autocomplete, waits for suggestions, accepts one.
    pub async fn type_and_accept(
        &self,
        page: &Arc<dyn PageDriver>,
        field: &str,
        selector: &str,
        value: &str,
        accept: Suggestion,
    ) -> FillResult {
        let typed = match page.type_into(selector, value).await {
            Ok(result) => result,
            Err(err) => {
                self.skipped(field, &err.to_string());
                return FillResult::NotFound;
            }
        };
        if typed == FillResult::NotFound {
            self.skipped(field, &format!("`{selector}` not on page"));
            return FillResult::NotFound;
        }
        sleep(SUGGESTION_PAUSE).await;
        let accepted = async {
            if let Suggestion::FirstInList = accept {
                page.press_key("ArrowDown").await?;
            }
            page.press_key("Enter").await
        }
        .await;
        match accepted {
            Ok(()) => {
                self.log(format!("Selected {field}: {value}"));
                FillResult::Filled
            }
            Err(err) => {
                self.skipped(field, &err.to_string());
                FillResult::NotFound
            }
        }
    }

    /// Opens a dropdown and clicks the option with the given label.
    pub async fn pick(
        &self,
        page: &Arc<dyn PageDriver>,
        field: &str,
        trigger: &str,
        option: &str,
    ) -> FillResult {
        if let Err(err) = page.click(trigger).await {
            self.skipped(field, &err.to_string());
            return FillResult::NotFound;
        }
        sleep(PICKER_PAUSE).await;
        match page.click_text(option).await {
            Ok(()) => {
                self.log(format!("Selected {field}: {option}"));
                FillResult::Filled
            }
            Err(err) => {
                self.skipped(field, &err.to_string());
                FillResult::NotFound
            }
        }
    }

    pub fn note_photos(&self, count: usize) {
        if count > 0 {
            self.log(format!("{count} photos to upload by hand"));
        }
    }

    /// Navigates to the listing and clicks through `steps`, pausing between
    /// clicks. Any missing control fails the whole action.
    pub async fn confirm_action(
        &self,
        url: &str,
        verb: &'static str,
        steps: &[Step],
        pause: Duration,
    ) -> Result<(), AdapterError> {
        let page = self.open(url).await?;
        for (index, step) in steps.iter().enumerate() {
            if index > 0 {
                sleep(pause).await;
            }
            let clicked = match step {
                Step::Selector(selector) => page.click(selector).await,
                Step::Text(text) => page.click_text(text).await,
            };
            clicked.map_err(|source| AdapterError::Action { verb, source })?;
        }
        Ok(())
    }
}

fn preview(value: &str) -> String {
    let mut shown: String = value.lines().next().unwrap_or_default().chars().take(60).collect();
    if shown.len() < value.len() {
        shown.push('…');
    }
    shown
}
