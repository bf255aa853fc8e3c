use crate::models::{ActionOutcome, Condition, ListingSnapshot, Platform, TaskAction, TaskPayload};
use crate::platforms::{
    AdapterCore, AdapterError, ListingFields, PlatformAdapter, Step, Suggestion, category_option,
    condition_option, require_platform_url,
};
use crate::session::PageDriver;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::debug;

const BASE_URL: &str = "https://www.vinted.com";
const SELL_URL: &str = "https://www.vinted.com/items/new";

const LOGIN_BUTTON: &str = r#"[data-testid="header--login-button"]"#;
const LOGIN_LINK: &str = r#"a[href*="login"]"#;
const COOKIE_ACCEPT: &str = "#onetrust-accept-btn-handler";
const ADD_PHOTOS: &str = r#"[data-testid="add-photos-button"]"#;
const TITLE_INPUT: &str = r#"input[name="title"]"#;
const DESCRIPTION_INPUT: &str = r#"textarea[name="description"]"#;
const PRICE_INPUT: &str = r#"input[name="price"]"#;
const BRAND_INPUT: &str = r#"input[name="brand"]"#;
const CATEGORY_PICKER: &str = r#"[data-testid="category-select"]"#;
const SIZE_PICKER: &str = r#"[data-testid="size-select"]"#;
const CONDITION_PICKER: &str = r#"[data-testid="condition-select"]"#;
const ITEM_ACTIONS: &str = r#"[data-testid="item-actions"]"#;

const CONFIRM_PAUSE: Duration = Duration::from_millis(300);

const CONDITIONS: [(Condition, &str); 5] = [
    (Condition::New, "New with tags"),
    (Condition::LikeNew, "New without tags"),
    (Condition::Good, "Very good"),
    (Condition::Fair, "Good"),
    (Condition::Poor, "Satisfactory"),
];
const DEFAULT_CONDITION: &str = "Very good";

const CATEGORIES: [(&str, &str); 6] = [
    ("Tops", "Tops"),
    ("Bottoms", "Trousers"),
    ("Outerwear", "Jackets"),
    ("Footwear", "Shoes"),
    ("Accessories", "Accessories"),
    ("Bags", "Bags"),
];

pub struct VintedAdapter {
    core: AdapterCore,
}

impl VintedAdapter {
    pub fn new(core: AdapterCore) -> Self {
        Self { core }
    }

    async fn dismiss_cookie_banner(&self, page: &Arc<dyn PageDriver>) {
        if page.click(COOKIE_ACCEPT).await.is_ok() {
            debug!(target = "reseller.platform", platform = "vinted", "cookie banner accepted");
        }
    }
}

#[async_trait]
impl PlatformAdapter for VintedAdapter {
    fn platform(&self) -> Platform {
        Platform::Vinted
    }

    async fn page(&self) -> Result<Arc<dyn PageDriver>, AdapterError> {
        self.core.page().await
    }

    async fn open_login_page(&self) -> Result<(), AdapterError> {
        let page = self.core.open(BASE_URL).await?;
        if page.click(LOGIN_BUTTON).await.is_err() {
            page.click(LOGIN_LINK).await?;
        }
        self.core.log("Opened Vinted login dialog");
        Ok(())
    }

    async fn check_session(&self) -> bool {
        self.core
            .check_landing(SELL_URL, |url| url.contains("/items/new"))
            .await
    }

    async fn post_listing(
        &self,
        listing: &ListingSnapshot,
        payload: &TaskPayload,
    ) -> Result<ActionOutcome, AdapterError> {
        let fields = ListingFields::resolve(Platform::Vinted, listing, payload);
        let core = &self.core;

        core.log("Navigating to Vinted sell page...");
        let page = core.open(SELL_URL).await?;
        self.dismiss_cookie_banner(&page).await;
        core.wait_for_form(&page, ADD_PHOTOS).await?;
        core.note_photos(fields.photo_count);

        core.fill(&page, "title", TITLE_INPUT, &fields.title).await;
        core.fill(&page, "description", DESCRIPTION_INPUT, &fields.description)
            .await;
        if let Some(category) = &fields.category {
            let option = category_option(&CATEGORIES, category);
            core.pick(&page, "category", CATEGORY_PICKER, &option).await;
        }
        if let Some(brand) = &fields.brand {
            core.type_and_accept(&page, "brand", BRAND_INPUT, brand, Suggestion::FirstInList)
                .await;
        }
        if let Some(size) = &fields.size {
            core.pick(&page, "size", SIZE_PICKER, size).await;
        }
        let condition = condition_option(&CONDITIONS, fields.condition, DEFAULT_CONDITION);
        core.pick(&page, "condition", CONDITION_PICKER, condition).await;
        core.fill(&page, "price", PRICE_INPUT, &fields.price).await;

        core.log("Listing form filled (submit disabled for safety)");
        Ok(ActionOutcome::awaiting_submission())
    }

    async fn update_listing(
        &self,
        _listing: Option<&ListingSnapshot>,
        _payload: &TaskPayload,
    ) -> Result<ActionOutcome, AdapterError> {
        self.core.log("Update listing not yet implemented for Vinted");
        Ok(ActionOutcome::unsupported())
    }

    async fn delist_listing(&self, payload: &TaskPayload) -> Result<ActionOutcome, AdapterError> {
        let url = require_platform_url(Platform::Vinted, TaskAction::Delist, payload)?;
        self.core
            .confirm_action(
                &url,
                "delist",
                &[
                    Step::Selector(ITEM_ACTIONS),
                    Step::Text("Delete"),
                    Step::Text("Confirm"),
                ],
                CONFIRM_PAUSE,
            )
            .await?;
        self.core.log("Listing delisted successfully");
        Ok(ActionOutcome::done())
    }

    async fn mark_sold(&self, payload: &TaskPayload) -> Result<ActionOutcome, AdapterError> {
        let url = require_platform_url(Platform::Vinted, TaskAction::MarkSold, payload)?;
        self.core
            .confirm_action(
                &url,
                "mark as sold",
                &[
                    Step::Selector(ITEM_ACTIONS),
                    Step::Text("Mark as sold"),
                    Step::Text("Confirm"),
                ],
                CONFIRM_PAUSE,
            )
            .await?;
        self.core.log("Marked as sold successfully");
        Ok(ActionOutcome::done())
    }
}
