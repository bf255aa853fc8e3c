use crate::models::{ActionOutcome, Condition, ListingSnapshot, Platform, TaskAction, TaskPayload};
use crate::platforms::{
    AdapterCore, AdapterError, ListingFields, PlatformAdapter, Step, Suggestion, category_option,
    condition_option, require_platform_url,
};
use crate::session::PageDriver;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

const LOGIN_URL: &str = "https://www.grailed.com/login";
const SELL_URL: &str = "https://www.grailed.com/sell";

const TITLE_INPUT: &str = r#"input[name="title"]"#;
const DESCRIPTION_INPUT: &str = r#"textarea[name="description"]"#;
const PRICE_INPUT: &str = r#"input[name="price"]"#;
const SIZE_INPUT: &str = r#"input[name="size"]"#;
const DESIGNER_INPUT: &str = r#"input[name="designer"]"#;
const CONDITION_PICKER: &str = r#"[data-testid="condition-select"]"#;
const CATEGORY_PICKER: &str = r#"[data-testid="category-select"]"#;
const DELETE_BUTTON: &str = r#"[data-testid="delete-listing"]"#;
const MARK_SOLD_BUTTON: &str = r#"[data-testid="mark-sold"]"#;

const CONFIRM_PAUSE: Duration = Duration::from_millis(500);

const CONDITIONS: [(Condition, &str); 5] = [
    (Condition::New, "New/Never Worn"),
    (Condition::LikeNew, "Gently Used"),
    (Condition::Good, "Used"),
    (Condition::Fair, "Very Worn"),
    (Condition::Poor, "Very Worn"),
];
const DEFAULT_CONDITION: &str = "Used";

// Grailed has no separate bag, jewelry or watch departments.
const CATEGORIES: [(&str, &str); 8] = [
    ("Tops", "Tops"),
    ("Bottoms", "Bottoms"),
    ("Outerwear", "Outerwear"),
    ("Footwear", "Footwear"),
    ("Accessories", "Accessories"),
    ("Bags", "Accessories"),
    ("Jewelry", "Accessories"),
    ("Watches", "Accessories"),
];

pub struct GrailedAdapter {
    core: AdapterCore,
}

impl GrailedAdapter {
    pub fn new(core: AdapterCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl PlatformAdapter for GrailedAdapter {
    fn platform(&self) -> Platform {
        Platform::Grailed
    }

    async fn page(&self) -> Result<Arc<dyn PageDriver>, AdapterError> {
        self.core.page().await
    }

    async fn open_login_page(&self) -> Result<(), AdapterError> {
        self.core.open(LOGIN_URL).await?;
        self.core.log("Opened Grailed login page");
        Ok(())
    }

    async fn check_session(&self) -> bool {
        self.core
            .check_landing(SELL_URL, |url| !url.contains("/login"))
            .await
    }

    async fn post_listing(
        &self,
        listing: &ListingSnapshot,
        payload: &TaskPayload,
    ) -> Result<ActionOutcome, AdapterError> {
        let fields = ListingFields::resolve(Platform::Grailed, listing, payload);
        let core = &self.core;

        core.log("Navigating to Grailed sell page...");
        let page = core.open(SELL_URL).await?;
        core.wait_for_form(&page, TITLE_INPUT).await?;

        core.fill(&page, "title", TITLE_INPUT, &fields.title).await;
        core.fill(&page, "description", DESCRIPTION_INPUT, &fields.description)
            .await;
        core.fill(&page, "price", PRICE_INPUT, &fields.price).await;
        if let Some(size) = &fields.size {
            core.fill(&page, "size", SIZE_INPUT, size).await;
        }
        if let Some(brand) = &fields.brand {
            core.type_and_accept(&page, "designer", DESIGNER_INPUT, brand, Suggestion::Highlighted)
                .await;
        }
        if let Some(category) = &fields.category {
            let option = category_option(&CATEGORIES, category);
            core.pick(&page, "category", CATEGORY_PICKER, &option).await;
        }
        let condition = condition_option(&CONDITIONS, fields.condition, DEFAULT_CONDITION);
        core.pick(&page, "condition", CONDITION_PICKER, condition).await;

        core.note_photos(fields.photo_count);
        core.log("Listing form filled (submit disabled for safety)");
        Ok(ActionOutcome::awaiting_submission())
    }

    async fn update_listing(
        &self,
        _listing: Option<&ListingSnapshot>,
        _payload: &TaskPayload,
    ) -> Result<ActionOutcome, AdapterError> {
        self.core.log("Grailed listing update not yet implemented");
        Ok(ActionOutcome::unsupported())
    }

    async fn delist_listing(&self, payload: &TaskPayload) -> Result<ActionOutcome, AdapterError> {
        let url = require_platform_url(Platform::Grailed, TaskAction::Delist, payload)?;
        self.core
            .confirm_action(
                &url,
                "delist",
                &[Step::Selector(DELETE_BUTTON), Step::Text("Confirm")],
                CONFIRM_PAUSE,
            )
            .await?;
        self.core.log("Grailed listing removed");
        Ok(ActionOutcome::done())
    }

    async fn mark_sold(&self, payload: &TaskPayload) -> Result<ActionOutcome, AdapterError> {
        let url = require_platform_url(Platform::Grailed, TaskAction::MarkSold, payload)?;
        self.core
            .confirm_action(
                &url,
                "mark as sold",
                &[Step::Selector(MARK_SOLD_BUTTON), Step::Text("Confirm")],
                CONFIRM_PAUSE,
            )
            .await?;
        self.core.log("Grailed listing marked as sold");
        Ok(ActionOutcome::done())
    }
}
