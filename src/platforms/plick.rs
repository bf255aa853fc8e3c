use crate::models::{ActionOutcome, Condition, ListingSnapshot, Platform, TaskAction, TaskPayload};
use crate::platforms::{
    AdapterCore, AdapterError, ListingFields, PlatformAdapter, Step, Suggestion, category_option,
    condition_option, require_platform_url,
};
use crate::session::PageDriver;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

const LOGIN_URL: &str = "https://www.plick.se/logga-in";
const SELL_URL: &str = "https://www.plick.se/salj";

const TITLE_INPUT: &str = r#"input[name="title"]"#;
const DESCRIPTION_INPUT: &str = r#"textarea[name="description"]"#;
const PRICE_INPUT: &str = r#"input[name="price"]"#;
const BRAND_INPUT: &str = r#"input[name="brand"]"#;
const CATEGORY_PICKER: &str = r#"[data-testid="category-select"]"#;
const SIZE_PICKER: &str = r#"[data-testid="size-select"]"#;
const CONDITION_PICKER: &str = r#"[data-testid="condition-select"]"#;
const EDIT_LISTING: &str = r#"[data-testid="edit-listing"]"#;

const CONFIRM_PAUSE: Duration = Duration::from_millis(300);

const CONDITIONS: [(Condition, &str); 5] = [
    (Condition::New, "Nytt med lappar"),
    (Condition::LikeNew, "Nyskick"),
    (Condition::Good, "Bra skick"),
    (Condition::Fair, "Okej skick"),
    (Condition::Poor, "Slitet"),
];
const DEFAULT_CONDITION: &str = "Bra skick";

const CATEGORIES: [(&str, &str); 8] = [
    ("Tops", "Toppar"),
    ("Bottoms", "Byxor"),
    ("Outerwear", "Jackor"),
    ("Footwear", "Skor"),
    ("Accessories", "Accessoarer"),
    ("Bags", "Väskor"),
    ("Jewelry", "Smycken"),
    ("Watches", "Klockor"),
];

pub struct PlickAdapter {
    core: AdapterCore,
}

impl PlickAdapter {
    pub fn new(core: AdapterCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl PlatformAdapter for PlickAdapter {
    fn platform(&self) -> Platform {
        Platform::Plick
    }

    async fn page(&self) -> Result<Arc<dyn PageDriver>, AdapterError> {
        self.core.page().await
    }

    async fn open_login_page(&self) -> Result<(), AdapterError> {
        self.core.open(LOGIN_URL).await?;
        self.core.log("Opened Plick login page");
        Ok(())
    }

    async fn check_session(&self) -> bool {
        self.core
            .check_landing(SELL_URL, |url| {
                url.contains("/salj") && !url.contains("/logga-in")
            })
            .await
    }

    async fn post_listing(
        &self,
        listing: &ListingSnapshot,
        payload: &TaskPayload,
    ) -> Result<ActionOutcome, AdapterError> {
        let fields = ListingFields::resolve(Platform::Plick, listing, payload);
        let core = &self.core;

        core.log("Navigating to Plick sell page...");
        let page = core.open(SELL_URL).await?;
        core.wait_for_form(&page, TITLE_INPUT).await?;
        core.note_photos(fields.photo_count);

        core.fill(&page, "title", TITLE_INPUT, &fields.title).await;
        core.fill(&page, "description", DESCRIPTION_INPUT, &fields.description)
            .await;
        if let Some(category) = &fields.category {
            let option = category_option(&CATEGORIES, category);
            core.pick(&page, "category", CATEGORY_PICKER, &option).await;
        }
        if let Some(brand) = &fields.brand {
            core.type_and_accept(&page, "brand", BRAND_INPUT, brand, Suggestion::Highlighted)
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
        self.core.log("Update listing not yet implemented for Plick");
        Ok(ActionOutcome::unsupported())
    }

    async fn delist_listing(&self, payload: &TaskPayload) -> Result<ActionOutcome, AdapterError> {
        let url = require_platform_url(Platform::Plick, TaskAction::Delist, payload)?;
        self.core
            .confirm_action(
                &url,
                "delist",
                &[
                    Step::Selector(EDIT_LISTING),
                    Step::Text("Ta bort"),
                    Step::Text("Bekräfta"),
                ],
                CONFIRM_PAUSE,
            )
            .await?;
        self.core.log("Plick listing removed");
        Ok(ActionOutcome::done())
    }

    async fn mark_sold(&self, payload: &TaskPayload) -> Result<ActionOutcome, AdapterError> {
        let url = require_platform_url(Platform::Plick, TaskAction::MarkSold, payload)?;
        self.core
            .confirm_action(
                &url,
                "mark as sold",
                &[
                    Step::Selector(EDIT_LISTING),
                    Step::Text("Markera som såld"),
                    Step::Text("Bekräfta"),
                ],
                CONFIRM_PAUSE,
            )
            .await?;
        self.core.log("Plick listing marked as sold");
        Ok(ActionOutcome::done())
    }
}
