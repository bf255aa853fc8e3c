use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Marketplaces the runner knows how to drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Grailed,
    Vinted,
    Plick,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Grailed, Platform::Vinted, Platform::Plick];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Grailed => "grailed",
            Platform::Vinted => "vinted",
            Platform::Plick => "plick",
        }
    }

    /// Store values are matched exactly; `"Grailed "` is not a platform.
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "grailed" => Some(Platform::Grailed),
            "vinted" => Some(Platform::Vinted),
            "plick" => Some(Platform::Plick),
            _ => None,
        }
    }

    /// Substring a page URL must contain to belong to this marketplace.
    pub fn host_marker(&self) -> &'static str {
        match self {
            Platform::Grailed => "grailed.com",
            Platform::Vinted => "vinted.",
            Platform::Plick => "plick.se",
        }
    }

    pub fn currency(&self) -> &'static str {
        match self {
            Platform::Grailed => "USD",
            Platform::Vinted => "EUR",
            Platform::Plick => "SEK",
        }
    }

    pub fn fee_percentage(&self) -> f64 {
        match self {
            Platform::Grailed => 9.0,
            Platform::Vinted => 5.0,
            Platform::Plick => 10.0,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Post,
    Update,
    Delist,
    MarkSold,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Post => "post",
            TaskAction::Update => "update",
            TaskAction::Delist => "delist",
            TaskAction::MarkSold => "mark_sold",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "post" => Some(TaskAction::Post),
            "update" => Some(TaskAction::Update),
            "delist" => Some(TaskAction::Delist),
            "mark_sold" => Some(TaskAction::MarkSold),
            _ => None,
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
}

impl Condition {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "new" => Some(Condition::New),
            "like_new" => Some(Condition::LikeNew),
            "good" => Some(Condition::Good),
            "fair" => Some(Condition::Fair),
            "poor" => Some(Condition::Poor),
            _ => None,
        }
    }
}

/// `draft` and `ready` are only ever written by the dashboard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[allow(dead_code)]
pub enum PlatformListingStatus {
    Draft,
    Ready,
    Listed,
    Sold,
    Removed,
}

/// One row of the `automation_tasks` queue.
///
/// `platform`, `action` and `payload` stay raw so that a bad value reaches
/// the runner and fails that one task with a readable message, instead of
/// breaking the read of the whole queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationTask {
    pub id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub listing_id: Option<Uuid>,
    pub platform: String,
    pub action: String,
    pub status: TaskStatus,
    #[serde(default, serialize_with = "without_credentials")]
    pub payload: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Joined `listings(*)` row, present when the read query embeds it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listings: Option<Value>,
}

impl AutomationTask {
    /// Decodes the free-form payload column. A missing or null payload is empty.
    pub fn decode_payload(&self) -> Result<TaskPayload, serde_json::Error> {
        match &self.payload {
            None | Some(Value::Null) => Ok(TaskPayload::default()),
            Some(raw) => TaskPayload::deserialize(raw),
        }
    }

    /// Listing snapshot captured at enqueue time, falling back to the joined row.
    pub fn listing(
        &self,
        payload: &TaskPayload,
    ) -> Result<Option<ListingSnapshot>, serde_json::Error> {
        if let Some(listing) = &payload.listing {
            return Ok(Some(listing.clone()));
        }
        match &self.listings {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => ListingSnapshot::deserialize(raw).map(Some),
        }
    }
}

// Login material never leaves the runner through history or the control API.
fn without_credentials<S: Serializer>(
    payload: &Option<Value>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match payload {
        Some(Value::Object(fields)) => fields
            .iter()
            .filter(|(key, _)| key.as_str() != "credentials")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<Map<String, Value>>()
            .serialize(serializer),
        other => other.serialize(serializer),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPayload {
    #[serde(default)]
    pub listing: Option<ListingSnapshot>,
    #[serde(default, skip_serializing)]
    pub credentials: Option<PlatformCredentials>,
    #[serde(default, rename = "platformUrl", alias = "platform_url")]
    pub platform_url: Option<String>,
    #[serde(default, rename = "optimizedTitle", alias = "optimized_title")]
    pub optimized_title: Option<String>,
    #[serde(
        default,
        rename = "optimizedDescription",
        alias = "optimized_description"
    )]
    pub optimized_description: Option<String>,
    #[serde(default, rename = "platformPrice", alias = "platform_price")]
    pub platform_price: Option<f64>,
}

impl TaskPayload {
    /// Recorded marketplace URL, ignoring blank strings.
    pub fn platform_url(&self) -> Option<&str> {
        self.platform_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Canonical listing as denormalized into the task payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default = "ListingSnapshot::default_condition")]
    pub condition: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    pub base_price: f64,
    #[serde(default = "ListingSnapshot::default_currency")]
    pub currency: String,
    #[serde(default)]
    pub photos: Option<Vec<String>>,
}

impl ListingSnapshot {
    fn default_condition() -> String {
        "good".to_string()
    }

    fn default_currency() -> String {
        "USD".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct PlatformCredentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub encrypted_password: Option<String>,
}

/// What an adapter reports back after driving the marketplace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(rename = "platformUrl")]
    pub platform_url: Option<String>,
}

impl ActionOutcome {
    /// Form filled, submission left to the human at the browser window.
    pub fn awaiting_submission() -> Self {
        Self {
            success: true,
            platform_url: None,
        }
    }

    pub fn done() -> Self {
        Self {
            success: true,
            platform_url: None,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            success: false,
            platform_url: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_row_with_joined_listing_and_camel_case_url() {
        let row = json!({
            "id": "6f1c3f5e-8f55-4c55-9a7c-1f3b8f0d2a11",
            "listing_id": "0b7f0c55-4d8e-4a4e-8f0a-0e3b0a3c9b22",
            "platform": "grailed",
            "action": "delist",
            "status": "pending",
            "payload": { "platformUrl": "https://www.grailed.com/listings/1" },
            "error_message": null,
            "created_at": "2026-01-01T10:00:00Z",
            "started_at": null,
            "completed_at": null,
            "listings": {
                "title": "Jacket",
                "base_price": 100.0,
                "currency": "USD",
                "condition": "good"
            }
        });
        let task: AutomationTask = serde_json::from_value(row).expect("task row");
        assert_eq!(task.status, TaskStatus::Pending);
        let payload = task.decode_payload().expect("payload");
        assert_eq!(
            payload.platform_url(),
            Some("https://www.grailed.com/listings/1")
        );
        let listing = task.listing(&payload).expect("listing row").expect("listing");
        assert_eq!(listing.title, "Jacket");
    }

    #[test]
    fn payload_listing_wins_over_joined_row() {
        let row = json!({
            "id": "6f1c3f5e-8f55-4c55-9a7c-1f3b8f0d2a11",
            "platform": "vinted",
            "action": "post",
            "status": "pending",
            "payload": {
                "listing": { "title": "Snapshot", "base_price": 10.0 },
                "credentials": { "username": "seller", "encrypted_password": "x" }
            },
            "created_at": "2026-01-01T10:00:00Z",
            "listings": { "title": "Live row", "base_price": 12.0 }
        });
        let task: AutomationTask = serde_json::from_value(row).expect("task row");
        let payload = task.decode_payload().expect("payload");
        let listing = task.listing(&payload).expect("listing row").expect("listing");
        assert_eq!(listing.title, "Snapshot");
        assert_eq!(listing.condition, "good");
        assert_eq!(listing.currency, "USD");

        let shown = serde_json::to_value(&task).unwrap();
        assert!(shown["payload"].get("credentials").is_none());
        assert_eq!(shown["payload"]["listing"]["title"], "Snapshot");
    }

    #[test]
    fn malformed_payload_still_reads_as_a_row() {
        let row = json!({
            "id": "6f1c3f5e-8f55-4c55-9a7c-1f3b8f0d2a11",
            "platform": "vinted",
            "action": "post",
            "status": "pending",
            "payload": { "platformPrice": "92", "listing": { "title": "No price" } },
            "created_at": "2026-01-01T10:00:00Z"
        });
        let task: AutomationTask = serde_json::from_value(row).expect("task row");
        assert!(task.decode_payload().is_err());

        let null_payload = AutomationTask {
            payload: Some(Value::Null),
            ..task
        };
        assert!(null_payload.decode_payload().unwrap().listing.is_none());
    }

    #[test]
    fn blank_platform_url_is_treated_as_missing() {
        let payload = TaskPayload {
            platform_url: Some("   ".into()),
            ..TaskPayload::default()
        };
        assert!(payload.platform_url().is_none());
    }

    #[test]
    fn enumerations_parse_store_values() {
        assert_eq!(Platform::parse("plick"), Some(Platform::Plick));
        assert_eq!(Platform::parse("Plick"), None);
        assert_eq!(Platform::parse("grailed "), None);
        assert_eq!(Platform::parse("depop"), None);
        assert_eq!(TaskAction::parse("Delist"), None);
        assert_eq!(TaskAction::parse("mark_sold"), Some(TaskAction::MarkSold));
        assert_eq!(TaskAction::parse("relist"), None);
        assert_eq!(Condition::parse("like_new"), Some(Condition::LikeNew));
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
    }
}
