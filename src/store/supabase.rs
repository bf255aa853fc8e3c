use crate::config::RunnerConfig;
use crate::http::build_client;
use crate::models::{AutomationTask, Platform, PlatformListingStatus, TaskStatus};
use crate::store::{StoreError, TaskStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_with::skip_serializing_none;
use tracing::debug;
use urlencoding::encode;
use uuid::Uuid;

const TASKS: &str = "automation_tasks";
const PLATFORM_LISTINGS: &str = "platform_listings";

/// PostgREST client for the Supabase project holding the queue.
#[derive(Debug, Clone)]
pub struct SupabaseTaskStore {
    base_url: String,
    service_key: String,
    user_id: Option<Uuid>,
    http: Client,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct TaskPatch<'a> {
    status: TaskStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<&'a str>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct StatusPatch {
    status: PlatformListingStatus,
    sold_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct ListedPatch<'a> {
    status: PlatformListingStatus,
    platform_url: &'a str,
    listed_at: DateTime<Utc>,
}

impl SupabaseTaskStore {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_key.clone(),
            user_id: config.user_id,
            http: build_client(config.http),
        }
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        format!("{}/rest/v1/{table}?{query}", self.base_url)
    }

    fn pending_query(&self, limit: Option<usize>) -> String {
        let mut query = String::from("select=*,listings(*)&status=eq.pending");
        if let Some(user_id) = self.user_id {
            query.push_str(&format!("&user_id=eq.{user_id}"));
        }
        // `id` settles rows created in the same instant.
        query.push_str("&order=created_at.asc,id.asc");
        if let Some(limit) = limit {
            query.push_str(&format!("&limit={limit}"));
        }
        query
    }

    fn platform_listing_url(&self, listing_id: Uuid, platform: Platform) -> String {
        self.table_url(
            PLATFORM_LISTINGS,
            &format!(
                "listing_id=eq.{listing_id}&platform=eq.{}",
                encode(platform.as_str())
            ),
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        Ok(response)
    }

    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>, StoreError> {
        self.send(request)
            .await?
            .json::<Vec<T>>()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))
    }

    async fn patch_task(&self, id: Uuid, patch: &TaskPatch<'_>) -> Result<(), StoreError> {
        let url = self.table_url(TASKS, &format!("id=eq.{id}"));
        debug!(target = "reseller.store", task_id = %id, status = patch.status.as_str(), "task_patch");
        self.send(self.http.patch(url).json(patch)).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for SupabaseTaskStore {
    async fn next_pending(&self) -> Result<Option<AutomationTask>, StoreError> {
        let url = self.table_url(TASKS, &self.pending_query(Some(1)));
        let mut tasks: Vec<AutomationTask> = self.rows(self.http.get(url)).await?;
        Ok(if tasks.is_empty() {
            None
        } else {
            Some(tasks.remove(0))
        })
    }

    async fn list_pending(&self) -> Result<Vec<AutomationTask>, StoreError> {
        let url = self.table_url(TASKS, &self.pending_query(None));
        self.rows(self.http.get(url)).await
    }

    async fn claim(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let url = self.table_url(TASKS, &format!("id=eq.{id}&status=eq.pending"));
        let patch = TaskPatch {
            status: TaskStatus::InProgress,
            started_at: Some(started_at),
            completed_at: None,
            error_message: None,
        };
        let claimed: Vec<serde_json::Value> = self
            .rows(
                self.http
                    .patch(url)
                    .header("Prefer", "return=representation")
                    .json(&patch),
            )
            .await?;
        Ok(!claimed.is_empty())
    }

    async fn complete(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.patch_task(
            id,
            &TaskPatch {
                status: TaskStatus::Completed,
                started_at: None,
                completed_at: Some(completed_at),
                error_message: None,
            },
        )
        .await
    }

    async fn fail(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
        message: &str,
    ) -> Result<(), StoreError> {
        self.patch_task(
            id,
            &TaskPatch {
                status: TaskStatus::Failed,
                started_at: None,
                completed_at: Some(completed_at),
                error_message: Some(message),
            },
        )
        .await
    }

    async fn mark_listed(
        &self,
        listing_id: Uuid,
        platform: Platform,
        platform_url: &str,
        listed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let url = self.platform_listing_url(listing_id, platform);
        let patch = ListedPatch {
            status: PlatformListingStatus::Listed,
            platform_url,
            listed_at,
        };
        self.send(self.http.patch(url).json(&patch)).await?;
        Ok(())
    }

    async fn set_listing_status(
        &self,
        listing_id: Uuid,
        platform: Platform,
        status: PlatformListingStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let url = self.platform_listing_url(listing_id, platform);
        let patch = StatusPatch {
            status,
            sold_at: (status == PlatformListingStatus::Sold).then_some(at),
        };
        self.send(self.http.patch(url).json(&patch)).await?;
        Ok(())
    }

    async fn cancel_pending(&self, id: Uuid) -> Result<bool, StoreError> {
        let url = self.table_url(TASKS, &format!("id=eq.{id}&status=eq.pending"));
        let removed: Vec<serde_json::Value> = self
            .rows(
                self.http
                    .delete(url)
                    .header("Prefer", "return=representation"),
            )
            .await?;
        Ok(!removed.is_empty())
    }
}
