//! Read/update contract over the remote `automation_tasks` queue.

pub mod supabase;

use crate::models::{AutomationTask, Platform, PlatformListingStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use supabase::SupabaseTaskStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("store returned HTTP {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    Deserialize(String),
}

/// The runner never inserts; enqueuing belongs to the dashboard.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Oldest pending task by `created_at`, ties broken by `id`.
    async fn next_pending(&self) -> Result<Option<AutomationTask>, StoreError>;

    async fn list_pending(&self) -> Result<Vec<AutomationTask>, StoreError>;

    /// Moves a task from `pending` to `in_progress`. `Ok(false)` means the
    /// row was no longer pending (claimed by another runner or cancelled).
    async fn claim(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn complete(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn fail(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
        message: &str,
    ) -> Result<(), StoreError>;

    async fn mark_listed(
        &self,
        listing_id: Uuid,
        platform: Platform,
        platform_url: &str,
        listed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Follows a confirmed delist or sale through to the platform listing row.
    async fn set_listing_status(
        &self,
        listing_id: Uuid,
        platform: Platform,
        status: PlatformListingStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Deletes a task only while it is still pending.
    async fn cancel_pending(&self, id: Uuid) -> Result<bool, StoreError>;
}
