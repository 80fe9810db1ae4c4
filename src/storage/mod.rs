use crate::types::{Campaign, CampaignStatus, Subscriber};
use anyhow::Result;
use chrono::{DateTime, Utc};

pub mod dynamo;
pub use dynamo::DynamoStorage;

// ============================================================================
// Storage trait
// ============================================================================

/// Campaign and subscriber store as consumed by the dispatcher. Each write is
/// a single-row read-modify-write; no transaction ever spans a store update
/// and a mail send, so the persisted `sent_emails` checkpoint is the
/// authoritative at-least-once boundary.
#[allow(async_fn_in_trait)]
pub trait Storage: Send + Sync {
    /// Campaigns with outstanding work: `scheduled_at <= now` and status
    /// `SCHEDULED` (fresh) or `SENDING` (interrupted, resumed via the
    /// cursor), ordered by scheduled time.
    async fn find_due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>>;

    /// Active subscribers in stable id order. The order must not change while
    /// a campaign is mid-send; the resume cursor indexes into it.
    async fn find_active_subscribers(&self) -> Result<Vec<Subscriber>>;

    async fn set_status(&self, campaign_id: &str, status: CampaignStatus) -> Result<()>;

    async fn set_total_recipients(&self, campaign_id: &str, total: u32) -> Result<()>;

    async fn set_sent_emails(&self, campaign_id: &str, sent: u32) -> Result<()>;
}

// ============================================================================
// Test utilities — InMemoryStorage for in-crate tests
// ============================================================================
