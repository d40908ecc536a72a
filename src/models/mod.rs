use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A journal post. `status` and `media_kind` are stored as plain text
/// columns; the enum helpers below keep the string values in one place.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub media_key: Option<String>,
    pub media_kind: Option<String>,
    pub tags: Vec<String>,
    pub status: String,
    pub views: i64,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// A newsletter subscriber, keyed by normalized email. Unsubscribing only
/// flips `is_active`; rows are never deleted so audit history survives.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscriber {
    pub email: String,
    pub subscribed_at: DateTime<Utc>,
    pub is_active: bool,
}

/// One notification run for a single published post.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationBatch {
    pub id: Uuid,
    pub post_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Running,
    /// Every recipient was attempted, including ones that failed.
    Complete,
    /// Stopped early by shutdown; recorded outcomes are preserved.
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Running => "running",
            BatchStatus::Complete => "complete",
            BatchStatus::Cancelled => "cancelled",
        }
    }
}

/// Per-recipient delivery record within a batch. Rows are inserted as
/// `skipped` when the snapshot is taken and updated as sends are attempted,
/// so a cancelled batch leaves the untouched tail recorded as skipped.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BatchRecipient {
    pub batch_id: Uuid,
    pub email: String,
    pub position: i32,
    pub outcome: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed,
    Skipped,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Sent => "sent",
            DeliveryOutcome::Failed => "failed",
            DeliveryOutcome::Skipped => "skipped",
        }
    }
}

/// Batch plus outcome counts, surfaced to the admin after a dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch: NotificationBatch,
    pub sent: i64,
    pub failed: i64,
    pub skipped: i64,
}

/// Homepage statistics derived from published posts.
#[derive(Debug, Clone, Serialize)]
pub struct SiteStats {
    pub published_count: i64,
    pub total_views: i64,
}
