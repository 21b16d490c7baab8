//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a tip.
///
/// Created as `pending` by ingestion, transitioned by the coordinator,
/// terminal at `processed` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl TipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TipStatus::Pending => "pending",
            TipStatus::Processing => "processing",
            TipStatus::Processed => "processed",
            TipStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for TipStatus {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(TipStatus::Pending),
            "processing" => Ok(TipStatus::Processing),
            "processed" => Ok(TipStatus::Processed),
            "failed" => Ok(TipStatus::Failed),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown tip status {other:?}"
            ))),
        }
    }
}

/// A place tips are submitted against. `(name, country)` is unique after
/// case-insensitive trimming.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A traveler tip as stored, before or after processing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tip {
    pub id: i64,
    pub raw_text: String,
    pub detected_language: Option<String>,
    pub translated_text: Option<String>,
    pub location_id: i64,
    pub submitted_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    #[sqlx(try_from = "String")]
    pub status: TipStatus,
    pub failure_reason: Option<String>,
}

/// Stored embedding of a tip's translation. One per tip, immutable once
/// written.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Embedding {
    pub id: i64,
    pub tip_id: i64,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// Projection the promotion engine consumes: one row per processed tip of a
/// location, in stable `tip_id` order.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProcessedTip {
    pub tip_id: i64,
    pub translated_text: String,
    pub vector: Vec<f32>,
}

/// A consensus tip promoted for a location.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Promotion {
    pub id: i64,
    pub location_id: i64,
    pub tip_text: String,
    pub mention_count: i64,
    pub similarity_score: f64,
    pub promoted_at: DateTime<Utc>,
}

/// Promotion content handed to `replace_promotions`; identity and timestamp
/// are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPromotion {
    pub tip_text: String,
    pub mention_count: i64,
    pub similarity_score: f64,
}
