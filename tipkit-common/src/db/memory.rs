//! In-memory gateway
//!
//! A [`TipStore`] over plain collections, for tests and offline tooling.
//! Mirrors the PostgreSQL implementation's observable behavior: claim
//! ordering, idempotent result recording, atomic promotion replacement.

use crate::db::models::{
    Embedding, Location, NewPromotion, ProcessedTip, Promotion, Tip, TipStatus,
};
use crate::db::store::TipStore;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    next_location_id: i64,
    next_tip_id: i64,
    next_embedding_id: i64,
    next_promotion_id: i64,
    locations: Vec<Location>,
    tips: Vec<Tip>,
    embeddings: HashMap<i64, Embedding>,
    promotions: HashMap<i64, Vec<Promotion>>,
}

/// In-memory [`TipStore`].
#[derive(Default)]
pub struct MemoryTipStore {
    state: Mutex<State>,
}

impl MemoryTipStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalized(value: &str) -> String {
        value.trim().to_lowercase()
    }
}

#[async_trait]
impl TipStore for MemoryTipStore {
    async fn find_or_create_location(&self, name: &str, country: &str) -> Result<Location> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.locations.iter().find(|l| {
            Self::normalized(&l.name) == Self::normalized(name)
                && Self::normalized(&l.country) == Self::normalized(country)
        }) {
            return Ok(existing.clone());
        }

        state.next_location_id += 1;
        let location = Location {
            id: state.next_location_id,
            name: name.trim().to_string(),
            country: country.trim().to_string(),
            latitude: None,
            longitude: None,
            created_at: Utc::now(),
        };
        state.locations.push(location.clone());
        Ok(location)
    }

    async fn insert_tip(&self, location_id: i64, raw_text: &str) -> Result<Tip> {
        if raw_text.trim().is_empty() {
            return Err(Error::InvalidInput("tip text must not be empty".to_string()));
        }

        let mut state = self.state.lock().await;
        state.next_tip_id += 1;
        let tip = Tip {
            id: state.next_tip_id,
            raw_text: raw_text.to_string(),
            detected_language: None,
            translated_text: None,
            location_id,
            submitted_at: Utc::now(),
            processed_at: None,
            status: TipStatus::Pending,
            failure_reason: None,
        };
        state.tips.push(tip.clone());
        Ok(tip)
    }

    async fn claim_pending(&self, limit: i64) -> Result<Vec<Tip>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let mut state = self.state.lock().await;

        let mut pending: Vec<usize> = state
            .tips
            .iter()
            .enumerate()
            .filter(|(_, tip)| tip.status == TipStatus::Pending)
            .map(|(index, _)| index)
            .collect();
        pending.sort_by_key(|&index| {
            let tip = &state.tips[index];
            (tip.submitted_at, tip.id)
        });
        pending.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(pending.len());
        for index in pending {
            state.tips[index].status = TipStatus::Processing;
            claimed.push(state.tips[index].clone());
        }
        Ok(claimed)
    }

    async fn record_result(
        &self,
        tip_id: i64,
        detected_language: &str,
        translated_text: &str,
        vector: &[f32],
    ) -> Result<()> {
        let mut state = self.state.lock().await;

        // First write wins; embeddings are immutable
        if !state.embeddings.contains_key(&tip_id) {
            state.next_embedding_id += 1;
            let embedding = Embedding {
                id: state.next_embedding_id,
                tip_id,
                vector: vector.to_vec(),
                created_at: Utc::now(),
            };
            state.embeddings.insert(tip_id, embedding);
        }

        let tip = state
            .tips
            .iter_mut()
            .find(|tip| tip.id == tip_id)
            .ok_or_else(|| Error::NotFound(format!("tip {tip_id}")))?;
        tip.detected_language = Some(detected_language.to_string());
        tip.translated_text = Some(translated_text.to_string());
        tip.status = TipStatus::Processed;
        tip.processed_at = Some(Utc::now());
        tip.failure_reason = None;
        Ok(())
    }

    async fn record_failure(&self, tip_id: i64, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let tip = state
            .tips
            .iter_mut()
            .find(|tip| tip.id == tip_id)
            .ok_or_else(|| Error::NotFound(format!("tip {tip_id}")))?;
        tip.status = TipStatus::Failed;
        tip.processed_at = Some(Utc::now());
        tip.failure_reason = Some(reason.to_string());
        Ok(())
    }

    async fn release_claimed(&self, tip_ids: &[i64]) -> Result<()> {
        let mut state = self.state.lock().await;
        for tip in state.tips.iter_mut() {
            if tip_ids.contains(&tip.id) && tip.status == TipStatus::Processing {
                tip.status = TipStatus::Pending;
            }
        }
        Ok(())
    }

    async fn list_processed(&self, location_id: i64) -> Result<Vec<ProcessedTip>> {
        let state = self.state.lock().await;
        let mut processed: Vec<ProcessedTip> = state
            .tips
            .iter()
            .filter(|tip| tip.location_id == location_id && tip.status == TipStatus::Processed)
            .filter_map(|tip| {
                let translated_text = tip.translated_text.clone()?;
                let vector = state.embeddings.get(&tip.id)?.vector.clone();
                Some(ProcessedTip {
                    tip_id: tip.id,
                    translated_text,
                    vector,
                })
            })
            .collect();
        processed.sort_by_key(|tip| tip.tip_id);
        Ok(processed)
    }

    async fn replace_promotions(
        &self,
        location_id: i64,
        promotions: &[NewPromotion],
    ) -> Result<()> {
        let mut state = self.state.lock().await;

        let mut rows = Vec::with_capacity(promotions.len());
        for promotion in promotions {
            state.next_promotion_id += 1;
            rows.push(Promotion {
                id: state.next_promotion_id,
                location_id,
                tip_text: promotion.tip_text.clone(),
                mention_count: promotion.mention_count,
                similarity_score: promotion.similarity_score,
                promoted_at: Utc::now(),
            });
        }
        state.promotions.insert(location_id, rows);
        Ok(())
    }

    async fn promotions_for(&self, location_id: i64) -> Result<Vec<Promotion>> {
        let state = self.state.lock().await;
        let mut rows = state
            .promotions
            .get(&location_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by(|a, b| {
            b.mention_count
                .cmp(&a.mention_count)
                .then(
                    b.similarity_score
                        .partial_cmp(&a.similarity_score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.id.cmp(&b.id))
        });
        Ok(rows)
    }

    async fn tip(&self, tip_id: i64) -> Result<Tip> {
        let state = self.state.lock().await;
        state
            .tips
            .iter()
            .find(|tip| tip.id == tip_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("tip {tip_id}")))
    }

    async fn embedding_for(&self, tip_id: i64) -> Result<Option<Embedding>> {
        let state = self.state.lock().await;
        Ok(state.embeddings.get(&tip_id).cloned())
    }
}
