//! Promotion engine
//!
//! Clusters a location's processed tips by embedding similarity and emits a
//! ranked set of consensus tips. Clustering is greedy and representative-
//! first: the oldest unclustered tip absorbs every remaining tip whose
//! cosine similarity reaches the threshold. Identical inputs produce an
//! identical promotion list.

use tipkit_common::db::{NewPromotion, ProcessedTip, TipStore};
use tipkit_common::Result;

/// Clustering configuration, process-wide.
#[derive(Debug, Clone, Copy)]
pub struct PromotionConfig {
    /// Cosine similarity at or above which two tips share a cluster
    pub similarity_threshold: f32,
    /// Cluster size required to emit a promotion
    pub min_mentions: usize,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            min_mentions: 3,
        }
    }
}

/// L2-normalize in place. Zero vectors are left untouched.
fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product; cosine similarity once both sides are unit-normalized.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Greedy, order-stable clustering over a location's processed tips.
///
/// Inputs are re-normalized before use; cosine then reduces to a dot
/// product.
/// The emitted list is sorted by `mention_count` descending, then
/// `similarity_score` descending, then representative `tip_id` ascending.
pub fn cluster_tips(tips: &[ProcessedTip], config: &PromotionConfig) -> Vec<NewPromotion> {
    let mut remaining: Vec<(i64, &str, Vec<f32>)> = tips
        .iter()
        .map(|tip| {
            let mut vector = tip.vector.clone();
            normalize(&mut vector);
            (tip.tip_id, tip.translated_text.as_str(), vector)
        })
        .collect();
    // Oldest first, for deterministic tie-breaks and a stable representative
    remaining.sort_by_key(|(tip_id, _, _)| *tip_id);

    // (representative tip_id, promotion), kept for the final sort
    let mut clusters: Vec<(i64, NewPromotion)> = Vec::new();

    while !remaining.is_empty() {
        let (head_id, head_text, head_vector) = remaining.remove(0);

        let mut member_similarities: Vec<f32> = Vec::new();
        remaining.retain(|(_, _, vector)| {
            let similarity = dot(&head_vector, vector);
            if similarity >= config.similarity_threshold {
                member_similarities.push(similarity);
                false
            } else {
                true
            }
        });

        let mention_count = member_similarities.len() + 1;
        if mention_count < config.min_mentions {
            continue;
        }

        let similarity_score = if member_similarities.is_empty() {
            1.0
        } else {
            let sum: f32 = member_similarities.iter().sum();
            f64::from(sum / member_similarities.len() as f32)
        };

        clusters.push((
            head_id,
            NewPromotion {
                tip_text: head_text.to_string(),
                mention_count: mention_count as i64,
                similarity_score: similarity_score.clamp(0.0, 1.0),
            },
        ));
    }

    clusters.sort_by(|(a_id, a), (b_id, b)| {
        b.mention_count
            .cmp(&a.mention_count)
            .then(
                b.similarity_score
                    .partial_cmp(&a.similarity_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a_id.cmp(b_id))
    });

    clusters.into_iter().map(|(_, promotion)| promotion).collect()
}

/// Run promotion for one location and replace its stored set.
///
/// An empty processed set is a silent no-op that retains the existing
/// promotions; a non-empty set always replaces, even with an empty result.
pub async fn promote_location<S: TipStore + ?Sized>(
    store: &S,
    location_id: i64,
    config: &PromotionConfig,
) -> Result<Option<usize>> {
    let processed = store.list_processed(location_id).await?;
    if processed.is_empty() {
        tracing::debug!(location_id, "No processed tips, keeping existing promotions");
        return Ok(None);
    }

    let promotions = cluster_tips(&processed, config);
    store.replace_promotions(location_id, &promotions).await?;

    tracing::info!(
        location_id,
        processed = processed.len(),
        promoted = promotions.len(),
        "Promotion set replaced"
    );
    Ok(Some(promotions.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tipkit_common::EMBEDDING_DIM;

    /// Unit vector along the given axis.
    fn axis(index: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[index] = 1.0;
        v
    }

    /// Unit vector close to axis 0; `tilt` controls how far it leans toward
    /// axis 1. cosine(axis(0), tilted(t)) == sqrt(1 - t²).
    fn tilted(tilt: f32) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = (1.0 - tilt * tilt).sqrt();
        v[1] = tilt;
        v
    }

    fn tip(tip_id: i64, text: &str, vector: Vec<f32>) -> ProcessedTip {
        ProcessedTip {
            tip_id,
            translated_text: text.to_string(),
            vector,
        }
    }

    #[test]
    fn near_identical_tips_form_one_cluster() {
        let tips = vec![
            tip(1, "skip the queue, book online", axis(0)),
            tip(2, "book tickets online to skip the line", tilted(0.1)),
            tip(3, "buy online, the queue is huge", tilted(0.15)),
            tip(4, "online booking avoids the wait", tilted(0.2)),
            tip(5, "reserve on the website first", tilted(0.05)),
        ];

        let promotions = cluster_tips(&tips, &PromotionConfig::default());
        assert_eq!(promotions.len(), 1);
        assert_eq!(promotions[0].mention_count, 5);
        // Oldest tip is the representative
        assert_eq!(promotions[0].tip_text, "skip the queue, book online");
        assert!(promotions[0].similarity_score >= 0.85);
        assert!(promotions[0].similarity_score <= 1.0);
    }

    #[test]
    fn dissimilar_tips_do_not_promote_below_min_mentions() {
        let tips = vec![
            tip(1, "a", axis(0)),
            tip(2, "b", axis(1)),
            tip(3, "c", axis(2)),
        ];
        assert!(cluster_tips(&tips, &PromotionConfig::default()).is_empty());
    }

    #[test]
    fn single_tip_never_promotes() {
        let tips = vec![tip(1, "only one", axis(0))];
        assert!(cluster_tips(&tips, &PromotionConfig::default()).is_empty());
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(cluster_tips(&[], &PromotionConfig::default()).is_empty());
    }

    #[test]
    fn threshold_one_only_clusters_exact_duplicates() {
        let config = PromotionConfig {
            similarity_threshold: 1.0,
            min_mentions: 3,
        };
        let tips = vec![
            tip(1, "dup", axis(0)),
            tip(2, "dup", axis(0)),
            tip(3, "dup", axis(0)),
            tip(4, "near dup", tilted(0.001)),
        ];

        let promotions = cluster_tips(&tips, &config);
        assert_eq!(promotions.len(), 1);
        assert_eq!(promotions[0].mention_count, 3);
        assert_eq!(promotions[0].similarity_score, 1.0);
    }

    #[test]
    fn clustering_is_deterministic() {
        let tips = vec![
            tip(10, "first", tilted(0.02)),
            tip(11, "second", tilted(0.12)),
            tip(12, "third", axis(5)),
            tip(13, "fourth", tilted(0.07)),
            tip(14, "fifth", axis(5)),
            tip(15, "sixth", axis(5)),
        ];
        let config = PromotionConfig::default();

        let first = cluster_tips(&tips, &config);
        let second = cluster_tips(&tips, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn output_is_ranked_by_mentions_then_similarity() {
        // Cluster A: 3 members around axis 0; cluster B: 4 members on axis 3
        let tips = vec![
            tip(1, "cluster a rep", axis(0)),
            tip(2, "a2", tilted(0.1)),
            tip(3, "a3", tilted(0.12)),
            tip(4, "cluster b rep", axis(3)),
            tip(5, "b2", axis(3)),
            tip(6, "b3", axis(3)),
            tip(7, "b4", axis(3)),
        ];

        let promotions = cluster_tips(&tips, &PromotionConfig::default());
        assert_eq!(promotions.len(), 2);
        assert_eq!(promotions[0].tip_text, "cluster b rep");
        assert_eq!(promotions[0].mention_count, 4);
        assert_eq!(promotions[1].tip_text, "cluster a rep");
        assert_eq!(promotions[1].mention_count, 3);
    }

    #[test]
    fn unnormalized_input_is_renormalized() {
        let scaled: Vec<f32> = axis(0).iter().map(|x| x * 42.0).collect();
        let tips = vec![
            tip(1, "rep", scaled),
            tip(2, "m2", axis(0)),
            tip(3, "m3", tilted(0.05)),
        ];

        let promotions = cluster_tips(&tips, &PromotionConfig::default());
        assert_eq!(promotions.len(), 1);
        assert_eq!(promotions[0].mention_count, 3);
        assert!(promotions[0].similarity_score <= 1.0);
    }

    #[test]
    fn mean_similarity_excludes_the_representative() {
        // Two members at known cosines from the representative
        let tips = vec![
            tip(1, "rep", axis(0)),
            tip(2, "m2", tilted(0.1)),
            tip(3, "m3", tilted(0.2)),
        ];

        let promotions = cluster_tips(&tips, &PromotionConfig::default());
        assert_eq!(promotions.len(), 1);

        let expected = (((1.0f32 - 0.01).sqrt() + (1.0f32 - 0.04).sqrt()) / 2.0) as f64;
        assert!((promotions[0].similarity_score - expected).abs() < 1e-6);
    }
}
