//! Processing run coordinator
//!
//! Drives one run to completion: claim pending tips, ensure the worker is
//! ready, fan batches out with bounded concurrency, persist every per-item
//! outcome, then promote each location touched by the run.
//!
//! Whatever happens (worker down, batch exhaustion, operator shutdown), no
//! tip claimed by a run is left in `processing` when the run returns.

use crate::promotion::{self, PromotionConfig};
use crate::wol::{WakeError, WakeProtocol};
use crate::worker_client::{BatchError, WorkerClient};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tipkit_common::api::{BatchItem, BatchItemResult};
use tipkit_common::config::Settings;
use tipkit_common::db::retry::retry_transient;
use tipkit_common::db::{Tip, TipStore};
use tokio_util::sync::CancellationToken;

/// Per-item failure reason when every attempt for the batch failed.
const REASON_BATCH_EXHAUSTED: &str = "batch_exhausted";
/// Per-item failure reason when the worker rejected the batch outright.
const REASON_BATCH_REJECTED: &str = "batch_rejected";

/// Run-level options, resolved from [`Settings`] and CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub batch_size: usize,
    pub fanout: usize,
    pub per_run_limit: i64,
    /// How long in-flight batches may finish after a shutdown signal
    pub grace_period: Duration,
    pub run_promotion: bool,
    pub promotion: PromotionConfig,
}

impl RunConfig {
    pub fn from_settings(settings: &Settings, run_promotion: bool) -> Self {
        Self {
            batch_size: settings.batch_size,
            fanout: settings.fanout,
            per_run_limit: settings.per_run_limit,
            grace_period: Duration::from_secs(30),
            run_promotion,
            promotion: PromotionConfig {
                similarity_threshold: settings.similarity_threshold,
                min_mentions: settings.min_mentions,
            },
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub claimed: usize,
    pub processed: usize,
    pub failed: usize,
    /// Claimed tips returned to `pending` (cancellation or persist failure)
    pub released: usize,
    pub promotions: usize,
    pub cancelled: bool,
}

/// Run-fatal errors. Everything here compensates claimed tips first.
#[derive(Debug, Error)]
pub enum RunError {
    /// The worker never became ready; the run is aborted.
    #[error("Pipeline aborted: {0}")]
    WorkerUnavailable(#[from] WakeError),

    #[error(transparent)]
    Store(#[from] tipkit_common::Error),
}

/// Outcome of one batch after every per-item write resolved.
struct BatchOutcome {
    processed: usize,
    failed: usize,
    /// First persistence error, if any; fails the run after the drain
    store_error: Option<tipkit_common::Error>,
}

/// One processing run's orchestrator.
pub struct Coordinator<S: TipStore + 'static> {
    store: Arc<S>,
    client: WorkerClient,
    wake: WakeProtocol,
    config: RunConfig,
}

impl<S: TipStore + 'static> Coordinator<S> {
    pub fn new(store: Arc<S>, client: WorkerClient, wake: WakeProtocol, config: RunConfig) -> Self {
        Self {
            store,
            client,
            wake,
            config,
        }
    }

    /// Execute one run to completion.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunStats, RunError> {
        let mut stats = RunStats::default();

        let claimed = retry_transient("claim_pending", || {
            self.store.claim_pending(self.config.per_run_limit)
        })
        .await?;

        if claimed.is_empty() {
            tracing::info!("No pending tips to process");
            return Ok(stats);
        }
        stats.claimed = claimed.len();
        let claimed_ids: Vec<i64> = claimed.iter().map(|tip| tip.id).collect();
        tracing::info!(claimed = claimed.len(), "Claimed pending tips");

        if let Err(err) = self.wake.ensure_ready(&self.client).await {
            tracing::error!(error = %err, "Worker unavailable, aborting run");
            self.compensate(&claimed_ids, &mut stats).await?;
            return Err(err.into());
        }

        let store_error = self.dispatch_batches(&claimed, &cancel, &mut stats).await;

        // Anything still `processing` (cancelled or never dispatched) goes
        // back to pending
        self.compensate(&claimed_ids, &mut stats).await?;

        if let Some(err) = store_error {
            return Err(err.into());
        }

        if cancel.is_cancelled() {
            stats.cancelled = true;
            tracing::warn!(?stats, "Run cancelled by operator, exiting after compensation");
            return Ok(stats);
        }

        if self.config.run_promotion {
            let locations: BTreeSet<i64> = claimed.iter().map(|tip| tip.location_id).collect();
            for location_id in locations {
                if let Some(count) =
                    promotion::promote_location(&*self.store, location_id, &self.config.promotion)
                        .await?
                {
                    stats.promotions += count;
                }
            }
        }

        tracing::info!(?stats, "Run complete");
        Ok(stats)
    }

    /// Fan batches out to the worker, at most `fanout` in flight. On
    /// cancellation, stops dispatching and gives in-flight batches a grace
    /// period to finish. Returns the first persistence error observed.
    async fn dispatch_batches(
        &self,
        claimed: &[Tip],
        cancel: &CancellationToken,
        stats: &mut RunStats,
    ) -> Option<tipkit_common::Error> {
        let mut queue: VecDeque<Vec<Tip>> = claimed
            .chunks(self.config.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let total_batches = queue.len();
        let mut inflight = FuturesUnordered::new();
        let mut store_error: Option<tipkit_common::Error> = None;

        tracing::info!(
            batches = total_batches,
            batch_size = self.config.batch_size,
            fanout = self.config.fanout,
            "Dispatching batches"
        );

        loop {
            while !cancel.is_cancelled() && inflight.len() < self.config.fanout {
                match queue.pop_front() {
                    Some(batch) => inflight.push(self.run_batch(batch)),
                    None => break,
                }
            }

            if inflight.is_empty() {
                break;
            }

            if cancel.is_cancelled() {
                tracing::warn!(
                    inflight = inflight.len(),
                    abandoned = queue.len(),
                    grace = ?self.config.grace_period,
                    "Shutdown signal received, draining in-flight batches"
                );
                let drain = async {
                    while let Some(outcome) = inflight.next().await {
                        merge_outcome(stats, &mut store_error, outcome);
                    }
                };
                if tokio::time::timeout(self.config.grace_period, drain)
                    .await
                    .is_err()
                {
                    tracing::warn!("Grace period expired, abandoning remaining batches");
                }
                break;
            }

            tokio::select! {
                Some(outcome) = inflight.next() => {
                    merge_outcome(stats, &mut store_error, outcome);
                }
                _ = cancel.cancelled() => {}
            }
        }

        store_error
    }

    /// Process one batch end to end: worker call (with retries inside the
    /// client), then one persistence write per item.
    async fn run_batch(&self, batch: Vec<Tip>) -> BatchOutcome {
        let items: Vec<BatchItem> = batch
            .iter()
            .map(|tip| BatchItem {
                id: tip.id,
                text: tip.raw_text.clone(),
                source_language: tip.detected_language.clone(),
            })
            .collect();

        let mut outcome = BatchOutcome {
            processed: 0,
            failed: 0,
            store_error: None,
        };

        match self.client.process_batch(&items).await {
            Ok(response) => {
                for result in response.results {
                    let write = match &result {
                        BatchItemResult::Ok(item) => {
                            retry_transient("record_result", || {
                                self.store.record_result(
                                    item.id,
                                    &item.detected_language,
                                    &item.translated_text,
                                    &item.vector,
                                )
                            })
                            .await
                        }
                        BatchItemResult::Err(item_err) => {
                            tracing::warn!(
                                tip_id = item_err.id,
                                error = %item_err.error,
                                "Worker reported per-item failure"
                            );
                            retry_transient("record_failure", || {
                                self.store.record_failure(item_err.id, &item_err.error)
                            })
                            .await
                        }
                    };

                    match write {
                        Ok(()) => match result {
                            BatchItemResult::Ok(_) => outcome.processed += 1,
                            BatchItemResult::Err(_) => outcome.failed += 1,
                        },
                        Err(err) => {
                            tracing::error!(tip_id = result.id(), error = %err, "Persist failed");
                            if outcome.store_error.is_none() {
                                outcome.store_error = Some(err);
                            }
                        }
                    }
                }
            }
            Err(batch_err) => {
                let reason = match &batch_err {
                    BatchError::Exhausted { .. } => REASON_BATCH_EXHAUSTED,
                    BatchError::Rejected(_) => REASON_BATCH_REJECTED,
                };
                tracing::error!(
                    error = %batch_err,
                    tips = batch.len(),
                    reason,
                    "Batch failed, recording every tip as failed"
                );
                for tip in &batch {
                    match retry_transient("record_failure", || {
                        self.store.record_failure(tip.id, reason)
                    })
                    .await
                    {
                        Ok(()) => outcome.failed += 1,
                        Err(err) => {
                            if outcome.store_error.is_none() {
                                outcome.store_error = Some(err);
                            }
                        }
                    }
                }
            }
        }

        outcome
    }

    /// Return still-`processing` claimed tips to `pending`, counting how
    /// many actually moved.
    async fn compensate(
        &self,
        claimed_ids: &[i64],
        stats: &mut RunStats,
    ) -> Result<(), tipkit_common::Error> {
        retry_transient("release_claimed", || {
            self.store.release_claimed(claimed_ids)
        })
        .await?;
        stats.released = stats
            .claimed
            .saturating_sub(stats.processed + stats.failed);
        Ok(())
    }
}

fn merge_outcome(
    stats: &mut RunStats,
    store_error: &mut Option<tipkit_common::Error>,
    outcome: BatchOutcome,
) {
    stats.processed += outcome.processed;
    stats.failed += outcome.failed;
    if store_error.is_none() {
        *store_error = outcome.store_error;
    }
}
