//! Asynchronous retry of usage recording.
//!
//! Once a response has been returned, a usage-recording failure must never
//! fail the request. Failed records land here and a background worker
//! retries them with exponential backoff until they commit or the attempt
//! budget runs out. Records retry in arrival order, which keeps per-budget
//! recording linearized.

use crate::model::UsageRecord;
use crate::tracker::BudgetTracker;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const MAX_ATTEMPTS: u32 = 8;
const BASE_DELAY: Duration = Duration::from_millis(250);
const MAX_DELAY: Duration = Duration::from_secs(30);
const JITTER: f64 = 0.25;

/// Handle for enqueueing usage records that failed to commit inline.
#[derive(Clone)]
pub struct UsageOutbox {
    tx: mpsc::UnboundedSender<UsageRecord>,
}

impl UsageOutbox {
    /// Spawn the outbox worker. Dropping every handle closes the queue; the
    /// worker drains what remains, so joining the handle on shutdown flushes
    /// pending billing.
    #[must_use]
    pub fn spawn(tracker: Arc<BudgetTracker>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<UsageRecord>();

        let worker = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let mut attempt = 0u32;
                loop {
                    attempt += 1;
                    match tracker.record_usage(record.clone()).await {
                        Ok(_) => {
                            info!(
                                request_id = %record.request_id,
                                budget_id = %record.budget_id,
                                attempt,
                                "Outbox usage record committed"
                            );
                            break;
                        }
                        Err(e) if attempt >= MAX_ATTEMPTS => {
                            error!(
                                request_id = %record.request_id,
                                budget_id = %record.budget_id,
                                error = %e,
                                attempts = attempt,
                                "Dropping usage record after exhausting retries"
                            );
                            break;
                        }
                        Err(e) => {
                            let delay = backoff(attempt);
                            warn!(
                                request_id = %record.request_id,
                                error = %e,
                                attempt,
                                delay_ms = delay.as_millis(),
                                "Usage recording failed, will retry"
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        });

        (Self { tx }, worker)
    }

    /// Enqueue a record for asynchronous recording.
    pub fn enqueue(&self, record: UsageRecord) {
        if self.tx.send(record).is_err() {
            error!("Usage outbox is closed; record lost");
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    let exp = BASE_DELAY.saturating_mul(2u32.saturating_pow(attempt.min(10)));
    let capped = exp.min(MAX_DELAY).as_millis() as f64;

    // Jitter spreads retries from concurrent workers apart
    let jitter_range = capped * JITTER;
    let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);

    Duration::from_millis((capped + jitter).max(0.0) as u64)
}
