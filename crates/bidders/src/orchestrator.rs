//! Drives a single bid request to exactly one terminal outcome.
//!
//! Each request owns its listener, its resolution guard and its deadline.
//! The bidder's work is never cancelled; once the deadline passes the
//! request is marked timed out and anything the bidder reports afterwards
//! is ignored.

use crate::listener::BidListener;
use crate::requester::BidRequester;
use chrono::{DateTime, Utc};
use hb_core::config::BiddingConfig;
use hb_core::openrtb::BidResponse;
use hb_core::{Outcome, RequestError, SlotConfiguration};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What the caller sees for one request.
#[derive(Debug, Clone, Serialize)]
pub struct BidResolution {
    pub bidder: String,
    pub request_id: String,
    pub outcome: Outcome,
    /// Result of the bidder's render-timing policy. Only evaluated for a
    /// fulfilled request; `false` otherwise.
    pub render_immediately: bool,
    pub elapsed_ms: u64,
    pub resolved_at: DateTime<Utc>,
}

impl BidResolution {
    pub fn response(&self) -> Option<&BidResponse> {
        self.outcome.response()
    }

    pub fn price(&self) -> f64 {
        self.response().map(BidResponse::winning_price).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct BidOrchestrator {
    config: BiddingConfig,
}

impl BidOrchestrator {
    pub fn new(config: BiddingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BiddingConfig {
        &self.config
    }

    pub async fn request_with_default_deadline(
        &self,
        requester: &dyn BidRequester,
        slot: Arc<SlotConfiguration>,
    ) -> BidResolution {
        self.request(requester, slot, self.config.default_timeout())
            .await
    }

    /// Issue one request to `requester` and wait at most `deadline` for it.
    pub async fn request(
        &self,
        requester: &dyn BidRequester,
        slot: Arc<SlotConfiguration>,
        deadline: Duration,
    ) -> BidResolution {
        let start = Instant::now();
        let bidder = requester.name().to_string();
        let request_id = Uuid::new_v4().to_string();
        let deadline_ms = deadline.as_millis() as u64;

        metrics::counter!("bidding.requests", "bidder" => bidder.clone()).increment(1);
        debug!(
            bidder = %bidder,
            request_id = %request_id,
            slot = %slot.config_id,
            deadline_ms,
            "Issuing bid request"
        );

        let (listener, mut rx) = BidListener::channel(&bidder, &request_id);

        if let Err(e) = slot.validate() {
            warn!(bidder = %bidder, request_id = %request_id, error = %e, "Rejected slot before bidding");
            let _ = listener.resolution().settle(Outcome::Failed {
                error: RequestError::Internal(e.to_string()),
            });
        } else {
            let invoke = catch_unwind(AssertUnwindSafe(|| {
                requester.request_bids(slot.clone(), listener.clone())
            }));
            if invoke.is_err() {
                error!(bidder = %bidder, request_id = %request_id, "Bidder panicked in request_bids");
                let contained = listener.resolution().settle(Outcome::Failed {
                    error: RequestError::Internal("bidder panicked while issuing request".to_string()),
                });
                if contained.is_err() {
                    debug!(bidder = %bidder, request_id = %request_id, "Panic after resolution, keeping first outcome");
                }
            }
        }

        let outcome = match tokio::time::timeout(deadline, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Outcome::Failed {
                error: RequestError::Internal("resolution channel closed".to_string()),
            },
            Err(_) => {
                if listener.resolution().time_out() {
                    info!(bidder = %bidder, request_id = %request_id, deadline_ms, "Bid request timed out");
                    Outcome::TimedOut { deadline_ms }
                } else {
                    // A callback claimed the request right at the deadline.
                    rx.await.unwrap_or_else(|_| Outcome::Failed {
                        error: RequestError::Internal("resolution channel closed".to_string()),
                    })
                }
            }
        };

        let render_immediately = match &outcome {
            Outcome::Fulfilled { response } => {
                let policy = catch_unwind(AssertUnwindSafe(|| {
                    requester.should_render_immediately(Some(response))
                }));
                policy.unwrap_or_else(|_| {
                    warn!(bidder = %bidder, request_id = %request_id, "Render policy panicked, deferring to auction");
                    metrics::counter!(
                        "bidding.protocol_violations",
                        "bidder" => bidder.clone(),
                        "reason" => "policy_panic"
                    )
                    .increment(1);
                    false
                })
            }
            _ => false,
        };

        let elapsed = start.elapsed();
        metrics::histogram!("bidding.latency_ms", "bidder" => bidder.clone())
            .record(elapsed.as_secs_f64() * 1000.0);
        metrics::counter!(
            "bidding.outcomes",
            "bidder" => bidder.clone(),
            "outcome" => outcome.label()
        )
        .increment(1);

        BidResolution {
            bidder,
            request_id,
            outcome,
            render_immediately,
            elapsed_ms: elapsed.as_millis() as u64,
            resolved_at: Utc::now(),
        }
    }
}
