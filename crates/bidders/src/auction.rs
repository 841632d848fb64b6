//! Header-bidding auction across registered demand sources.
//!
//! Every requester is queried concurrently through the orchestrator, each
//! with its own deadline and resolution guard. A render-immediately win
//! short-circuits comparison; otherwise the highest price wins.

use crate::orchestrator::{BidOrchestrator, BidResolution};
use crate::requester::BidRequester;
use chrono::Utc;
use hb_core::openrtb::BidResponse;
use hb_core::{Outcome, RequestError, SlotConfiguration};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Pick between the primary auction's response and the direct-demand one.
/// A missing side loses; direct demand wins a tie.
pub fn decide_winner<'a>(
    primary: Option<&'a BidResponse>,
    direct: Option<&'a BidResponse>,
) -> Option<&'a BidResponse> {
    match (primary, direct) {
        (None, direct) => direct,
        (primary, None) => primary,
        (Some(primary), Some(direct)) => {
            if direct.winning_price() >= primary.winning_price() {
                Some(direct)
            } else {
                Some(primary)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AuctionDecision {
    /// Paint `resolutions[index]` without further mediation.
    RenderImmediately { index: usize },
    /// `resolutions[index]` is the best price; hand off for comparison.
    Compare { index: usize },
    NoBid,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuctionResult {
    pub slot: String,
    pub decision: AuctionDecision,
    /// One entry per queried requester, in registration order.
    pub resolutions: Vec<BidResolution>,
}

impl AuctionResult {
    pub fn winner(&self) -> Option<&BidResolution> {
        match self.decision {
            AuctionDecision::RenderImmediately { index } | AuctionDecision::Compare { index } => {
                self.resolutions.get(index)
            }
            AuctionDecision::NoBid => None,
        }
    }
}

pub struct HeaderBiddingAuction {
    orchestrator: BidOrchestrator,
    requesters: Vec<Arc<dyn BidRequester>>,
}

impl HeaderBiddingAuction {
    pub fn new(orchestrator: BidOrchestrator) -> Self {
        Self {
            orchestrator,
            requesters: Vec::new(),
        }
    }

    pub fn register(&mut self, requester: Arc<dyn BidRequester>) {
        info!(bidder = %requester.name(), "Bidder registered");
        self.requesters.push(requester);
    }

    pub fn bidder_count(&self) -> usize {
        self.requesters.len()
    }

    /// Query every registered bidder for `slot` and decide what to render.
    pub async fn run(&self, slot: SlotConfiguration, deadline: Option<Duration>) -> AuctionResult {
        let slot = Arc::new(slot);
        let deadline = deadline.unwrap_or_else(|| self.orchestrator.config().default_timeout());
        let limit = self.orchestrator.config().max_concurrent_bidders;

        if self.requesters.len() > limit {
            warn!(
                slot = %slot.config_id,
                registered = self.requesters.len(),
                limit,
                "More bidders than allowed, skipping the rest"
            );
        }

        let mut tasks = JoinSet::new();
        for (index, requester) in self.requesters.iter().take(limit).enumerate() {
            let requester = Arc::clone(requester);
            let orchestrator = self.orchestrator.clone();
            let slot = Arc::clone(&slot);
            tasks.spawn(async move {
                let resolution = orchestrator.request(requester.as_ref(), slot, deadline).await;
                (index, resolution)
            });
        }

        let mut slots: Vec<Option<BidResolution>> = Vec::new();
        slots.resize_with(self.requesters.len().min(limit), || None);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, resolution)) => slots[index] = Some(resolution),
                Err(e) => error!(slot = %slot.config_id, error = %e, "Bid task aborted"),
            }
        }
        let resolutions = fill_aborted(slots, &self.requesters);

        let decision = decide(&resolutions);
        info!(
            slot = %slot.config_id,
            bidders = resolutions.len(),
            decision = ?decision,
            "Auction decided"
        );
        metrics::counter!("bidding.auctions", "decision" => decision_label(&decision)).increment(1);

        AuctionResult {
            slot: slot.config_id.clone(),
            decision,
            resolutions,
        }
    }
}

/// Every queried requester keeps its slot: a task that died before
/// reporting becomes an internal failure for that bidder.
fn fill_aborted(
    slots: Vec<Option<BidResolution>>,
    requesters: &[Arc<dyn BidRequester>],
) -> Vec<BidResolution> {
    slots
        .into_iter()
        .zip(requesters)
        .map(|(slot, requester)| {
            slot.unwrap_or_else(|| {
                let bidder = requester.name().to_string();
                metrics::counter!(
                    "bidding.outcomes",
                    "bidder" => bidder.clone(),
                    "outcome" => "failed"
                )
                .increment(1);
                BidResolution {
                    bidder,
                    request_id: Uuid::new_v4().to_string(),
                    outcome: Outcome::Failed {
                        error: RequestError::Internal("bid task aborted".to_string()),
                    },
                    render_immediately: false,
                    elapsed_ms: 0,
                    resolved_at: Utc::now(),
                }
            })
        })
        .collect()
}

fn decide(resolutions: &[BidResolution]) -> AuctionDecision {
    if let Some(index) = resolutions
        .iter()
        .position(|r| r.outcome.is_fulfilled() && r.render_immediately)
    {
        return AuctionDecision::RenderImmediately { index };
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, resolution) in resolutions.iter().enumerate() {
        if !resolution.outcome.is_fulfilled() {
            continue;
        }
        let price = resolution.price();
        match best {
            Some((_, best_price)) if price <= best_price => {}
            _ => best = Some((index, price)),
        }
    }

    match best {
        Some((index, _)) => AuctionDecision::Compare { index },
        None => AuctionDecision::NoBid,
    }
}

fn decision_label(decision: &AuctionDecision) -> &'static str {
    match decision {
        AuctionDecision::RenderImmediately { .. } => "render_immediately",
        AuctionDecision::Compare { .. } => "compare",
        AuctionDecision::NoBid => "no_bid",
    }
}
