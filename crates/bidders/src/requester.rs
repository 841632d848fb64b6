//! The capability every demand source integration exposes.

use crate::listener::BidListener;
use crate::policy::{DeferToAuction, RenderTimingPolicy};
use hb_core::openrtb::BidResponse;
use hb_core::SlotConfiguration;
use std::sync::Arc;

/// An external bidder: in-process SDK, server round-trip or mediation adapter.
pub trait BidRequester: Send + Sync {
    /// Bidder code used in logs and metrics.
    fn name(&self) -> &str;

    /// Start a bid request for `slot` and return without waiting for it.
    ///
    /// Network or other heavy work belongs on a spawned task. The result is
    /// reported through `listener` exactly once; failures are reported as
    /// an error with no response, never by panicking.
    fn request_bids(&self, slot: Arc<SlotConfiguration>, listener: BidListener);

    /// Whether `response` should be rendered without comparing it against
    /// other demand. Defaults to deferring everything to the auction.
    fn should_render_immediately(&self, response: Option<&BidResponse>) -> bool {
        DeferToAuction.should_render_immediately(response)
    }
}
