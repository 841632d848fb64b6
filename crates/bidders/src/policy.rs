//! Render-timing classification: should a resolved bid be painted right
//! away, or go through comparison with the rest of the demand?
//!
//! Policies are pure functions of the response. They must not do I/O or
//! touch shared state.

use hb_core::openrtb::BidResponse;

pub trait RenderTimingPolicy: Send + Sync {
    fn should_render_immediately(&self, response: Option<&BidResponse>) -> bool;
}

/// Default policy: every response goes to the auction.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferToAuction;

impl RenderTimingPolicy for DeferToAuction {
    fn should_render_immediately(&self, _response: Option<&BidResponse>) -> bool {
        false
    }
}

/// Bypass the auction when the winning bid is flagged as owned-and-operated
/// demand under `ext.<namespace>.oo`.
#[derive(Debug, Clone)]
pub struct OwnedOperatedPolicy {
    namespace: String,
}

impl OwnedOperatedPolicy {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl RenderTimingPolicy for OwnedOperatedPolicy {
    fn should_render_immediately(&self, response: Option<&BidResponse>) -> bool {
        response
            .and_then(BidResponse::winning_bid)
            .map(|bid| bid.is_owned_operated(&self.namespace))
            .unwrap_or(false)
    }
}
