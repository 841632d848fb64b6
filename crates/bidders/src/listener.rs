//! One-shot result delivery from a bidder back to the orchestrator.
//!
//! A [`BidListener`] can be cloned and called from any thread, but only the
//! first resolution of a request is delivered. The resolution state is a
//! single atomic compare-and-set; everything that loses the race is
//! reported as a protocol violation and dropped.

use hb_core::openrtb::BidResponse;
use hb_core::{Outcome, RequestError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

const PENDING: u8 = 0;
const RESOLVED: u8 = 1;
const TIMED_OUT: u8 = 2;

/// Resolution state of a request, as seen by whoever lost the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Pending,
    Resolved,
    TimedOut,
}

impl ResolutionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            PENDING => ResolutionState::Pending,
            RESOLVED => ResolutionState::Resolved,
            _ => ResolutionState::TimedOut,
        }
    }
}

pub(crate) struct Resolution {
    bidder: String,
    request_id: String,
    state: AtomicU8,
    violations: AtomicU32,
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Resolution {
    fn transition(&self, to: u8) -> Result<(), ResolutionState> {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ResolutionState::from_raw)
    }

    /// Deliver `outcome` if the request is still pending.
    pub(crate) fn settle(&self, outcome: Outcome) -> Result<(), ResolutionState> {
        self.transition(RESOLVED)?;
        if let Some(tx) = self.sender.lock().take() {
            // The receiver is gone only if the orchestrator itself was dropped.
            let _ = tx.send(outcome);
        }
        Ok(())
    }

    /// Mark the request timed out. Returns false if a callback got there first.
    pub(crate) fn time_out(&self) -> bool {
        if self.transition(TIMED_OUT).is_err() {
            return false;
        }
        self.sender.lock().take();
        true
    }

    fn record_violation(&self, reason: &'static str, state: Option<ResolutionState>) {
        self.violations.fetch_add(1, Ordering::Relaxed);
        warn!(
            bidder = %self.bidder,
            request_id = %self.request_id,
            reason,
            state = ?state,
            "Bidder broke the listener contract"
        );
        metrics::counter!(
            "bidding.protocol_violations",
            "bidder" => self.bidder.clone(),
            "reason" => reason
        )
        .increment(1);
    }
}

/// Completion handle passed to [`BidRequester::request_bids`](crate::BidRequester::request_bids).
#[derive(Clone)]
pub struct BidListener {
    inner: Arc<Resolution>,
}

impl BidListener {
    pub(crate) fn channel(bidder: &str, request_id: &str) -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let listener = Self {
            inner: Arc::new(Resolution {
                bidder: bidder.to_string(),
                request_id: request_id.to_string(),
                state: AtomicU8::new(PENDING),
                violations: AtomicU32::new(0),
                sender: Mutex::new(Some(tx)),
            }),
        };
        (listener, rx)
    }

    /// Report the terminal result of the request.
    ///
    /// Exactly one of `response` and `error` should be set. Both absent is
    /// accepted as a no-fill. Both present, or any call after the first,
    /// is a protocol violation.
    pub fn on_complete(&self, response: Option<BidResponse>, error: Option<RequestError>) {
        let both_payloads = response.is_some() && error.is_some();
        let outcome = Outcome::from_callback(response, error);
        let label = outcome.label();
        match self.inner.settle(outcome) {
            Ok(()) => {
                if both_payloads {
                    self.inner.record_violation("both_payloads", None);
                }
                debug!(
                    bidder = %self.inner.bidder,
                    request_id = %self.inner.request_id,
                    outcome = label,
                    "Bid request resolved"
                )
            }
            Err(ResolutionState::TimedOut) => {
                self.inner
                    .record_violation("late_callback", Some(ResolutionState::TimedOut))
            }
            Err(state) => self.inner.record_violation("duplicate_callback", Some(state)),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    pub fn state(&self) -> ResolutionState {
        ResolutionState::from_raw(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_resolved(&self) -> bool {
        self.state() != ResolutionState::Pending
    }

    /// Number of contract violations observed on this request so far.
    pub fn protocol_violations(&self) -> u32 {
        self.inner.violations.load(Ordering::Relaxed)
    }

    pub(crate) fn resolution(&self) -> &Resolution {
        &self.inner
    }
}

impl std::fmt::Debug for BidListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BidListener")
            .field("bidder", &self.inner.bidder)
            .field("request_id", &self.inner.request_id)
            .field("state", &self.state())
            .finish()
    }
}
