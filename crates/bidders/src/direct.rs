//! Owned-and-operated demand bidder.
//!
//! Posts an OpenRTB request for the slot to the direct-demand endpoint and
//! reports the decorated winning bid. Only one request may be in flight per
//! bidder instance. Wins flagged as owned-and-operated bypass the auction.

use crate::listener::BidListener;
use crate::policy::{OwnedOperatedPolicy, RenderTimingPolicy};
use crate::requester::BidRequester;
use crate::transport::{BidTransport, TransportError, TransportResponse};
use hb_core::config::DirectDemandConfig;
use hb_core::openrtb::BidResponse;
use hb_core::{RequestError, SlotConfiguration};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error};

const HTTP_NO_CONTENT: u16 = 204;

pub struct DirectDemandRequester {
    config: DirectDemandConfig,
    transport: Arc<dyn BidTransport>,
    policy: OwnedOperatedPolicy,
    tmax: Duration,
    in_flight: Arc<AtomicBool>,
}

impl DirectDemandRequester {
    pub fn new(config: DirectDemandConfig, transport: Arc<dyn BidTransport>, tmax: Duration) -> Self {
        let policy = OwnedOperatedPolicy::new(config.bidder_code.clone());
        Self {
            config,
            transport,
            policy,
            tmax,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn fail(&self, guard: InFlightGuard, listener: &BidListener, err: RequestError) {
        error!(bidder = %self.config.bidder_code, error = %err, "Direct demand request failed");
        drop(guard);
        listener.on_complete(None, Some(err));
    }
}

/// Holds the single-flight slot; releasing it on drop also covers a
/// round trip whose task is cancelled.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BidRequester for DirectDemandRequester {
    fn name(&self) -> &str {
        &self.config.bidder_code
    }

    fn request_bids(&self, slot: Arc<SlotConfiguration>, listener: BidListener) {
        let Some(guard) = InFlightGuard::acquire(&self.in_flight) else {
            listener.on_complete(
                None,
                Some(RequestError::Internal(format!(
                    "{} request already in progress",
                    self.config.bidder_code
                ))),
            );
            return;
        };

        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(guard, &listener, RequestError::Internal(format!("no async runtime: {e}")));
                return;
            }
        };

        let request = slot.to_openrtb_request(listener.request_id(), self.tmax.as_millis() as u32);
        let body = match serde_json::to_string(&request) {
            Ok(body) => body,
            Err(e) => {
                self.fail(guard, &listener, RequestError::Internal(format!("failed to encode request: {e}")));
                return;
            }
        };

        debug!(
            bidder = %self.config.bidder_code,
            request_id = %listener.request_id(),
            url = %self.config.endpoint_url,
            "Sending direct demand bid request"
        );

        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        let tmax = self.tmax;
        runtime.spawn(async move {
            let result = tokio::time::timeout(tmax, transport.post(&config.endpoint_url, body))
                .await
                .unwrap_or(Err(TransportError::TimedOut));
            drop(guard);

            let (response, err) = interpret_response(result, &config);
            if let Some(err) = &err {
                error!(bidder = %config.bidder_code, error = %err, "Direct demand request failed");
            }
            listener.on_complete(response, err);
        });
    }

    fn should_render_immediately(&self, response: Option<&BidResponse>) -> bool {
        self.policy.should_render_immediately(response)
    }
}

/// Map a transport result onto the listener's `(response, error)` pair.
fn interpret_response(
    result: Result<TransportResponse, TransportError>,
    config: &DirectDemandConfig,
) -> (Option<BidResponse>, Option<RequestError>) {
    let reply = match result {
        Ok(reply) => reply,
        Err(e) => {
            return (
                None,
                Some(RequestError::TransportFailure(format!("request failed: {e}"))),
            )
        }
    };

    if reply.status == HTTP_NO_CONTENT {
        return (None, None);
    }
    if !reply.is_success() {
        return (
            None,
            Some(RequestError::TransportFailure(format!(
                "unexpected status {}",
                reply.status
            ))),
        );
    }

    let body = match reply.body.as_deref().map(str::trim) {
        Some(body) if !body.is_empty() => body,
        _ => return (None, None),
    };

    let mut response: BidResponse = match serde_json::from_str(body) {
        Ok(resp) => resp,
        Err(e) => return (None, Some(RequestError::MalformedResponse(e.to_string()))),
    };

    match response.winning_bid_mut() {
        Some(bid) => {
            bid.apply_targeting(&config.bidder_code);
            bid.apply_renderer_meta(&config.renderer_name, &config.renderer_version);
        }
        None => return (None, None),
    }

    (Some(response), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::BidOrchestrator;
    use crate::transport::CannedTransport;
    use async_trait::async_trait;
    use hb_core::config::BiddingConfig;
    use hb_core::{ErrorKind, Outcome};

    const OO_RESPONSE: &str = r#"{
        "id": "r1",
        "seatbid": [{
            "seat": "direct",
            "bid": [
                {"id": "b1", "impid": "1", "price": 0.8, "w": 300, "h": 250},
                {"id": "b2", "impid": "1", "price": 1.9, "w": 320, "h": 50,
                 "ext": {"direct": {"oo": 1}}}
            ]
        }]
    }"#;

    fn requester(transport: CannedTransport) -> DirectDemandRequester {
        DirectDemandRequester::new(
            DirectDemandConfig::default(),
            Arc::new(transport),
            Duration::from_millis(1500),
        )
    }

    fn slot() -> Arc<SlotConfiguration> {
        Arc::new(SlotConfiguration::banner("slot-1", 320, 50))
    }

    async fn run(req: &DirectDemandRequester) -> crate::orchestrator::BidResolution {
        BidOrchestrator::new(BiddingConfig::default())
            .request(req, slot(), Duration::from_millis(2000))
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_owned_operated_win_is_decorated_and_renders_immediately() {
        let req = requester(CannedTransport::ok(OO_RESPONSE, Duration::from_millis(120)));

        let res = run(&req).await;

        assert!(res.render_immediately);
        let bid = res.response().unwrap().winning_bid().unwrap();
        assert_eq!(bid.id, "b2");
        assert_eq!(bid.targeting("hb_bidder"), Some("direct"));
        assert_eq!(bid.targeting("hb_size_direct"), Some("320x50"));
        assert_eq!(bid.ext.as_ref().unwrap()["prebid"]["meta"]["rendererName"], "DirectRenderer");
        assert!(!req.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_content_is_no_fill() {
        let req = requester(CannedTransport::new(
            Ok(TransportResponse::no_content()),
            Duration::ZERO,
        ));
        assert_eq!(run(&req).await.outcome, Outcome::NoFill);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_body_is_no_fill() {
        let req = requester(CannedTransport::ok("   ", Duration::ZERO));
        assert_eq!(run(&req).await.outcome, Outcome::NoFill);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_without_bids_is_no_fill() {
        let req = requester(CannedTransport::ok(r#"{"id": "r1", "seatbid": []}"#, Duration::ZERO));
        assert_eq!(run(&req).await.outcome, Outcome::NoFill);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_body_is_malformed() {
        let req = requester(CannedTransport::ok("{not json", Duration::ZERO));
        let res = run(&req).await;
        assert_eq!(res.outcome.error().unwrap().kind(), ErrorKind::MalformedResponse);
        assert!(!res.render_immediately);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_transport_failure() {
        let req = requester(CannedTransport::new(
            Err(TransportError::Connection("refused".into())),
            Duration::ZERO,
        ));
        let err = run(&req).await.outcome.error().unwrap();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(err.to_string().contains("request failed: connection failed: refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_status_is_transport_failure() {
        let req = requester(CannedTransport::new(
            Ok(TransportResponse { status: 503, body: Some("busy".into()) }),
            Duration::ZERO,
        ));
        assert_eq!(
            run(&req).await.outcome.error().unwrap().kind(),
            ErrorKind::TransportFailure
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_while_in_flight_is_rejected() {
        let req = Arc::new(requester(CannedTransport::ok(OO_RESPONSE, Duration::from_millis(500))));
        let orchestrator = BidOrchestrator::new(BiddingConfig::default());

        let first = {
            let req = Arc::clone(&req);
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .request(req.as_ref(), slot(), Duration::from_millis(2000))
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(req.is_in_flight());

        let second = orchestrator
            .request(req.as_ref(), slot(), Duration::from_millis(2000))
            .await;
        assert_eq!(second.outcome.error().unwrap().kind(), ErrorKind::Internal);

        let first = first.await.unwrap();
        assert!(first.outcome.is_fulfilled());
        assert!(!req.is_in_flight());
    }

    /// Accepts the request and never answers.
    struct HangingTransport;

    #[async_trait]
    impl BidTransport for HangingTransport {
        async fn post(&self, _url: &str, _body: String) -> Result<TransportResponse, TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_transport_is_cut_off_at_tmax() {
        let req = DirectDemandRequester::new(
            DirectDemandConfig::default(),
            Arc::new(HangingTransport),
            Duration::from_millis(300),
        );
        let orchestrator = BidOrchestrator::new(BiddingConfig::default());

        let first = orchestrator
            .request(&req, slot(), Duration::from_millis(200))
            .await;
        assert_eq!(first.outcome, Outcome::TimedOut { deadline_ms: 200 });
        assert!(req.is_in_flight());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!req.is_in_flight());

        let second = orchestrator
            .request(&req, slot(), Duration::from_millis(2000))
            .await;
        let err = second.outcome.error().unwrap();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(err.to_string().contains("request timed out"));
        assert!(!req.is_in_flight());
    }
}
