//! Bid acquisition boundary: the bidder contract, its exactly-once driver,
//! render-timing policies and the header-bidding auction built on them.

pub mod auction;
pub mod direct;
pub mod listener;
pub mod orchestrator;
pub mod policy;
pub mod requester;
pub mod transport;

pub use auction::{AuctionDecision, AuctionResult, HeaderBiddingAuction};
pub use direct::DirectDemandRequester;
pub use listener::{BidListener, ResolutionState};
pub use orchestrator::{BidOrchestrator, BidResolution};
pub use policy::{DeferToAuction, OwnedOperatedPolicy, RenderTimingPolicy};
pub use requester::BidRequester;
pub use transport::{BidTransport, CannedTransport, TransportError, TransportResponse};
