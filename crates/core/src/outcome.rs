//! Terminal result of one bid request.
//!
//! Every request resolves to exactly one [`Outcome`]. Failures never cross
//! the bidder contract as panics or `Err` returns; they are carried here.

use crate::openrtb::BidResponse;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a [`RequestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportFailure,
    MalformedResponse,
    Timeout,
    ProtocolViolation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::Internal => "internal",
        }
    }
}

/// A terminal failure reported by (or synthesized for) a bidder.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestError {
    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no resolution within {deadline_ms}ms")]
    Timeout { deadline_ms: u64 },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("bidder internal error: {0}")]
    Internal(String),
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::TransportFailure(_) => ErrorKind::TransportFailure,
            RequestError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            RequestError::Timeout { .. } => ErrorKind::Timeout,
            RequestError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            RequestError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// The one result a caller observes for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Fulfilled { response: BidResponse },
    Failed { error: RequestError },
    NoFill,
    TimedOut { deadline_ms: u64 },
}

impl Outcome {
    /// Normalize a raw listener callback.
    ///
    /// Both payloads absent is a no-fill. Both present is a protocol
    /// violation: the response is dropped and the request fails.
    pub fn from_callback(response: Option<BidResponse>, error: Option<RequestError>) -> Self {
        match (response, error) {
            (Some(response), None) => Outcome::Fulfilled { response },
            (None, Some(error)) => Outcome::Failed { error },
            (None, None) => Outcome::NoFill,
            (Some(_), Some(error)) => Outcome::Failed {
                error: RequestError::ProtocolViolation(format!(
                    "callback carried both a response and an error ({error})"
                )),
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Fulfilled { .. } => "fulfilled",
            Outcome::Failed { .. } => "failed",
            Outcome::NoFill => "no_fill",
            Outcome::TimedOut { .. } => "timed_out",
        }
    }

    pub fn response(&self) -> Option<&BidResponse> {
        match self {
            Outcome::Fulfilled { response } => Some(response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<BidResponse> {
        match self {
            Outcome::Fulfilled { response } => Some(response),
            _ => None,
        }
    }

    /// The failure behind this outcome, with a timeout surfaced as
    /// [`RequestError::Timeout`]. `None` for fulfilled and no-fill.
    pub fn error(&self) -> Option<RequestError> {
        match self {
            Outcome::Failed { error } => Some(error.clone()),
            Outcome::TimedOut { deadline_ms } => Some(RequestError::Timeout {
                deadline_ms: *deadline_ms,
            }),
            _ => None,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_normalization() {
        let resp = BidResponse::no_bid("r".to_string());

        assert!(Outcome::from_callback(Some(resp.clone()), None).is_fulfilled());
        assert_eq!(Outcome::from_callback(None, None), Outcome::NoFill);

        let failed = Outcome::from_callback(None, Some(RequestError::TransportFailure("reset".into())));
        assert_eq!(failed.error().unwrap().kind(), ErrorKind::TransportFailure);

        let both = Outcome::from_callback(Some(resp), Some(RequestError::Internal("x".into())));
        assert_eq!(both.error().unwrap().kind(), ErrorKind::ProtocolViolation);
        assert!(both.response().is_none());
    }

    #[test]
    fn test_timed_out_surfaces_timeout_error() {
        let outcome = Outcome::TimedOut { deadline_ms: 200 };
        let err = outcome.error().unwrap();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.to_string(), "no resolution within 200ms");
        assert_eq!(outcome.label(), "timed_out");
    }

    #[test]
    fn test_no_fill_is_not_an_error() {
        assert!(Outcome::NoFill.error().is_none());
        assert!(Outcome::NoFill.response().is_none());
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(Outcome::TimedOut { deadline_ms: 200 }).unwrap();
        assert_eq!(json["status"], "timed_out");
        assert_eq!(json["deadline_ms"], 200);
    }
}
