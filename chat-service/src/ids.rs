//! Typed request identifiers
//!
//! Every HTTP request gets an `x-request-id` of the form
//! `req_01h455vb4pex5vsknk084sn02q`: a TypeID with a `req` prefix over a
//! UUIDv7, so ids sort by creation time.

use http::{HeaderValue, Request};
use mti::prelude::*;
use std::fmt;
use std::str::FromStr;
use tower_http::request_id::{MakeRequestId, RequestId as TowerRequestId};

/// Identifier attached to one HTTP request
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(MagicTypeId);

impl RequestId {
    pub const PREFIX: &'static str = "req";

    #[must_use]
    pub fn new() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = RequestIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = MagicTypeId::from_str(s).map_err(RequestIdError::Parse)?;
        let prefix = id.prefix().as_str();
        if prefix != Self::PREFIX {
            return Err(RequestIdError::InvalidPrefix(prefix.to_string()));
        }
        Ok(Self(id))
    }
}

/// Failure to parse a [`RequestId`]
#[derive(Debug, thiserror::Error)]
pub enum RequestIdError {
    #[error("failed to parse request ID: {0}")]
    Parse(#[from] MagicTypeIdError),

    #[error("invalid request ID prefix '{0}', expected 'req'")]
    InvalidPrefix(String),
}

/// Generates a fresh [`RequestId`] for requests that arrive without one
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTypedRequestId;

impl MakeRequestId for MakeTypedRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<TowerRequestId> {
        let value = HeaderValue::from_str(RequestId::new().as_str()).ok()?;
        Some(TowerRequestId::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = RequestId::new();
        assert!(id.as_str().starts_with("req_"));
        assert_eq!(id.as_str().len(), 30);
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn test_parse_rejects_foreign_prefix() {
        let parsed = RequestId::from_str("req_01h455vb4pex5vsknk084sn02q").unwrap();
        assert_eq!(parsed.as_str(), "req_01h455vb4pex5vsknk084sn02q");

        match RequestId::from_str("chat_01h455vb4pex5vsknk084sn02q") {
            Err(RequestIdError::InvalidPrefix(prefix)) => assert_eq!(prefix, "chat"),
            other => panic!("expected prefix error, got {:?}", other),
        }
        assert!(RequestId::from_str("req_invalid").is_err());
    }

    #[test]
    fn test_make_typed_request_id() {
        let request = Request::builder().body(()).unwrap();
        let id = MakeTypedRequestId.make_request_id(&request).unwrap();
        let value = id.into_header_value();
        assert!(value.to_str().unwrap().starts_with("req_"));
    }
}
