//! Inbound reply envelope.

use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointId;

/// A reply received from an endpoint.
///
/// Pairs the identity of the endpoint that produced it with the raw line
/// text. Immutable once constructed: mutating an in-flight reply would let a
/// validator and a callback observe different values, so the fields are
/// private and re-stamping the endpoint consumes the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    endpoint: EndpointId,
    text: String,
}

impl Reply {
    pub fn new(endpoint: EndpointId, text: impl Into<String>) -> Self {
        Self {
            endpoint,
            text: text.into(),
        }
    }

    /// Identity of the endpoint this reply came from.
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// The reply line, without the trailing newline.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Returns the same reply text attributed to a different endpoint.
    ///
    /// Used when a canned reply written against no particular endpoint is
    /// delivered on behalf of a specific one.
    pub fn with_endpoint(self, endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            text: self.text,
        }
    }
}
