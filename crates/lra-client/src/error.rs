//! Participant call error types.
//!
//! None of these reach a coordinator caller. They are logged and folded into
//! participant state as retryable outcomes.

/// Errors from calls to participant endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ParticipantCallError {
    /// The request could not be delivered.
    #[error("HTTP error calling {endpoint}: {source}")]
    Transport {
        /// Endpoint that was called.
        endpoint: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },
    /// The participant did not answer within the per-call timeout.
    #[error("call to {endpoint} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Endpoint that was called.
        endpoint: String,
        /// Configured timeout.
        elapsed_ms: u64,
    },
    /// The participant answered with a status code the protocol does not
    /// treat as success.
    #[error("participant {endpoint} returned {status}: {body}")]
    UnexpectedStatus {
        /// Endpoint that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        body: String,
    },
    /// The status endpoint answered with something that is not a status name.
    #[error("participant {endpoint} reported unknown status \"{body}\"")]
    InvalidStatusBody {
        /// Endpoint that was called.
        endpoint: String,
        /// The unparseable body.
        body: String,
    },
    /// A protocol header could not be encoded.
    #[error("invalid header value for {name}: {value}")]
    InvalidHeader {
        /// Header name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientInit(reqwest::Error),
}

impl ParticipantCallError {
    /// HTTP status code, when the participant answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
