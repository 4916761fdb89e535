//! # lra-client: Outbound Participant Protocol
//!
//! The coordinator's only path to participants. Each call carries the saga
//! context headers:
//!
//! | Header | Value |
//! |--------|-------|
//! | `Long-Running-Action` | LRA URI |
//! | `Long-Running-Action-Ended` | LRA URI (termination and after calls) |
//! | `Long-Running-Action-Parent` | parent LRA URI, nested sagas only |
//! | `Long-Running-Action-Recovery` | participant recovery URI |
//!
//! ## Response mapping
//!
//! | Call | Success | Anything else |
//! |------|---------|---------------|
//! | `PUT` complete/compensate | `200`, `410` | retryable (`202` included) |
//! | `GET` status | plain-text status name; `410` = finished and forgotten | retryable |
//! | `PUT` after | `2xx` | retryable |
//! | `DELETE` forget | `2xx`, `410` | retryable |
//!
//! Retries are not built into the client: the recovery loop owns retry
//! policy, and every retryable outcome spends one unit of the participant's
//! budget.

pub mod config;
pub mod error;

pub use config::ParticipantClientConfig;
pub use error::ParticipantCallError;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use url::Url;

use lra_core::protocol::{
    LRA_HTTP_CONTEXT_HEADER, LRA_HTTP_ENDED_CONTEXT_HEADER, LRA_HTTP_PARENT_CONTEXT_HEADER,
    LRA_HTTP_RECOVERY_HEADER,
};
use lra_state::{LraStatus, ParticipantStatus, TerminationKind, TerminationOutcome};

/// Saga context sent with every participant call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// The LRA URI.
    pub lra_uri: String,
    /// The parent LRA URI, for nested sagas.
    pub parent_uri: Option<String>,
    /// The participant's recovery URI.
    pub recovery_uri: String,
}

/// What a participant's status endpoint said.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReport {
    /// The participant reported a status name.
    Reported(ParticipantStatus),
    /// `410`: the participant finished and already forgot the saga.
    Gone,
}

/// HTTP client for participant endpoints.
#[derive(Debug, Clone)]
pub struct ParticipantClient {
    http: reqwest::Client,
    timeout_ms: u64,
}

impl ParticipantClient {
    /// Build a client from configuration.
    pub fn new(config: ParticipantClientConfig) -> Result<Self, ParticipantCallError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ParticipantCallError::ClientInit)?;
        Ok(Self {
            http,
            timeout_ms: config.timeout_ms,
        })
    }

    /// Ask a participant to complete or compensate.
    ///
    /// Never fails: transport errors and unexpected codes become
    /// [`TerminationOutcome::Retry`]. When the call does not settle and a
    /// status endpoint is known, the status endpoint is consulted before
    /// giving up on this attempt.
    pub async fn terminate(
        &self,
        endpoint: &Url,
        status_endpoint: Option<&Url>,
        kind: TerminationKind,
        ctx: &CallContext,
    ) -> TerminationOutcome {
        let outcome = match self.put_termination(endpoint, kind, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "participant {kind} call failed");
                TerminationOutcome::Retry {
                    reason: e.to_string(),
                }
            }
        };

        let TerminationOutcome::Retry { reason } = outcome else {
            return outcome;
        };
        let Some(status_endpoint) = status_endpoint else {
            return TerminationOutcome::Retry { reason };
        };

        match self.status(status_endpoint, ctx).await {
            Ok(StatusReport::Gone) => TerminationOutcome::Succeeded,
            Ok(StatusReport::Reported(status)) if status.is_end_state() => {
                TerminationOutcome::Reported(status)
            }
            Ok(StatusReport::Reported(status)) => TerminationOutcome::Retry {
                reason: format!("{reason}; participant reports {status}"),
            },
            Err(e) => {
                tracing::debug!(endpoint = %status_endpoint, error = %e, "status poll failed");
                TerminationOutcome::Retry { reason }
            }
        }
    }

    async fn put_termination(
        &self,
        endpoint: &Url,
        kind: TerminationKind,
        ctx: &CallContext,
    ) -> Result<TerminationOutcome, ParticipantCallError> {
        let request = self
            .http
            .put(endpoint.clone())
            .headers(context_headers(ctx, true)?)
            .header(CONTENT_TYPE, "text/plain")
            .body(kind.participant_success().as_str());
        let resp = self.send_request(request, endpoint).await?;

        let status = resp.status();
        if status == StatusCode::OK || status == StatusCode::GONE {
            return Ok(TerminationOutcome::Succeeded);
        }
        if status == StatusCode::ACCEPTED {
            return Ok(TerminationOutcome::Retry {
                reason: format!("{endpoint} accepted, still in progress"),
            });
        }
        Err(unexpected(endpoint, resp).await)
    }

    /// Poll a participant's status endpoint.
    pub async fn status(
        &self,
        endpoint: &Url,
        ctx: &CallContext,
    ) -> Result<StatusReport, ParticipantCallError> {
        let request = self
            .http
            .get(endpoint.clone())
            .headers(context_headers(ctx, false)?);
        let resp = self.send_request(request, endpoint).await?;

        let status = resp.status();
        if status == StatusCode::GONE {
            return Ok(StatusReport::Gone);
        }
        if !status.is_success() {
            return Err(unexpected(endpoint, resp).await);
        }
        let body = resp.text().await.map_err(|e| ParticipantCallError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        let name = body.trim().trim_matches('"');
        ParticipantStatus::from_name(name)
            .map(StatusReport::Reported)
            .ok_or_else(|| ParticipantCallError::InvalidStatusBody {
                endpoint: endpoint.to_string(),
                body: name.to_string(),
            })
    }

    /// Tell a participant the saga reached its final status.
    pub async fn after(
        &self,
        endpoint: &Url,
        lra_status: LraStatus,
        ctx: &CallContext,
    ) -> Result<(), ParticipantCallError> {
        let request = self
            .http
            .put(endpoint.clone())
            .headers(context_headers(ctx, true)?)
            .header(CONTENT_TYPE, "text/plain")
            .body(lra_status.as_str());
        let resp = self.send_request(request, endpoint).await?;
        if resp.status().is_success() {
            return Ok(());
        }
        Err(unexpected(endpoint, resp).await)
    }

    /// Tell a participant it may discard its record of the saga.
    pub async fn forget(
        &self,
        endpoint: &Url,
        ctx: &CallContext,
    ) -> Result<(), ParticipantCallError> {
        let request = self
            .http
            .delete(endpoint.clone())
            .headers(context_headers(ctx, false)?);
        let resp = self.send_request(request, endpoint).await?;
        if resp.status().is_success() || resp.status() == StatusCode::GONE {
            return Ok(());
        }
        Err(unexpected(endpoint, resp).await)
    }

    /// Send a request and map transport failures.
    async fn send_request(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &Url,
    ) -> Result<reqwest::Response, ParticipantCallError> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                ParticipantCallError::Timeout {
                    endpoint: endpoint.to_string(),
                    elapsed_ms: self.timeout_ms,
                }
            } else {
                ParticipantCallError::Transport {
                    endpoint: endpoint.to_string(),
                    source: e,
                }
            }
        })
    }
}

async fn unexpected(endpoint: &Url, resp: reqwest::Response) -> ParticipantCallError {
    let status = resp.status().as_u16();
    let mut body = resp.text().await.unwrap_or_default();
    body.truncate(256);
    ParticipantCallError::UnexpectedStatus {
        endpoint: endpoint.to_string(),
        status,
        body,
    }
}

fn context_headers(ctx: &CallContext, ended: bool) -> Result<HeaderMap, ParticipantCallError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        LRA_HTTP_CONTEXT_HEADER,
        header_value(LRA_HTTP_CONTEXT_HEADER, &ctx.lra_uri)?,
    );
    if ended {
        headers.insert(
            LRA_HTTP_ENDED_CONTEXT_HEADER,
            header_value(LRA_HTTP_ENDED_CONTEXT_HEADER, &ctx.lra_uri)?,
        );
    }
    if let Some(parent) = &ctx.parent_uri {
        headers.insert(
            LRA_HTTP_PARENT_CONTEXT_HEADER,
            header_value(LRA_HTTP_PARENT_CONTEXT_HEADER, parent)?,
        );
    }
    headers.insert(
        LRA_HTTP_RECOVERY_HEADER,
        header_value(LRA_HTTP_RECOVERY_HEADER, &ctx.recovery_uri)?,
    );
    Ok(headers)
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ParticipantCallError> {
    HeaderValue::from_str(value).map_err(|_| ParticipantCallError::InvalidHeader {
        name,
        value: value.to_string(),
    })
}
