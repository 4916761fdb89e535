//! Tests for ParticipantClient against wiremock participants.
//!
//! Covers the response mapping for each participant call, the status-poll
//! fallback and the saga context headers.

use lra_client::{CallContext, ParticipantClient, ParticipantClientConfig, StatusReport};
use lra_state::{LraStatus, ParticipantStatus, TerminationKind, TerminationOutcome};
use url::Url;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> ParticipantClient {
    ParticipantClient::new(ParticipantClientConfig::with_timeout_ms(500)).unwrap()
}

fn ctx() -> CallContext {
    CallContext {
        lra_uri: "http://coordinator/lra-coordinator/abc".into(),
        parent_uri: None,
        recovery_uri: "http://coordinator/lra-coordinator/abc/recovery/def".into(),
    }
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{p}", server.uri())).unwrap()
}

#[tokio::test]
async fn complete_200_succeeds_with_context_headers() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/complete"))
        .and(header(
            "Long-Running-Action",
            "http://coordinator/lra-coordinator/abc",
        ))
        .and(header(
            "Long-Running-Action-Ended",
            "http://coordinator/lra-coordinator/abc",
        ))
        .and(header(
            "Long-Running-Action-Recovery",
            "http://coordinator/lra-coordinator/abc/recovery/def",
        ))
        .and(body_string("Completed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client()
        .terminate(&url(&server, "/complete"), None, TerminationKind::Complete, &ctx())
        .await;
    assert_eq!(outcome, TerminationOutcome::Succeeded);
}

#[tokio::test]
async fn compensate_410_counts_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/compensate"))
        .and(body_string("Compensated"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client()
        .terminate(
            &url(&server, "/compensate"),
            None,
            TerminationKind::Compensate,
            &ctx(),
        )
        .await;
    assert_eq!(outcome, TerminationOutcome::Succeeded);
}

#[tokio::test]
async fn accepted_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/complete"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client()
        .terminate(&url(&server, "/complete"), None, TerminationKind::Complete, &ctx())
        .await;
    assert!(matches!(outcome, TerminationOutcome::Retry { .. }));
}

#[tokio::test]
async fn server_error_without_status_endpoint_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/compensate"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client()
        .terminate(
            &url(&server, "/compensate"),
            None,
            TerminationKind::Compensate,
            &ctx(),
        )
        .await;
    match outcome {
        TerminationOutcome::Retry { reason } => assert!(reason.contains("503")),
        other => panic!("expected retry, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_call_adopts_reported_end_state() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/complete"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("FailedToComplete"))
        .expect(1)
        .mount(&server)
        .await;

    let status = url(&server, "/status");
    let outcome = client()
        .terminate(
            &url(&server, "/complete"),
            Some(&status),
            TerminationKind::Complete,
            &ctx(),
        )
        .await;
    assert_eq!(
        outcome,
        TerminationOutcome::Reported(ParticipantStatus::FailedToComplete)
    );
}

#[tokio::test]
async fn status_gone_means_success() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/compensate"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let status = url(&server, "/status");
    let outcome = client()
        .terminate(
            &url(&server, "/compensate"),
            Some(&status),
            TerminationKind::Compensate,
            &ctx(),
        )
        .await;
    assert_eq!(outcome, TerminationOutcome::Succeeded);
}

#[tokio::test]
async fn in_progress_status_keeps_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/compensate"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Compensating"))
        .mount(&server)
        .await;

    let status = url(&server, "/status");
    let outcome = client()
        .terminate(
            &url(&server, "/compensate"),
            Some(&status),
            TerminationKind::Compensate,
            &ctx(),
        )
        .await;
    assert!(matches!(outcome, TerminationOutcome::Retry { .. }));
}

#[tokio::test]
async fn status_rejects_unknown_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Sleeping"))
        .mount(&server)
        .await;

    let err = client()
        .status(&url(&server, "/status"), &ctx())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Sleeping"));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Completed\n"))
        .mount(&server)
        .await;
    let report = client().status(&url(&server, "/status"), &ctx()).await.unwrap();
    assert_eq!(report, StatusReport::Reported(ParticipantStatus::Completed));
}

#[tokio::test]
async fn after_sends_lra_status() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/after"))
        .and(body_string("Cancelled"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client()
        .after(&url(&server, "/after"), LraStatus::Cancelled, &ctx())
        .await
        .unwrap();
}

#[tokio::test]
async fn after_failure_reports_status_code() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/after"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client()
        .after(&url(&server, "/after"), LraStatus::Closed, &ctx())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(500));
}

#[tokio::test]
async fn forget_accepts_ok_and_gone() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/forget"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;

    client()
        .forget(&url(&server, "/forget"), &ctx())
        .await
        .unwrap();
}

#[tokio::test]
async fn unreachable_participant_is_retryable() {
    let endpoint = Url::parse("http://127.0.0.1:1/complete").unwrap();
    let outcome = client()
        .terminate(&endpoint, None, TerminationKind::Complete, &ctx())
        .await;
    assert!(matches!(outcome, TerminationOutcome::Retry { .. }));
}
