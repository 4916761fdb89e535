//! # Coordination Protocol API
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST | `/start?ClientID&TimeLimit&ParentLRA` | start |
//! | PUT | `/:id?TimeLimit` | join (descriptor in `Link` header or body) |
//! | PUT | `/:id/remove` | leave |
//! | PUT | `/:id/close` | close |
//! | PUT | `/:id/cancel` | cancel |
//! | GET | `/:id/status` | status |
//! | GET | `/:id` | info |
//! | GET | `/?Status=` | list |
//! | GET | `/recovery` | sagas still recovering |
//!
//! `:id` may be the bare UUID or the percent-encoded LRA URI.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lra_core::protocol::{LRA_HTTP_CONTEXT_HEADER, LRA_HTTP_RECOVERY_HEADER};
use lra_core::{LraId, ParticipantId, TimeLimit};
use lra_state::{AfterState, CompensatorLinks, Lra, LraStatus, ParticipantStatus};

use crate::coordinator::{Coordinator, RecoveringLra};
use crate::error::AppError;
use crate::state::AppState;

/// Build the coordination protocol router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_lras))
        .route("/start", post(start_lra))
        .route("/recovery", get(recovery))
        .route("/:id", get(lra_info).put(join_lra))
        .route("/:id/status", get(lra_status))
        .route("/:id/close", put(close_lra))
        .route("/:id/cancel", put(cancel_lra))
        .route("/:id/remove", put(leave_lra))
}

// ---------------------------------------------------------------------------
// Request/response types
// ---------------------------------------------------------------------------

/// Query parameters of `POST /start`.
#[derive(Debug, Default, Deserialize)]
pub struct StartParams {
    #[serde(rename = "ClientID", default)]
    pub client_id: Option<String>,
    #[serde(rename = "TimeLimit", default)]
    pub time_limit: Option<i64>,
    #[serde(rename = "ParentLRA", default)]
    pub parent_lra: Option<String>,
}

/// Query parameters of `PUT /:id` (join).
#[derive(Debug, Default, Deserialize)]
pub struct JoinParams {
    #[serde(rename = "TimeLimit", default)]
    pub time_limit: Option<i64>,
}

/// Query parameters of `GET /`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
}

/// JSON view of a saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LraView {
    pub lra_id: String,
    pub id: LraId,
    pub client_id: String,
    pub status: LraStatus,
    pub parent_lra: Option<String>,
    pub children: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub ready_to_delete_at: Option<DateTime<Utc>>,
    pub participants: Vec<ParticipantView>,
}

/// JSON view of a participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub recovery_uri: String,
    pub status: ParticipantStatus,
    pub after: AfterState,
    pub forgotten: bool,
    pub remaining_attempts: u32,
    pub links: CompensatorLinks,
}

impl LraView {
    fn new(lra: &Lra, coordinator: &Coordinator) -> Self {
        Self {
            lra_id: coordinator.lra_uri(lra.id()),
            id: lra.id(),
            client_id: lra.client_id().to_string(),
            status: lra.status(),
            parent_lra: lra.parent_id().map(|p| coordinator.lra_uri(p)),
            children: lra
                .children()
                .iter()
                .map(|c| coordinator.lra_uri(*c))
                .collect(),
            created_at: lra.created_at(),
            deadline: lra.deadline(),
            finished_at: lra.finished_at(),
            ready_to_delete_at: lra.ready_to_delete_at(),
            participants: lra
                .participants()
                .iter()
                .map(|p| ParticipantView {
                    id: p.id(),
                    recovery_uri: coordinator.recovery_uri(lra.id(), p.id()),
                    status: p.status(),
                    after: p.after_state(),
                    forgotten: p.is_forgotten(),
                    remaining_attempts: p.remaining_attempts(),
                    links: p.links().clone(),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An unparseable path id cannot name a registered saga.
fn path_id(raw: &str) -> Result<LraId, AppError> {
    LraId::parse(raw).map_err(|_| AppError::NotFound(format!("LRA {raw} not found")))
}

fn time_limit(raw: Option<i64>) -> Result<TimeLimit, AppError> {
    Ok(TimeLimit::try_from_signed(raw.unwrap_or(0))?)
}

/// The compensator descriptor: every `Link` header value, else the body.
fn descriptor(headers: &HeaderMap, body: &str) -> Result<String, AppError> {
    let links: Vec<&str> = headers
        .get_all(header::LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if !links.is_empty() {
        return Ok(links.join(", "));
    }
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest(
            "compensator descriptor missing: send a Link header or a Link-format body".to_string(),
        ));
    }
    Ok(body.to_string())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /start: Start a new LRA, optionally nested.
async fn start_lra(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> Result<Response, AppError> {
    let time_limit = time_limit(params.time_limit)?;
    let parent = params
        .parent_lra
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(LraId::parse)
        .transpose()?;
    let client_id = params.client_id.unwrap_or_default();

    let id = state.coordinator.start(&client_id, parent, time_limit)?;
    let uri = state.coordinator.lra_uri(id);
    Ok((
        StatusCode::CREATED,
        [(LRA_HTTP_CONTEXT_HEADER, uri.clone())],
        uri,
    )
        .into_response())
}

/// PUT /:id: Join a participant. Returns its recovery URI.
async fn join_lra(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(params): Query<JoinParams>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let id = path_id(&raw)?;
    state.coordinator.status(id)?;
    let links = CompensatorLinks::parse(&descriptor(&headers, &body)?)?;
    let time_limit = time_limit(params.time_limit)?;

    let participant = state.coordinator.join(id, links, time_limit)?;
    let recovery = state.coordinator.recovery_uri(id, participant);
    Ok((
        [
            (LRA_HTTP_RECOVERY_HEADER, recovery.clone()),
            (LRA_HTTP_CONTEXT_HEADER, state.coordinator.lra_uri(id)),
        ],
        recovery,
    )
        .into_response())
}

/// PUT /:id/remove: Remove a participant.
async fn leave_lra(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, AppError> {
    let id = path_id(&raw)?;
    state.coordinator.status(id)?;
    let links = CompensatorLinks::parse(&descriptor(&headers, &body)?)?;
    state.coordinator.leave(id, &links)?;
    Ok(StatusCode::OK)
}

/// PUT /:id/close: Close an LRA.
async fn close_lra(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<String, AppError> {
    let status = state.coordinator.close(path_id(&raw)?).await?;
    Ok(status.to_string())
}

/// PUT /:id/cancel: Cancel an LRA.
async fn cancel_lra(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<String, AppError> {
    let status = state.coordinator.cancel(path_id(&raw)?).await?;
    Ok(status.to_string())
}

/// GET /:id/status: Current status as plain text.
async fn lra_status(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<String, AppError> {
    Ok(state.coordinator.status(path_id(&raw)?)?.to_string())
}

/// GET /:id: Full saga view.
async fn lra_info(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<LraView>, AppError> {
    let lra = state.coordinator.info(path_id(&raw)?)?;
    Ok(Json(LraView::new(&lra, &state.coordinator)))
}

/// GET /: All sagas, optionally filtered with `?Status=`.
async fn list_lras(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<LraView>>, AppError> {
    let filter = params
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<LraStatus>)
        .transpose()?;
    let views = state
        .coordinator
        .list(filter)
        .iter()
        .map(|l| LraView::new(l, &state.coordinator))
        .collect();
    Ok(Json(views))
}

/// GET /recovery: Sagas still recovering, after the next full sweep.
async fn recovery(State(state): State<AppState>) -> Json<Vec<RecoveringLra>> {
    Json(state.coordinator.recovery().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn descriptor_prefers_link_headers() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::LINK,
            HeaderValue::from_static("<http://p/complete>; rel=\"complete\""),
        );
        headers.append(
            header::LINK,
            HeaderValue::from_static("<http://p/compensate>; rel=\"compensate\""),
        );
        let d = descriptor(&headers, "ignored").unwrap();
        let links = CompensatorLinks::parse(&d).unwrap();
        assert!(links.complete.is_some());
        assert!(links.compensate.is_some());
    }

    #[test]
    fn descriptor_falls_back_to_body() {
        let d = descriptor(&HeaderMap::new(), "  <http://p/after>; rel=\"after\"\n").unwrap();
        assert_eq!(d, "<http://p/after>; rel=\"after\"");
        assert!(descriptor(&HeaderMap::new(), "   ").is_err());
    }

    #[test]
    fn path_id_accepts_uri_and_rejects_garbage() {
        let id = LraId::new();
        assert_eq!(path_id(&id.to_string()).unwrap(), id);
        assert_eq!(path_id(&format!("http://c/lra/{id}")).unwrap(), id);
        assert!(matches!(path_id("nope"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn negative_time_limit_is_bad_request() {
        assert!(matches!(time_limit(Some(-5)), Err(AppError::BadRequest(_))));
        assert_eq!(time_limit(None).unwrap(), TimeLimit::NONE);
    }
}
