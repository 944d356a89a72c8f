use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, ORIGIN, VARY,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use wds_signups::RecordKind;

use crate::AppState;
use crate::error::ApiError;

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

pub(crate) async fn submit(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload: Value = serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJson)?;
    let submitted = state.signups.submit_payload(&payload).await?;
    if submitted.bot {
        return Ok(Json(json!({ "ok": true, "bot": true })));
    }
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    kind: Option<String>,
    key: Option<String>,
    format: Option<String>,
    diag: Option<String>,
}

enum ListFormat {
    Csv,
    Json,
}

impl ListFormat {
    fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::Csv),
            Some(f) if f.eq_ignore_ascii_case("csv") => Ok(Self::Csv),
            Some(f) if f.eq_ignore_ascii_case("json") => Ok(Self::Json),
            Some(other) => Err(ApiError::UnknownFormat(other.to_string())),
        }
    }
}

pub(crate) async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    if params.diag.as_deref() == Some("1") {
        return Ok(Json(diagnostics(&state, params.kind.as_deref())).into_response());
    }

    let Some(admin_key) = state.admin_key.as_deref() else {
        return Err(ApiError::NoAdminKey);
    };
    if params.key.as_deref().map(str::trim) != Some(admin_key) {
        return Err(ApiError::Unauthorized);
    }

    let format = ListFormat::parse(params.format.as_deref())?;
    let table = state
        .signups
        .list(params.kind.as_deref().unwrap_or_default())
        .await?;
    tracing::debug!(kind = %table.kind, rows = table.len(), "listed records");

    Ok(match format {
        ListFormat::Csv => ([(CONTENT_TYPE, CSV_CONTENT_TYPE)], table.to_csv()).into_response(),
        ListFormat::Json => Json(table.rows).into_response(),
    })
}

/// Connection summary for `diag=1`. Never includes the token itself.
fn diagnostics(state: &AppState, kind: Option<&str>) -> Value {
    let summary = &state.summary;
    let path = kind
        .and_then(RecordKind::parse)
        .map(|kind| state.signups.path_for(kind).to_string());
    json!({
        "ok": true,
        "hasToken": summary.has_token,
        "owner": &summary.owner,
        "repo": &summary.repo,
        "branch": &summary.branch,
        "backend": summary.backend.as_str(),
        "kind": kind,
        "path": path,
    })
}

pub(crate) async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

/// Adds CORS headers to every response and answers preflight requests.
pub(crate) async fn cors(request: Request, next: Next) -> Response {
    let origin = request.headers().get(ORIGIN).cloned();
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        origin.unwrap_or_else(|| HeaderValue::from_static("*")),
    );
    headers.insert(VARY, HeaderValue::from_static("Origin"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}
