// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the ingress API.
//!
//! Handles POST /v1/leads and GET /health.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use leadflow_connector::dispatch::DEFAULT_SOURCE;
use leadflow_core::LeadflowError;

use crate::server::GatewayState;
use crate::validation::{self, FieldError};

/// Query parameters accepted by POST /v1/leads.
#[derive(Debug, Default, Deserialize)]
pub struct LeadQuery {
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Response body for a created lead.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub success: bool,
    pub lead_id: i64,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// Request failures and the status each maps to.
#[derive(Debug)]
pub enum ApiError {
    RateLimited { retry_after_secs: u64 },
    MissingApiKey,
    InvalidApiKey,
    Validation(Vec<FieldError>),
    Internal(LeadflowError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingApiKey => StatusCode::UNAUTHORIZED,
            Self::InvalidApiKey => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details, retry_after) = match self {
            Self::RateLimited { retry_after_secs } => {
                ("Too many requests", None, Some(retry_after_secs))
            }
            Self::MissingApiKey => ("Missing API Key", None, None),
            Self::InvalidApiKey => ("Invalid API Key", None, None),
            Self::Validation(errors) => ("Validation Error", Some(errors), None),
            Self::Internal(e) => {
                error!(error = %e, "lead ingestion failed");
                ("Internal Server Error", None, None)
            }
        };
        let body = Json(ErrorResponse {
            success: false,
            error: message.to_string(),
            details,
        });
        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<LeadflowError> for ApiError {
    fn from(e: LeadflowError) -> Self {
        Self::Internal(e)
    }
}

/// Rate-limit key: the first `x-forwarded-for` hop, or `unknown`.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

fn api_key<'a>(headers: &'a HeaderMap, query: &'a LeadQuery) -> Option<&'a str> {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .or(query.api_key.as_deref())
        .filter(|k| !k.is_empty())
}

/// POST /v1/leads
///
/// Checks run in order: rate limit, API key, body. The first failure wins.
pub async fn post_lead(
    State(state): State<GatewayState>,
    Query(query): Query<LeadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let ip = client_ip(&headers);
    if let Err(throttled) = state.limiter.check(&ip) {
        warn!(client = %ip, "ingress rate limit exceeded");
        return Err(ApiError::RateLimited {
            retry_after_secs: throttled.retry_after_secs(),
        });
    }

    let key = api_key(&headers, &query).ok_or(ApiError::MissingApiKey)?;
    let tenant = state
        .store
        .find_tenant_by_api_key(key)
        .await?
        .ok_or(ApiError::InvalidApiKey)?;

    let value: serde_json::Value = serde_json::from_slice(&body).map_err(|_| {
        ApiError::Validation(vec![FieldError {
            field: "body".into(),
            message: "must be valid JSON".into(),
        }])
    })?;
    let submission = validation::validate(value).map_err(ApiError::Validation)?;

    let source = query
        .source
        .filter(|s| !s.is_empty())
        .or(submission.source)
        .unwrap_or_else(|| DEFAULT_SOURCE.to_string());

    let lead = state
        .dispatcher
        .ingest_structured(&tenant.id, submission.fields, &source, submission.raw, None)
        .await?;
    info!(tenant_id = %tenant.id, lead_id = %lead.id, source = %source, "lead ingested");

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            success: true,
            lead_id: lead.id.0,
        }),
    ))
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn client_ip_uses_first_forwarded_hop() {
        let h = headers(&[("x-forwarded-for", " 10.0.0.7 , 172.16.0.1")]);
        assert_eq!(client_ip(&h), "10.0.0.7");
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn header_key_wins_over_query() {
        let h = headers(&[("x-api-key", "from-header")]);
        let q = LeadQuery {
            api_key: Some("from-query".into()),
            source: None,
        };
        assert_eq!(api_key(&h, &q), Some("from-header"));
        assert_eq!(api_key(&HeaderMap::new(), &q), Some("from-query"));
        assert_eq!(api_key(&HeaderMap::new(), &LeadQuery::default()), None);
    }

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(ApiError::MissingApiKey.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidApiKey.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Validation(vec![]).status(), StatusCode::BAD_REQUEST);

        let response = ApiError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "42");
    }
}
