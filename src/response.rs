//! HTTP rendering of reset outcomes.
//!
//! Success: `{ ok: true, event_id, deleted }`. Errors:
//! `{ ok: false, code, error }`, with the per-collection progress added for a
//! partial failure.

use axum::http::{header::WWW_AUTHENTICATE, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::service::{ResetOutcome, ServiceError};

#[derive(Debug, Serialize)]
pub struct SuccessBody {
    pub ok: bool,
    pub event_id: String,
    pub deleted: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub code: &'static str,
    pub error: String,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialDetails>,
}

#[derive(Debug, Serialize)]
pub struct PartialDetails {
    pub event_id: String,
    pub deleted: BTreeMap<String, u64>,
    pub completed_branches: Vec<String>,
    pub failed_branch: String,
    pub failed_collection: String,
    pub timed_out: bool,
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InProgress(_) => StatusCode::CONFLICT,
            Self::PartialFailure(_) | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InProgress(_) => "RESET_IN_PROGRESS",
            Self::PartialFailure(_) => "PARTIAL_FAILURE",
            Self::Unexpected(_) => "INTERNAL_ERROR",
        }
    }

    pub fn body(&self) -> ErrorBody {
        let partial = match self {
            Self::PartialFailure(p) => Some(PartialDetails {
                event_id: p.event_id.clone(),
                deleted: p.deleted.clone(),
                completed_branches: p.completed_branches.clone(),
                failed_branch: p.failed_branch.clone(),
                failed_collection: p.failed_collection.clone(),
                timed_out: p.timed_out,
            }),
            _ => None,
        };
        ErrorBody {
            ok: false,
            code: self.code(),
            error: self.to_string(),
            partial,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "reset request failed");
        }
        let body = Json(self.body());
        match self {
            Self::Unauthorized(_) => (status, [(WWW_AUTHENTICATE, "Bearer")], body).into_response(),
            _ => (status, body).into_response(),
        }
    }
}

impl IntoResponse for ResetOutcome {
    fn into_response(self) -> Response {
        let (summary, dry_run) = match self {
            Self::Reset(s) => (s, false),
            Self::Preview(s) => (s, true),
        };
        let body = SuccessBody {
            ok: true,
            event_id: summary.event_id,
            deleted: summary.deleted,
            dry_run,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}
