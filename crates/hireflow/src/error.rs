use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::matching::{EvidenceImportError, MatchingError};
use crate::workflows::pipeline::PipelineError;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Evidence(EvidenceImportError),
    Matching(MatchingError),
    Pipeline(PipelineError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Evidence(err) => write!(f, "evidence import error: {}", err),
            AppError::Matching(err) => write!(f, "matching error: {}", err),
            AppError::Pipeline(err) => write!(f, "pipeline error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Evidence(err) => Some(err),
            AppError::Matching(err) => Some(err),
            AppError::Pipeline(err) => Some(err),
        }
    }
}

/// Workflow errors keep the status and payload their own routers produce.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Matching(err) => err.into_response(),
            AppError::Pipeline(err) => err.into_response(),
            other => {
                let status = match &other {
                    AppError::Evidence(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let body = Json(json!({ "error": other.to_string() }));
                (status, body).into_response()
            }
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<EvidenceImportError> for AppError {
    fn from(value: EvidenceImportError) -> Self {
        Self::Evidence(value)
    }
}

impl From<MatchingError> for AppError {
    fn from(value: MatchingError) -> Self {
        Self::Matching(value)
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::domain::{CandidacyId, JobId};

    #[test]
    fn workflow_errors_keep_their_status() {
        let cases = [
            (
                AppError::from(PipelineError::Conflict("busy".to_string())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::from(PipelineError::NotFound(CandidacyId(4))),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(MatchingError::NotFound(JobId(9))),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(MatchingError::Configuration("no requirements".to_string())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::from(std::io::Error::other("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn pipeline_errors_use_the_router_mapping() {
        for err in [
            PipelineError::InvalidTransition {
                from: crate::workflows::pipeline::PipelineState::Hired,
                to: crate::workflows::pipeline::PipelineState::TestsDone,
            },
            PipelineError::Precondition("salary".to_string()),
            PipelineError::ExternalDependency("amount".to_string()),
            PipelineError::Repository(crate::store::RepositoryError::Unavailable(
                "down".to_string(),
            )),
        ] {
            let expected = err.status_code();
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }
}
