use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{error::AppError, storage::types::fiscal_document::DocumentSummary};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        conflict: Option<DocumentSummary>,
    },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::MalformedDocument(_)
            | AppError::MissingIdentity(_)
            | AppError::InvalidAmount(_)
            | AppError::InvalidId(_) => Self::ValidationError(err.to_string()),
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::DuplicateDocument { key, conflict } => Self::Conflict {
                message: format!("a document with the same {} already exists", key.as_str()),
                conflict: conflict.map(|summary| *summary),
            },
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::StoreUnavailable(msg) => Self::ServiceUnavailable(msg),
            AppError::RenderFailure(_) | AppError::BlobWriteFailure(_) => {
                tracing::error!("Rendering error: {:?}", err);
                Self::InternalError(err.to_string())
            }
            _ => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, conflict) = match self {
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message, None),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message, None),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            Self::Conflict { message, conflict } => (StatusCode::CONFLICT, message, conflict),
            Self::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, message, None)
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                status: "error".to_string(),
                conflict,
            }),
        )
            .into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflict: Option<DocumentSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::error::DuplicateKey;
    use std::fmt::Debug;

    fn assert_status_code<T: IntoResponse + Debug>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    #[test]
    fn test_input_errors_map_to_validation() {
        for err in [
            AppError::MalformedDocument("missing NFe envelope".to_string()),
            AppError::MissingIdentity("document number is missing".to_string()),
            AppError::InvalidAmount("grand total".to_string()),
            AppError::InvalidId("abc".to_string()),
        ] {
            let api_error = ApiError::from(err);
            assert!(matches!(api_error, ApiError::ValidationError(_)));
            assert_status_code(api_error, StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_duplicate_maps_to_conflict_with_summary() {
        let summary = DocumentSummary {
            id: "id-1".to_string(),
            number: "123".to_string(),
            document_key: "3520".to_string(),
            created_at: Utc::now(),
        };
        let api_error = ApiError::from(AppError::DuplicateDocument {
            key: DuplicateKey::DocumentKey,
            conflict: Some(Box::new(summary.clone())),
        });

        match &api_error {
            ApiError::Conflict { message, conflict } => {
                assert!(message.contains("document key"));
                assert_eq!(conflict.as_ref(), Some(&summary));
            }
            other => panic!("unexpected api error: {other:?}"),
        }
        assert_status_code(api_error, StatusCode::CONFLICT);
    }

    #[test]
    fn test_api_error_response_status_codes() {
        assert_status_code(
            ApiError::InternalError("server error".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        assert_status_code(
            ApiError::NotFound("not found".to_string()),
            StatusCode::NOT_FOUND,
        );
        assert_status_code(
            ApiError::ServiceUnavailable("store down".to_string()),
            StatusCode::SERVICE_UNAVAILABLE,
        );
        assert_status_code(
            ApiError::from(AppError::StoreUnavailable("blob store".to_string())),
            StatusCode::SERVICE_UNAVAILABLE,
        );
    }

    #[test]
    fn test_internal_error_sanitization() {
        let internal_error =
            AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, "db password incorrect"));
        let api_error = ApiError::from(internal_error);

        assert!(
            matches!(&api_error, ApiError::InternalError(msg) if msg == "Internal server error")
        );
        assert_eq!(api_error.to_string(), "Internal server error");
        assert_status_code(api_error, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_render_failures_keep_their_message() {
        let api_error = ApiError::from(AppError::RenderFailure("document abc".to_string()));
        assert!(matches!(&api_error, ApiError::InternalError(msg) if msg.contains("document abc")));
    }
}
