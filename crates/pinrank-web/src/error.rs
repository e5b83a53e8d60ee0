use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pinrank_import::ImportError;
use pinrank_sources::SourceError;
use pinrank_store::StoreError;
use serde_json::json;
use tracing::{error, warn};

/// Handler error, rendered as `{"error": message}` with a matching status.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// Logged in full; the caller only sees a generic message.
    Internal(anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => AppError::Conflict(message),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Validation(message) => AppError::BadRequest(message),
            ImportError::NotFound(message) => AppError::NotFound(message),
            ImportError::Fetch { message, source } => {
                warn!(error = %source, "upstream fetch failed");
                AppError::BadRequest(message)
            }
            ImportError::Source(
                source @ (SourceError::MissingColumns { .. }
                | SourceError::InvalidSheetUrl(_)
                | SourceError::Csv(_)),
            ) => AppError::BadRequest(source.to_string()),
            ImportError::Source(other) => AppError::Internal(other.into()),
            ImportError::Store(store) => store.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message),
            AppError::Internal(err) => {
                error!("internal server error: {err:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_surface_found_headers() {
        let err: AppError = ImportError::Source(SourceError::MissingColumns {
            missing: vec!["Link".into()],
            found: vec!["Keyword".into(), "Volume".into()],
        })
        .into();
        match err {
            AppError::BadRequest(message) => {
                assert!(message.contains("Link"));
                assert!(message.contains("Keyword, Volume"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn store_conflict_maps_to_conflict_and_malformed_xml_is_internal() {
        let err: AppError = ImportError::Store(StoreError::Conflict("Domain already exists".into())).into();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Domain already exists"));

        let err: AppError = ImportError::Source(SourceError::Sitemap("bad".into())).into();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
