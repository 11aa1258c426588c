use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ledgerdeck_core::settings::SettingsRecord;
use ledgerdeck_core::Error;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    /// The upstream service failed. `record` is what the client should now show.
    #[error("{message}")]
    BadGateway {
        code: &'static str,
        message: String,
        record: Option<Box<SettingsRecord>>,
    },

    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<&'a SettingsRecord>,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "busy",
            Self::Unprocessable(_) => "invalid_setting",
            Self::BadGateway { code, .. } => code,
            Self::Internal(_) => "internal",
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let code = err.code();
        match err {
            Error::NotLoaded(_) => ApiError::NotFound(err.to_string()),
            Error::Busy { .. } => ApiError::Conflict(err.to_string()),
            Error::InvalidSetting(message) => ApiError::Unprocessable(message),
            Error::MutationFailed {
                ref entity_id,
                key,
                ref reason,
                ref restored,
            } => ApiError::BadGateway {
                code,
                message: format!("Changing '{}' for '{}' failed: {}", key, entity_id, reason),
                record: Some(restored.clone()),
            },
            Error::LoadFailed { ref stale, .. } => ApiError::BadGateway {
                code,
                message: err.to_string(),
                record: stale.clone(),
            },
            Error::Remote(_) => ApiError::BadGateway {
                code,
                message: err.to_string(),
                record: None,
            },
            Error::Cache(_) | Error::Serialization(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("API error ({}): {}", status, self);
        }
        let record = match &self {
            Self::BadGateway { record, .. } => record.as_deref(),
            _ => None,
        };
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            record,
        };
        (status, Json(body)).into_response()
    }
}
