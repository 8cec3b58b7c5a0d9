use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use yamdb_collab::{AuthError, CollabError, DatabaseError};
use yamdb_core::Denial;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },
    #[error("Authentication credentials were not provided or are invalid")]
    AuthenticationRequired,
    #[error("You do not have permission to perform this action")]
    PermissionDenied,
    #[error("{resource} with this {identifier} was not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("The confirmation code could not be delivered")]
    Delivery,
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

/// The body of every error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// One of `validation_failure`, `authentication_required`, `permission_denied`,
    /// `not_found`, `delivery_failure`, `internal`
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    message: String,
}

impl ServerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Delivery => StatusCode::BAD_GATEWAY,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_failure",
            Self::AuthenticationRequired => "authentication_required",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound { .. } => "not_found",
            Self::Delivery => "delivery_failure",
            Self::Unknown(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Unknown(reason) => {
                error!("Request failed: {}", reason);
                "Internal server error".to_string()
            }
            e => e.to_string(),
        };

        let body = ErrorBody {
            error: self.tag(),
            field: match &self {
                Self::Validation { field, .. } => field.clone(),
                _ => None,
            },
            message,
        };

        (self.as_status_code(), Json(body)).into_response()
    }
}

impl From<Denial> for ServerError {
    fn from(value: Denial) -> Self {
        match value {
            Denial::AuthenticationRequired => Self::AuthenticationRequired,
            Denial::PermissionDenied => Self::PermissionDenied,
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCode => Self::validation("code", value.to_string()),
            AuthError::UnknownEmail(_) => Self::validation("email", value.to_string()),
            AuthError::InvalidSession => Self::AuthenticationRequired,
            AuthError::Delivery(_) => Self::Delivery,
            AuthError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<CollabError> for ServerError {
    fn from(value: CollabError) -> Self {
        match value {
            CollabError::Validation { field, message } => Self::validation(field, message),
            CollabError::Denied(denial) => denial.into(),
            CollabError::Db(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value: _,
            } => Self::validation(field, format!("{resource} with this {field} already exists")),
            e => Self::Unknown(e.to_string()),
        }
    }
}
