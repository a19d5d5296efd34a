use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::borrow::Cow;

use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("A recipe needs at least one ingredient")]
    EmptyIngredientList,

    #[error("Ingredient {0} is listed more than once")]
    DuplicateIngredient(i32),

    #[error("Amount of ingredient {0} must be at least 1")]
    NonPositiveAmount(i32),

    #[error("Ingredient {0} does not exist")]
    UnknownIngredient(i32),

    #[error("A recipe needs an image")]
    MissingImage,

    #[error("Cooking time must be at least 1 minute")]
    InvalidCookingTime,

    #[error("You cannot subscribe to yourself")]
    InvalidRelation,

    #[error("{field}: {message}")]
    InvalidRequest {
        field: Cow<'static, str>,
        message: String,
    },

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Shopping cart is empty")]
    EmptyCart,

    #[error("Invalid short link")]
    InvalidToken,

    #[error("Authentication required")]
    AuthRequired,

    #[error("Invalid credentials")]
    AuthFailed,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn invalid(field: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        ServerError::InvalidRequest {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Request field a validation error is reported against.
    pub fn field(&self) -> Option<&str> {
        match self {
            ServerError::EmptyIngredientList
            | ServerError::DuplicateIngredient(_)
            | ServerError::NonPositiveAmount(_)
            | ServerError::UnknownIngredient(_) => Some("ingredients"),
            ServerError::MissingImage => Some("image"),
            ServerError::InvalidCookingTime => Some("cooking_time"),
            ServerError::InvalidRelation => Some("errors"),
            ServerError::InvalidRequest { field, .. } => Some(field.as_ref()),
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::EmptyIngredientList
            | ServerError::DuplicateIngredient(_)
            | ServerError::NonPositiveAmount(_)
            | ServerError::UnknownIngredient(_)
            | ServerError::MissingImage
            | ServerError::InvalidCookingTime
            | ServerError::InvalidRelation
            | ServerError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::NotFound(_) | ServerError::InvalidToken => StatusCode::NOT_FOUND,
            ServerError::EmptyCart => StatusCode::BAD_REQUEST,
            ServerError::AuthRequired => StatusCode::UNAUTHORIZED,
            ServerError::AuthFailed => StatusCode::BAD_REQUEST,
            ServerError::PermissionDenied => StatusCode::FORBIDDEN,
            ServerError::Database(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ServerError::Database(_) | ServerError::Internal(_) => {
                tracing::error!("Request failed: {}", self);
                json!({ "detail": "Internal server error" })
            }
            _ => match self.field() {
                Some(field) => field_error(field, &self),
                None => json!({ "detail": self.to_string() }),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// `{"<field>": ["<message>"]}`, the shape clients render next to form inputs.
fn field_error(field: &str, err: &ServerError) -> serde_json::Value {
    let message = match err {
        ServerError::InvalidRequest { message, .. } => message.clone(),
        other => other.to_string(),
    };
    let mut body = serde_json::Map::new();
    body.insert(field.to_string(), json!([message]));
    serde_json::Value::Object(body)
}

pub type Result<T> = std::result::Result<T, ServerError>;
