//! JSON body extractor whose rejections are field-scoped validation errors.
//!
//! axum's `Json` answers a missing or mistyped field with a plain-text 422.
//! `ApiJson` runs the same deserialization through `serde_path_to_error` and
//! turns the failure into `ServerError::InvalidRequest` against the top-level
//! field that broke, so clients always get `{"<field>": ["<message>"]}`.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use serde_path_to_error::Segment;

use crate::error::{Result, ServerError};

/// Key for errors that do not belong to one input, e.g. malformed JSON
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ServerError::invalid(NON_FIELD_ERRORS, rejection.body_text()))?;
        parse_body(&bytes).map(ApiJson)
    }
}

pub fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize(&mut de).map_err(rejection_error)?;
    de.end()
        .map_err(|err| ServerError::invalid(NON_FIELD_ERRORS, strip_location(&err.to_string())))?;
    Ok(value)
}

fn rejection_error(err: serde_path_to_error::Error<serde_json::Error>) -> ServerError {
    let message = strip_location(&err.inner().to_string()).to_string();

    if err.inner().classify() != Category::Data {
        return ServerError::invalid(NON_FIELD_ERRORS, format!("Malformed JSON: {}", message));
    }

    let field = match err.path().iter().next() {
        Some(Segment::Map { key }) => Some(key.clone()),
        _ => None,
    };

    match (field, missing_field(&message)) {
        // Missing at the top level: the path is empty, the name is in the message
        (None, Some(name)) => ServerError::invalid(name, "This field is required"),
        (Some(field), _) => ServerError::invalid(field, message),
        (None, None) => ServerError::invalid(NON_FIELD_ERRORS, message),
    }
}

/// Name out of serde's "missing field `name`" message
fn missing_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next().map(str::to_string)
}

fn strip_location(message: &str) -> &str {
    message
        .rsplit_once(" at line ")
        .map_or(message, |(text, _)| text)
}
