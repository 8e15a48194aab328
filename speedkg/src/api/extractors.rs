use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;

use crate::error::KgError;

/// `axum::Json` whose rejections render in the v1 error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(KgError))]
pub struct AppJson<T>(pub T);

impl From<JsonRejection> for KgError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => {
                let message = err.body_text();
                match extract_missing_field(&message) {
                    Some(field) => KgError::Validation(format!("Missing required field: {field}")),
                    None => KgError::Validation(format!("Invalid JSON: {message}")),
                }
            }
            JsonRejection::JsonSyntaxError(err) => {
                KgError::Validation(format!("JSON syntax error: {}", err.body_text()))
            }
            JsonRejection::MissingJsonContentType(_) => {
                KgError::Validation("Missing `Content-Type: application/json` header".to_string())
            }
            JsonRejection::BytesRejection(_) => {
                KgError::Validation("Failed to read request body".to_string())
            }
            other => KgError::Validation(other.body_text()),
        }
    }
}

fn extract_missing_field(message: &str) -> Option<&str> {
    let prefix = "missing field `";
    let start = message.find(prefix)? + prefix.len();
    let remaining = message.get(start..)?;
    let end = remaining.find('`')?;
    remaining.get(..end)
}
