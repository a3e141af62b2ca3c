use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures talking to the hosted record store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable at '{path}': {reason}")]
    Unavailable { path: String, reason: String },

    #[error("Invalid store path '{0}'")]
    InvalidPath(String),

    #[error("Malformed data at '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn unavailable(path: &str, reason: impl ToString) -> Self {
        StoreError::Unavailable {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// User-facing account and permission errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Please verify your email address before signing in. Check your inbox for a verification email.")]
    EmailNotVerified,

    #[error("Access denied. Admins only.")]
    AccessDenied,

    #[error("Please fill in required fields: Property name, Rent, Agent name and phone.")]
    MissingFields,

    #[error("No user is currently signed in.")]
    NotSignedIn,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("PhoneNumber and Amount are required")]
    MissingFields,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = match self {
            PaymentError::MissingFields => StatusCode::BAD_REQUEST,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
