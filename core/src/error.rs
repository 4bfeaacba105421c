//! Error types for the marketplace client.
//!
//! # Design
//! Every failure that can happen during a call ends up in `ApiError`, and
//! every variant renders to a non-empty message. Callers that prefer errors
//! as data use `to_json` (or `ApiResultExt::into_json`) to get the
//! `{"error": "<message>"}` object the marketplace tooling documents.

use serde_json::{json, Value};
use thiserror::Error;

/// Errors produced by the client, the transport, or configuration loading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced an HTTP response: DNS, connect, TLS,
    /// timeout, or a failure reading the body.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// A 2xx response body was not valid JSON.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The client could not be configured.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Plain-data form of the error: `{"error": "<message>"}`.
    pub fn to_json(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

/// Collapses a typed result into the plain JSON the marketplace wrappers
/// traditionally return: the decoded body on success, the error object
/// otherwise.
pub trait ApiResultExt {
    fn into_json(self) -> Value;
}

impl ApiResultExt for Result<Value, ApiError> {
    fn into_json(self) -> Value {
        match self {
            Ok(value) => value,
            Err(err) => err.to_json(),
        }
    }
}
