//! Error types for the entity client.
//!
//! # Design
//! Per-exchange failures are not flattened into one message: a non-2xx
//! response whose body is JSON keeps that body as a `serde_json::Value` so
//! callers can branch on the server's own error shape. Only when the body is
//! not JSON does the error degrade to the status text.
//!
//! `UsageError` is kept apart from `RestError` because it is a programming
//! mistake reported before any future is created, not a network condition.

use serde_json::Value;
use thiserror::Error;

use crate::http::HttpRequest;

/// Failures of a single exchange, or of building its request.
#[derive(Debug, Error)]
pub enum RestError {
    /// The server answered with a non-2xx status and a JSON body.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: Value },

    /// The server answered with a non-2xx status and a body that is not JSON.
    #[error("HTTP {status}: {status_text}")]
    StatusText { status: u16, status_text: String },

    /// A 2xx body could not be decoded as the JSON its headers declared.
    #[error("response decoding failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The request body could not be serialized.
    #[error("request encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// No response was received (connect failure, timeout, I/O).
    #[error("transport failed: {0}")]
    Transport(String),

    /// A before-request hook aborted the exchange.
    #[error("request aborted by hook")]
    Aborted,

    /// A before-request hook rejected the exchange with a reason.
    #[error("request vetoed: {reason}")]
    Vetoed { reason: String },

    /// The options named a path that the entity schema does not declare.
    #[error("unknown path '{0}'")]
    UnknownPath(String),
}

impl RestError {
    /// The parsed error body, when the server sent one.
    pub fn body(&self) -> Option<&Value> {
        match self {
            RestError::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// The HTTP status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Status { status, .. } | RestError::StatusText { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// The failure side of every CRUD future.
///
/// `request` is the request that was (or would have been) sent; it is `None`
/// when the failure happened while building it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejection {
    #[source]
    pub error: RestError,
    pub request: Option<HttpRequest>,
}

impl Rejection {
    pub fn new(error: RestError, request: Option<HttpRequest>) -> Self {
        Self { error, request }
    }

    /// Failure raised before a request existed.
    pub fn unsent(error: RestError) -> Self {
        Self { error, request: None }
    }
}

/// Misuse of the API detected synchronously.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("model must be an instance of '{expected}', got '{actual}'")]
    ForeignModel { expected: String, actual: String },
}

/// Schema problems found while building a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("entity '{entity}' has no \"default\" path")]
    MissingDefaultPath { entity: String },

    #[error("entity '{entity}' declares field '{field}' more than once")]
    DuplicateField { entity: String, field: String },

    #[error("entity '{entity}' declares more than one primary field ('{first}', '{second}')")]
    MultiplePrimary {
        entity: String,
        first: String,
        second: String,
    },

    #[error("entity '{0}' is registered more than once")]
    DuplicateEntity(String),

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
}
