//! Declarative REST entities.
//!
//! # Overview
//! Entity types are declared as schemas (fields, wire keys, defaults, nested
//! types, URL templates) on a `Registry`. Each registered type gets an
//! `Entity` handle exposing `save`, `get`, `all` and `delete`; responses are
//! materialized into `Model` instances following the schema.
//!
//! # Design
//! - The registry is sealed at `build()`: schemas are validated once, the
//!   primary field and the default `Consumer` are resolved per type.
//! - Request building is pure (`url`, `http`, `Consumer::request`); only the
//!   `Transport` trait performs I/O, so `generate_only` and tests can inspect
//!   URLs without a server.
//! - Global hooks and timeout live in `settings`; hooks return a
//!   `HookVerdict`, so a vetoed request still settles its future.

pub mod client;
pub mod error;
pub mod http;
pub mod model;
pub mod registry;
pub mod schema;
pub mod settings;
pub mod transport;
pub mod ureq_transport;
pub mod url;

pub use client::{Entity, Exchanged, Fetched, Listed, Options, Payload, Resolution};
pub use error::{Rejection, RestError, SchemaError, UsageError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, ResponseType};
pub use model::{FieldValue, Model};
pub use registry::{EntityType, Registry, RegistryBuilder};
pub use schema::{FieldDescriptor, FieldKind, ModelConfig, ResultField, DEFAULT_PATH};
pub use settings::{HookVerdict, Settings};
pub use transport::{CallHooks, Consumer, Exchange, Transport};
pub use ureq_transport::UreqTransport;
