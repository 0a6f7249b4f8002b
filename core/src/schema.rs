//! Declarative entity schemas.
//!
//! # Design
//! A field is described by a tagged `FieldKind` rather than by inspecting
//! values at runtime: a field is either copied from the payload (`Plain`),
//! wrapped into another registered entity type (`Nested`), or computed after
//! every other field is assigned (`Serializer`). Nested types are referenced
//! by registered name and resolved against the registry that owns the schema.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::model::Model;

/// Name of the path every schema must declare.
pub const DEFAULT_PATH: &str = "default";

/// Computes a field from the partially built model and the extra
/// constructor arguments.
pub type Serializer = Arc<dyn Fn(&Model, &[Value]) -> Value + Send + Sync>;

/// Projects a raw response onto whatever shape the caller wants.
pub type Projection = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Clone, Default)]
pub enum FieldKind {
    #[default]
    Plain,
    /// Wrap the value as an instance of the named entity type.
    Nested(String),
    Serializer(Serializer),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Plain => f.write_str("Plain"),
            FieldKind::Nested(entity) => f.debug_tuple("Nested").field(entity).finish(),
            FieldKind::Serializer(_) => f.write_str("Serializer(..)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldDescriptor {
    /// Wire name, when it differs from the field name.
    pub map_key: Option<String>,
    pub primary: bool,
    pub default: Option<Value>,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, wire_key: impl Into<String>) -> Self {
        self.map_key = Some(wire_key.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn default_to(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn nested(mut self, entity: impl Into<String>) -> Self {
        self.kind = FieldKind::Nested(entity.into());
        self
    }

    pub fn serializer<F>(mut self, serializer: F) -> Self
    where
        F: Fn(&Model, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.kind = FieldKind::Serializer(Arc::new(serializer));
        self
    }

    /// The key this field travels under on the wire.
    pub fn wire_key<'a>(&'a self, field: &'a str) -> &'a str {
        self.map_key.as_deref().unwrap_or(field)
    }

    /// The value an undefined field falls back to.
    ///
    /// Array and object defaults only declare the shape: they yield a fresh
    /// empty array or object, never the declared contents.
    pub fn default_value(&self) -> Option<Value> {
        match self.default.as_ref()? {
            Value::Array(_) => Some(Value::Array(Vec::new())),
            Value::Object(_) => Some(Value::Object(Map::new())),
            literal => Some(literal.clone()),
        }
    }
}

/// Where a single-entity or list result lives inside a response.
#[derive(Clone)]
pub enum ResultField {
    Key(String),
    Project(Projection),
}

impl ResultField {
    pub fn key(key: impl Into<String>) -> Self {
        ResultField::Key(key.into())
    }

    pub fn project<F>(projection: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        ResultField::Project(Arc::new(projection))
    }
}

impl From<&str> for ResultField {
    fn from(key: &str) -> Self {
        ResultField::Key(key.to_string())
    }
}

impl fmt::Debug for ResultField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultField::Key(key) => f.debug_tuple("Key").field(key).finish(),
            ResultField::Project(_) => f.write_str("Project(..)"),
        }
    }
}

/// Everything an entity type declares: fields, URL templates, headers and
/// where results sit in responses.
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    /// Fields in declaration order.
    pub fields: Vec<(String, FieldDescriptor)>,
    pub paths: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub endpoint_name: Option<String>,
    pub api_path_name: Option<String>,
    pub result_field: Option<ResultField>,
    pub result_list_field: Option<ResultField>,
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.push((name.into(), descriptor));
        self
    }

    pub fn path(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.paths.insert(name.into(), template.into());
        self
    }

    /// Shorthand for `path("default", template)`.
    pub fn default_path(self, template: impl Into<String>) -> Self {
        self.path(DEFAULT_PATH, template)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn endpoint(mut self, name: impl Into<String>) -> Self {
        self.endpoint_name = Some(name.into());
        self
    }

    pub fn api_path(mut self, name: impl Into<String>) -> Self {
        self.api_path_name = Some(name.into());
        self
    }

    pub fn result_field(mut self, field: impl Into<ResultField>) -> Self {
        self.result_field = Some(field.into());
        self
    }

    pub fn result_list_field(mut self, field: impl Into<ResultField>) -> Self {
        self.result_list_field = Some(field.into());
        self
    }

    pub fn descriptor(&self, field: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, descriptor)| descriptor)
    }

    /// Wire key for `field`; undeclared fields travel under their own name.
    pub fn wire_key<'a>(&'a self, field: &'a str) -> &'a str {
        match self.descriptor(field) {
            Some(descriptor) => descriptor.wire_key(field),
            None => field,
        }
    }
}
