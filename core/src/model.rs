//! Materialized entity instances.
//!
//! # Design
//! A `Model` keeps one `FieldValue` per declared field. `Undefined` is kept
//! distinct from JSON `null`: a payload that sends `null` keeps it, while a
//! payload that omits the key leaves room for the schema default. Rendering a
//! model back to JSON drops undefined fields.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::client::{Entity, Exchanged, Options, Resolution};
use crate::error::Rejection;
use crate::schema::{FieldKind, Serializer};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Undefined,
    Json(Value),
    Nested(Box<Model>),
}

impl FieldValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, FieldValue::Undefined)
    }

    /// JSON view of the value; `None` when undefined.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            FieldValue::Undefined => None,
            FieldValue::Json(value) => Some(value.clone()),
            FieldValue::Nested(model) => Some(model.to_json()),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Undefined => false,
            FieldValue::Json(value) => is_truthy(value),
            FieldValue::Nested(_) => true,
        }
    }
}

impl From<Option<&Value>> for FieldValue {
    fn from(value: Option<&Value>) -> Self {
        value.cloned().map_or(FieldValue::Undefined, FieldValue::Json)
    }
}

/// `false`, `0`, `""` and `null` are falsy; everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Clone)]
pub struct Model {
    entity: Entity,
    fields: BTreeMap<String, FieldValue>,
}

impl Model {
    /// Build an instance of `entity` from a raw payload.
    ///
    /// Fields resolve in declaration order: the wire key wins over the field
    /// name when present, nested fields are wrapped recursively, and defaults
    /// fill whatever is still undefined. Serializer fields run last and see
    /// every other field already assigned.
    pub(crate) fn construct(entity: &Entity, raw: Option<&Value>, args: &[Value]) -> Model {
        let mut lineage = Vec::new();
        Self::construct_within(entity, raw, args, &mut lineage)
    }

    fn construct_within(
        entity: &Entity,
        raw: Option<&Value>,
        args: &[Value],
        lineage: &mut Vec<String>,
    ) -> Model {
        let payload = raw.and_then(Value::as_object);
        let mut model = Model {
            entity: entity.clone(),
            fields: BTreeMap::new(),
        };
        lineage.push(entity.name().to_string());

        let mut deferred: Vec<(&str, &Serializer)> = Vec::new();
        for (name, descriptor) in &entity.config().fields {
            if let FieldKind::Serializer(serializer) = &descriptor.kind {
                deferred.push((name.as_str(), serializer));
                continue;
            }

            let resolved = payload.and_then(|payload| {
                descriptor
                    .map_key
                    .as_deref()
                    .and_then(|key| payload.get(key))
                    .or_else(|| payload.get(name))
            });

            let mut value = match &descriptor.kind {
                FieldKind::Nested(target) => {
                    // An absent value for a type already being built would recurse forever.
                    let cyclic = resolved.is_none() && lineage.iter().any(|seen| seen == target);
                    match entity.registry().lookup(target) {
                        Some(nested) if !cyclic => FieldValue::Nested(Box::new(
                            Self::construct_within(&nested, resolved, args, lineage),
                        )),
                        _ => FieldValue::from(resolved),
                    }
                }
                _ => FieldValue::from(resolved),
            };

            if value.is_undefined() {
                if let Some(default) = descriptor.default_value() {
                    value = FieldValue::Json(default);
                }
            }
            model.fields.insert(name.clone(), value);
        }

        for (name, serializer) in deferred {
            let value = serializer(&model, args);
            model.fields.insert(name.to_string(), FieldValue::Json(value));
        }

        lineage.pop();
        model
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn entity_name(&self) -> &str {
        self.entity.name()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// JSON view of a field; `None` when absent or undefined.
    pub fn value(&self, field: &str) -> Option<Value> {
        self.fields.get(field).and_then(FieldValue::to_json)
    }

    pub fn nested(&self, field: &str) -> Option<&Model> {
        match self.fields.get(field) {
            Some(FieldValue::Nested(model)) => Some(model),
            _ => None,
        }
    }

    pub fn is_undefined(&self, field: &str) -> bool {
        self.fields.get(field).is_none_or(FieldValue::is_undefined)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields
            .insert(field.into(), FieldValue::Json(value.into()));
    }

    pub fn set_field(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn unset(&mut self, field: &str) {
        if let Some(value) = self.fields.get_mut(field) {
            *value = FieldValue::Undefined;
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// The value of the primary field, when the type declares one.
    pub fn primary_value(&self) -> Option<Value> {
        self.entity
            .primary_field()
            .and_then(|field| self.value(field))
    }

    /// Render the instance under its field names (not wire keys).
    pub fn to_json(&self) -> Value {
        let fields: Map<String, Value> = self
            .fields
            .iter()
            .filter_map(|(name, value)| value.to_json().map(|json| (name.clone(), json)))
            .collect();
        Value::Object(fields)
    }

    /// Create or update this instance; see `Entity::save`.
    pub async fn save(&mut self, options: Options) -> Result<Resolution<Exchanged>, Rejection> {
        let entity = self.entity.clone();
        entity.save_model(self, options).await
    }

    /// Delete this instance, addressed by `options.id` or its primary field.
    pub async fn delete(&self, options: Options) -> Result<Resolution<Exchanged>, Rejection> {
        let mut options = options;
        if !options.id.as_ref().is_some_and(is_truthy) {
            options.id = self.primary_value();
        }
        self.entity.delete(options).await
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.entity_name() == other.entity_name() && self.fields == other.fields
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("entity", &self.entity_name())
            .field("fields", &self.fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::registry::Registry;
    use crate::schema::{FieldDescriptor, ModelConfig};
    use crate::ureq_transport::UreqTransport;

    fn registry() -> Registry {
        Registry::builder(Arc::new(UreqTransport::new()))
            .entity(
                "Owner",
                ModelConfig::new()
                    .default_path("/owners")
                    .field("name", FieldDescriptor::new().map("full_name"))
                    .field("roles", FieldDescriptor::new().default_to(json!(["admin"]))),
            )
            .entity(
                "Item",
                ModelConfig::new()
                    .default_path("/items")
                    .field("id", FieldDescriptor::new().map("item_id").primary())
                    .field("name", FieldDescriptor::new().map("display_name"))
                    .field("done", FieldDescriptor::new().default_to(false))
                    .field("meta", FieldDescriptor::new().default_to(json!({"k": "v"})))
                    .field("owner", FieldDescriptor::new().nested("Owner"))
                    .field("ghost", FieldDescriptor::new().nested("Unregistered"))
                    .field(
                        "label",
                        FieldDescriptor::new().serializer(|model, args| {
                            let name = model.value("name").unwrap_or(Value::Null);
                            let suffix = args.first().cloned().unwrap_or(Value::Null);
                            json!(format!(
                                "{}{}",
                                name.as_str().unwrap_or("?"),
                                suffix.as_str().unwrap_or("")
                            ))
                        }),
                    ),
            )
            .entity(
                "Node",
                ModelConfig::new()
                    .default_path("/nodes")
                    .field("value", FieldDescriptor::new())
                    .field("next", FieldDescriptor::new().nested("Node")),
            )
            .entity("Empty", ModelConfig::new().default_path("/empty"))
            .build()
            .unwrap()
    }

    fn item(raw: Value) -> Model {
        registry().entity("Item").unwrap().construct(Some(&raw), &[])
    }

    #[test]
    fn default_fills_missing_field_and_input_is_kept() {
        let model = item(json!({"display_name": "lamp"}));
        assert_eq!(model.value("done"), Some(json!(false)));
        assert_eq!(model.value("name"), Some(json!("lamp")));
        assert!(model.is_undefined("id"));
    }

    #[test]
    fn container_defaults_become_empty() {
        let model = item(json!({}));
        assert_eq!(model.value("meta"), Some(json!({})));
        let owner = model.nested("owner").unwrap();
        assert_eq!(owner.value("roles"), Some(json!([])));
    }

    #[test]
    fn wire_key_wins_over_field_name() {
        let model = item(json!({"item_id": 7, "id": 3, "name": "local", "display_name": "wire"}));
        assert_eq!(model.value("id"), Some(json!(7)));
        assert_eq!(model.value("name"), Some(json!("wire")));
    }

    #[test]
    fn field_name_used_when_wire_key_absent() {
        let model = item(json!({"id": 3, "name": "local"}));
        assert_eq!(model.value("id"), Some(json!(3)));
        assert_eq!(model.value("name"), Some(json!("local")));
    }

    #[test]
    fn explicit_null_is_not_replaced_by_default() {
        let model = item(json!({"done": null}));
        assert_eq!(model.get("done"), Some(&FieldValue::Json(Value::Null)));
    }

    #[test]
    fn nested_field_wraps_registered_type() {
        let model = item(json!({"owner": {"full_name": "Ada"}}));
        let owner = model.nested("owner").unwrap();
        assert_eq!(owner.entity_name(), "Owner");
        assert_eq!(owner.value("name"), Some(json!("Ada")));
    }

    #[test]
    fn nested_field_with_unregistered_type_keeps_raw_value() {
        let model = item(json!({"ghost": {"boo": true}}));
        assert!(model.nested("ghost").is_none());
        assert_eq!(model.value("ghost"), Some(json!({"boo": true})));
    }

    #[test]
    fn serializer_sees_siblings_and_constructor_args() {
        let entity = registry().entity("Item").unwrap();
        let model = entity.construct(Some(&json!({"display_name": "lamp"})), &[json!("!")]);
        assert_eq!(model.value("label"), Some(json!("lamp!")));
    }

    #[test]
    fn self_nesting_stops_when_payload_runs_out() {
        let entity = registry().entity("Node").unwrap();
        let model = entity.construct(Some(&json!({"value": 1, "next": {"value": 2}})), &[]);
        let next = model.nested("next").unwrap();
        assert_eq!(next.value("value"), Some(json!(2)));
        assert!(next.is_undefined("next"));
    }

    #[test]
    fn empty_schema_builds_empty_shell() {
        let entity = registry().entity("Empty").unwrap();
        let model = entity.construct(Some(&json!({"anything": 1})), &[]);
        assert_eq!(model.field_names().count(), 0);
        assert_eq!(model.to_json(), json!({}));
    }

    #[test]
    fn non_object_payload_resolves_nothing() {
        let model = item(json!("not an object"));
        assert!(model.is_undefined("name"));
        assert_eq!(model.value("done"), Some(json!(false)));
    }

    #[test]
    fn to_json_omits_undefined_and_renders_nested() {
        let model = item(json!({"display_name": "lamp", "owner": {"full_name": "Ada"}}));
        let json = model.to_json();
        assert!(json.get("id").is_none());
        assert_eq!(json["owner"]["name"], "Ada");
        assert_eq!(json["label"], "lamp");
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&Value::Null));
        assert!(is_truthy(&json!(5)));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!([])));
    }
}
