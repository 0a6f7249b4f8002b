//! Sealed registry of entity types.
//!
//! # Design
//! All entity types are declared up front on a `RegistryBuilder` and frozen by
//! `build()`. Registration validates each schema and resolves the two per-type
//! facts that never change afterwards: the primary field and the default
//! `Consumer`. Nested field types are looked up in the same registry, so the
//! set of types a field can wrap is closed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::client::Entity;
use crate::error::SchemaError;
use crate::schema::{ModelConfig, DEFAULT_PATH};
use crate::transport::{Consumer, Transport};

/// One registered entity type.
#[derive(Debug)]
pub struct EntityType {
    name: String,
    config: ModelConfig,
    primary_field: Option<String>,
    consumer: Consumer,
}

impl EntityType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn primary_field(&self) -> Option<&str> {
        self.primary_field.as_deref()
    }

    /// The consumer built from the schema's endpoint and API path names.
    pub fn consumer(&self) -> &Consumer {
        &self.consumer
    }
}

pub struct RegistryBuilder {
    transport: Arc<dyn Transport>,
    endpoints: BTreeMap<String, String>,
    api_paths: BTreeMap<String, String>,
    entities: Vec<(String, ModelConfig)>,
}

impl RegistryBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            endpoints: BTreeMap::new(),
            api_paths: BTreeMap::new(),
            entities: Vec::new(),
        }
    }

    /// Map an endpoint name to its base URL.
    pub fn endpoint(mut self, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.endpoints.insert(name.into(), base_url.into());
        self
    }

    /// Map an API path name to its URL prefix.
    pub fn api_path(mut self, name: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.api_paths.insert(name.into(), prefix.into());
        self
    }

    pub fn entity(mut self, name: impl Into<String>, config: ModelConfig) -> Self {
        self.entities.push((name.into(), config));
        self
    }

    pub fn build(self) -> Result<Registry, SchemaError> {
        let mut inner = RegistryInner {
            transport: self.transport,
            endpoints: self.endpoints,
            api_paths: self.api_paths,
            entities: BTreeMap::new(),
        };

        for (name, config) in self.entities {
            if inner.entities.contains_key(&name) {
                return Err(SchemaError::DuplicateEntity(name));
            }
            let primary_field = validate(&name, &config)?;
            let consumer = inner.consumer(
                config.endpoint_name.as_deref(),
                config.api_path_name.as_deref(),
            );
            debug!(
                entity = %name,
                fields = config.fields.len(),
                primary = primary_field.as_deref().unwrap_or("-"),
                base_url = consumer.base_url(),
                "registered entity type"
            );
            let entity = EntityType {
                name: name.clone(),
                config,
                primary_field,
                consumer,
            };
            inner.entities.insert(name, Arc::new(entity));
        }

        Ok(Registry {
            inner: Arc::new(inner),
        })
    }
}

/// Check a schema and return its primary field.
fn validate(entity: &str, config: &ModelConfig) -> Result<Option<String>, SchemaError> {
    if !config.paths.contains_key(DEFAULT_PATH) {
        return Err(SchemaError::MissingDefaultPath {
            entity: entity.to_string(),
        });
    }

    let mut primary: Option<&str> = None;
    for (index, (field, descriptor)) in config.fields.iter().enumerate() {
        if config.fields[..index].iter().any(|(seen, _)| seen == field) {
            return Err(SchemaError::DuplicateField {
                entity: entity.to_string(),
                field: field.clone(),
            });
        }
        if descriptor.primary {
            if let Some(first) = primary {
                return Err(SchemaError::MultiplePrimary {
                    entity: entity.to_string(),
                    first: first.to_string(),
                    second: field.clone(),
                });
            }
            primary = Some(field.as_str());
        }
    }
    Ok(primary.map(str::to_string))
}

struct RegistryInner {
    transport: Arc<dyn Transport>,
    endpoints: BTreeMap<String, String>,
    api_paths: BTreeMap<String, String>,
    entities: BTreeMap<String, Arc<EntityType>>,
}

impl RegistryInner {
    /// Unregistered names are taken literally as the base URL or prefix.
    fn consumer(&self, endpoint_name: Option<&str>, api_path_name: Option<&str>) -> Consumer {
        let resolve = |names: &BTreeMap<String, String>, name: Option<&str>| match name {
            Some(name) => names.get(name).cloned().unwrap_or_else(|| name.to_string()),
            None => String::new(),
        };
        Consumer::new(
            resolve(&self.endpoints, endpoint_name),
            resolve(&self.api_paths, api_path_name),
            Arc::clone(&self.transport),
        )
    }
}

/// A frozen set of entity types sharing one transport. Cheap to clone.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn builder(transport: Arc<dyn Transport>) -> RegistryBuilder {
        RegistryBuilder::new(transport)
    }

    pub fn entity(&self, name: &str) -> Result<Entity, SchemaError> {
        self.lookup(name)
            .ok_or_else(|| SchemaError::UnknownEntity(name.to_string()))
    }

    /// The entity handle for `name`, if it is registered here.
    pub fn lookup(&self, name: &str) -> Option<Entity> {
        self.inner
            .entities
            .get(name)
            .map(|ty| Entity::new(self.clone(), Arc::clone(ty)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.entities.contains_key(name)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.inner.entities.keys().map(String::as_str)
    }

    /// A consumer for an explicit pair of endpoint and API path names.
    pub fn consumer(&self, endpoint_name: Option<&str>, api_path_name: Option<&str>) -> Consumer {
        self.inner.consumer(endpoint_name, api_path_name)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.inner.entities.keys().collect::<Vec<_>>())
            .field("endpoints", &self.inner.endpoints)
            .field("api_paths", &self.inner.api_paths)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;
    use crate::ureq_transport::UreqTransport;

    fn builder() -> RegistryBuilder {
        Registry::builder(Arc::new(UreqTransport::new()))
    }

    #[test]
    fn caches_primary_field_and_consumer() {
        let registry = builder()
            .endpoint("main", "http://localhost:3000")
            .api_path("v1", "/api/v1")
            .entity(
                "Item",
                ModelConfig::new()
                    .default_path("/items")
                    .endpoint("main")
                    .api_path("v1")
                    .field("name", FieldDescriptor::new())
                    .field("id", FieldDescriptor::new().map("item_id").primary()),
            )
            .build()
            .unwrap();

        let item = registry.entity("Item").unwrap();
        assert_eq!(item.primary_field(), Some("id"));
        assert_eq!(item.consumer().base_url(), "http://localhost:3000");
        assert_eq!(item.consumer().api_path(), "/api/v1");
    }

    #[test]
    fn unregistered_names_are_used_literally() {
        let registry = builder()
            .entity(
                "Item",
                ModelConfig::new()
                    .default_path("/items")
                    .endpoint("http://example.test"),
            )
            .build()
            .unwrap();
        let consumer = registry.entity("Item").unwrap().consumer().clone();
        assert_eq!(consumer.base_url(), "http://example.test");
        assert_eq!(consumer.api_path(), "");
    }

    #[test]
    fn rejects_schema_without_default_path() {
        let err = builder()
            .entity("Item", ModelConfig::new().path("list", "/items"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingDefaultPath {
                entity: "Item".to_string()
            }
        );
    }

    #[test]
    fn rejects_duplicate_fields() {
        let err = builder()
            .entity(
                "Item",
                ModelConfig::new()
                    .default_path("/items")
                    .field("name", FieldDescriptor::new())
                    .field("name", FieldDescriptor::new().map("title")),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { ref field, .. } if field == "name"));
    }

    #[test]
    fn rejects_second_primary_field() {
        let err = builder()
            .entity(
                "Item",
                ModelConfig::new()
                    .default_path("/items")
                    .field("id", FieldDescriptor::new().primary())
                    .field("uuid", FieldDescriptor::new().primary()),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::MultiplePrimary {
                entity: "Item".to_string(),
                first: "id".to_string(),
                second: "uuid".to_string(),
            }
        );
    }

    #[test]
    fn rejects_duplicate_entity_names() {
        let config = ModelConfig::new().default_path("/items");
        let err = builder()
            .entity("Item", config.clone())
            .entity("Item", config)
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateEntity("Item".to_string()));
    }

    #[test]
    fn unknown_entity_lookup_fails() {
        let registry = builder().build().unwrap();
        assert!(registry.lookup("Ghost").is_none());
        assert_eq!(
            registry.entity("Ghost").unwrap_err(),
            SchemaError::UnknownEntity("Ghost".to_string())
        );
    }
}
