//! CRUD operations over registered entity types.
//!
//! # Design
//! An `Entity` is a cheap handle (registry + entity type) that composes the
//! URL helpers, a `Consumer` and model construction into the four verbs.
//! Every verb builds its request completely before touching the network, so
//! `generate_only` can return the URL and stop there. Failures while building
//! a request (an unknown path name, an unencodable body) come back as a
//! `Rejection` with no request attached; only `save` on a model of another
//! type fails synchronously, with a `UsageError`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Rejection, RestError, UsageError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::model::{is_truthy, FieldValue, Model};
use crate::registry::{EntityType, Registry};
use crate::schema::{ModelConfig, ResultField, DEFAULT_PATH};
use crate::settings::{AfterHook, BeforeHook, HookVerdict};
use crate::transport::{CallHooks, Consumer, Exchange};
use crate::url::{append_query_params, encode_component, path_join, replace_url_params, value_to_string, Params};

pub use crate::transport::Exchanged;

/// Per-call options shared by all four verbs.
///
/// Fields that only one verb reads say so; the others ignore them.
#[derive(Clone, Default)]
pub struct Options {
    /// Path name in the schema; `"default"` when unset.
    pub path: Option<String>,
    pub path_data: Params,
    pub query_params: Params,
    /// Merged over the schema headers.
    pub headers: BTreeMap<String, String>,
    /// Build the request URL and stop.
    pub generate_only: bool,
    pub disable_auto_appended_id: bool,
    pub endpoint_name: Option<String>,
    pub api_path_name: Option<String>,
    pub before_request: Option<BeforeHook>,
    pub after_request: Option<AfterHook>,
    /// Body sent instead of the computed one (save, delete).
    pub data: Option<Value>,
    /// Extra arguments handed to serializers of constructed models.
    pub constructor_args: Vec<Value>,
    /// Fields of a partial update (save).
    pub patch: Option<Vec<String>>,
    /// Identifier to address (get, delete).
    pub id: Option<Value>,
    /// Overrides the schema's `result_field` (get).
    pub result_field: Option<ResultField>,
    /// Overrides the schema's `result_list_field` (all).
    pub result_list_field: Option<ResultField>,
    /// Entity type used for list items (all).
    pub result_list_item_type: Option<String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, name: impl Into<String>) -> Self {
        self.path = Some(name.into());
        self
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path_data.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn generate_only(mut self) -> Self {
        self.generate_only = true;
        self
    }

    pub fn disable_auto_appended_id(mut self) -> Self {
        self.disable_auto_appended_id = true;
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

    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HttpRequest) -> HookVerdict + Send + Sync + 'static,
    {
        self.before_request = Some(Arc::new(hook));
        self
    }

    pub fn after_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HttpRequest, Option<&HttpResponse>) + Send + Sync + 'static,
    {
        self.after_request = Some(Arc::new(hook));
        self
    }

    pub fn data(mut self, body: impl Into<Value>) -> Self {
        self.data = Some(body.into());
        self
    }

    pub fn constructor_args(mut self, args: Vec<Value>) -> Self {
        self.constructor_args = args;
        self
    }

    pub fn patch<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patch = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
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

    pub fn result_list_item_type(mut self, entity: impl Into<String>) -> Self {
        self.result_list_item_type = Some(entity.into());
        self
    }

    fn path_name(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_PATH)
    }

    fn hooks(&self) -> CallHooks {
        CallHooks {
            before: self.before_request.clone(),
            after: self.after_request.clone(),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("path", &self.path)
            .field("path_data", &self.path_data)
            .field("query_params", &self.query_params)
            .field("headers", &self.headers)
            .field("generate_only", &self.generate_only)
            .field("disable_auto_appended_id", &self.disable_auto_appended_id)
            .field("patch", &self.patch)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// How a CRUD future settled successfully.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Completed(T),
    /// `generate_only` was set; nothing was sent.
    Generated { request_url: String },
}

impl<T> Resolution<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Resolution::Completed(value) => Some(value),
            Resolution::Generated { .. } => None,
        }
    }

    pub fn request_url(&self) -> Option<&str> {
        match self {
            Resolution::Completed(_) => None,
            Resolution::Generated { request_url } => Some(request_url),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
        match self {
            Resolution::Completed(value) => Resolution::Completed(f(value)),
            Resolution::Generated { request_url } => Resolution::Generated { request_url },
        }
    }
}

/// What `get` extracted from the response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Model(Model),
    /// Return value of a `ResultField::Project`, passed through as-is.
    Projected(Value),
}

impl Payload {
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Payload::Model(model) => Some(model),
            Payload::Projected(_) => None,
        }
    }

    pub fn into_model(self) -> Option<Model> {
        match self {
            Payload::Model(model) => Some(model),
            Payload::Projected(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    /// `None` when the response was not a JSON object.
    pub model: Option<Payload>,
    pub response: Value,
    pub request: HttpRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listed {
    pub result_list: Vec<Model>,
    pub response: Value,
    pub request: HttpRequest,
}

/// Handle on one registered entity type.
#[derive(Clone)]
pub struct Entity {
    registry: Registry,
    ty: Arc<EntityType>,
}

impl Entity {
    pub(crate) fn new(registry: Registry, ty: Arc<EntityType>) -> Self {
        Self { registry, ty }
    }

    pub fn name(&self) -> &str {
        self.ty.name()
    }

    pub fn config(&self) -> &ModelConfig {
        self.ty.config()
    }

    pub fn primary_field(&self) -> Option<&str> {
        self.ty.primary_field()
    }

    /// The consumer cached for this type at registration.
    pub fn consumer(&self) -> &Consumer {
        self.ty.consumer()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Materialize a raw payload as an instance of this type.
    pub fn construct(&self, raw: Option<&Value>, args: &[Value]) -> Model {
        Model::construct(self, raw, args)
    }

    /// Shorthand for `construct(Some(raw), &[])`.
    pub fn from_json(&self, raw: &Value) -> Model {
        self.construct(Some(raw), &[])
    }

    /// Create (POST), fully update (PUT) or partially update (PATCH) `model`.
    ///
    /// A model whose primary field is empty is created and receives the
    /// identifier the server answers with. Otherwise `options.patch` selects a
    /// partial update of the listed fields, and its absence a full update.
    ///
    /// Returns `UsageError` right away when `model` belongs to another type.
    pub fn save<'m>(
        &self,
        model: &'m mut Model,
        options: Options,
    ) -> Result<impl Future<Output = Result<Resolution<Exchanged>, Rejection>> + Send + 'm, UsageError>
    {
        if !self.same_type(model.entity()) {
            return Err(UsageError::ForeignModel {
                expected: self.name().to_string(),
                actual: model.entity_name().to_string(),
            });
        }
        Ok(self.clone().save_model(model, options))
    }

    pub(crate) async fn save_model(
        self,
        model: &mut Model,
        options: Options,
    ) -> Result<Resolution<Exchanged>, Rejection> {
        let primary = self.primary_field();
        let id = primary
            .and_then(|field| model.value(field))
            .filter(is_truthy);

        let method = match (&id, &options.patch) {
            (None, _) => HttpMethod::Post,
            (Some(_), Some(_)) => HttpMethod::Patch,
            (Some(_), None) => HttpMethod::Put,
        };
        let body = match &options.data {
            Some(data) => data.clone(),
            None => self.save_body(model, method, options.patch.as_deref()),
        };

        let template = self.template(options.path_name()).map_err(Rejection::unsent)?;
        let id_segment = encode_component(&id.as_ref().map(value_to_string).unwrap_or_default());
        let path = if options.disable_auto_appended_id {
            template.to_string()
        } else {
            path_join([template, id_segment.as_str()])
        };
        let url = append_query_params(&replace_url_params(&path, &options.path_data), &options.query_params);

        let exchange = self.prepare(method, &url, Some(&body), &options)?;
        if options.generate_only {
            return Ok(self.generated(exchange));
        }

        let done = exchange.exec(&options.hooks()).await?;
        if method == HttpMethod::Post {
            if let Some(field) = primary {
                let assigned = done.response.get(self.config().wire_key(field));
                model.set_field(field, FieldValue::from(assigned));
            }
        }
        Ok(Resolution::Completed(done))
    }

    /// Wire body for `save`: included fields under their wire keys, undefined
    /// values left out, and no primary key unless this is a PATCH.
    fn save_body(&self, model: &Model, method: HttpMethod, patch: Option<&[String]>) -> Value {
        let config = self.config();
        let fields: Vec<&str> = match patch {
            Some(fields) => fields.iter().map(String::as_str).collect(),
            None => model.field_names().collect(),
        };

        let mut body = Map::new();
        for field in fields {
            if let Some(value) = model.value(field) {
                body.insert(config.wire_key(field).to_string(), value);
            }
        }
        if method != HttpMethod::Patch {
            if let Some(primary) = self.primary_field() {
                body.remove(config.wire_key(primary));
            }
        }
        Value::Object(body)
    }

    /// Fetch one instance.
    ///
    /// A truthy `options.id` fills the `id` path placeholder (unless one is
    /// already given) and, on the default path, is appended as a segment.
    pub async fn get(&self, options: Options) -> Result<Resolution<Fetched>, Rejection> {
        let path_name = options.path_name();
        let mut template = self.template(path_name).map_err(Rejection::unsent)?.to_string();
        let mut path_data = options.path_data.clone();

        if let Some(id) = options.id.as_ref().filter(|id| is_truthy(id)) {
            if !options.disable_auto_appended_id {
                if !path_data.get("id").is_some_and(is_truthy) {
                    path_data.insert("id".to_string(), id.clone());
                }
                if path_name == DEFAULT_PATH {
                    template = path_join([template.as_str(), "{id}"]);
                }
            }
        }
        let url = append_query_params(&replace_url_params(&template, &path_data), &options.query_params);

        let exchange = self.prepare(HttpMethod::Get, &url, None, &options)?;
        if options.generate_only {
            return Ok(self.generated(exchange));
        }

        let done = exchange.exec(&options.hooks()).await?;
        let result_field = options
            .result_field
            .as_ref()
            .or(self.config().result_field.as_ref());
        let model = done.response.as_object().map(|object| match result_field {
            Some(ResultField::Project(project)) => Payload::Projected(project(&done.response)),
            Some(ResultField::Key(key)) if object.get(key).is_some_and(is_truthy) => {
                Payload::Model(self.construct(object.get(key), &options.constructor_args))
            }
            _ => Payload::Model(self.construct(Some(&done.response), &options.constructor_args)),
        });

        Ok(Resolution::Completed(Fetched {
            model,
            response: done.response,
            request: done.request,
        }))
    }

    /// Fetch a list of instances into a new vector.
    pub async fn all(&self, options: Options) -> Result<Resolution<Listed>, Rejection> {
        let mut result_list = Vec::new();
        let resolution = self.all_into(&mut result_list, options).await?;
        Ok(resolution.map(|done| Listed {
            result_list,
            response: done.response,
            request: done.request,
        }))
    }

    /// Fetch a list of instances into `result_list`.
    ///
    /// On success the list is cleared and refilled in place; on failure or in
    /// `generate_only` mode it is left untouched. Items that are not JSON
    /// objects are skipped.
    pub async fn all_into(
        &self,
        result_list: &mut Vec<Model>,
        options: Options,
    ) -> Result<Resolution<Exchanged>, Rejection> {
        let template = self.template(options.path_name()).map_err(Rejection::unsent)?;
        let url = append_query_params(
            &replace_url_params(template, &options.path_data),
            &options.query_params,
        );

        let exchange = self.prepare(HttpMethod::Get, &url, None, &options)?;
        if options.generate_only {
            return Ok(self.generated(exchange));
        }

        let done = exchange.exec(&options.hooks()).await?;
        let list_field = options
            .result_list_field
            .as_ref()
            .or(self.config().result_list_field.as_ref());
        let extracted = match list_field {
            Some(ResultField::Project(project)) => project(&done.response),
            Some(ResultField::Key(key)) if done.response.get(key).is_some_and(Value::is_array) => {
                done.response[key.as_str()].clone()
            }
            _ => done.response.clone(),
        };

        let item_type = options
            .result_list_item_type
            .as_deref()
            .and_then(|name| self.registry.lookup(name))
            .unwrap_or_else(|| self.clone());

        result_list.clear();
        if let Value::Array(items) = &extracted {
            result_list.extend(
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .map(|item| item_type.construct(Some(item), &options.constructor_args)),
            );
        }
        Ok(Resolution::Completed(done))
    }

    /// Delete the instance addressed by `options.id`.
    pub async fn delete(&self, options: Options) -> Result<Resolution<Exchanged>, Rejection> {
        let template = self.template(options.path_name()).map_err(Rejection::unsent)?;
        let id = options
            .id
            .as_ref()
            .filter(|id| is_truthy(id))
            .map(value_to_string)
            .unwrap_or_default();
        let path = if options.disable_auto_appended_id {
            template.to_string()
        } else {
            path_join([template, encode_component(&id).as_str()])
        };
        let url = append_query_params(&replace_url_params(&path, &options.path_data), &options.query_params);

        let exchange = self.prepare(HttpMethod::Delete, &url, options.data.as_ref(), &options)?;
        if options.generate_only {
            return Ok(self.generated(exchange));
        }
        exchange.exec(&options.hooks()).await.map(Resolution::Completed)
    }

    /// Identity of the registered type, not just its name: a model built by
    /// another registry never matches.
    fn same_type(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.ty, &other.ty)
    }

    fn template(&self, path: &str) -> Result<&str, RestError> {
        self.config()
            .paths
            .get(path)
            .map(String::as_str)
            .ok_or_else(|| RestError::UnknownPath(path.to_string()))
    }

    /// The cached consumer, unless the call overrides endpoint or API path.
    fn consumer_for(&self, options: &Options) -> Consumer {
        if options.endpoint_name.is_none() && options.api_path_name.is_none() {
            return self.consumer().clone();
        }
        let config = self.config();
        self.registry.consumer(
            options
                .endpoint_name
                .as_deref()
                .or(config.endpoint_name.as_deref()),
            options
                .api_path_name
                .as_deref()
                .or(config.api_path_name.as_deref()),
        )
    }

    fn prepare(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&Value>,
        options: &Options,
    ) -> Result<Exchange, Rejection> {
        let mut headers = self.config().headers.clone();
        headers.extend(options.headers.clone());
        let headers: Vec<(String, String)> = headers.into_iter().collect();
        self.consumer_for(options)
            .request(method, url, body, &headers)
            .map_err(Rejection::unsent)
    }

    fn generated<T>(&self, exchange: Exchange) -> Resolution<T> {
        debug!(entity = %self.name(), url = %exchange.url(), "generated request url");
        Resolution::Generated {
            request_url: exchange.url().to_string(),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name())
            .field("primary_field", &self.primary_field())
            .finish_non_exhaustive()
    }
}
