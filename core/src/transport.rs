//! One request/response exchange and the normalization of its outcome.
//!
//! # Design
//! `Transport` is the only piece that performs I/O. Everything around it is
//! plain data: a `Consumer` turns a path into an `Exchange` (absolute URL,
//! merged headers, encoded body) and `Exchange::exec` runs the hook gate,
//! calls the transport once, runs the after hooks and classifies the result.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Rejection, RestError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, ResponseType};
use crate::settings::{self, AfterHook, BeforeHook, HookVerdict};
use crate::url::path_join;

/// Executes exactly one HTTP exchange.
///
/// Implementations report every received response as `Ok`, whatever its
/// status; `Err` is reserved for exchanges that produced no response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, RestError>;
}

/// Per-call hooks, consulted after the process-wide ones.
#[derive(Clone, Default)]
pub struct CallHooks {
    pub before: Option<BeforeHook>,
    pub after: Option<AfterHook>,
}

/// A successful exchange: the decoded body and the request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchanged {
    pub response: Value,
    pub request: HttpRequest,
}

/// A transport client bound to one endpoint base URL and API path prefix.
#[derive(Clone)]
pub struct Consumer {
    base_url: String,
    api_path: String,
    transport: Arc<dyn Transport>,
}

impl Consumer {
    pub fn new(
        base_url: impl Into<String>,
        api_path: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_path: api_path.into(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_path(&self) -> &str {
        &self.api_path
    }

    /// Prepare a request for `path`, relative to this consumer's endpoint.
    pub fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
        headers: &[(String, String)],
    ) -> Result<Exchange, RestError> {
        let url = path_join([self.base_url.as_str(), self.api_path.as_str(), path]);
        let mut headers = headers.to_vec();
        let body = match body {
            Some(value) => {
                if !headers
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
                {
                    headers.push(("content-type".to_string(), "application/json".to_string()));
                }
                Some(serde_json::to_string(value).map_err(RestError::Encode)?)
            }
            None => None,
        };
        Ok(Exchange {
            request: HttpRequest {
                method,
                url,
                headers,
                body,
            },
            transport: Arc::clone(&self.transport),
        })
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("base_url", &self.base_url)
            .field("api_path", &self.api_path)
            .finish_non_exhaustive()
    }
}

/// A fully built request waiting to be executed.
pub struct Exchange {
    request: HttpRequest,
    transport: Arc<dyn Transport>,
}

impl Exchange {
    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Run the exchange: hooks, one transport call, after hooks, decoding.
    pub async fn exec(self, hooks: &CallHooks) -> Result<Exchanged, Rejection> {
        let settings = settings::current();
        let request = self.request;

        let gates = [settings.before_every_request.as_ref(), hooks.before.as_ref()];
        for hook in gates.into_iter().flatten() {
            match hook(&request) {
                HookVerdict::Proceed => {}
                HookVerdict::Abort => {
                    debug!(method = %request.method, url = %request.url, "request aborted by hook");
                    return Err(Rejection::new(RestError::Aborted, Some(request)));
                }
                HookVerdict::Reject(reason) => {
                    warn!(method = %request.method, url = %request.url, %reason, "request vetoed by hook");
                    return Err(Rejection::new(RestError::Vetoed { reason }, Some(request)));
                }
            }
        }

        debug!(method = %request.method, url = %request.url, "sending request");
        let outcome = self.transport.execute(&request, settings.timeout).await;

        let received = outcome.as_ref().ok();
        if let Some(after) = &settings.after_every_request {
            after(&request, received);
        }
        if let Some(after) = &hooks.after {
            after(&request, received);
        }

        match outcome.and_then(|response| normalize(&response)) {
            Ok(response) => Ok(Exchanged { response, request }),
            Err(error) => {
                debug!(method = %request.method, url = %request.url, %error, "request failed");
                Err(Rejection::new(error, Some(request)))
            }
        }
    }
}

/// Classify a received response and decode its body.
pub fn normalize(response: &HttpResponse) -> Result<Value, RestError> {
    if response.is_success() {
        decode_body(response)
    } else {
        Err(classify_failure(response))
    }
}

fn decode_body(response: &HttpResponse) -> Result<Value, RestError> {
    match response.response_type {
        ResponseType::Empty | ResponseType::Text => {
            let declares_json = response
                .header("content-type")
                .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"));
            if declares_json && !response.body.is_empty() {
                serde_json::from_str(&response.body).map_err(RestError::Decode)
            } else {
                Ok(Value::String(response.body.clone()))
            }
        }
        ResponseType::Json if response.body.is_empty() => Ok(Value::Null),
        ResponseType::Json => serde_json::from_str(&response.body).map_err(RestError::Decode),
        ResponseType::Other => Ok(Value::String(response.body.clone())),
    }
}

fn classify_failure(response: &HttpResponse) -> RestError {
    let text = if response.body.is_empty() {
        &response.status_text
    } else {
        &response.body
    };
    match serde_json::from_str::<Value>(text) {
        Ok(body) => RestError::Status {
            status: response.status,
            body,
        },
        Err(_) => RestError::StatusText {
            status: response.status,
            status_text: response.status_text.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Canned {
        response: Result<HttpResponse, String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Canned {
        async fn execute(
            &self,
            _request: &HttpRequest,
            _timeout: Option<Duration>,
        ) -> Result<HttpResponse, RestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone().map_err(RestError::Transport)
        }
    }

    fn response(status: u16, content_type: Option<&str>, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            status_text: match status {
                200 => "OK",
                404 => "Not Found",
                500 => "Internal Server Error",
                _ => "",
            }
            .to_string(),
            headers: content_type
                .map(|ct| vec![("Content-Type".to_string(), ct.to_string())])
                .unwrap_or_default(),
            body: body.to_string(),
            response_type: ResponseType::Empty,
        }
    }

    fn consumer(response: Result<HttpResponse, String>) -> (Consumer, Arc<Canned>) {
        let transport = Arc::new(Canned {
            response,
            calls: AtomicUsize::new(0),
        });
        (Consumer::new("http://api.test", "v1", transport.clone()), transport)
    }

    #[test]
    fn request_prefixes_endpoint_and_encodes_body() {
        let (consumer, _) = consumer(Ok(response(200, None, "")));
        let exchange = consumer
            .request(
                HttpMethod::Post,
                "/items",
                Some(&json!({"name": "lamp"})),
                &[("x-trace".to_string(), "1".to_string())],
            )
            .unwrap();
        let request = exchange.request();
        assert_eq!(request.url, "http://api.test/v1/items");
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header("x-trace"), Some("1"));
        let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"name": "lamp"}));
    }

    #[test]
    fn bodyless_request_has_no_content_type() {
        let (consumer, _) = consumer(Ok(response(200, None, "")));
        let exchange = consumer.request(HttpMethod::Get, "/items", None, &[]).unwrap();
        assert!(exchange.request().body.is_none());
        assert!(exchange.request().header("content-type").is_none());
    }

    #[test]
    fn json_content_type_is_parsed() {
        let decoded = normalize(&response(200, Some("application/json; charset=utf-8"), r#"{"id":1}"#));
        assert_eq!(decoded.unwrap(), json!({"id": 1}));
    }

    #[test]
    fn text_without_json_content_type_passes_through() {
        let decoded = normalize(&response(200, Some("text/plain"), "hello"));
        assert_eq!(decoded.unwrap(), json!("hello"));
    }

    #[test]
    fn declared_json_that_fails_to_parse_is_a_decode_error() {
        let err = normalize(&response(200, Some("application/json"), "{oops")).unwrap_err();
        assert!(matches!(err, RestError::Decode(_)));
    }

    #[test]
    fn json_response_type_parses_without_header() {
        let mut raw = response(201, None, "[1,2]");
        raw.response_type = ResponseType::Json;
        assert_eq!(normalize(&raw).unwrap(), json!([1, 2]));
    }

    #[test]
    fn error_body_is_parsed_when_json() {
        let err = normalize(&response(404, Some("application/json"), r#"{"error":"not found"}"#))
            .unwrap_err();
        match err {
            RestError::Status { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, json!({"error": "not found"}));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unparseable_error_body_falls_back_to_status_text() {
        let err = normalize(&response(500, None, "<html>boom</html>")).unwrap_err();
        match err {
            RestError::StatusText { status, status_text } => {
                assert_eq!(status, 500);
                assert_eq!(status_text, "Internal Server Error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exec_runs_after_hook_on_failure() {
        let (consumer, transport) = consumer(Ok(response(500, None, "")));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let hooks = CallHooks {
            before: None,
            after: Some(Arc::new(move |_req: &HttpRequest, res: Option<&HttpResponse>| {
                record.lock().unwrap().push(res.map(|r| r.status));
            })),
        };

        let exchange = consumer.request(HttpMethod::Get, "/items", None, &[]).unwrap();
        let rejection = exchange.exec(&hooks).await.unwrap_err();

        assert_eq!(rejection.error.status(), Some(500));
        assert_eq!(rejection.request.unwrap().url, "http://api.test/v1/items");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![Some(500)]);
    }

    #[tokio::test]
    async fn vetoed_exchange_never_reaches_transport() {
        let (consumer, transport) = consumer(Ok(response(200, None, "")));
        let hooks = CallHooks {
            before: Some(Arc::new(|_req: &HttpRequest| {
                HookVerdict::Reject("token refresh pending".to_string())
            })),
            after: None,
        };

        let exchange = consumer.request(HttpMethod::Get, "/items", None, &[]).unwrap();
        let rejection = exchange.exec(&hooks).await.unwrap_err();

        assert!(matches!(
            rejection.error,
            RestError::Vetoed { ref reason } if reason == "token refresh pending"
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_failure_reports_no_response_to_hooks() {
        let (consumer, _) = consumer(Err("connection refused".to_string()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let hooks = CallHooks {
            before: None,
            after: Some(Arc::new(move |_req: &HttpRequest, res: Option<&HttpResponse>| {
                record.lock().unwrap().push(res.is_some());
            })),
        };

        let exchange = consumer.request(HttpMethod::Delete, "/items/1", None, &[]).unwrap();
        let rejection = exchange.exec(&hooks).await.unwrap_err();

        assert!(matches!(rejection.error, RestError::Transport(_)));
        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }
}
