//! Blocking `ureq` transport driven from async code.
//!
//! Each exchange builds a fresh agent so the configured timeout applies to
//! exactly that request, then runs the blocking call on tokio's blocking pool.
//! Status codes are never turned into errors here; classification happens in
//! `transport::normalize`.

use std::time::Duration;

use async_trait::async_trait;
use ureq::typestate::WithBody;
use ureq::RequestBuilder;

use crate::error::RestError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, ResponseType};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransport;

impl UreqTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, RestError> {
        let request = request.clone();
        tokio::task::spawn_blocking(move || send_blocking(&request, timeout))
            .await
            .map_err(|e| RestError::Transport(e.to_string()))?
    }
}

fn send_blocking(request: &HttpRequest, timeout: Option<Duration>) -> Result<HttpResponse, RestError> {
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(timeout)
        .build()
        .new_agent();

    let url = request.url.as_str();
    let body = request.body.as_deref();
    let result = match request.method {
        HttpMethod::Get => with_headers(agent.get(url), &request.headers).call(),
        HttpMethod::Delete => {
            let builder = with_headers(agent.delete(url), &request.headers);
            match body {
                Some(body) => builder.force_send_body().send(body.as_bytes()),
                None => builder.call(),
            }
        }
        HttpMethod::Post => send_with_body(with_headers(agent.post(url), &request.headers), body),
        HttpMethod::Put => send_with_body(with_headers(agent.put(url), &request.headers), body),
        HttpMethod::Patch => send_with_body(with_headers(agent.patch(url), &request.headers), body),
    };
    let mut response = result.map_err(|e| RestError::Transport(e.to_string()))?;

    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| RestError::Transport(e.to_string()))?;

    Ok(HttpResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body,
        response_type: ResponseType::Text,
    })
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_with_body(
    builder: RequestBuilder<WithBody>,
    body: Option<&str>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}
