//! Executes `HttpRequest` values over the network.
//!
//! # Design
//! `Transport` is the only I/O seam in the crate. `MlHttpClient` owns one
//! transport for its whole lifetime, so connections are pooled across calls
//! instead of a fresh HTTP client being built per request. Tests substitute
//! scripted transports.
//!
//! `UreqTransport` disables ureq's status-as-error behaviour: 4xx and 5xx
//! come back as data, because asserting on them is the caller's job.

use tracing::trace;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody};

pub trait Transport {
    /// Send `request` and return the response with its body fully read.
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a pooled `ureq::Agent`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    pub fn from_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let result = match (method, body) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(&url), &headers).call(),
            (HttpMethod::Delete, _) => with_headers(self.agent.delete(&url), &headers).call(),
            (HttpMethod::Post, None) => with_headers(self.agent.post(&url), &headers).send_empty(),
            (HttpMethod::Post, Some(RequestBody::Json(json))) => {
                with_headers(self.agent.post(&url), &headers).send(json.as_bytes())
            }
            (HttpMethod::Post, Some(RequestBody::Multipart(form))) => {
                let encoded = form.encode();
                with_headers(self.agent.post(&url), &headers).send(&encoded[..])
            }
        };
        let mut response = result?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        // Draining the body hands the connection back to the agent's pool.
        let body = response.body_mut().read_to_string()?;
        trace!(%method, %url, status, bytes = body.len(), "response drained");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
