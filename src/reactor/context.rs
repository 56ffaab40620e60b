//! Per-request execution state shared by every pipeline stage.
//!
//! An [`ExecutionContext`] owns the inbound [`GatewayRequest`], the
//! [`GatewayResponse`] being built, free-form attributes, the invoker
//! selected for the request, request metrics, and the failure recorded
//! by [`ExecutionContext::interrupt_with`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};

use super::interrupt::{ExecutionError, ExecutionFailure};
use super::invoker::InvokerKind;

pub const ATTR_API: &str = "api";
pub const ATTR_API_NAME: &str = "api.name";
pub const ATTR_API_VERSION: &str = "api.version";
pub const ATTR_CONTEXT_PATH: &str = "context-path";
pub const ATTR_ENVIRONMENT: &str = "environment";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Request,
    Response,
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Request => "REQUEST",
            Self::Response => "RESPONSE",
        })
    }
}

#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub id: String,
    pub transaction_id: Option<String>,
    pub method: Method,
    pub uri: Uri,
    pub host: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_address: Option<SocketAddr>,
    pub server_id: Option<String>,
    /// Path below the matched context path, set when the request enters a reactor.
    pub path_info: String,
    pub timestamp: Instant,
}

impl GatewayRequest {
    #[must_use]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let host = headers
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.as_str().to_string()));
        let path_info = uri.path().to_string();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_id: None,
            method,
            uri,
            host,
            headers,
            body,
            remote_address: None,
            server_id: None,
            path_info,
            timestamp: Instant::now(),
        }
    }

    /// Body-less GET, mostly useful in tests.
    #[must_use]
    pub fn get(uri: &str) -> Self {
        let uri = uri.parse().unwrap_or_else(|_| Uri::from_static("/"));
        Self::new(Method::GET, uri, HeaderMap::new(), Bytes::new())
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        if let Ok(value) = HeaderValue::from_str(&host) {
            self.headers.insert(http::header::HOST, value);
        }
        self.host = Some(host);
        self
    }

    #[must_use]
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    #[must_use]
    pub const fn with_remote_address(mut self, addr: SocketAddr) -> Self {
        self.remote_address = Some(addr);
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    ended: bool,
}

impl Default for GatewayResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            ended: false,
        }
    }
}

impl GatewayResponse {
    /// Mark the response complete. Returns `false` if it was already ended.
    pub fn end(&mut self) -> bool {
        !std::mem::replace(&mut self.ended, true)
    }

    #[must_use]
    pub const fn ended(&self) -> bool {
        self.ended
    }
}

#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub api_id: Option<String>,
    pub api_name: Option<String>,
    pub path_info: Option<String>,
    pub endpoint: Option<String>,
    pub endpoint_response_time: Option<Duration>,
    pub gateway_response_time: Option<Duration>,
    pub status: u16,
    pub error_key: Option<String>,
    pub error_message: Option<String>,
}

pub struct ExecutionContext {
    request: GatewayRequest,
    response: GatewayResponse,
    attributes: HashMap<String, serde_json::Value>,
    invoker: Option<InvokerKind>,
    failure: Option<ExecutionFailure>,
    metrics: Metrics,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(request: GatewayRequest) -> Self {
        Self {
            request,
            response: GatewayResponse::default(),
            attributes: HashMap::new(),
            invoker: None,
            failure: None,
            metrics: Metrics::default(),
        }
    }

    #[must_use]
    pub const fn request(&self) -> &GatewayRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut GatewayRequest {
        &mut self.request
    }

    #[must_use]
    pub const fn response(&self) -> &GatewayResponse {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut GatewayResponse {
        &mut self.response
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<serde_json::Value> {
        self.attributes.remove(name)
    }

    #[must_use]
    pub const fn invoker(&self) -> Option<&InvokerKind> {
        self.invoker.as_ref()
    }

    pub fn set_invoker(&mut self, invoker: InvokerKind) {
        self.invoker = Some(invoker);
    }

    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut Metrics {
        &mut self.metrics
    }

    #[must_use]
    pub const fn failure(&self) -> Option<&ExecutionFailure> {
        self.failure.as_ref()
    }

    /// Benign early exit: the returned error is treated as success.
    #[must_use]
    pub fn interrupt(&mut self) -> ExecutionError {
        ExecutionError::Interrupted
    }

    /// Record `failure` on the context and return it as an error for `?`.
    #[must_use]
    pub fn interrupt_with(&mut self, failure: ExecutionFailure) -> ExecutionError {
        self.response.status = failure.status();
        self.metrics.error_key = failure.key().map(str::to_string);
        self.metrics.error_message = failure.message().map(str::to_string);
        self.failure = Some(failure.clone());
        ExecutionError::Failure(failure)
    }

    /// Split the context once the pipeline is done with it.
    #[must_use]
    pub fn into_parts(self) -> (GatewayRequest, GatewayResponse, Metrics) {
        (self.request, self.response, self.metrics)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("request_id", &self.request.id)
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .field("status", &self.response.status)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}
