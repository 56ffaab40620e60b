//! Forwarding of requests to an API's backend endpoint.
//!
//! [`EndpointInvoker`] is the default [`Invoker`] of a reactor. It sends
//! the request to `endpoint.target` followed by the path below the
//! matched context path, using the shared hyper client, and copies the
//! endpoint response onto the execution context. Header construction
//! lives in [`headers`].

pub mod headers;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::StatusCode;
use http_body_util::{BodyExt, Full};

use crate::config::model::Endpoint;
use crate::error::GatehouseError;
use crate::reactor::{ExecutionContext, ExecutionError, ExecutionFailure, ExecutionResult, Invoker};
use crate::server::HttpClient;

pub const CONNECTION_ERROR_KEY: &str = "GATEWAY_CLIENT_CONNECTION_ERROR";
pub const CONNECTION_TIMEOUT_KEY: &str = "GATEWAY_CLIENT_CONNECTION_TIMEOUT";

pub struct EndpointInvoker {
    id: String,
    target: String,
    timeout: Option<Duration>,
    client: HttpClient,
}

impl EndpointInvoker {
    /// `default_timeout` applies when the endpoint sets none.
    pub fn new(
        api_id: &str,
        endpoint: &Endpoint,
        client: HttpClient,
        default_timeout: Option<Duration>,
    ) -> Result<Self, GatehouseError> {
        url::Url::parse(&endpoint.target).map_err(|source| GatehouseError::EndpointUrl {
            url: endpoint.target.clone(),
            source,
        })?;

        Ok(Self {
            id: format!("{api_id}-endpoint"),
            target: endpoint.target.clone(),
            timeout: endpoint.timeout_ms.map(Duration::from_millis).or(default_timeout),
            client,
        })
    }

    /// Endpoint URL for a request path below the context path.
    #[must_use]
    pub fn target_for(&self, path_info: &str, query: Option<&str>) -> String {
        let base = self.target.trim_end_matches('/');
        let mut url = if path_info.is_empty() || path_info == "/" {
            if self.target.ends_with('/') {
                format!("{base}/")
            } else {
                base.to_string()
            }
        } else if path_info.starts_with('/') {
            format!("{base}{path_info}")
        } else {
            format!("{base}/{path_info}")
        };

        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

#[async_trait]
impl Invoker for EndpointInvoker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let request = ctx.request();
        let target = self.target_for(&request.path_info, request.uri.query());
        let target_url = url::Url::parse(&target).map_err(ExecutionError::unexpected)?;
        let client_ip = request.remote_address.map(|addr| addr.ip().to_string());
        let forwarded = headers::build_forwarded_headers(&request.headers, client_ip.as_deref(), &target_url);

        let mut builder = hyper::Request::builder()
            .method(request.method.clone())
            .uri(target.as_str());
        for (key, value) in &forwarded {
            builder = builder.header(key, value);
        }
        let outbound = builder
            .body(Full::new(request.body.clone()))
            .map_err(ExecutionError::unexpected)?;

        let request_id = request.id.clone();
        ctx.metrics_mut().endpoint = Some(target.clone());

        let started = Instant::now();
        let sent = self.client.request(outbound);
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, sent).await.ok(),
            None => Some(sent.await),
        };

        let response = match result {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                tracing::warn!(
                    request_id = %request_id,
                    target = %target,
                    error = %e,
                    "endpoint connection failed"
                );
                return Err(ctx.interrupt_with(
                    ExecutionFailure::new(StatusCode::BAD_GATEWAY.as_u16())
                        .with_key(CONNECTION_ERROR_KEY)
                        .with_message("Bad Gateway"),
                ));
            }
            None => {
                tracing::warn!(
                    request_id = %request_id,
                    target = %target,
                    "endpoint request timed out"
                );
                return Err(ctx.interrupt_with(
                    ExecutionFailure::new(StatusCode::GATEWAY_TIMEOUT.as_u16())
                        .with_key(CONNECTION_TIMEOUT_KEY)
                        .with_message("Gateway Timeout"),
                ));
            }
        };

        let status = response.status();
        let mut response_headers = response.headers().clone();
        let body = match response.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    target = %target,
                    error = %e,
                    "failed to read endpoint response body"
                );
                return Err(ctx.interrupt_with(
                    ExecutionFailure::new(StatusCode::BAD_GATEWAY.as_u16())
                        .with_key(CONNECTION_ERROR_KEY)
                        .with_message("Bad Gateway"),
                ));
            }
        };
        headers::strip_response_hop_by_hop(&mut response_headers);

        tracing::debug!(
            request_id = %request_id,
            target = %target,
            status = status.as_u16(),
            latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "endpoint responded"
        );

        let out = ctx.response_mut();
        out.status = status;
        out.headers.extend(response_headers);
        out.body = body;
        Ok(())
    }
}
