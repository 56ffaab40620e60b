//! Built-in processors wired around every reactor.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderName, HeaderValue, StatusCode};
use serde::Serialize;

use super::api::ReactorChains;
use super::chain::{ExecutionResult, Processor, ProcessorList};
use super::context::{ExecutionContext, ATTR_CONTEXT_PATH};
use crate::config::properties::{Configuration, X_FORWARDED_PREFIX};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-gatehouse-request-id");
pub const TRANSACTION_ID_HEADER: HeaderName =
    HeaderName::from_static("x-gatehouse-transaction-id");
pub const X_FORWARDED_PREFIX_HEADER: HeaderName = HeaderName::from_static("x-forwarded-prefix");

/// Processor chains with the built-in processors in place.
#[must_use]
pub fn builtin_chains(configuration: &Configuration) -> ReactorChains {
    let mut before_api_flows = ProcessorList::new("before-api-flows");
    if configuration.property(X_FORWARDED_PREFIX, false) {
        before_api_flows = before_api_flows.with(XForwardedPrefixProcessor);
    }

    ReactorChains {
        before_handle: Arc::new(
            ProcessorList::new("before-handle").with(TransactionIdProcessor),
        ),
        before_api_flows: Arc::new(before_api_flows),
        on_error: Arc::new(ProcessorList::new("on-error").with(FailureResponseProcessor)),
        after_handle: Arc::new(
            ProcessorList::new("after-handle").with(ResponseTimeProcessor),
        ),
        ..ReactorChains::default()
    }
}

/// Ensures request and transaction ids on the request and echoes them on
/// the response. An incoming transaction id is kept; otherwise the
/// request id doubles as the transaction id.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionIdProcessor;

#[async_trait]
impl Processor for TransactionIdProcessor {
    fn id(&self) -> &str {
        "transaction-id"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let request_id = ctx.request().id.clone();
        let transaction_id = ctx
            .request()
            .headers
            .get(&TRANSACTION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| request_id.clone(), str::to_string);

        let (Ok(request_value), Ok(transaction_value)) = (
            HeaderValue::from_str(&request_id),
            HeaderValue::from_str(&transaction_id),
        ) else {
            return Ok(());
        };

        let request = ctx.request_mut();
        request.transaction_id = Some(transaction_id);
        request.headers.insert(REQUEST_ID_HEADER, request_value.clone());
        request.headers.insert(TRANSACTION_ID_HEADER, transaction_value.clone());

        let response = ctx.response_mut();
        response.headers.insert(REQUEST_ID_HEADER, request_value);
        response.headers.insert(TRANSACTION_ID_HEADER, transaction_value);
        Ok(())
    }
}

/// Tells the backend which context path the gateway stripped.
#[derive(Debug, Clone, Copy, Default)]
pub struct XForwardedPrefixProcessor;

#[async_trait]
impl Processor for XForwardedPrefixProcessor {
    fn id(&self) -> &str {
        "x-forwarded-prefix"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let Some(prefix) = ctx
            .attribute(ATTR_CONTEXT_PATH)
            .and_then(serde_json::Value::as_str)
            .map(|cp| crate::acceptor::without_trailing_slash(cp).to_string())
        else {
            return Ok(());
        };

        if let Ok(value) = HeaderValue::from_str(&prefix) {
            ctx.request_mut().headers.insert(X_FORWARDED_PREFIX_HEADER, value);
        }
        Ok(())
    }
}

/// Records the gateway response time and writes the access log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseTimeProcessor;

#[async_trait]
impl Processor for ResponseTimeProcessor {
    fn id(&self) -> &str {
        "response-time"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let elapsed = ctx.request().timestamp.elapsed();
        let status = ctx.response().status.as_u16();
        let metrics = ctx.metrics_mut();
        metrics.gateway_response_time = Some(elapsed);
        metrics.status = status;

        let request = ctx.request();
        let metrics = ctx.metrics();
        tracing::info!(
            request_id = %request.id,
            api_id = metrics.api_id.as_deref().unwrap_or("-"),
            method = %request.method,
            path = %request.uri.path(),
            status,
            latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            endpoint_latency_ms = metrics
                .endpoint_response_time
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            error_key = metrics.error_key.as_deref(),
            "request completed"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct FailureBody<'a> {
    message: &'a str,
    http_status_code: u16,
}

/// Renders the recorded failure, or a plain 500 when there is none.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureResponseProcessor;

#[async_trait]
impl Processor for FailureResponseProcessor {
    fn id(&self) -> &str {
        "failure-response"
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let (status, message, content_type) = match ctx.failure() {
            Some(failure) => (
                failure.status(),
                failure
                    .message()
                    .map(str::to_string)
                    .or_else(|| failure.status().canonical_reason().map(str::to_string)),
                failure.content_type().map(str::to_string),
            ),
            None => (StatusCode::INTERNAL_SERVER_ERROR, None, None),
        };
        let message = message.unwrap_or_else(|| "Internal Server Error".to_string());

        let body = serde_json::to_vec(&FailureBody {
            message: &message,
            http_status_code: status.as_u16(),
        })
        .map_err(crate::reactor::ExecutionError::unexpected)?;

        let content_type = content_type
            .and_then(|ct| HeaderValue::from_str(&ct).ok())
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));

        let response = ctx.response_mut();
        response.status = status;
        response.headers.insert(CONTENT_TYPE, content_type);
        response.body = Bytes::from(body);
        Ok(())
    }
}
