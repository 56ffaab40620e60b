//! HTTP entrypoint: the Axum fallback that routes every request to a reactor.
//!
//! The handler resolves the request against the registry's sorted
//! acceptors, builds an [`ExecutionContext`], runs the matched reactor,
//! and turns the finished context back into an HTTP response. The reactor
//! runs on its own task, so a client that disconnects mid-request does not
//! cut the pipeline short.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::reactor::{ExecutionContext, GatewayRequest, ReactorHandler};
use crate::server::AppState;

pub const NO_MATCH_MESSAGE: &str = "No context-path matches the request URI.";

/// Run `ctx` through `reactor` on a separate task and wait for the end
/// handler. Dropping the returned future leaves the pipeline running to
/// completion. `None` when the reactor never handed the context back.
pub async fn dispatch(
    reactor: Arc<dyn ReactorHandler>,
    ctx: ExecutionContext,
) -> Option<ExecutionContext> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        reactor
            .handle(
                ctx,
                Box::new(move |ctx| {
                    let _ = tx.send(ctx);
                }),
            )
            .await;
    });
    rx.await.ok()
}

pub async fn handle_request(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = GatewayRequest::new(method, uri, headers, body)
        .with_server_id(state.server_id.as_str())
        .with_remote_address(addr);

    let resolved = state.registry.resolve_http(
        request.host.as_deref(),
        request.path(),
        Some(state.server_id.as_str()),
    );
    let Some((_, reactor)) = resolved else {
        tracing::debug!(
            request_id = %request.id,
            host = request.host.as_deref().unwrap_or("-"),
            path = %request.path(),
            "no reactor matched"
        );
        state.stats.unmatched.fetch_add(1, Ordering::Relaxed);
        return (StatusCode::NOT_FOUND, NO_MATCH_MESSAGE).into_response();
    };

    let request_id = request.id.clone();
    let Some(ctx) = dispatch(Arc::clone(&reactor), ExecutionContext::new(request)).await else {
        tracing::error!(
            request_id = %request_id,
            api_id = %reactor.id(),
            "reactor finished without handing back the context"
        );
        state.stats.failed.fetch_add(1, Ordering::Relaxed);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let (_, response, _) = ctx.into_parts();
    if response.status.is_server_error() {
        state.stats.failed.fetch_add(1, Ordering::Relaxed);
    } else {
        state.stats.handled.fetch_add(1, Ordering::Relaxed);
    }

    let mut builder = Response::builder().status(response.status);
    for (key, value) in &response.headers {
        builder = builder.header(key, value);
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| {
            tracing::error!(request_id = %request_id, error = %e, "failed to build response");
            StatusCode::BAD_GATEWAY.into_response()
        })
}
