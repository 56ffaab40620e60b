//! Gatehouse is the request routing and per-API execution core of an API
//! gateway.
//!
//! Every deployed API becomes a reactor. Inbound requests are matched
//! against the sorted acceptors of all reactors; the winning reactor runs
//! the request through its processor and flow chains, invokes the
//! backend endpoint under a request deadline, and hands the finished
//! exchange back to the server. Reactors are deployed, updated, and
//! undeployed from events, and drain their pending requests on stop.
//!
//! # Architecture
//!
//! - [`acceptor`] -- Host/path, access-point group, and SNI acceptors with
//!   their total resolution order.
//! - [`access_point`] -- Registry of externally managed access points.
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, routes).
//! - [`config`] -- Configuration loading, validation, and hot-reloading via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`entrypoint`] -- Axum fallback handler resolving requests to reactors.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`event`] -- In-process deploy event topics.
//! - [`health`] -- `GET /_gatehouse/health` handler returning runtime diagnostics.
//! - [`lifecycle`] -- Node state and the start/stop component contract.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`proxy`] -- Endpoint invoker forwarding requests to backends.
//! - [`reactor`] -- The per-API execution pipeline, its registry, and the
//!   deploy event listener.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `sentry-integration` | Sentry error tracking |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod acceptor;
pub mod access_point;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod entrypoint;
pub mod error;
pub mod event;
pub mod health;
pub mod lifecycle;
pub mod logging;
pub mod proxy;
pub mod reactor;
pub mod server;

#[cfg(feature = "sentry-integration")]
pub mod sentry_integration;
