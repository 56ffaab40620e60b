//! Serde data structures for the Gatehouse configuration file.
//!
//! Contains [`Config`] (the root), [`GatewaySettings`], [`Api`] with its
//! [`Listener`]s and [`Endpoint`], and [`AccessPoint`]. All types derive
//! `Serialize` and `Deserialize` with `deny_unknown_fields` for strict
//! parsing. The [`Api`] and [`AccessPoint`] types double as the runtime
//! definitions carried by deploy events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const fn default_request_timeout() -> i64 {
    30_000
}

const fn default_grace_delay() -> u64 {
    30
}

fn default_server_id() -> String {
    "http".to_string()
}

fn default_environment() -> String {
    "DEFAULT".to_string()
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_default_environment(v: &str) -> bool {
    v == "DEFAULT"
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_points: Vec<AccessPoint>,

    pub apis: Vec<Api>,
}

impl Config {
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.apis.iter().map(|a| a.listeners.len()).sum()
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Exact host equality, shallow paths sort first.
    Strict,
    /// Wildcard hosts, most specific host and deepest path first.
    #[default]
    Overlapping,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySettings {
    #[serde(default = "default_server_id")]
    pub server_id: String,

    #[serde(default = "default_environment")]
    pub environment_id: String,

    #[serde(default)]
    pub routing_mode: RoutingMode,

    /// Zero or negative disables the per-request deadline.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: i64,

    #[serde(default = "default_grace_delay")]
    pub request_timeout_grace_delay_ms: u64,

    #[serde(default, skip_serializing_if = "is_false")]
    pub access_points_enabled: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            server_id: default_server_id(),
            environment_id: default_environment(),
            routing_mode: RoutingMode::default(),
            request_timeout_ms: default_request_timeout(),
            request_timeout_grace_delay_ms: default_grace_delay(),
            access_points_enabled: false,
            properties: BTreeMap::new(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessPointTarget {
    #[default]
    Gateway,
    TcpGateway,
    KafkaGateway,
    Console,
    Portal,
}

/// Externally managed virtual host that host-less listeners bind to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccessPoint {
    pub host: String,

    #[serde(
        default = "default_environment",
        skip_serializing_if = "is_default_environment"
    )]
    pub environment_id: String,

    #[serde(default)]
    pub target: AccessPointTarget,
}

impl AccessPoint {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        environment_id: impl Into<String>,
        target: AccessPointTarget,
    ) -> Self {
        Self {
            host: host.into(),
            environment_id: environment_id.into(),
            target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Api {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(
        default = "default_environment",
        skip_serializing_if = "is_default_environment"
    )]
    pub environment_id: String,

    pub listeners: Vec<Listener>,

    /// Server ids this API is exposed on. Empty means every server.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<String>,

    /// SNI hosts for TCP proxying.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp_hosts: Vec<String>,

    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Listener {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    pub path: String,
}

impl Listener {
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            host: None,
            path: path.into(),
        }
    }

    #[must_use]
    pub fn with_host(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}
