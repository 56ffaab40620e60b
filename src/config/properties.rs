//! Typed lookup over the free-form `gateway.properties` map.
//!
//! Properties are stored as strings and parsed on read, falling back to
//! the caller's default when absent or unparsable. Environment variables
//! named `GATEHOUSE_<KEY>` (key uppercased, `.` and `-` turned into `_`)
//! take precedence over the file.

use std::collections::BTreeMap;
use std::str::FromStr;

pub const PENDING_REQUESTS_TIMEOUT: &str = "api.pending_requests_timeout";
pub const DEFAULT_PENDING_REQUESTS_TIMEOUT_MS: u64 = 10_000;
pub const X_FORWARDED_PREFIX: &str = "handlers.request.headers.x-forwarded-prefix";

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    properties: BTreeMap<String, String>,
    read_env: bool,
}

impl Configuration {
    #[must_use]
    pub fn new(properties: BTreeMap<String, String>) -> Self {
        Self {
            properties,
            read_env: false,
        }
    }

    /// Same as [`Configuration::new`] but consults the process environment first.
    #[must_use]
    pub fn with_env_overrides(properties: BTreeMap<String, String>) -> Self {
        Self {
            properties,
            read_env: true,
        }
    }

    #[must_use]
    pub fn property<T: FromStr>(&self, key: &str, default: T) -> T {
        let raw = self
            .env_value(key)
            .or_else(|| self.properties.get(key).cloned());

        match raw {
            Some(value) => value.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %value, "unparsable property, using default");
                default
            }),
            None => default,
        }
    }

    fn env_value(&self, key: &str) -> Option<String> {
        if !self.read_env {
            return None;
        }
        std::env::var(env_key(key)).ok()
    }
}

fn env_key(key: &str) -> String {
    let normalized: String = key
        .chars()
        .map(|c| match c {
            '.' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    format!("GATEHOUSE_{normalized}")
}
