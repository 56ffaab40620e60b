//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for structural
//! errors such as missing APIs, duplicate ids, malformed listener paths
//! and hosts, and bad endpoint URLs. Returns every [`ValidationError`]
//! found, each with an optional suggestion.

use std::collections::HashSet;

use url::Url;

use super::model::{Api, Config};
use crate::error::ValidationError;

/// Validate a single listener path. Returns `Ok(())` or a human-readable error.
pub fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("path cannot be empty".into());
    }
    if !path.starts_with('/') {
        return Err(format!("path must start with '/' (did you mean '/{path}'?)"));
    }
    Ok(())
}

/// Validate a listener host. A single leading `*.` wildcard label is allowed.
pub fn validate_host(host: &str) -> Result<(), String> {
    if host.trim().is_empty() {
        return Err("host cannot be blank".into());
    }
    let rest = host.strip_prefix("*.").unwrap_or(host);
    if rest.contains('*') {
        return Err(format!(
            "'{host}' has a misplaced wildcard (only a leading '*.' is supported)"
        ));
    }
    if rest.contains('/') {
        return Err(format!("'{host}' must not contain a path"));
    }
    Ok(())
}

/// Validate an endpoint target URL. Returns `Ok(())` or a human-readable error.
pub fn validate_target_url(url: &str) -> Result<(), String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.gateway.server_id.trim().is_empty() {
        errors.push(ValidationError {
            item: "(gateway)".into(),
            field: "server_id".into(),
            message: "server id cannot be blank".into(),
            suggestion: Some("the default is 'http'".into()),
        });
    }

    let mut seen_access_points = HashSet::new();
    for access_point in &config.access_points {
        let item = format!("access point {}", access_point.host);
        if let Err(msg) = validate_host(&access_point.host) {
            errors.push(ValidationError {
                item: item.clone(),
                field: "host".into(),
                message: msg,
                suggestion: None,
            });
        }
        if !seen_access_points.insert((
            access_point.host.to_ascii_lowercase(),
            &access_point.environment_id,
            access_point.target,
        )) {
            errors.push(ValidationError {
                item,
                field: "host".into(),
                message: "duplicate access point".into(),
                suggestion: None,
            });
        }
    }

    if config.apis.is_empty() {
        errors.push(ValidationError {
            item: "(root)".into(),
            field: "apis".into(),
            message: "at least one API must be defined".into(),
            suggestion: None,
        });
        return Err(errors);
    }

    let mut seen_ids = HashSet::new();

    for (i, api) in config.apis.iter().enumerate() {
        let item = if api.id.is_empty() {
            format!("apis[{i}]")
        } else {
            format!("api {}", api.id)
        };

        if api.id.trim().is_empty() {
            errors.push(ValidationError {
                item: item.clone(),
                field: "id".into(),
                message: "id cannot be blank".into(),
                suggestion: None,
            });
        } else if !seen_ids.insert(api.id.as_str()) {
            errors.push(ValidationError {
                item: item.clone(),
                field: "id".into(),
                message: "duplicate API id".into(),
                suggestion: None,
            });
        }

        validate_listeners(api, &item, &mut errors);

        for sni in &api.tcp_hosts {
            if sni.trim().is_empty() {
                errors.push(ValidationError {
                    item: item.clone(),
                    field: "tcp_hosts".into(),
                    message: "SNI host cannot be blank".into(),
                    suggestion: None,
                });
            }
        }

        if let Err(msg) = validate_target_url(&api.endpoint.target) {
            errors.push(ValidationError {
                item: item.clone(),
                field: "endpoint.target".into(),
                message: msg,
                suggestion: None,
            });
        }

        if api.endpoint.timeout_ms == Some(0) {
            errors.push(ValidationError {
                item,
                field: "endpoint.timeout_ms".into(),
                message: "endpoint timeout must be greater than zero".into(),
                suggestion: Some("remove the field to wait for the request deadline".into()),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listeners(api: &Api, item: &str, errors: &mut Vec<ValidationError>) {
    if api.listeners.is_empty() && api.tcp_hosts.is_empty() {
        errors.push(ValidationError {
            item: item.to_string(),
            field: "listeners".into(),
            message: "at least one listener or TCP host must be defined".into(),
            suggestion: None,
        });
        return;
    }

    let mut seen = HashSet::new();
    for listener in &api.listeners {
        if let Err(msg) = validate_path(&listener.path) {
            errors.push(ValidationError {
                item: item.to_string(),
                field: "listeners.path".into(),
                message: msg,
                suggestion: if !listener.path.is_empty() && !listener.path.starts_with('/') {
                    Some(format!("did you mean '/{}'?", listener.path))
                } else {
                    None
                },
            });
        }

        if let Some(ref host) = listener.host {
            if let Err(msg) = validate_host(host) {
                errors.push(ValidationError {
                    item: item.to_string(),
                    field: "listeners.host".into(),
                    message: msg,
                    suggestion: None,
                });
            }
        }

        let key = (
            listener.host.as_deref().map(str::to_ascii_lowercase),
            listener.path.as_str(),
        );
        if !seen.insert(key) {
            errors.push(ValidationError {
                item: item.to_string(),
                field: "listeners".into(),
                message: format!("duplicate listener for path '{}'", listener.path),
                suggestion: None,
            });
        }
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let mut lines = vec![format!(
        "  {} APIs, {} listeners, {} access points\n",
        config.apis.len(),
        config.total_listeners(),
        config.access_points.len()
    )];

    for api in &config.apis {
        lines.push(format!("  {}  -> {}", api.id, api.endpoint.target));
        for listener in &api.listeners {
            let host = listener.host.as_deref().unwrap_or("(access points)");
            lines.push(format!("    listen: {host} {}", listener.path));
        }
        for sni in &api.tcp_hosts {
            lines.push(format!("    sni:    {sni}"));
        }
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{AccessPoint, AccessPointTarget, Endpoint, GatewaySettings, Listener};

    fn api(id: &str, listeners: Vec<Listener>) -> Api {
        Api {
            id: id.into(),
            name: id.into(),
            version: "1".into(),
            environment_id: "DEFAULT".into(),
            listeners,
            servers: vec![],
            tcp_hosts: vec![],
            endpoint: Endpoint {
                target: "http://localhost:8080/".into(),
                timeout_ms: None,
            },
        }
    }

    fn config(apis: Vec<Api>) -> Config {
        Config {
            gateway: GatewaySettings::default(),
            access_points: vec![],
            apis,
        }
    }

    #[test]
    fn valid_config_passes() {
        let c = config(vec![api("petstore", vec![Listener::path("/petstore")])]);
        assert!(validate(&c).is_ok());
    }

    #[test]
    fn empty_apis_fails() {
        let errors = validate(&config(vec![])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("at least one API"));
    }

    #[test]
    fn duplicate_ids_fail() {
        let c = config(vec![
            api("a", vec![Listener::path("/a")]),
            api("a", vec![Listener::path("/b")]),
        ]);
        let errors = validate(&c).unwrap_err();
        assert!(errors.iter().any(|e| e.message == "duplicate API id"));
    }

    #[test]
    fn path_without_slash_suggests_fix() {
        let c = config(vec![api("a", vec![Listener::path("teams")])]);
        let errors = validate(&c).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.suggestion.as_deref() == Some("did you mean '/teams'?")));
    }

    #[test]
    fn misplaced_wildcard_fails() {
        let c = config(vec![api("a", vec![Listener::with_host("api.*.com", "/")])]);
        let errors = validate(&c).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("misplaced wildcard")));
    }

    #[test]
    fn leading_wildcard_is_accepted() {
        assert!(validate_host("*.acme.com").is_ok());
    }

    #[test]
    fn duplicate_listener_is_case_insensitive_on_host() {
        let c = config(vec![api(
            "a",
            vec![
                Listener::with_host("Api.Acme.com", "/a"),
                Listener::with_host("api.acme.com", "/a"),
            ],
        )]);
        let errors = validate(&c).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("duplicate listener")));
    }

    #[test]
    fn bad_endpoint_scheme_fails() {
        let mut a = api("a", vec![Listener::path("/a")]);
        a.endpoint.target = "ftp://files.acme.com".into();
        let errors = validate(&config(vec![a])).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("unsupported scheme")));
    }

    #[test]
    fn tcp_only_api_is_valid() {
        let mut a = api("a", vec![]);
        a.tcp_hosts = vec!["db.acme.com".into()];
        assert!(validate(&config(vec![a])).is_ok());
    }

    #[test]
    fn duplicate_access_point_fails() {
        let mut c = config(vec![api("a", vec![Listener::path("/a")])]);
        c.access_points = vec![
            AccessPoint::new("gw.acme.com", "DEFAULT", AccessPointTarget::Gateway),
            AccessPoint::new("GW.acme.com", "DEFAULT", AccessPointTarget::Gateway),
        ];
        let errors = validate(&c).unwrap_err();
        assert!(errors.iter().any(|e| e.message == "duplicate access point"));
    }
}
