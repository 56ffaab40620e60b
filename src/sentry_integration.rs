//! Optional Sentry error tracking integration.
//!
//! Initializes the Sentry SDK with the provided DSN and environment.
//! Pipeline errors logged at `error` level (failed deployments, reactors
//! that never hand back their context) reach Sentry through the
//! `sentry-tracing` layer installed by [`crate::logging::init`]. The
//! returned guard must be held for the lifetime of the application to
//! ensure errors and panics are reported.

pub fn init(dsn: &str, environment: Option<&str>) -> sentry::ClientInitGuard {
    let parsed_dsn = match dsn.parse() {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!(error = %e, "invalid Sentry DSN, error tracking disabled");
            None
        }
    };

    let guard = sentry::init(sentry::ClientOptions {
        dsn: parsed_dsn,
        environment: environment.map(|e| e.to_string().into()),
        release: Some(concat!("gatehouse@", env!("CARGO_PKG_VERSION")).into()),
        attach_stacktrace: true,
        ..Default::default()
    });

    sentry::configure_scope(|scope| {
        scope.set_tag("build", env!("GATEHOUSE_GIT_SHORT"));
    });

    guard
}
