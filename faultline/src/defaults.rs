use std::borrow::Cow;
use std::env;
use std::sync::Arc;

use crate::transports::DefaultTransportFactory;
use crate::ClientOptions;

/// Apply default client options.
///
/// Extends the given `ClientOptions` with defaults taken from the
/// environment:
///
/// - `transport`: the default HTTP transport factory
/// - `dsn`: from the `FAULTLINE_DSN` environment variable
/// - `release`: from the `FAULTLINE_RELEASE` environment variable
/// - `environment`: from the `FAULTLINE_ENVIRONMENT` environment variable,
///   or `debug`/`release` depending on the build profile
/// - proxies: from the `HTTP_PROXY`/`HTTPS_PROXY` environment variables
/// - default integrations (currently the panic integration)
pub fn apply_defaults(mut opts: ClientOptions) -> ClientOptions {
    if opts.transport.is_none() {
        opts.transport = Some(Arc::new(DefaultTransportFactory));
    }
    if opts.default_integrations {
        // default integrations go first, user integrations run after them
        let mut integrations: Vec<Arc<dyn crate::Integration>> = vec![];
        #[cfg(feature = "panic")]
        integrations.push(Arc::new(faultline_panic::PanicIntegration::new()));
        integrations.extend(opts.integrations.into_iter());
        opts.integrations = integrations;
    }
    if opts.dsn.is_none() {
        opts.dsn = env::var("FAULTLINE_DSN")
            .ok()
            .and_then(|dsn| dsn.parse().ok());
    }
    if opts.release.is_none() {
        opts.release = env::var("FAULTLINE_RELEASE").ok().map(Cow::Owned);
    }
    if opts.environment.is_none() {
        opts.environment = env::var("FAULTLINE_ENVIRONMENT")
            .ok()
            .map(Cow::Owned)
            .or_else(|| {
                Some(Cow::Borrowed(if cfg!(debug_assertions) {
                    "debug"
                } else {
                    "release"
                }))
            });
    }
    if opts.http_proxy.is_none() {
        opts.http_proxy = env::var("HTTP_PROXY")
            .ok()
            .map(Cow::Owned)
            .or_else(|| env::var("http_proxy").ok().map(Cow::Owned));
    }
    if opts.https_proxy.is_none() {
        opts.https_proxy = env::var("HTTPS_PROXY")
            .ok()
            .map(Cow::Owned)
            .or_else(|| env::var("https_proxy").ok().map(Cow::Owned))
            .or_else(|| opts.http_proxy.clone());
    }
    opts
}
