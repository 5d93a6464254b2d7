use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use ureq::{Agent, AgentBuilder, Proxy};

use faultline_core::fault_debug;

use super::connection::{AsyncConnection, RequestOutcome, SendRequest};
use crate::cache::{DiskCache, EnvelopeCache, NoopCache};
use crate::types::Scheme;
use crate::{ClientOptions, Envelope, Hint, Transport};

/// A [`Transport`] that sends envelopes via the [`ureq`] library.
///
/// Bodies are gzip compressed. Delivery runs on the connection's single
/// worker thread; the capturing thread never blocks on the network.
///
/// This is enabled by the `transport` feature flag.
pub struct UreqHttpTransport {
    conn: AsyncConnection,
}

impl UreqHttpTransport {
    /// Creates a new transport.
    pub fn new(options: &ClientOptions) -> Self {
        Self::new_internal(options, None)
    }

    /// Creates a new transport that uses the specified [`ureq::Agent`].
    pub fn with_agent(options: &ClientOptions, agent: Agent) -> Self {
        Self::new_internal(options, Some(agent))
    }

    fn new_internal(options: &ClientOptions, agent: Option<Agent>) -> Self {
        let dsn = options.dsn.as_ref().expect("transport requires a DSN");
        let scheme = dsn.scheme();
        let agent = agent.unwrap_or_else(|| {
            let mut builder = AgentBuilder::new();

            match (scheme, &options.http_proxy, &options.https_proxy) {
                (Scheme::Https, _, Some(proxy)) => match Proxy::new(proxy.as_ref()) {
                    Ok(proxy) => {
                        builder = builder.proxy(proxy);
                    }
                    Err(err) => {
                        fault_debug!("invalid proxy: {:?}", err);
                    }
                },
                (_, Some(proxy), _) => match Proxy::new(proxy.as_ref()) {
                    Ok(proxy) => {
                        builder = builder.proxy(proxy);
                    }
                    Err(err) => {
                        fault_debug!("invalid proxy: {:?}", err);
                    }
                },
                _ => {}
            }

            builder.build()
        });

        let user_agent = options.user_agent.clone();
        let auth = dsn.to_auth(Some(&user_agent)).to_string();
        let url = dsn.envelope_api_url().to_string();

        let cache: Arc<dyn EnvelopeCache> = match options.cache_dir_path {
            Some(ref dir) => match DiskCache::new(dir, options.max_cache_items) {
                Ok(cache) => Arc::new(cache),
                Err(err) => {
                    fault_debug!(
                        "[Transport] cannot use cache directory {:?}: {}",
                        dir,
                        err
                    );
                    Arc::new(NoopCache)
                }
            },
            None => Arc::new(NoopCache),
        };

        let send_request: SendRequest = Box::new(move |body: Vec<u8>| {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&body)?;
            let compressed = encoder.finish()?;

            let request = agent
                .post(&url)
                .set("User-Agent", &user_agent)
                .set("X-Faultline-Auth", &auth)
                .set("Content-Encoding", "gzip")
                .set("Content-Type", "application/x-faultline-envelope")
                .set("Accept", "application/json");

            match request.send_bytes(&compressed) {
                Ok(response) => Ok(RequestOutcome {
                    status: response.status(),
                    rate_limits: response
                        .header("x-faultline-rate-limits")
                        .map(str::to_owned),
                    retry_after: response.header("retry-after").map(str::to_owned),
                }),
                Err(ureq::Error::Status(status, response)) => Ok(RequestOutcome {
                    status,
                    rate_limits: response
                        .header("x-faultline-rate-limits")
                        .map(str::to_owned),
                    retry_after: response.header("retry-after").map(str::to_owned),
                }),
                Err(err) => Err(io::Error::other(err)),
            }
        });

        let conn = AsyncConnection::new(options, cache, send_request);

        Self { conn }
    }
}

impl Transport for UreqHttpTransport {
    fn send_envelope(&self, envelope: Envelope, hint: Hint) {
        self.conn.send(envelope, hint)
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.conn.flush(timeout)
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        self.conn.shutdown(timeout)
    }

    fn is_healthy(&self) -> bool {
        self.conn.is_healthy()
    }
}
