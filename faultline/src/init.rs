use std::sync::Arc;
use std::thread;

use faultline_core::fault_debug;

use crate::cache::{resend_cached_envelopes, DiskCache};
use crate::defaults::apply_defaults;
use crate::{Client, ClientOptions, Hub};

/// Helper struct that is returned from [`init`].
///
/// When this is dropped the session is ended and events are drained with
/// the configured shutdown timeout.
#[must_use = "when the init guard is dropped the transport will be shut down and no further \
              events can be sent.  If you do want to ignore this use mem::forget on it."]
pub struct ClientInitGuard(Arc<Client>);

impl std::ops::Deref for ClientInitGuard {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.0
    }
}

impl ClientInitGuard {
    /// Quick check if the client is enabled.
    pub fn is_enabled(&self) -> bool {
        self.0.is_enabled()
    }
}

impl Drop for ClientInitGuard {
    fn drop(&mut self) {
        if self.is_enabled() {
            fault_debug!("dropping client guard -> disposing client");
            // end the session before the transport goes away
            Hub::main().end_session();
        } else {
            fault_debug!("dropping client guard (no client to dispose)");
        }
        self.0.close(None);
    }
}

/// Creates the faultline client for a given client config and binds it.
///
/// This returns a client init guard that must be kept in scope and will
/// help the client send events before the application closes. When the
/// guard is dropped, the transport that was initialized shuts down and no
/// further events can be sent on it.
///
/// If you don't want (or can't) keep the guard around, it's permissible to
/// call `mem::forget` on it.
///
/// # Examples
///
/// ```
/// let _faultline = faultline::init("https://key@ingest.faultline.dev/1234");
/// ```
///
/// Or if draining on shutdown should be ignored:
///
/// ```
/// std::mem::forget(faultline::init("https://key@ingest.faultline.dev/1234"));
/// ```
///
/// The guard returned can also be inspected to see if a client has been
/// created to enable further configuration:
///
/// ```
/// let faultline = faultline::init(faultline::ClientOptions {
///     release: Some("foo-bar-baz@1.0.0".into()),
///     ..Default::default()
/// });
/// if faultline.is_enabled() {
///     // some other initialization
/// }
/// ```
///
/// This behaves similar to creating a client by calling
/// `Client::from_config` and then binding it to the hub, with these
/// additions: option defaults are filled from the environment, envelopes a
/// previous run left in the disk cache are re-submitted, and a release
/// health session is started when `auto_session_tracking` is enabled.
pub fn init<C: Into<ClientOptions>>(opts: C) -> ClientInitGuard {
    let options = apply_defaults(opts.into());
    let auto_session_tracking = options.auto_session_tracking;
    let cache_dir_path = options.cache_dir_path.clone();
    let max_cache_items = options.max_cache_items;

    let client = Arc::new(Client::with_options(options));
    Hub::with(|hub| hub.bind_client(Some(client.clone())));

    match client.dsn() {
        Some(dsn) => {
            fault_debug!("enabled faultline client for DSN {}", dsn);
        }
        None => {
            fault_debug!("initialized disabled faultline client due to empty or invalid DSN");
        }
    }

    if client.is_enabled() {
        if let Some(dir) = cache_dir_path {
            let sweep_client = client.clone();
            let handle = thread::Builder::new()
                .name("faultline-cache-sweep".into())
                .spawn(move || match DiskCache::new(&dir, max_cache_items) {
                    Ok(cache) => {
                        let removed = resend_cached_envelopes(&cache, &sweep_client);
                        if removed > 0 {
                            fault_debug!("re-sent {} cached envelope(s) from {:?}", removed, dir);
                        }
                    }
                    Err(err) => {
                        fault_debug!("cannot open envelope cache at {:?}: {}", dir, err);
                    }
                });
            if handle.is_err() {
                fault_debug!("failed to spawn the cache sweep thread");
            }
        }

        if auto_session_tracking {
            Hub::current().start_session();
        }
    }

    ClientInitGuard(client)
}
