use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::panic::RefUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rand::random;

use crate::constants::SDK_INFO;
use crate::fault_debug;
use crate::protocol::{ClientSdkInfo, Envelope, Event, SessionUpdate};
use crate::types::{random_uuid, Dsn, Uuid};
use crate::{ClientOptions, Hint, Hub, Integration, Scope, Transport};

impl<T: Into<ClientOptions>> From<T> for Client {
    fn from(o: T) -> Client {
        Client::with_options(o.into())
    }
}

pub(crate) type TransportArc = Arc<RwLock<Option<Arc<dyn Transport>>>>;

/// The faultline client.
///
/// The client is responsible for event processing and for handing finished
/// events to the collector via the configured [`Transport`]. It can be
/// created from [`ClientOptions`].
///
/// # Examples
///
/// ```
/// faultline_core::Client::from(faultline_core::ClientOptions::default());
/// ```
pub struct Client {
    options: ClientOptions,
    transport: TransportArc,
    integrations: Vec<(TypeId, Arc<dyn Integration>)>,
    pub(crate) sdk_info: ClientSdkInfo,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("dsn", &self.dsn())
            .field("options", &self.options)
            .finish()
    }
}

impl Clone for Client {
    fn clone(&self) -> Client {
        let transport = Arc::new(RwLock::new(
            self.transport
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        ));
        Client {
            options: self.options.clone(),
            transport,
            integrations: self.integrations.clone(),
            sdk_info: self.sdk_info.clone(),
        }
    }
}

impl Client {
    /// Creates a new client from a config.
    ///
    /// # Supported Configs
    ///
    /// The following common values are supported for the client config:
    ///
    /// * `ClientOptions`: configure the client with the given client options.
    /// * `()` or empty string: disable the client.
    /// * `&str` / `String` / `&OsStr` / `OsString`: configure the client with the given DSN.
    /// * `Dsn` / `&Dsn`: configure the client with a given DSN.
    /// * `(Dsn, ClientOptions)`: configure the client from the given DSN and options.
    ///
    /// # Panics
    ///
    /// The `Into<ClientOptions>` implementations can panic for the forms
    /// where a DSN needs to be parsed. If you want to handle invalid DSNs
    /// you need to parse them manually by calling parse on them and handle
    /// the error.
    pub fn from_config<O: Into<ClientOptions>>(opts: O) -> Client {
        Client::with_options(opts.into())
    }

    /// Creates a new client for the given options.
    ///
    /// If the DSN on the options is set to `None` the client will be
    /// entirely disabled.
    pub fn with_options(mut options: ClientOptions) -> Client {
        crate::macros::set_debug_enabled(options.debug);

        // Create the main hub eagerly so the transport worker does not race
        // hub initialization from its own thread.
        Hub::with(|_| {});

        let create_transport = || {
            options.dsn.as_ref()?;
            let factory = options.transport.as_ref()?;
            Some(factory.create_transport(&options))
        };

        let transport = Arc::new(RwLock::new(create_transport()));
        if transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
        {
            fault_debug!("[Client] no transport available, client is disabled");
        }

        let mut sdk_info = SDK_INFO.clone();

        // NOTE: We do not filter out duplicate integrations based on their
        // TypeId.
        let integrations: Vec<_> = options
            .integrations
            .iter()
            .map(|integration| (integration.as_ref().type_id(), integration.clone()))
            .collect();

        for (_, integration) in integrations.iter() {
            integration.setup(&mut options);
            sdk_info.integrations.push(integration.name().to_string());
        }

        Client {
            options,
            transport,
            integrations,
            sdk_info,
        }
    }

    pub(crate) fn get_integration<I>(&self) -> Option<&I>
    where
        I: Integration,
    {
        let id = TypeId::of::<I>();
        let integration = &self.integrations.iter().find(|(iid, _)| *iid == id)?.1;
        integration.as_ref().as_any().downcast_ref()
    }

    /// Prepares an event for transmission.
    ///
    /// This merges the scope, runs the registered processors, fills in the
    /// client defaults and applies the `before_send` callback. `None` means
    /// the event was dropped along the way.
    pub fn prepare_event(
        &self,
        mut event: Event<'static>,
        scope: Option<&Scope>,
    ) -> Option<Event<'static>> {
        // event_id and sdk info are set before the processors run so that
        // processors can poke around in that data.
        if event.event_id.is_nil() {
            event.event_id = random_uuid();
        }

        if event.sdk.is_none() {
            // NOTE: we need to clone here because `Event` must be `'static`
            event.sdk = Some(Cow::Owned(self.sdk_info.clone()));
        }

        if let Some(scope) = scope {
            event = match scope.apply_to_event(event) {
                Some(event) => event,
                None => {
                    fault_debug!("[Client] event dropped by a scope event processor");
                    return None;
                }
            };
        }

        for (_, integration) in self.integrations.iter() {
            let id = event.event_id;
            event = match integration.process_event(event, &self.options) {
                Some(event) => event,
                None => {
                    fault_debug!(
                        "[Client] integration '{}' dropped event {:?}",
                        integration.name(),
                        id
                    );
                    return None;
                }
            }
        }

        if event.release.is_none() {
            event.release.clone_from(&self.options.release);
        }
        if event.environment.is_none() {
            event.environment.clone_from(&self.options.environment);
        }
        if event.server_name.is_none() {
            event.server_name.clone_from(&self.options.server_name);
        }
        if &event.platform == "other" {
            event.platform = "native".into();
        }

        // The session keeps its error count even when `before_send` decides
        // to drop the event afterwards.
        if let Some(scope) = scope {
            scope.update_session_from_event(&event);
        }

        if let Some(ref func) = self.options.before_send {
            let id = event.event_id;
            event = match func(event) {
                Some(event) => event,
                None => {
                    fault_debug!("[Client] before_send dropped event {:?}", id);
                    return None;
                }
            }
        }

        Some(event)
    }

    /// Returns the options of this client.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns the DSN that constructed this client.
    pub fn dsn(&self) -> Option<&Dsn> {
        self.options.dsn.as_ref()
    }

    /// Quick check to see if the client is enabled.
    ///
    /// The client is enabled if it has a valid DSN and transport configured.
    pub fn is_enabled(&self) -> bool {
        self.options.dsn.is_some()
            && self
                .transport
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }

    /// Captures an event and sends it to the collector.
    pub fn capture_event(&self, event: Event<'static>, scope: Option<&Scope>) -> Uuid {
        self.capture_event_with_hint(event, scope, Hint::new())
    }

    /// Captures an event with an explicit delivery [`Hint`].
    ///
    /// The returned id means "accepted for send", not "delivered"; delivery
    /// failures never surface to the capturing code path.
    pub fn capture_event_with_hint(
        &self,
        event: Event<'static>,
        scope: Option<&Scope>,
        hint: Hint,
    ) -> Uuid {
        let transport = self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(ref transport) = *transport else {
            fault_debug!("[Client] no transport, dropping event");
            return Uuid::nil();
        };

        // The sampling gate comes first: a sampled-out event pays no
        // processing cost at all.
        if !self.sample_should_send(self.options.sample_rate) {
            fault_debug!(
                "[Client] event dropped by sampling (rate {})",
                self.options.sample_rate
            );
            return Uuid::nil();
        }

        let Some(event) = self.prepare_event(event, scope) else {
            return Uuid::nil();
        };

        let event_id = event.event_id;
        let mut envelope: Envelope = event.into();

        if let Some(scope) = scope {
            let session_item = scope
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_mut()
                .and_then(|session| session.create_envelope_item());
            if let Some(session_item) = session_item {
                envelope.add_item(session_item);
            }

            for attachment in scope.attachments.iter().cloned() {
                envelope.add_item(attachment);
            }
        }

        transport.send_envelope(envelope, hint);
        event_id
    }

    /// Sends the specified [`Envelope`] directly to the collector.
    pub fn send_envelope(&self, envelope: Envelope) {
        self.send_envelope_with_hint(envelope, Hint::new())
    }

    /// Sends the specified [`Envelope`] with an explicit delivery [`Hint`].
    pub fn send_envelope_with_hint(&self, envelope: Envelope, hint: Hint) {
        if let Some(ref transport) = *self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
        {
            transport.send_envelope(envelope, hint);
        } else {
            fault_debug!("[Client] no transport, dropping envelope");
        }
    }

    pub(crate) fn enqueue_session(&self, session_update: SessionUpdate<'static>) {
        self.send_envelope(session_update.into())
    }

    /// Drains all pending events without shutting down.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        if let Some(ref transport) = *self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
        {
            transport.flush(timeout.unwrap_or(self.options.shutdown_timeout))
        } else {
            true
        }
    }

    /// Drains all pending events and shuts down the transport behind the
    /// client. After shutting down the transport is removed.
    ///
    /// This returns `true` if the queue was successfully drained in the
    /// given time or `false` if not (for instance because of a timeout).
    /// If no timeout is provided the client will wait for as long as
    /// `shutdown_timeout` in the client options.
    pub fn close(&self, timeout: Option<Duration>) -> bool {
        let transport_opt = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(transport) = transport_opt {
            transport.shutdown(timeout.unwrap_or(self.options.shutdown_timeout))
        } else {
            true
        }
    }

    /// Returns whether the transport believes a submission would currently
    /// have a chance to go out.
    pub fn is_transport_healthy(&self) -> bool {
        match *self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(ref transport) => transport.is_healthy(),
            None => false,
        }
    }

    /// Returns a random boolean with a probability defined by rate.
    pub fn sample_should_send(&self, rate: f32) -> bool {
        if rate >= 1.0 {
            true
        } else if rate <= 0.0 {
            false
        } else {
            random::<f32>() < rate
        }
    }
}

// Make this unwind safe. It's not out of the box because of the
// `BeforeCallback`s inside `ClientOptions`, and the contained Integrations.
impl RefUnwindSafe for Client {}
