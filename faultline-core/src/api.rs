use std::sync::Arc;

use crate::protocol::{Event, Level};
use crate::types::Uuid;
use crate::{Hub, Integration, IntoBreadcrumbs, Scope, ScopeGuard};

/// Captures an event on the currently active client if any.
///
/// The event must already be assembled. Typically code would instead use
/// the utility methods like [`capture_message`] or
/// [`capture_error`](crate::capture_error). The return value is the event
/// id. In case the SDK is disabled the return value will be the nil UUID
/// (`Uuid::nil`).
///
/// # Examples
///
/// ```
/// use faultline_core::protocol::{Event, Level};
///
/// faultline_core::capture_event(Event {
///     message: Some("Hello World!".into()),
///     level: Level::Info,
///     ..Default::default()
/// });
/// ```
pub fn capture_event(event: Event<'static>) -> Uuid {
    Hub::with_active(|hub| hub.capture_event(event))
}

/// Captures an arbitrary message.
///
/// This creates an event from the given message and sends it to the current
/// hub.
pub fn capture_message(msg: &str, level: Level) -> Uuid {
    Hub::with_active(|hub| hub.capture_message(msg, level))
}

/// Records a breadcrumb by calling a function.
///
/// The total number of breadcrumbs that can be recorded are limited by the
/// configuration on the client. This function accepts any object that
/// implements [`IntoBreadcrumbs`], which is implemented for a variety of
/// common types. For efficiency reasons you can also pass a closure
/// returning a breadcrumb in which case the closure is only called if the
/// client is enabled.
///
/// The most common implementations that can be passed:
///
/// * `Breadcrumb`: to record a breadcrumb.
/// * `Vec<Breadcrumb>`: to record more than one breadcrumb in one go.
/// * `Option<Breadcrumb>`: to record a breadcrumb or not.
/// * additionally all of these can also be returned from an `FnOnce()`.
///
/// # Examples
///
/// ```
/// use faultline_core::protocol::{Breadcrumb, Map};
///
/// faultline_core::add_breadcrumb(|| Breadcrumb {
///     ty: "http".into(),
///     category: Some("request".into()),
///     data: {
///         let mut map = Map::new();
///         map.insert("method".into(), "GET".into());
///         map.insert("url".into(), "https://example.com/".into());
///         map
///     },
///     ..Default::default()
/// });
/// ```
pub fn add_breadcrumb<B: IntoBreadcrumbs>(breadcrumb: B) {
    Hub::with_active(|hub| hub.add_breadcrumb(breadcrumb))
}

/// Invokes a function that can modify the current scope.
///
/// The function is passed a mutable reference to the [`Scope`] so that
/// modifications can be performed. Because there might currently not be a
/// scope or client active it's possible that the callback might not be
/// called at all. As a result of this the return value of this closure must
/// have a default that is returned in such cases.
///
/// # Examples
///
/// ```
/// faultline_core::configure_scope(|scope| {
///     scope.set_user(Some(faultline_core::User {
///         username: Some("john_doe".into()),
///         ..Default::default()
///     }));
/// });
/// ```
pub fn configure_scope<F, R>(f: F) -> R
where
    R: Default,
    F: FnOnce(&mut Scope) -> R,
{
    Hub::with_active(|hub| hub.configure_scope(f))
}

/// Temporarily pushes a scope for a single call optionally reconfiguring it.
///
/// This function takes two arguments: the first is a callback that is
/// passed a scope and can reconfigure it. The second is a callback that
/// then executes in the context of that scope.
///
/// This is useful when extra data should be sent with a single capture call,
/// for instance a different level or tags.
///
/// # Examples
///
/// ```
/// use faultline_core::protocol::Level;
///
/// faultline_core::with_scope(
///     |scope| scope.set_level(Some(Level::Warning)),
///     || faultline_core::capture_message("something went wrong", Level::Error),
/// );
/// ```
pub fn with_scope<C, F, R>(scope_config: C, callback: F) -> R
where
    C: FnOnce(&mut Scope),
    F: FnOnce() -> R,
    R: Default,
{
    Hub::with_active(|hub| hub.with_scope(scope_config, callback))
}

/// Pushes a new scope on the current hub.
///
/// The returned guard pops the scope again when dropped.
pub fn push_scope() -> ScopeGuard {
    Hub::with(|hub| hub.push_scope())
}

/// Returns the last event id captured on the current hub.
pub fn last_event_id() -> Option<Uuid> {
    Hub::with(|hub| hub.last_event_id())
}

/// Blocks until all pending envelopes have been sent out, bounded by the
/// given timeout.
///
/// Returns `true` when the transport queue was drained in time; a hub
/// without a client has nothing to flush and reports `true` as well.
pub fn flush(timeout: Option<std::time::Duration>) -> bool {
    Hub::with(|hub| hub.flush(timeout))
}

/// Starts a new release health session on the current scope.
pub fn start_session() {
    Hub::with_active(|hub| hub.start_session())
}

/// Ends the currently running session.
pub fn end_session() {
    Hub::with_active(|hub| hub.end_session())
}

/// Looks up an integration on the current client and invokes the callback
/// with it and the current hub.
///
/// If there is no client, or the client does not carry an integration of
/// the requested type, the callback is not invoked and a default value is
/// returned.
pub fn with_integration<I, F, R>(f: F) -> R
where
    I: Integration,
    F: FnOnce(&I, &Arc<Hub>) -> R,
    R: Default,
{
    Hub::with_active(|hub| match hub.client() {
        Some(client) => match client.get_integration::<I>() {
            Some(integration) => f(integration, hub),
            None => Default::default(),
        },
        None => Default::default(),
    })
}
