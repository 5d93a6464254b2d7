use std::sync::{Arc, PoisonError, RwLock};

use crate::fault_debug;
use crate::hub_impl::HubImpl;
use crate::protocol::{Event, Level, SessionStatus};
use crate::session::Session;
use crate::types::Uuid;
use crate::{Hint, IntoBreadcrumbs, Scope, ScopeGuard};

/// The central object that manages scopes and clients.
///
/// This can be used to capture events and manage the scope. This object is
/// internally synchronized so it can be used from multiple threads if
/// needed. The default hub that is available automatically is thread local.
///
/// Each hub owns a stack of `(client, scope)` layers. All capture calls are
/// routed to the top of that stack. For propagation to other threads, a new
/// hub is derived from the top layer via [`Hub::new_from_top`]; the derived
/// hub shares the layer contents rather than copying them.
///
/// Most functions on the hub are also available as global functions which
/// dispatch to the thread-local hub ([`Hub::current`]).
pub struct Hub {
    pub(crate) inner: HubImpl,
    pub(crate) last_event_id: RwLock<Option<Uuid>>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hub")
    }
}

impl Hub {
    /// Sends the event to the current client with the current scope.
    ///
    /// If no client is bound this is a no-op that returns the nil id.
    /// Delivery failures never propagate back into the calling code.
    ///
    /// See the global [`capture_event`](crate::capture_event) for more
    /// documentation.
    pub fn capture_event(&self, event: Event<'static>) -> Uuid {
        self.capture_event_with_hint(event, Hint::new())
    }

    /// Sends the event with an explicit delivery [`Hint`].
    ///
    /// The hint travels with the envelope all the way into the transport,
    /// where its capabilities (retry flag, result callback, disk-flush
    /// latch) are honored.
    pub fn capture_event_with_hint(&self, event: Event<'static>, hint: Hint) -> Uuid {
        let event_id = self.inner.with(|stack| {
            let top = stack.top();
            match top.client {
                Some(ref client) => {
                    client.capture_event_with_hint(event, Some(&top.scope), hint)
                }
                None => {
                    fault_debug!("[Hub] no client bound, dropping event");
                    Uuid::nil()
                }
            }
        });
        if !event_id.is_nil() {
            *self
                .last_event_id
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(event_id);
        }
        event_id
    }

    /// Captures an arbitrary message.
    ///
    /// See the global [`capture_message`](crate::capture_message) for more
    /// documentation.
    pub fn capture_message(&self, msg: &str, level: Level) -> Uuid {
        let event = Event {
            message: Some(msg.to_string()),
            level,
            ..Default::default()
        };
        self.capture_event(event)
    }

    /// Invokes a function that can modify the current scope.
    ///
    /// The callback runs against the top of the stack without pushing a new
    /// layer. See the global [`configure_scope`](crate::configure_scope)
    /// for more documentation.
    pub fn configure_scope<F, R>(&self, f: F) -> R
    where
        R: Default,
        F: FnOnce(&mut Scope) -> R,
    {
        self.inner.with_mut(|stack| {
            let top = stack.top_mut();
            if top.client.is_none() {
                return Default::default();
            }
            f(Arc::make_mut(&mut top.scope))
        })
    }

    /// Pushes a new scope.
    ///
    /// The new top is a clone of the current top layer; mutations of it do
    /// not affect the layer below. This returns a guard that pops the scope
    /// again when dropped.
    pub fn push_scope(&self) -> ScopeGuard {
        self.inner.with_mut(|stack| {
            stack.push();
            ScopeGuard(Some(self.inner.stack.clone()))
        })
    }

    /// Pops the top scope.
    ///
    /// Popping the root scope is refused: the stack stays at depth one and
    /// a diagnostic message is logged.
    pub fn pop_scope(&self) {
        let popped = self.inner.with_mut(|stack| stack.pop());
        if !popped {
            fault_debug!("[Hub] refusing to pop the root scope");
        }
    }

    /// Temporarily pushes a scope for a single call, optionally
    /// reconfiguring it.
    ///
    /// The pushed scope is popped again when the callback returns, also
    /// when it panics.
    ///
    /// See the global [`with_scope`](crate::with_scope) for more
    /// documentation.
    pub fn with_scope<C, F, R>(&self, scope_config: C, callback: F) -> R
    where
        C: FnOnce(&mut Scope),
        F: FnOnce() -> R,
    {
        let _guard = self.push_scope();
        self.configure_scope(scope_config);
        callback()
    }

    /// Adds a new breadcrumb to the current scope.
    ///
    /// The `before_breadcrumb` callback from the options runs for every
    /// breadcrumb; returning `None` from it discards the breadcrumb. The
    /// scope holds at most `max_breadcrumbs` entries, evicting the oldest
    /// first.
    ///
    /// See the global [`add_breadcrumb`](crate::add_breadcrumb) for more
    /// documentation.
    pub fn add_breadcrumb<B: IntoBreadcrumbs>(&self, breadcrumb: B) {
        self.inner.with_mut(|stack| {
            let top = stack.top_mut();
            if let Some(client) = top.client.clone() {
                let scope = Arc::make_mut(&mut top.scope);
                let options = client.options();
                let breadcrumbs = Arc::make_mut(&mut scope.breadcrumbs);
                for breadcrumb in breadcrumb.into_breadcrumbs() {
                    let breadcrumb_opt = match &options.before_breadcrumb {
                        Some(callback) => callback(breadcrumb),
                        None => Some(breadcrumb),
                    };
                    if let Some(breadcrumb) = breadcrumb_opt {
                        breadcrumbs.push_back(breadcrumb);
                    }
                    while breadcrumbs.len() > options.max_breadcrumbs {
                        breadcrumbs.pop_front();
                    }
                }
            }
        })
    }

    /// Returns the last event id.
    pub fn last_event_id(&self) -> Option<Uuid> {
        *self
            .last_event_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Drains all queued transport work, bounded by the timeout.
    ///
    /// When no timeout is provided, the configured shutdown timeout is
    /// used.
    pub fn flush(&self, timeout: Option<std::time::Duration>) -> bool {
        match self.client() {
            Some(client) => client.flush(timeout),
            None => true,
        }
    }

    /// Starts a new release health session.
    ///
    /// A previously running session on this scope is replaced, ending it.
    pub fn start_session(&self) {
        self.inner.with_mut(|stack| {
            let top = stack.top_mut();
            if let Some(session) = Session::from_stack(top) {
                let scope = Arc::make_mut(&mut top.scope);
                // the `Drop` of any previous session flushes it out
                scope.session = Arc::new(std::sync::Mutex::new(Some(session)));
            }
        })
    }

    /// Ends the currently running session, transitioning it to `Exited`.
    pub fn end_session(&self) {
        self.end_session_with_status(SessionStatus::Exited)
    }

    /// Ends the currently running session with the given status.
    pub fn end_session_with_status(&self, status: SessionStatus) {
        self.inner.with_mut(|stack| {
            let top = stack.top_mut();
            // the `Drop` of the session will flush it to the transport
            if let Some(mut session) = top
                .scope
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                session.close(status);
            }
        })
    }
}
