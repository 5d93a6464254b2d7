use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::fault_debug;
use crate::protocol::{
    Attachment, Breadcrumb, Context, Event, Level, Map, User, Value,
};
use crate::session::Session;
use crate::Client;

/// The hub's stack of `(client, scope)` layers.
///
/// The root layer is created together with the hub and can never be popped.
#[derive(Debug)]
pub(crate) struct Stack {
    top: StackLayer,
    layers: Vec<StackLayer>,
}

/// A function that can modify or drop an event before it is handed off.
pub type EventProcessor = Arc<dyn Fn(Event<'static>) -> Option<Event<'static>> + Send + Sync>;

/// Holds contextual data for the current scope.
///
/// The scope is an object that can be cloned efficiently and stores data
/// that is locally relevant to an event, such as recorded breadcrumbs, tags
/// or the acting user. At capture time the scope is merged into the event;
/// the event's own values always win, except for the level where an
/// explicit scope override takes precedence.
#[derive(Clone, Default)]
pub struct Scope {
    pub(crate) level: Option<Level>,
    pub(crate) fingerprint: Option<Arc<[Cow<'static, str>]>>,
    pub(crate) transaction: Option<Arc<str>>,
    pub(crate) breadcrumbs: Arc<VecDeque<Breadcrumb>>,
    pub(crate) user: Option<Arc<User>>,
    pub(crate) extra: Arc<Map<String, Value>>,
    pub(crate) tags: Arc<Map<String, String>>,
    pub(crate) contexts: Arc<Map<String, Context>>,
    pub(crate) event_processors: Arc<Vec<EventProcessor>>,
    pub(crate) session: Arc<Mutex<Option<Session>>>,
    pub(crate) attachments: Arc<Vec<Attachment>>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("level", &self.level)
            .field("fingerprint", &self.fingerprint)
            .field("transaction", &self.transaction)
            .field("breadcrumbs", &self.breadcrumbs)
            .field("user", &self.user)
            .field("extra", &self.extra)
            .field("tags", &self.tags)
            .field("contexts", &self.contexts)
            .field("event_processors", &self.event_processors.len())
            .field("attachments", &self.attachments.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StackLayer {
    pub client: Option<Arc<Client>>,
    pub scope: Arc<Scope>,
}

impl Stack {
    pub fn from_client_and_scope(client: Option<Arc<Client>>, scope: Arc<Scope>) -> Stack {
        Stack {
            top: StackLayer { client, scope },
            layers: vec![],
        }
    }

    /// Pushes a clone of the current top layer.
    ///
    /// The scope is shared copy-on-write, so mutations of the new top do not
    /// affect the layer below.
    pub fn push(&mut self) {
        let layer = self.top.clone();
        self.layers.push(layer);
    }

    /// Pops the top layer, unless only the root layer is left.
    ///
    /// Returns whether a layer was actually removed.
    pub fn pop(&mut self) -> bool {
        match self.layers.pop() {
            Some(layer) => {
                self.top = layer;
                true
            }
            None => false,
        }
    }

    #[inline(always)]
    pub fn top(&self) -> &StackLayer {
        &self.top
    }

    #[inline(always)]
    pub fn top_mut(&mut self) -> &mut StackLayer {
        &mut self.top
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

/// A scope guard.
///
/// This is returned from [`Hub::push_scope`](crate::Hub::push_scope) and
/// will automatically pop the scope on drop.
#[derive(Default)]
pub struct ScopeGuard(pub(crate) Option<Arc<RwLock<Stack>>>);

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeGuard")
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(stack) = self.0.take() {
            let popped = {
                let mut stack = stack.write().unwrap_or_else(PoisonError::into_inner);
                stack.pop()
            };
            // NOTE: log only after the lock is released; the diagnostic
            // logger must never run while the stack lock is held.
            if !popped {
                fault_debug!("refusing to pop the root scope");
            }
        }
    }
}

impl Scope {
    /// Clear the scope.
    ///
    /// By default a scope will inherit all values from the higher scope.
    /// In some situations this might not be what a user wants. Calling
    /// this method will wipe all data contained within.
    pub fn clear(&mut self) {
        *self = Default::default();
    }

    /// Deletes current breadcrumbs from the scope.
    pub fn clear_breadcrumbs(&mut self) {
        self.breadcrumbs = Default::default();
    }

    /// Sets a level override.
    pub fn set_level(&mut self, level: Option<Level>) {
        self.level = level;
    }

    /// Sets the fingerprint.
    pub fn set_fingerprint(&mut self, fingerprint: Option<&[&str]>) {
        self.fingerprint =
            fingerprint.map(|fp| fp.iter().map(|s| Cow::Owned((*s).into())).collect())
    }

    /// Sets the transaction.
    pub fn set_transaction(&mut self, transaction: Option<&str>) {
        self.transaction = transaction.map(Arc::from);
    }

    /// Sets the user for the current scope.
    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user.map(Arc::new);
    }

    /// Retrieves the user of the current scope.
    pub fn user(&self) -> Option<&User> {
        self.user.as_deref()
    }

    /// Sets a tag to a specific value.
    pub fn set_tag<V: ToString>(&mut self, key: &str, value: V) {
        Arc::make_mut(&mut self.tags).insert(key.to_string(), value.to_string());
    }

    /// Removes a tag.
    ///
    /// If the tag is not set, does nothing.
    pub fn remove_tag(&mut self, key: &str) {
        Arc::make_mut(&mut self.tags).remove(key);
    }

    /// Sets a context for a key.
    pub fn set_context<C: Into<Context>>(&mut self, key: &str, value: C) {
        Arc::make_mut(&mut self.contexts).insert(key.to_string(), value.into());
    }

    /// Removes a context for a key.
    pub fn remove_context(&mut self, key: &str) {
        Arc::make_mut(&mut self.contexts).remove(key);
    }

    /// Sets an extra to a specific value.
    pub fn set_extra(&mut self, key: &str, value: Value) {
        Arc::make_mut(&mut self.extra).insert(key.to_string(), value);
    }

    /// Removes an extra.
    pub fn remove_extra(&mut self, key: &str) {
        Arc::make_mut(&mut self.extra).remove(key);
    }

    /// Add an event processor to the scope.
    ///
    /// The processors run at the end of the scope merge, in registration
    /// order. A processor may return `None` to drop the event.
    pub fn add_event_processor<F>(&mut self, f: F)
    where
        F: Fn(Event<'static>) -> Option<Event<'static>> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.event_processors).push(Arc::new(f));
    }

    /// Adds an attachment to the scope.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        Arc::make_mut(&mut self.attachments).push(attachment);
    }

    /// Clears attachments from the scope.
    pub fn clear_attachments(&mut self) {
        Arc::make_mut(&mut self.attachments).clear();
    }

    /// Applies the contained scoped data to fill an event.
    ///
    /// The event's own values take precedence; the scope only fills fields
    /// the event did not set itself. The one exception is the level, where
    /// an explicit scope override always wins. Breadcrumbs are appended to
    /// whatever the event already carries.
    pub fn apply_to_event(&self, mut event: Event<'static>) -> Option<Event<'static>> {
        if let Some(level) = self.level {
            event.level = level;
        }

        if event.user.is_none() {
            if let Some(user) = self.user.as_deref() {
                event.user = Some(user.clone());
            }
        }

        event.breadcrumbs.extend(self.breadcrumbs.iter().cloned());

        for (key, value) in self.extra.iter() {
            event
                .extra
                .entry(key.to_owned())
                .or_insert_with(|| value.to_owned());
        }

        for (key, value) in self.tags.iter() {
            event
                .tags
                .entry(key.to_owned())
                .or_insert_with(|| value.to_owned());
        }

        for (key, value) in self.contexts.iter() {
            event
                .contexts
                .entry(key.to_owned())
                .or_insert_with(|| value.to_owned());
        }

        if event.transaction.is_none() {
            if let Some(txn) = self.transaction.as_deref() {
                event.transaction = Some(txn.to_owned());
            }
        }

        if event.fingerprint.len() == 1
            && (event.fingerprint[0] == "{{ default }}" || event.fingerprint[0] == "{{default}}")
        {
            if let Some(fp) = self.fingerprint.as_deref() {
                event.fingerprint = Cow::Owned(fp.to_owned());
            }
        }

        for processor in self.event_processors.as_ref() {
            event = processor(event)?;
        }

        Some(event)
    }

    pub(crate) fn update_session_from_event(&self, event: &Event<'static>) {
        if let Some(session) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            session.update_from_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_values_win_on_merge() {
        let mut scope = Scope::default();
        scope.set_tag("a", "1");
        scope.set_tag("b", "2");

        let mut event = Event::default();
        event.tags.insert("a".into(), "2".into());

        let event = scope.apply_to_event(event).unwrap();
        assert_eq!(event.tags.get("a").unwrap(), "2");
        assert_eq!(event.tags.get("b").unwrap(), "2");
    }

    #[test]
    fn test_scope_fills_empty_event() {
        let mut scope = Scope::default();
        scope.set_tag("a", "1");

        let event = scope.apply_to_event(Event::default()).unwrap();
        assert_eq!(event.tags.get("a").unwrap(), "1");
    }

    #[test]
    fn test_scope_level_overrides_event() {
        let mut scope = Scope::default();
        scope.set_level(Some(Level::Warning));

        let mut event = Event::default();
        event.level = Level::Error;

        let event = scope.apply_to_event(event).unwrap();
        assert_eq!(event.level, Level::Warning);
    }

    #[test]
    fn test_breadcrumbs_append() {
        let mut scope = Scope::default();
        Arc::make_mut(&mut scope.breadcrumbs).push_back(Breadcrumb {
            message: Some("from scope".into()),
            ..Default::default()
        });

        let mut event = Event::default();
        event.breadcrumbs.push(Breadcrumb {
            message: Some("own".into()),
            ..Default::default()
        });

        let event = scope.apply_to_event(event).unwrap();
        assert_eq!(event.breadcrumbs.len(), 2);
        assert_eq!(event.breadcrumbs[0].message.as_deref(), Some("own"));
        assert_eq!(event.breadcrumbs[1].message.as_deref(), Some("from scope"));
    }

    #[test]
    fn test_event_processor_drops_event() {
        let mut scope = Scope::default();
        scope.add_event_processor(|_| None);
        assert!(scope.apply_to_event(Event::default()).is_none());
    }

    #[test]
    fn test_push_does_not_leak_into_parent() {
        let mut stack = Stack::from_client_and_scope(None, Arc::new(Scope::default()));
        stack.push();
        Arc::make_mut(&mut stack.top_mut().scope).set_tag("inner", "1");
        assert!(stack.pop());
        assert!(stack.top().scope.tags.is_empty());
    }

    #[test]
    fn test_root_layer_is_not_poppable() {
        let mut stack = Stack::from_client_and_scope(None, Arc::new(Scope::default()));
        assert!(!stack.pop());
        assert_eq!(stack.depth(), 0);
    }
}
