//! Release health sessions.
//!
//! A session tracks one run of the application from start to termination.
//! It moves from `Ok` to either `Exited` or `Crashed`; the `Abnormal` state
//! is reserved and never reported by this client itself.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::protocol::{
    EnvelopeItem, Event, Level, SessionAttributes, SessionStatus, SessionUpdate,
};
use crate::scope::StackLayer;
use crate::types::random_uuid;
use crate::Client;

/// A release health session.
///
/// All mutations go through [`update`](Session::update) or the close path,
/// both of which recompute the logical clock and the change timestamp. The
/// scope guards the session behind a single mutex, so concurrent captures
/// observe consistent error counts.
#[derive(Clone, Debug)]
pub struct Session {
    client: Arc<Client>,
    session_update: SessionUpdate<'static>,
    started: Instant,
    dirty: bool,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close(SessionStatus::Exited);
        if self.dirty {
            self.client.enqueue_session(self.session_update.clone());
        }
    }
}

/// The logical clock value for a session change at the given wall time.
///
/// Clock skew can put the wall clock before the epoch; the sequence is the
/// absolute millisecond distance so it never goes negative.
fn sequence_at(timestamp: SystemTime) -> u64 {
    match timestamp.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as u64,
        Err(err) => err.duration().as_millis() as u64,
    }
}

impl Session {
    pub(crate) fn from_stack(stack: &StackLayer) -> Option<Self> {
        let client = stack.client.as_ref()?;
        let options = client.options();
        let user = stack.scope.user.as_deref();
        let distinct_id = user
            .and_then(|user| {
                user.id
                    .as_ref()
                    .or(user.email.as_ref())
                    .or(user.username.as_ref())
            })
            .cloned();
        Some(Self {
            client: client.clone(),
            session_update: SessionUpdate {
                session_id: random_uuid(),
                distinct_id,
                sequence: None,
                timestamp: None,
                started: SystemTime::now(),
                init: true,
                duration: None,
                status: SessionStatus::Ok,
                errors: 0,
                attributes: SessionAttributes {
                    release: options.release.clone()?,
                    environment: options.environment.clone(),
                    ip_address: None,
                    user_agent: None,
                },
            },
            started: Instant::now(),
            dirty: true,
        })
    }

    /// The current status of the session.
    pub fn status(&self) -> SessionStatus {
        self.session_update.status
    }

    /// The number of errors recorded for the session so far.
    pub fn errors(&self) -> u64 {
        self.session_update.errors
    }

    /// The duration in seconds, set once the session ended.
    pub fn duration(&self) -> Option<f64> {
        self.session_update.duration
    }

    fn touch(&mut self) {
        let now = SystemTime::now();
        self.session_update.timestamp = Some(now);
        self.session_update.sequence = Some(sequence_at(now));
        self.dirty = true;
    }

    /// Applies a change to the session.
    ///
    /// Any combination of a new status, a user agent and an error-count
    /// increment can be applied in one call; the sequence and timestamp are
    /// recomputed either way.
    pub fn update(
        &mut self,
        status: Option<SessionStatus>,
        user_agent: Option<&str>,
        add_error: bool,
    ) {
        if let Some(status) = status {
            self.session_update.status = status;
        }
        if let Some(user_agent) = user_agent {
            self.session_update.attributes.user_agent = Some(user_agent.to_owned());
        }
        if add_error {
            self.session_update.errors += 1;
        }
        self.touch();
    }

    /// Ends the session, transitioning `Ok` to `Exited`.
    pub fn end(&mut self) {
        self.close(SessionStatus::Exited);
    }

    pub(crate) fn update_from_event(&mut self, event: &Event<'static>) {
        if self.session_update.status != SessionStatus::Ok {
            // a session that has already transitioned to a "terminal" state
            // should not receive any more updates
            return;
        }
        let mut has_error = event.level >= Level::Error;
        let mut is_crash = false;
        for exc in &event.exception.values {
            has_error = true;
            if let Some(mechanism) = &exc.mechanism {
                if let Some(false) = mechanism.handled {
                    is_crash = true;
                    break;
                }
            }
        }

        if is_crash {
            self.session_update.status = SessionStatus::Crashed;
        }
        if has_error {
            self.session_update.errors += 1;
            self.touch();
        }
    }

    pub(crate) fn close(&mut self, status: SessionStatus) {
        if self.session_update.status == SessionStatus::Ok {
            let status = match status {
                SessionStatus::Ok => SessionStatus::Exited,
                s => s,
            };
            self.session_update.duration = Some(self.started.elapsed().as_secs_f64());
            self.session_update.status = status;
            self.touch();
        }
    }

    pub(crate) fn create_envelope_item(&mut self) -> Option<EnvelopeItem> {
        if self.dirty {
            let item = self.session_update.clone().into();
            self.session_update.init = false;
            self.dirty = false;
            return Some(item);
        }
        None
    }
}
