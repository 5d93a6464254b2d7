use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use httpdate::parse_http_date;

use crate::protocol::EnvelopeItemType;
use crate::Envelope;
use faultline_core::fault_debug;

/// The fallback backoff window used when a throttling header carries an
/// unparsable seconds value.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// The category of payload that a rate limit refers to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RateLimitCategory {
    /// Rate limit for any kind of payload.
    All,
    /// Rate limit pertaining to errors.
    Error,
    /// Rate limit pertaining to sessions.
    Session,
    /// Rate limit pertaining to attachments.
    Attachment,
    /// Rate limit pertaining to transactions.
    Transaction,
    /// Payloads the limiter does not know about; these are never limited.
    Unknown,
}

impl RateLimitCategory {
    fn from_header_name(name: &str) -> Option<RateLimitCategory> {
        Some(match name {
            "error" => RateLimitCategory::Error,
            "session" => RateLimitCategory::Session,
            "attachment" => RateLimitCategory::Attachment,
            "transaction" => RateLimitCategory::Transaction,
            _ => return None,
        })
    }
}

impl From<&EnvelopeItemType> for RateLimitCategory {
    fn from(ty: &EnvelopeItemType) -> Self {
        match ty {
            EnvelopeItemType::Event => RateLimitCategory::Error,
            EnvelopeItemType::Session => RateLimitCategory::Session,
            EnvelopeItemType::Attachment => RateLimitCategory::Attachment,
            EnvelopeItemType::Transaction => RateLimitCategory::Transaction,
            EnvelopeItemType::Unknown(_) => RateLimitCategory::Unknown,
        }
    }
}

/// A utility that tracks server-imposed throttling windows per category.
///
/// The expiry map is only ever extended, never shortened: a limit that
/// arrives while a longer one is already active does not reduce the block.
/// This makes concurrent updates from the response-handling thread and the
/// submit path safe to apply in any order.
#[derive(Debug, Default)]
pub struct RateLimiter {
    blocked_until: HashMap<RateLimitCategory, SystemTime>,
}

impl RateLimiter {
    /// Creates a new rate limiter with no active limits.
    pub fn new() -> Self {
        Self::default()
    }

    fn extend(&mut self, category: RateLimitCategory, until: SystemTime) {
        let entry = self.blocked_until.entry(category).or_insert(until);
        if until > *entry {
            *entry = until;
        }
    }

    /// Updates the limiter from a `Retry-After` header value.
    ///
    /// Accepts a float seconds value or an HTTP date; an unparsable value
    /// falls back to the 60 second default. The limit applies to all
    /// categories.
    pub fn update_from_retry_after(&mut self, header: &str) {
        self.update_from_retry_after_at(header, SystemTime::now())
    }

    fn update_from_retry_after_at(&mut self, header: &str, now: SystemTime) {
        let until = if let Ok(seconds) = header.trim().parse::<f64>() {
            now + Duration::from_secs_f64(seconds.max(0.0))
        } else if let Ok(date) = parse_http_date(header.trim()) {
            date
        } else {
            now + DEFAULT_RETRY_AFTER
        };
        self.extend(RateLimitCategory::All, until);
    }

    /// Updates the limiter from a structured rate limits header value.
    ///
    /// The header is a comma separated list of groups of the form
    /// `seconds:category;category;…:scope`. An empty category list applies
    /// the limit to all categories; the scope is ignored by the client.
    pub fn update_from_limits_header(&mut self, header: &str) {
        self.update_from_limits_header_at(header, SystemTime::now())
    }

    fn update_from_limits_header_at(&mut self, header: &str, now: SystemTime) {
        for group in header.split(',') {
            let group = group.trim();
            if group.is_empty() {
                continue;
            }
            let mut splits = group.split(':');
            let seconds = splits
                .next()
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
                .unwrap_or(DEFAULT_RETRY_AFTER.as_secs_f64());
            let Some(categories) = splits.next() else {
                continue;
            };
            let until = now + Duration::from_secs_f64(seconds);

            if categories.is_empty() {
                self.extend(RateLimitCategory::All, until);
                continue;
            }
            for category in categories.split(';') {
                if let Some(category) = RateLimitCategory::from_header_name(category) {
                    self.extend(category, until);
                }
            }
        }
    }

    /// Applies the throttling information of a finished request.
    ///
    /// A structured limits header takes precedence; without one, a plain
    /// `429` applies the `Retry-After` header (or the 60 second default) to
    /// all categories.
    pub fn update_from_response(
        &mut self,
        status: u16,
        limits_header: Option<&str>,
        retry_after: Option<&str>,
    ) {
        if let Some(limits) = limits_header {
            self.update_from_limits_header(limits);
        } else if status == 429 {
            self.update_from_retry_after(retry_after.unwrap_or(""));
        }
    }

    /// Queries whether the given category is currently blocked.
    pub fn is_active(&self, category: RateLimitCategory) -> bool {
        self.is_active_at(category, SystemTime::now())
    }

    fn is_active_at(&self, category: RateLimitCategory, now: SystemTime) -> bool {
        if category == RateLimitCategory::Unknown {
            return false;
        }
        let blocked = |category| {
            self.blocked_until
                .get(&category)
                .is_some_and(|until| *until > now)
        };
        blocked(RateLimitCategory::All) || blocked(category)
    }

    /// Returns how long the given category remains blocked, if at all.
    pub fn time_left(&self, category: RateLimitCategory) -> Option<Duration> {
        let now = SystemTime::now();
        let until = [RateLimitCategory::All, category]
            .iter()
            .filter_map(|category| self.blocked_until.get(category))
            .max()?;
        until.duration_since(now).ok()
    }

    /// Whether any category is currently blocked.
    pub fn is_any_active(&self) -> bool {
        let now = SystemTime::now();
        self.blocked_until.values().any(|until| *until > now)
    }

    /// Removes the items of rate limited categories from the envelope.
    ///
    /// Returns the envelope with only the surviving items, or `None` when
    /// nothing survived. Raw envelopes cannot be inspected and pass
    /// through unchanged.
    pub fn filter(&self, envelope: Envelope) -> Option<Envelope> {
        let before = envelope.items().count();
        let filtered = envelope.filter(|item| !self.is_active(RateLimitCategory::from(item.ty())));
        let after = filtered.as_ref().map_or(0, |e| e.items().count());
        if after < before {
            fault_debug!(
                "[RateLimiter] dropped {} rate limited envelope item(s)",
                before - after
            );
        }
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_header_blocks_category() {
        let mut rl = RateLimiter::new();
        let now = SystemTime::now();
        rl.update_from_limits_header_at("60:error:key", now);

        assert!(rl.is_active_at(RateLimitCategory::Error, now));
        assert!(!rl.is_active_at(RateLimitCategory::Session, now));
        assert!(!rl.is_active_at(RateLimitCategory::All, now));

        // the window ends exactly 60 simulated seconds later
        assert!(rl.is_active_at(RateLimitCategory::Error, now + Duration::from_secs(59)));
        assert!(!rl.is_active_at(RateLimitCategory::Error, now + Duration::from_secs(60)));
    }

    #[test]
    fn test_shorter_limit_never_shortens_active_block() {
        let mut rl = RateLimiter::new();
        let now = SystemTime::now();
        rl.update_from_limits_header_at("60:error:key", now);
        rl.update_from_limits_header_at("1:error:key", now);

        assert!(rl.is_active_at(RateLimitCategory::Error, now + Duration::from_secs(30)));
    }

    #[test]
    fn test_empty_category_list_blocks_everything() {
        let mut rl = RateLimiter::new();
        let now = SystemTime::now();
        rl.update_from_limits_header_at("30::key", now);

        assert!(rl.is_active_at(RateLimitCategory::Error, now));
        assert!(rl.is_active_at(RateLimitCategory::Session, now));
        assert!(rl.is_active_at(RateLimitCategory::Transaction, now));
        // unknown payloads are exempt even from the wildcard bucket
        assert!(!rl.is_active_at(RateLimitCategory::Unknown, now));
    }

    #[test]
    fn test_unparsable_seconds_fall_back_to_default() {
        let mut rl = RateLimiter::new();
        let now = SystemTime::now();
        rl.update_from_limits_header_at("florp:session:key", now);

        assert!(rl.is_active_at(RateLimitCategory::Session, now + Duration::from_secs(59)));
        assert!(!rl.is_active_at(RateLimitCategory::Session, now + Duration::from_secs(61)));
    }

    #[test]
    fn test_plain_429_blocks_all_via_retry_after() {
        let mut rl = RateLimiter::new();
        rl.update_from_response(429, None, Some("120"));

        assert!(rl.is_active(RateLimitCategory::Error));
        assert!(rl.is_active(RateLimitCategory::Session));
        assert!(rl.time_left(RateLimitCategory::Error).unwrap() <= Duration::from_secs(120));
    }

    #[test]
    fn test_multiple_groups() {
        let mut rl = RateLimiter::new();
        rl.update_from_limits_header("120:error:project:reason, 60:session;attachment:foo");

        assert!(rl.time_left(RateLimitCategory::Error).unwrap() <= Duration::from_secs(120));
        assert!(rl.time_left(RateLimitCategory::Session).unwrap() <= Duration::from_secs(60));
        assert!(rl.time_left(RateLimitCategory::Attachment).unwrap() <= Duration::from_secs(60));
        assert!(rl.time_left(RateLimitCategory::Transaction).is_none());
    }

    #[test]
    fn test_filter_drops_limited_items() {
        use crate::protocol::EnvelopeItem;

        let mut rl = RateLimiter::new();
        rl.update_from_limits_header("60:session:key");

        let mut envelope = Envelope::new();
        envelope.add_item(EnvelopeItem::from_json(
            EnvelopeItemType::Event,
            b"{}".to_vec(),
        ));
        envelope.add_item(EnvelopeItem::from_json(
            EnvelopeItemType::Session,
            b"{}".to_vec(),
        ));

        let filtered = rl.filter(envelope).unwrap();
        let types: Vec<_> = filtered.items().map(|item| item.ty().clone()).collect();
        assert_eq!(types, vec![EnvelopeItemType::Event]);
    }

    #[test]
    fn test_filter_discards_fully_limited_envelope() {
        use crate::protocol::EnvelopeItem;

        let mut rl = RateLimiter::new();
        rl.update_from_limits_header("60::key");

        let mut envelope = Envelope::new();
        envelope.add_item(EnvelopeItem::from_json(
            EnvelopeItemType::Event,
            b"{}".to_vec(),
        ));

        assert!(rl.filter(envelope).is_none());
    }
}
