//! Useful utilities for working with timestamps and their wire formats.
use std::time::{Duration, SystemTime};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Converts a `SystemTime` object into a float timestamp.
pub fn datetime_to_timestamp(st: &SystemTime) -> f64 {
    match st.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => duration.as_secs_f64(),
        Err(_) => 0.0,
    }
}

/// Converts a float timestamp into a `SystemTime`, if representable.
pub fn timestamp_to_datetime(ts: f64) -> Option<SystemTime> {
    let duration = Duration::from_secs_f64(ts);
    SystemTime::UNIX_EPOCH.checked_add(duration)
}

/// Formats a `SystemTime` as an RFC3339 string, or an empty string if the
/// time predates the epoch.
pub fn to_rfc3339(st: &SystemTime) -> String {
    st.duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .and_then(|duration| TryFrom::try_from(duration).ok())
        .and_then(|duration| OffsetDateTime::UNIX_EPOCH.checked_add(duration))
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_default()
}

/// Parses an RFC3339 string into a `SystemTime`.
pub fn from_rfc3339(s: &str) -> Option<SystemTime> {
    let dt = OffsetDateTime::parse(s, &Rfc3339).ok()?;
    let secs = u64::try_from(dt.unix_timestamp()).ok()?;
    let duration = Duration::new(secs, dt.nanosecond());
    SystemTime::UNIX_EPOCH.checked_add(duration)
}

/// Serde support for timestamps serialized as float seconds since the epoch.
pub mod ts_seconds_float {
    use std::fmt;

    use serde::{de, ser};

    use super::*;

    /// Deserializes a float or integer seconds timestamp.
    pub fn deserialize<'de, D>(d: D) -> Result<SystemTime, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        d.deserialize_any(SecondsTimestampVisitor)
    }

    /// Serializes a timestamp as float seconds, or integer seconds when the
    /// subsecond part is zero.
    pub fn serialize<S>(st: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match st.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(duration) => {
                if duration.subsec_nanos() == 0 {
                    serializer.serialize_u64(duration.as_secs())
                } else {
                    serializer.serialize_f64(duration.as_secs_f64())
                }
            }
            Err(_) => Err(ser::Error::custom(format!(
                "invalid `SystemTime` instance: {st:?}"
            ))),
        }
    }

    struct SecondsTimestampVisitor;

    impl de::Visitor<'_> for SecondsTimestampVisitor {
        type Value = SystemTime;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a unix timestamp")
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<SystemTime, E> {
            timestamp_to_datetime(value)
                .ok_or_else(|| E::custom(format!("timestamp out of range: {value}")))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<SystemTime, E> {
            self.visit_f64(value as f64)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<SystemTime, E> {
            self.visit_f64(value as f64)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<SystemTime, E> {
            from_rfc3339(value).ok_or_else(|| E::custom(format!("invalid timestamp: {value}")))
        }
    }
}

/// Serde support for timestamps serialized as RFC3339 strings.
pub mod ts_rfc3339 {
    use std::fmt;

    use serde::{de, ser};

    use super::*;

    /// Deserializes an RFC3339 timestamp.
    pub fn deserialize<'de, D>(d: D) -> Result<SystemTime, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        d.deserialize_any(Rfc3339Visitor)
    }

    /// Serializes a timestamp as an RFC3339 string.
    pub fn serialize<S>(st: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        serializer.serialize_str(&to_rfc3339(st))
    }

    struct Rfc3339Visitor;

    impl de::Visitor<'_> for Rfc3339Visitor {
        type Value = SystemTime;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "an RFC3339 timestamp")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<SystemTime, E> {
            from_rfc3339(value).ok_or_else(|| E::custom(format!("invalid timestamp: {value}")))
        }
    }
}

/// Serde support for optional RFC3339 timestamps.
pub mod ts_rfc3339_opt {
    use serde::{de::Deserialize, ser};

    use super::*;

    /// Deserializes an optional RFC3339 timestamp.
    pub fn deserialize<'de, D>(d: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.as_deref().and_then(from_rfc3339))
    }

    /// Serializes an optional RFC3339 timestamp.
    pub fn serialize<S>(st: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match st {
            Some(st) => ts_rfc3339::serialize(st, serializer),
            None => serializer.serialize_none(),
        }
    }
}
