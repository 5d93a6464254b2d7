use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::protocol::LATEST;

/// Represents an auth header parsing error.
#[derive(Debug, Error)]
#[error("invalid auth header")]
pub struct ParseAuthError;

/// Represents an auth header.
///
/// The auth header is sent along with every store/envelope request and
/// carries the protocol version, the public client key and the name of the
/// submitting client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Auth {
    pub(crate) key: String,
    pub(crate) secret: Option<String>,
    pub(crate) version: u16,
    pub(crate) client: Option<String>,
}

impl Auth {
    /// Creates an auth header from a public key and client agent.
    pub fn new(key: String, client: Option<String>) -> Auth {
        Auth {
            key,
            secret: None,
            version: LATEST,
            client,
        }
    }

    /// Returns the protocol version the client speaks.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Returns the public key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the client's agent string, if set.
    pub fn client_agent(&self) -> Option<&str> {
        self.client.as_deref()
    }
}

impl fmt::Display for Auth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Faultline faultline_version={}, faultline_key={}",
            self.version, self.key
        )?;
        if let Some(ref client) = self.client {
            write!(f, ", faultline_client={client}")?;
        }
        if let Some(ref secret) = self.secret {
            write!(f, ", faultline_secret={secret}")?;
        }
        Ok(())
    }
}

impl FromStr for Auth {
    type Err = ParseAuthError;

    fn from_str(s: &str) -> Result<Auth, ParseAuthError> {
        let mut rv = Auth {
            key: String::new(),
            secret: None,
            version: LATEST,
            client: None,
        };

        let trimmed = s.strip_prefix("Faultline").unwrap_or(s);
        for item in trimmed.split(',') {
            let mut kv = item.trim().splitn(2, '=');
            let key = kv.next().ok_or(ParseAuthError)?.trim();
            let value = kv.next().ok_or(ParseAuthError)?.trim();
            match key {
                "faultline_version" => {
                    rv.version = value.parse().map_err(|_| ParseAuthError)?;
                }
                "faultline_key" => rv.key = value.into(),
                "faultline_secret" => rv.secret = Some(value.into()),
                "faultline_client" => rv.client = Some(value.into()),
                _ => {}
            }
        }

        if rv.key.is_empty() {
            return Err(ParseAuthError);
        }
        Ok(rv)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_auth_to_string() {
        let auth = Auth::new("42".into(), Some("faultline-rust/0.3".into()));
        assert_eq!(
            auth.to_string(),
            "Faultline faultline_version=1, faultline_key=42, \
             faultline_client=faultline-rust/0.3"
        );
    }

    #[test]
    fn test_auth_parse_roundtrip() {
        let auth = Auth::new("publickey".into(), Some("agent/1.0".into()));
        let parsed: Auth = auth.to_string().parse().unwrap();
        assert_eq!(parsed, auth);
    }
}
