use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use thiserror::Error;
use url::Url;

use crate::auth::Auth;
use crate::project_id::{ParseProjectIdError, ProjectId};

/// Represents a dsn url parsing error.
#[derive(Debug, Error)]
pub enum ParseDsnError {
    /// raised on completely invalid urls
    #[error("no valid url provided")]
    InvalidUrl,
    /// raised on unknown or unsupported schemes
    #[error("no valid scheme provided")]
    InvalidScheme,
    /// raised if the public key portion is missing
    #[error("username is empty")]
    NoUsername,
    /// raised if the project id portion is missing
    #[error("empty path")]
    NoProjectId,
    /// raised the project id is invalid
    #[error("invalid project id")]
    InvalidProjectId(#[from] ParseProjectIdError),
}

/// Represents the scheme of an url http or https.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum Scheme {
    /// unencrypted http
    Http,
    /// encrypted https
    Https,
}

impl Scheme {
    /// Returns the default port for this scheme.
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match *self {
                Scheme::Https => "https",
                Scheme::Http => "http",
            }
        )
    }
}

/// Represents a DSN.
///
/// The DSN is the client key issued for a project. It encodes where to send
/// envelopes and which public key to authenticate with:
/// `{scheme}://{public_key}@{host}[:{port}]/{project_id}`.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Dsn {
    scheme: Scheme,
    public_key: String,
    host: String,
    port: Option<u16>,
    project_id: ProjectId,
}

impl Dsn {
    /// Converts the dsn into an auth header for the given client agent.
    pub fn to_auth(&self, client_agent: Option<&str>) -> Auth {
        Auth::new(self.public_key.clone(), client_agent.map(str::to_owned))
    }

    fn api_url(&self, endpoint: &str) -> Url {
        use std::fmt::Write;
        let mut buf = format!("{}://{}", self.scheme(), self.host());
        if self.port() != self.scheme.default_port() {
            write!(&mut buf, ":{}", self.port()).unwrap();
        }
        write!(&mut buf, "/api/{}/{}/", self.project_id(), endpoint).unwrap();
        Url::parse(&buf).unwrap()
    }

    /// Returns the submission API URL for envelopes.
    pub fn envelope_api_url(&self) -> Url {
        self.api_url("envelope")
    }

    /// Returns the scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the public_key.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Returns the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Returns the project_id.
    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}://{}@{}", self.scheme, self.public_key, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "/{}", self.project_id)
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dsn(\"{self}\")")
    }
}

impl FromStr for Dsn {
    type Err = ParseDsnError;

    fn from_str(s: &str) -> Result<Dsn, ParseDsnError> {
        let url = Url::parse(s).map_err(|_| ParseDsnError::InvalidUrl)?;

        if url.path() == "/" {
            return Err(ParseDsnError::NoProjectId);
        }

        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            _ => return Err(ParseDsnError::InvalidScheme),
        };

        let public_key = match url.username() {
            "" => return Err(ParseDsnError::NoUsername),
            username => username.to_string(),
        };

        let host = url
            .host_str()
            .ok_or(ParseDsnError::InvalidUrl)?
            .to_string();
        let port = url.port();

        let project_id = url
            .path()
            .trim_matches('/')
            .rsplit('/')
            .next()
            .ok_or(ParseDsnError::NoProjectId)?
            .parse()?;

        Ok(Dsn {
            scheme,
            public_key,
            host,
            port,
            project_id,
        })
    }
}

impl Serialize for Dsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Dsn, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Dsn::from_str(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dsn_parsing() {
        let url = "https://username@domain:8888/23";
        let dsn = url.parse::<Dsn>().unwrap();
        assert_eq!(dsn.scheme(), Scheme::Https);
        assert_eq!(dsn.public_key(), "username");
        assert_eq!(dsn.host(), "domain");
        assert_eq!(dsn.port(), 8888);
        assert_eq!(dsn.project_id(), &ProjectId::new(23));
        assert_eq!(dsn.to_string(), url);
    }

    #[test]
    fn test_dsn_default_port() {
        let dsn = "https://username@domain/42".parse::<Dsn>().unwrap();
        assert_eq!(dsn.port(), 443);
        assert_eq!(
            dsn.envelope_api_url().to_string(),
            "https://domain/api/42/envelope/"
        );
    }

    #[test]
    fn test_dsn_no_key() {
        assert!(matches!(
            "https://domain/42".parse::<Dsn>(),
            Err(ParseDsnError::NoUsername)
        ));
    }

    #[test]
    fn test_dsn_bad_project_id() {
        assert!(matches!(
            "https://username@domain/bad".parse::<Dsn>(),
            Err(ParseDsnError::InvalidProjectId(_))
        ));
    }

    #[test]
    fn test_dsn_to_auth() {
        let dsn = "https://key@ingest.faultline.dev/1".parse::<Dsn>().unwrap();
        let auth = dsn.to_auth(Some("faultline-rust/0.3"));
        assert_eq!(auth.key(), "key");
        assert_eq!(auth.version(), 1);
    }
}
