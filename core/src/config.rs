//! Server address and credential configuration.
//!
//! # Design
//! Both values are fixed for the lifetime of a client. The ML server exposes
//! an HTTPS and an HTTP listener; which one a client talks to is chosen by
//! whoever builds the `ClientConfig`, either in code or through `from_env`.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// Default servlet port of the ML server for this scheme.
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 9763,
            Scheme::Https => 9443,
        }
    }
}

impl FromStr for Scheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(ConfigError::UnsupportedScheme(s.to_string())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the ML server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: &str, port: u16) -> Self {
        Self {
            scheme,
            host: host.to_string(),
            port,
        }
    }

    pub fn http(host: &str, port: u16) -> Self {
        Self::new(Scheme::Http, host, port)
    }

    pub fn https(host: &str, port: u16) -> Self {
        Self::new(Scheme::Https, host, port)
    }

    /// `scheme://host:port`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Username and password sent as HTTP basic auth on every request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// The `Authorization` header value: `Basic base64(username:password)`.
    pub fn basic_auth_header(&self) -> String {
        let token = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(token.as_bytes()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
}

impl ClientConfig {
    pub fn new(endpoint: Endpoint, credentials: Credentials) -> Self {
        Self {
            endpoint,
            credentials,
        }
    }

    /// Read the configuration from `ML_SCHEME`, `ML_HOST`, `ML_PORT`,
    /// `ML_USERNAME` and `ML_PASSWORD`.
    ///
    /// Unset variables fall back to an HTTPS connection to `localhost` on the
    /// scheme's default port, authenticated as `admin`/`admin`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let scheme = match lookup("ML_SCHEME") {
            Some(raw) => raw.parse()?,
            None => Scheme::Https,
        };
        let host = lookup("ML_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup("ML_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            None => scheme.default_port(),
        };
        let username = lookup("ML_USERNAME").unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        let password = lookup("ML_PASSWORD").unwrap_or_else(|| DEFAULT_PASSWORD.to_string());

        Ok(Self {
            endpoint: Endpoint::new(scheme, &host, port),
            credentials: Credentials::new(&username, &password),
        })
    }
}
