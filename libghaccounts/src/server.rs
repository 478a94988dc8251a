//! GitHub server addresses
//!
//! A `ServerPath` is the normalized form of whatever the user typed as a host:
//! `github.com`, `https://ghe.example.com:8443/prefix`, `http://localhost`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GhAccountsError;

/// Host used when no host was ever configured
pub const DEFAULT_HOST: &str = "github.com";

const DEFAULT_API_URL: &str = "https://api.github.com";

/// Normalized GitHub server address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerPath {
    /// `Some(true)` for `http://`, `Some(false)` for `https://`, `None` if no scheme was given
    use_http: Option<bool>,
    host: String,
    port: Option<u16>,
    /// Path prefix including the leading `/`, without a trailing `/`
    suffix: Option<String>,
}

impl ServerPath {
    /// The public github.com server
    pub fn default_server() -> Self {
        Self {
            use_http: None,
            host: DEFAULT_HOST.to_string(),
            port: None,
            suffix: None,
        }
    }

    /// Parse a host, falling back to [`DEFAULT_HOST`] when absent
    pub fn from_host(host: Option<&str>) -> Result<Self, GhAccountsError> {
        host.unwrap_or(DEFAULT_HOST).parse()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn is_default(&self) -> bool {
        self.host == DEFAULT_HOST && self.port.is_none() && self.suffix.is_none()
    }

    /// Web URL of the server
    pub fn to_url(&self) -> String {
        let scheme = if self.use_http == Some(true) { "http" } else { "https" };
        format!("{}://{}", scheme, self.authority_and_suffix())
    }

    /// Base URL of the REST API
    ///
    /// github.com serves its API from a separate host; Enterprise servers
    /// serve it under `/api/v3`.
    pub fn api_url(&self) -> String {
        if self.is_default() {
            DEFAULT_API_URL.to_string()
        } else {
            format!("{}/api/v3", self.to_url())
        }
    }

    fn authority_and_suffix(&self) -> String {
        let mut out = self.host.clone();
        if let Some(port) = self.port {
            out.push(':');
            out.push_str(&port.to_string());
        }
        if let Some(suffix) = &self.suffix {
            out.push_str(suffix);
        }
        out
    }
}

impl FromStr for ServerPath {
    type Err = GhAccountsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = |reason: &str| {
            GhAccountsError::InvalidInput(format!("Invalid server address '{}': {}", s, reason))
        };

        let (use_http, rest) = if let Some(rest) = strip_prefix_ignore_case(input, "https://") {
            (Some(false), rest)
        } else if let Some(rest) = strip_prefix_ignore_case(input, "http://") {
            (Some(true), rest)
        } else if input.contains("://") {
            return Err(invalid("only http and https are supported"));
        } else {
            (None, input)
        };

        let (authority, suffix) = match rest.find('/') {
            Some(idx) => (&rest[..idx], Some(&rest[idx..])),
            None => (rest, None),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid("port must be a number between 0 and 65535"))?;
                (host, Some(port))
            }
            None => (authority, None),
        };

        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        if host.chars().any(|c| c.is_whitespace()) {
            return Err(invalid("host contains whitespace"));
        }

        let suffix = suffix
            .map(|s| s.trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            use_http,
            host: host.to_lowercase(),
            port,
            suffix,
        })
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}

impl fmt::Display for ServerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.use_http {
            Some(true) => write!(f, "http://{}", self.authority_and_suffix()),
            Some(false) => write!(f, "https://{}", self.authority_and_suffix()),
            None => write!(f, "{}", self.authority_and_suffix()),
        }
    }
}

impl TryFrom<String> for ServerPath {
    type Error = GhAccountsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServerPath> for String {
    fn from(value: ServerPath) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_host() {
        let server: ServerPath = "github.com".parse().unwrap();
        assert_eq!(server.host(), "github.com");
        assert_eq!(server.to_string(), "github.com");
        assert!(server.is_default());
    }

    #[test]
    fn test_parse_full_address() {
        let server: ServerPath = "https://GHE.example.com:8443/prefix/".parse().unwrap();
        assert_eq!(server.host(), "ghe.example.com");
        assert_eq!(server.port(), Some(8443));
        assert_eq!(server.to_string(), "https://ghe.example.com:8443/prefix");
        assert!(!server.is_default());
    }

    #[test]
    fn test_parse_non_ascii_host() {
        let server: ServerPath = "aéééé".parse().unwrap();
        assert_eq!(server.host(), "aéééé");

        let server: ServerPath = "HTTPS://ÉCOLE.example".parse().unwrap();
        assert_eq!(server.to_string(), "https://école.example");
    }

    #[test]
    fn test_parse_http_scheme() {
        let server: ServerPath = "http://localhost".parse().unwrap();
        assert_eq!(server.to_url(), "http://localhost");
        assert_eq!(server.api_url(), "http://localhost/api/v3");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("".parse::<ServerPath>().is_err());
        assert!("https://".parse::<ServerPath>().is_err());
        assert!("ftp://github.com".parse::<ServerPath>().is_err());
        assert!("github.com:notaport".parse::<ServerPath>().is_err());
        assert!("git hub.com".parse::<ServerPath>().is_err());
    }

    #[test]
    fn test_from_host_defaults() {
        assert_eq!(ServerPath::from_host(None).unwrap(), ServerPath::default_server());
        assert_eq!(
            ServerPath::from_host(Some("ghe.corp")).unwrap().to_string(),
            "ghe.corp"
        );
    }

    #[test]
    fn test_api_url() {
        assert_eq!(ServerPath::default_server().api_url(), "https://api.github.com");
        let https_default: ServerPath = "https://github.com".parse().unwrap();
        assert_eq!(https_default.api_url(), "https://api.github.com");

        let enterprise: ServerPath = "ghe.corp:8080".parse().unwrap();
        assert_eq!(enterprise.api_url(), "https://ghe.corp:8080/api/v3");
    }

    #[test]
    fn test_serde_as_string() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            server: ServerPath,
        }

        let wrapper = Wrapper {
            server: "https://ghe.corp/x".parse().unwrap(),
        };
        let encoded = toml::to_string(&wrapper).unwrap();
        assert!(encoded.contains("server = \"https://ghe.corp/x\""));

        let decoded: Wrapper = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded.server, wrapper.server);
    }
}
