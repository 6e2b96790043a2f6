//! Utility functions module

use crate::error::{Error, Result};
use reqwest::Client;
use std::time::Duration;

/// HTTP client builder
///
/// No whole-request timeout is applied: the SSE leg stays open for the whole
/// tool invocation, so only connect and per-read timeouts are bounded.
pub struct HttpClientBuilder {
    connect_timeout: Duration,
    read_timeout: Duration,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Duration,
    user_agent: String,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            pool_max_idle_per_host: 5,
            pool_idle_timeout: Duration::from_secs(30),
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
        }
    }
}

impl HttpClientBuilder {
    /// Create a new HTTP client builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connection timeout
    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Set per-read timeout
    #[must_use]
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Set connection pool size
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max_idle: usize) -> Self {
        self.pool_max_idle_per_host = max_idle;
        self
    }

    /// Set keep-alive expiry for idle pooled connections
    #[must_use]
    pub fn pool_idle_timeout(mut self, idle: Duration) -> Self {
        self.pool_idle_timeout = idle;
        self
    }

    /// Set User-Agent
    #[must_use]
    pub fn user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Build HTTP client
    pub fn build(self) -> Result<Client> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| Error::HttpRequest(e.to_string()))
    }
}

/// String utilities
pub mod string {
    /// Upper-case the first letter of every alphabetic run, lower-case the rest.
    ///
    /// `"next.js"` becomes `"Next.Js"`, `"react-router"` becomes `"React-Router"`.
    #[must_use]
    pub fn title_case(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut at_word_start = true;
        for c in s.chars() {
            if c.is_alphabetic() {
                if at_word_start {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                at_word_start = false;
            } else {
                out.push(c);
                at_word_start = true;
            }
        }
        out
    }
}

/// Validation utilities
pub mod validation {
    use crate::error::Error;

    /// Maximum length of a library name given on the command line
    pub const MAX_LIBRARY_NAME_LEN: usize = 50;

    /// Validate a library name passed explicitly by the user
    pub fn validate_library_name(name: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::Config("Library name cannot be empty".to_string()));
        }

        if name.len() > MAX_LIBRARY_NAME_LEN {
            return Err(Error::Config(format!("Library name too long: {name}")));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Config(format!(
                "Invalid library name: {name} (only letters, numbers, hyphens, and underscores are allowed)"
            )));
        }

        Ok(())
    }

    /// Split a comma-separated library list and validate every entry
    pub fn parse_library_list(list: &str) -> Result<Vec<String>, Error> {
        list.split(',')
            .map(str::trim)
            .map(|lib| validate_library_name(lib).map(|()| lib.to_string()))
            .collect()
    }

    /// Check whether an API key looks well-formed
    #[must_use]
    pub fn is_valid_api_key(key: &str) -> bool {
        key.len() >= 6
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }
}

#[cfg(test)]
mod tests {
    use super::string::title_case;
    use super::validation::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("react"), "React");
        assert_eq!(title_case("postgresql"), "Postgresql");
        assert_eq!(title_case("react-router"), "React-Router");
        assert_eq!(title_case("next.js"), "Next.Js");
    }

    #[test]
    fn test_library_list() {
        assert_eq!(
            parse_library_list("react, fastapi,postgresql").unwrap(),
            vec!["react", "fastapi", "postgresql"]
        );
        assert!(parse_library_list("react,,vue").is_err());
        assert!(parse_library_list("re act").is_err());
        assert!(parse_library_list(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_api_key_format() {
        assert!(is_valid_api_key("env-key"));
        assert!(is_valid_api_key("ctx7sk_abc.123"));
        assert!(!is_valid_api_key("short"));
        assert!(!is_valid_api_key("has space key"));
    }

    #[test]
    fn test_http_client_builds() {
        assert!(super::HttpClientBuilder::new().build().is_ok());
    }
}
