//! Remote endpoint configuration.

use std::env;

const HOST_ENV: &str = "GEOGRID_HOST";
const PORT_ENV: &str = "GEOGRID_PORT";
const USER_ENV: &str = "GEOGRID_USER";
const PASSWORD_ENV: &str = "GEOGRID_PASSWORD";

const DEFAULT_PORT: u16 = 4711;

/// Connection settings for the remote analysis endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Read the configuration from `GEOGRID_*` environment variables.
    /// Unset variables leave their fields empty; an unparseable port falls
    /// back to the default.
    pub fn from_env() -> Self {
        let host = env::var(HOST_ENV).ok().filter(|h| !h.is_empty());
        let port = env::var(PORT_ENV)
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Self {
            host,
            port,
            username: env::var(USER_ENV).ok(),
            password: env::var(PASSWORD_ENV).ok(),
        }
    }

    /// True when a host is set; submission requires it.
    pub fn is_configured(&self) -> bool {
        self.host.is_some()
    }

    pub fn base_url(&self) -> Option<String> {
        self.host
            .as_ref()
            .map(|host| format!("http://{host}:{port}", port = self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_builds_base_url() {
        let config = EndpointConfig::new("analysis.local", 8080);
        assert!(config.is_configured());
        assert_eq!(
            config.base_url().as_deref(),
            Some("http://analysis.local:8080")
        );
    }

    #[test]
    fn default_config_is_unconfigured() {
        let config = EndpointConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.base_url(), None);
    }

    #[test]
    fn credentials_attach() {
        let config = EndpointConfig::new("h", 1).with_credentials("user", "secret");
        assert_eq!(config.username.as_deref(), Some("user"));
        assert_eq!(config.password.as_deref(), Some("secret"));
    }
}
