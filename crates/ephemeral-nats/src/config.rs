//! NATS connection configuration for the side channel

use serde::{Deserialize, Serialize};

/// NATS connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URLs (comma-separated when loaded from env)
    pub servers: Vec<String>,
    /// Deployment prefix for subjects (e.g., "prod", "dev")
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Connection name reported to the server
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Optional credentials file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<String>,
    /// Optional username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Optional password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_prefix() -> String {
    "prod".to_string()
}

fn default_client_name() -> String {
    "ephemeral-roles".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self::new(vec!["localhost:4222".to_string()], default_prefix())
    }
}

impl NatsConfig {
    pub fn new(servers: Vec<String>, prefix: impl Into<String>) -> Self {
        Self {
            servers,
            prefix: prefix.into(),
            client_name: default_client_name(),
            credentials_file: None,
            username: None,
            password: None,
        }
    }

    /// Parse servers from a comma-separated URL string. Empty entries are skipped.
    pub fn from_url(url: impl AsRef<str>, prefix: impl Into<String>) -> Self {
        let servers = url
            .as_ref()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Self::new(servers, prefix)
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_credentials(mut self, file: impl Into<String>) -> Self {
        self.credentials_file = Some(file.into());
        self
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_localhost() {
        let cfg = NatsConfig::default();
        assert_eq!(cfg.servers, vec!["localhost:4222"]);
        assert_eq!(cfg.prefix, "prod");
        assert_eq!(cfg.client_name, "ephemeral-roles");
    }

    #[test]
    fn test_from_url_multiple_trimmed() {
        let cfg = NatsConfig::from_url("n1:4222 , n2:4222,,", "dev");
        assert_eq!(cfg.servers, vec!["n1:4222", "n2:4222"]);
        assert_eq!(cfg.prefix, "dev");
    }

    #[test]
    fn test_with_client_name() {
        let cfg = NatsConfig::from_url("localhost:4222", "dev").with_client_name("ephemeral-roles-ctl");
        assert_eq!(cfg.client_name, "ephemeral-roles-ctl");
    }

    #[test]
    fn test_with_auth() {
        let cfg = NatsConfig::from_url("localhost:4222", "test").with_auth("alice", "secret");
        assert_eq!(cfg.username.as_deref(), Some("alice"));
        assert_eq!(cfg.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_toml_defaults() {
        let cfg: NatsConfig = toml::from_str(r#"servers = ["nats://n1:4222"]"#).unwrap();
        assert_eq!(cfg.prefix, "prod");
        assert_eq!(cfg.client_name, "ephemeral-roles");
        assert!(cfg.credentials_file.is_none());
    }

    #[test]
    fn test_optional_fields_omitted_in_json() {
        let cfg = NatsConfig::from_url("localhost:4222", "test").with_credentials("/creds");
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("credentials_file"));
        assert!(!json.contains("username"));
        assert!(!json.contains("password"));
    }
}
