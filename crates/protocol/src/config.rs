use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub ice: IceConfig,
}

/// Deployment environment. Selects the WebSocket URL scheme handed to
/// clients and whether peer connections are forced through the TURN relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Parse the `ENVIRONMENT` env var the deployment scripts set.
    /// Anything other than `PRODUCTION` (case-insensitive) is development.
    pub fn from_env_var(value: &str) -> Self {
        if value.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// WebSocket URL scheme for client-facing session URLs.
    pub fn ws_scheme(&self) -> &'static str {
        match self {
            Environment::Production => "wss",
            Environment::Development => "ws",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// ICE server configuration for WebRTC NAT traversal.
///
/// In development peer connections run with an empty configuration (host
/// candidates only). In production every connection is forced through the
/// TURN relay with long-term credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceConfig {
    /// STUN server URLs
    #[serde(default = "default_stun_urls")]
    pub stun_urls: Vec<String>,
    /// TURN server URLs (e.g., "turn:turn.example.com:3478")
    #[serde(default = "default_turn_urls")]
    pub turn_urls: Vec<String>,
    /// TURN username (long-term credential mechanism)
    pub turn_username: Option<String>,
    /// TURN credential/password
    pub turn_credential: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_urls: default_stun_urls(),
            turn_urls: default_turn_urls(),
            turn_username: None,
            turn_credential: None,
        }
    }
}

impl BeaconConfig {
    /// Validate the configuration, returning a list of issues found.
    ///
    /// Issues are prefixed with "ERROR:" (fatal, server should not start) or
    /// "WARNING:" (advisory, server can start but the config is likely wrong).
    ///
    /// Returns `Ok(())` if no issues, or `Err(issues)` with all found problems.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.server.bind.parse::<std::net::IpAddr>().is_err() {
            issues.push(format!(
                "ERROR: server.bind '{}' is not a valid IP address",
                self.server.bind
            ));
        }

        if self.environment.is_production() {
            if self.ice.turn_urls.is_empty() {
                issues.push(
                    "ERROR: environment is production but ice.turn_urls is empty \
                     (production forces relay-only ICE)"
                        .to_string(),
                );
            }
            if self.ice.turn_username.is_none() || self.ice.turn_credential.is_none() {
                issues.push(
                    "ERROR: environment is production but ice.turn_username / \
                     ice.turn_credential are not set"
                        .to_string(),
                );
            }
        } else if self.ice.turn_username.is_some() && self.ice.turn_credential.is_none() {
            issues.push(
                "WARNING: ice.turn_username is set without ice.turn_credential".to_string(),
            );
        }

        for url in self.ice.stun_urls.iter() {
            if !url.starts_with("stun:") {
                issues.push(format!(
                    "WARNING: ice.stun_urls entry '{url}' is not a stun: URL"
                ));
            }
        }
        for url in self.ice.turn_urls.iter() {
            if !url.starts_with("turn:") && !url.starts_with("turns:") {
                issues.push(format!(
                    "WARNING: ice.turn_urls entry '{url}' is not a turn: URL"
                ));
            }
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_stun_urls() -> Vec<String> {
    vec!["stun:turn.localhost:3478".to_string()]
}

fn default_turn_urls() -> Vec<String> {
    vec!["turn:turn.localhost:3478".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config: BeaconConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.ice.stun_urls, vec!["stun:turn.localhost:3478"]);
        assert_eq!(config.ice.turn_urls, vec!["turn:turn.localhost:3478"]);
        assert!(config.ice.turn_username.is_none());
        assert!(config.ice.turn_credential.is_none());
    }

    #[test]
    fn config_parses_full_toml() {
        let config: BeaconConfig = toml::from_str(
            r#"
            environment = "production"

            [server]
            bind = "127.0.0.1"
            port = 9000

            [ice]
            stun_urls = ["stun:turn.example.org:3478"]
            turn_urls = ["turn:turn.example.org:3478"]
            turn_username = "victim"
            turn_credential = "s3cret"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert!(config.environment.is_production());
        assert_eq!(config.ice.turn_username.as_deref(), Some("victim"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ws_scheme_follows_environment() {
        assert_eq!(Environment::Development.ws_scheme(), "ws");
        assert_eq!(Environment::Production.ws_scheme(), "wss");
    }

    #[test]
    fn environment_from_env_var() {
        assert_eq!(
            Environment::from_env_var("PRODUCTION"),
            Environment::Production
        );
        assert_eq!(
            Environment::from_env_var("production"),
            Environment::Production
        );
        assert_eq!(Environment::from_env_var(""), Environment::Development);
        assert_eq!(
            Environment::from_env_var("staging"),
            Environment::Development
        );
    }

    #[test]
    fn validate_rejects_production_without_turn_credentials() {
        let config: BeaconConfig = toml::from_str(r#"environment = "production""#).unwrap();
        let issues = config.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.starts_with("ERROR:")));
        assert!(issues.iter().any(|i| i.contains("turn_username")));
    }

    #[test]
    fn validate_rejects_bad_bind_address() {
        let config: BeaconConfig = toml::from_str(
            r#"
            [server]
            bind = "not-an-ip"
            "#,
        )
        .unwrap();
        let issues = config.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.contains("server.bind")));
    }

    #[test]
    fn validate_warns_on_non_stun_url() {
        let config: BeaconConfig = toml::from_str(
            r#"
            [ice]
            stun_urls = ["http://example.org"]
            "#,
        )
        .unwrap();
        let issues = config.validate().unwrap_err();
        assert!(issues.iter().any(|i| i.starts_with("WARNING:")));
    }
}
