use crate::error::ConfigError;
use crate::peer::types::ServerConfig;
use std::path::Path;
use url::Url;

// Verbose logging is the default only in development builds.

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:8080/ws";

/// Endpoints and ICE servers a session needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: Url,
    pub signaling_url: Url,
    pub ice_servers: Vec<ServerConfig>,
}

impl AppConfig {
    pub fn load(
        api_url: &str,
        signaling_url: &str,
        ice_servers_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let ice_servers = match ice_servers_file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str::<Vec<ServerConfig>>(&raw)?
            }
            None => default_ice_servers(),
        };
        validate_ice_servers(&ice_servers)?;

        Ok(Self {
            api_url: Url::parse(api_url)?,
            signaling_url: Url::parse(signaling_url)?,
            ice_servers,
        })
    }
}

pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
}

/// Rejects entries without a URL and TURN entries without credentials.
pub fn validate_ice_servers(servers: &[ServerConfig]) -> Result<(), ConfigError> {
    for server in servers {
        if server.url.is_empty() {
            return Err(ConfigError::InvalidServer {
                id: server.id.clone(),
                reason: "server URL cannot be empty".into(),
            });
        }

        if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
            return Err(ConfigError::InvalidServer {
                id: server.id.clone(),
                reason: "TURN servers require username and credential".into(),
            });
        }
    }
    Ok(())
}
