//! Spotify credential resolution
//!
//! **Priority:** ENV → TOML. Id and secret are resolved independently.

use spotan_common::config::TomlConfig;
use spotan_common::{Error, Result};
use tracing::{info, warn};

pub const CLIENT_ID_ENV: &str = "SPOTAN_SPOTIFY_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "SPOTAN_SPOTIFY_CLIENT_SECRET";

/// Client-credentials pair for the Spotify Web API
#[derive(Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for SpotifyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Non-empty, non-whitespace
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

fn resolve_value(name: &str, env_var: &str, toml_value: Option<&String>) -> Result<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_value(v));
    let toml_value = toml_value.filter(|v| is_valid_value(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "Spotify {} found in both environment and TOML config. Using environment.",
            name
        );
    }

    if let Some(value) = env_value {
        info!("Spotify {} loaded from environment variable", name);
        return Ok(value.trim().to_string());
    }

    if let Some(value) = toml_value {
        info!("Spotify {} loaded from TOML config", name);
        return Ok(value.trim().to_string());
    }

    Err(Error::Config(format!(
        "Spotify {} not configured. Set {} or [spotify] {} in the config file.",
        name,
        env_var,
        name.replace(' ', "_")
    )))
}

pub fn resolve_spotify_credentials(toml_config: &TomlConfig) -> Result<SpotifyCredentials> {
    let client_id = resolve_value(
        "client id",
        CLIENT_ID_ENV,
        toml_config.spotify.client_id.as_ref(),
    )?;
    let client_secret = resolve_value(
        "client secret",
        CLIENT_SECRET_ENV,
        toml_config.spotify.client_secret.as_ref(),
    )?;

    Ok(SpotifyCredentials {
        client_id,
        client_secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn toml_with(id: Option<&str>, secret: Option<&str>) -> TomlConfig {
        let mut config = TomlConfig::default();
        config.spotify.client_id = id.map(str::to_string);
        config.spotify.client_secret = secret.map(str::to_string);
        config
    }

    fn clear_env() {
        std::env::remove_var(CLIENT_ID_ENV);
        std::env::remove_var(CLIENT_SECRET_ENV);
    }

    #[test]
    #[serial]
    fn test_env_wins_over_toml() {
        clear_env();
        std::env::set_var(CLIENT_ID_ENV, "env-id");
        let creds = resolve_spotify_credentials(&toml_with(Some("toml-id"), Some("toml-secret")));
        clear_env();

        let creds = creds.expect("resolved");
        assert_eq!(creds.client_id, "env-id");
        assert_eq!(creds.client_secret, "toml-secret");
    }

    #[test]
    #[serial]
    fn test_blank_values_are_ignored() {
        clear_env();
        std::env::set_var(CLIENT_ID_ENV, "   ");
        let result = resolve_spotify_credentials(&toml_with(Some(""), Some("secret")));
        clear_env();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_missing_secret_is_config_error() {
        clear_env();
        let err = resolve_spotify_credentials(&toml_with(Some("id"), None)).unwrap_err();
        assert!(err.to_string().contains(CLIENT_SECRET_ENV));
    }

    #[test]
    fn test_debug_hides_secret() {
        let creds = SpotifyCredentials {
            client_id: "id".to_string(),
            client_secret: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
