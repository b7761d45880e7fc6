use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::audio::session::SessionSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: u8, // Porcentaje 0-100
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    pub max_playlist_size: usize,

    // Resolución
    #[serde(with = "humantime_serde")]
    pub resolve_cache_ttl: Duration,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub lyrics_api_url: String,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: match env_opt("DEFAULT_VOLUME") {
                Some(val) => val.parse().context("DEFAULT_VOLUME inválido")?,
                None => defaults.default_volume,
            },
            idle_timeout: match env_opt("IDLE_TIMEOUT") {
                Some(val) => humantime::parse_duration(&val).context("IDLE_TIMEOUT inválido")?,
                None => defaults.idle_timeout,
            },
            max_playlist_size: match env_opt("MAX_PLAYLIST_SIZE") {
                Some(val) => val.parse().context("MAX_PLAYLIST_SIZE inválido")?,
                None => defaults.max_playlist_size,
            },

            // Resolución
            resolve_cache_ttl: match env_opt("RESOLVE_CACHE_TTL") {
                Some(val) => {
                    humantime::parse_duration(&val).context("RESOLVE_CACHE_TTL inválido")?
                }
                None => defaults.resolve_cache_ttl,
            },
            spotify_client_id: env_opt("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: env_opt("SPOTIFY_CLIENT_SECRET"),
            lyrics_api_url: env_opt("LYRICS_API_URL").unwrap_or(defaults.lyrics_api_url),

            // Paths
            data_dir: env_opt("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Default volume must be a percentage (0-100)
    /// - Idle timeout must be greater than zero
    /// - Playlist size must be greater than zero
    /// - Lyrics API must be an http(s) URL
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!(
                "Default volume must be between 0 and 100, got: {}",
                self.default_volume
            );
        }

        if self.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        let lyrics = url::Url::parse(&self.lyrics_api_url)
            .with_context(|| format!("Invalid lyrics API URL: {}", self.lyrics_api_url))?;
        if !matches!(lyrics.scheme(), "http" | "https") {
            anyhow::bail!("Lyrics API URL must be http(s), got: {}", self.lyrics_api_url);
        }

        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_volume: f32::from(self.default_volume) / 100.0,
            idle_timeout: self.idle_timeout,
        }
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the Discord token or Spotify credentials.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {}\n  \
            Audio: {}% vol, idle disconnect after {}\n  \
            Sources: playlist max {}, cache TTL {}, Spotify={}\n  \
            Data: {}",
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            humantime::format_duration(self.idle_timeout),
            self.max_playlist_size,
            humantime::format_duration(self.resolve_cache_ttl),
            self.spotify_enabled(),
            self.data_dir.display(),
        )
    }
}

/// Variable de entorno definida y no vacía.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            // Audio defaults
            default_volume: 50,
            idle_timeout: Duration::from_secs(180),
            max_playlist_size: 100,

            // Source defaults
            resolve_cache_ttl: Duration::from_secs(3600),
            spotify_client_id: None,
            spotify_client_secret: None,
            lyrics_api_url: "https://api.lyrics.ovh/v1".to_string(),

            // Path defaults
            data_dir: "./data".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let settings = config.session_settings();
        assert_eq!(settings.default_volume, 0.5);
        assert_eq!(settings.idle_timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            default_volume: 101,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            idle_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_playlist_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            lyrics_api_url: "ftp://lyrics".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = Config {
            discord_token: "super-secret-token".to_string(),
            spotify_client_id: Some("id".to_string()),
            spotify_client_secret: Some("spotify-secret".to_string()),
            ..Config::default()
        };

        let summary = config.summary();
        assert!(!summary.contains("super-secret-token"));
        assert!(!summary.contains("spotify-secret"));
        assert!(summary.contains("Spotify=true"));
        assert!(summary.contains("3m"));
    }

    #[test]
    fn test_durations_serialize_as_humantime() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["idle_timeout"], "3m");
        assert_eq!(json["resolve_cache_ttl"], "1h");

        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back.idle_timeout, Duration::from_secs(180));
    }
}
