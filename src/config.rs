use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::audio::player::PlayerOptions;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32, // Porcentaje, 0-200
    pub max_queue_size: usize,
    pub idle_timeout: u64, // En segundos

    // APIs (Opcionales)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Herramientas externas
    pub ytdlp_path: String,
    pub ffprobe_path: String,

    // Límites
    pub http_timeout: u64, // En segundos
    pub search_limit: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the process environment
    /// in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: optional("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            guild_id: parse_optional(&optional, "GUILD_ID")?,

            // Audio
            default_volume: parse_or(&optional, "DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: parse_or(&optional, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            idle_timeout: parse_or(&optional, "IDLE_TIMEOUT", defaults.idle_timeout)?,

            // APIs
            spotify_client_id: optional("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: optional("SPOTIFY_CLIENT_SECRET"),

            // Herramientas
            ytdlp_path: optional("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ffprobe_path: optional("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),

            // Límites
            http_timeout: parse_or(&optional, "HTTP_TIMEOUT", defaults.http_timeout)?,
            search_limit: parse_or(&optional, "SEARCH_LIMIT", defaults.search_limit)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 200 percent
    /// - Queue and search limits must be greater than 0
    /// - Timeouts must be greater than 0
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=200.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0 and 200, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.search_limit == 0 {
            anyhow::bail!("Search limit must be greater than 0");
        }

        if self.idle_timeout == 0 || self.http_timeout == 0 {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    pub fn has_spotify(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    /// Opciones iniciales de cada reproductor
    pub fn player_options(&self) -> PlayerOptions {
        PlayerOptions {
            idle_timeout: self.idle_timeout(),
            max_queue_size: self.max_queue_size,
            default_volume: self.default_volume,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes tokens and secrets.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {}\n  \
            Audio: {}% vol, {} queue, idle {}\n  \
            Sources: Spotify={}, yt-dlp=`{}`, ffprobe=`{}`\n  \
            Limits: {}s http, {} search results",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.max_queue_size,
            humantime::format_duration(self.idle_timeout()),
            self.has_spotify(),
            self.ytdlp_path,
            self.ffprobe_path,
            self.http_timeout,
            self.search_limit,
        )
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_optional(lookup, key)?.unwrap_or(default))
}

fn parse_optional<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|value| value.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("Valor inválido para {}", key))
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valor por defecto para el token)
            discord_token: String::new(),
            guild_id: None,

            // Audio defaults
            default_volume: 100.0,
            max_queue_size: 1000,
            idle_timeout: 600, // 10 minutos

            spotify_client_id: None,
            spotify_client_secret: None,

            ytdlp_path: "yt-dlp".to_string(),
            ffprobe_path: "ffprobe".to_string(),

            http_timeout: 30,
            search_limit: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn token_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn defaults_fill_missing_values() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc")])).unwrap();
        assert_eq!(config.default_volume, 100.0);
        assert_eq!(config.idle_timeout(), Duration::from_secs(600));
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert!(!config.has_spotify());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("GUILD_ID", "42"),
            ("IDLE_TIMEOUT", "30"),
            ("DEFAULT_VOLUME", "80"),
        ]))
        .unwrap();
        assert_eq!(config.guild_id, Some(42));
        assert_eq!(config.player_options().idle_timeout, Duration::from_secs(30));
        assert_eq!(config.player_options().default_volume, 80.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc"), ("DEFAULT_VOLUME", "300")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc"), ("MAX_QUEUE_SIZE", "many")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "abc"), ("SPOTIFY_CLIENT_ID", "id")])).is_err());
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secret"));
    }
}
