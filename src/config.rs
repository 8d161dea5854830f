use std::env;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub football: FootballConfig,
    pub feed: FeedConfig,
    pub sync: SyncConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used to build feed links handed to clients.
    pub public_url: String,
    pub frontend_url: String,
    /// Shown as the calendar name and used as the attachment filename suffix.
    pub app_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FootballConfig {
    /// Upstream credential. `None` puts the provider in demo mode.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Serve demo payloads even when a credential is configured.
    pub demo_mode: bool,
}

impl FootballConfig {
    /// Whether the provider serves demo payloads instead of calling upstream.
    pub fn is_demo(&self) -> bool {
        self.demo_mode || self.api_key.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Maximum age of a rendered feed before it is regenerated.
    pub cache_ttl_seconds: u64,
    /// Directory for rendered feeds. `None` keeps them in memory.
    pub cache_dir: Option<PathBuf>,
    /// Assumed length of every match event.
    pub event_duration_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// How many upcoming fixtures auto-sync requests per team.
    pub fixtures_per_team: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the public feed endpoint
    pub feed_per_second: u32,
    /// Burst size for the public feed endpoint
    pub feed_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                public_url: env::var("PUBLIC_URL")
                    .unwrap_or_else(|_| "http://localhost:8080".to_string()),
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                app_name: env::var("APP_NAME").unwrap_or_else(|_| "MatchDay".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/app.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            football: FootballConfig {
                api_key: env::var("FOOTBALL_API_KEY")
                    .ok()
                    .filter(|k| !k.trim().is_empty()),
                base_url: env::var("FOOTBALL_API_URL")
                    .unwrap_or_else(|_| "https://v3.football.api-sports.io".to_string()),
                demo_mode: match env::var("FOOTBALL_DEMO_MODE") {
                    Ok(v) => match v.to_lowercase().as_str() {
                        "1" | "true" | "yes" => true,
                        "0" | "false" | "no" => false,
                        _ => false,
                    },
                    Err(_) => false,
                },
            },
            feed: FeedConfig {
                cache_ttl_seconds: env::var("FEED_CACHE_TTL_SECONDS")
                    .unwrap_or_else(|_| "21600".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("FEED_CACHE_TTL_SECONDS".to_string()))?,
                cache_dir: env::var("FEED_CACHE_DIR")
                    .ok()
                    .filter(|d| !d.trim().is_empty())
                    .map(PathBuf::from),
                event_duration_minutes: env::var("EVENT_DURATION_MINUTES")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .unwrap_or(120),
            },
            sync: SyncConfig {
                fixtures_per_team: env::var("SYNC_FIXTURES_PER_TEAM")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
            },
            rate_limit: RateLimitConfig {
                feed_per_second: env::var("RATE_LIMIT_FEED_PER_SECOND")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                feed_burst: env::var("RATE_LIMIT_FEED_BURST")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
            },
        })
    }

    /// Public URL of the calendar feed for `username`.
    pub fn feed_url(&self, username: &str) -> String {
        format!(
            "{}/sync/{}.ics",
            self.server.public_url.trim_end_matches('/'),
            urlencoding::encode(username)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                public_url: "http://localhost:8080".to_string(),
                frontend_url: "http://localhost:3000".to_string(),
                app_name: "MatchDay".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/app.db".to_string(),
                max_connections: 5,
            },
            football: FootballConfig {
                api_key: None,
                base_url: "https://v3.football.api-sports.io".to_string(),
                demo_mode: false,
            },
            feed: FeedConfig {
                cache_ttl_seconds: 6 * 3600,
                cache_dir: None,
                event_duration_minutes: 120,
            },
            sync: SyncConfig {
                fixtures_per_team: 10,
            },
            jwt: JwtConfig {
                secret: String::new(),
            },
            rate_limit: RateLimitConfig {
                feed_per_second: 2,
                feed_burst: 20,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_url_joins_public_url_and_username() {
        let mut config = Config::default();
        config.server.public_url = "https://cal.example.com/".to_string();
        assert_eq!(
            config.feed_url("jane doe"),
            "https://cal.example.com/sync/jane%20doe.ics"
        );
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.feed.cache_ttl_seconds, 21600);
        assert_eq!(config.feed.event_duration_minutes, 120);
        assert_eq!(config.sync.fixtures_per_team, 10);
        assert!(config.football.api_key.is_none());
    }

    #[test]
    fn demo_mode_follows_credential_and_override() {
        let mut football = Config::default().football;
        assert!(football.is_demo());

        football.api_key = Some("key".to_string());
        assert!(!football.is_demo());

        football.demo_mode = true;
        assert!(football.is_demo());
    }
}
