use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub membership_sweep_interval_secs: u64,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // JWT_EXPIRATION 以小时为单位，允许 "24h" 写法
        let jwt_expiration_hours = match optional("JWT_EXPIRATION") {
            Some(raw) => {
                let trimmed = raw.trim().trim_end_matches('h').to_string();
                trimmed.parse::<u64>().map_err(|_| ConfigError::Invalid {
                    name: "JWT_EXPIRATION",
                    value: raw,
                })?
            }
            None => 24,
        };

        let api_base_uri = optional("API_BASE_URI").unwrap_or_else(|| "/api".to_string());

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            redis_url: optional("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration_hours * 3600,
            rate_limit_window_secs: parsed("RATE_LIMIT_WINDOW", 60)?,
            rate_limit_requests: parsed("RATE_LIMIT_REQUESTS", 100)?,
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: parsed("SERVER_PORT", 5000)?,
            api_base_uri: normalize_base_uri(&api_base_uri),
            membership_sweep_interval_secs: parsed("MEMBERSHIP_SWEEP_INTERVAL", 300)?,
            bootstrap_admin_email: optional("BOOTSTRAP_ADMIN_EMAIL"),
            bootstrap_admin_password: optional("BOOTSTRAP_ADMIN_PASSWORD"),
        })
    }

    /// Settings for tests and tooling that never read the environment.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Config {
            database_url: "postgres://localhost/gym_access_test".into(),
            database_max_connections: 2,
            redis_url: "redis://127.0.0.1:6379".into(),
            jwt_secret: jwt_secret.into(),
            jwt_expiration_secs: 24 * 3600,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            server_host: "127.0.0.1".into(),
            server_port: 5000,
            api_base_uri: "/api".into(),
            membership_sweep_interval_secs: 300,
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
        }
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn membership_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.membership_sweep_interval_secs.max(1))
    }
}

fn normalize_base_uri(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
