use std::{env, fmt};

/// Signing secret used when `JWT_SECRET` is unset. Only tolerated outside production.
pub const FALLBACK_ACCESS_SECRET: &str = "insecure-dev-access-secret";
/// Signing secret used when `JWT_REFRESH_SECRET` is unset. Only tolerated outside production.
pub const FALLBACK_REFRESH_SECRET: &str = "insecure-dev-refresh-secret";

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost";

/// Deployment mode, read from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "test" => Some(Environment::Test),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
    InsecureSecret(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid { key, value } => write!(f, "{} has an invalid value: {:?}", key, value),
            ConfigError::InsecureSecret(key) => write!(
                f,
                "{} is unset or uses the built-in fallback, which is not allowed in production",
                key
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_port: u16,
    pub server_host: String,
    pub environment: Environment,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let server_port = match lookup("SERVER_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "SERVER_PORT",
                value,
            })?,
            None => 8080,
        };
        let server_host = lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let environment = match lookup("APP_ENV") {
            Some(value) => Environment::parse(&value).ok_or(ConfigError::Invalid {
                key: "APP_ENV",
                value,
            })?,
            None => Environment::Development,
        };

        let access_token_secret = resolve_secret(
            lookup("JWT_SECRET"),
            "JWT_SECRET",
            FALLBACK_ACCESS_SECRET,
            environment,
        )?;
        let refresh_token_secret = resolve_secret(
            lookup("JWT_REFRESH_SECRET"),
            "JWT_REFRESH_SECRET",
            FALLBACK_REFRESH_SECRET,
            environment,
        )?;
        if environment.is_production() && access_token_secret == refresh_token_secret {
            return Err(ConfigError::Invalid {
                key: "JWT_REFRESH_SECRET",
                value: "<same as JWT_SECRET>".to_string(),
            });
        }

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            database_url,
            server_port,
            server_host,
            environment,
            access_token_secret,
            refresh_token_secret,
            cors_allowed_origins,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn resolve_secret(
    value: Option<String>,
    key: &'static str,
    fallback: &str,
    environment: Environment,
) -> Result<String, ConfigError> {
    let value = value.filter(|secret| !secret.is_empty());
    let uses_fallback = value.as_deref().map_or(true, |secret| secret == fallback);

    if uses_fallback {
        if environment.is_production() {
            return Err(ConfigError::InsecureSecret(key));
        }
        log::warn!(
            "{} is not configured; using an insecure built-in secret. Never deploy like this.",
            key
        );
    }

    Ok(value.unwrap_or_else(|| fallback.to_string()))
}
