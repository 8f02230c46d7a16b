//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CM_TOKEN_SECRET` - Token signing secret (min 32 chars, high entropy)
//! - `CM_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`), unless `CM_STORE=memory`
//!
//! ## Optional
//! - `CM_STORE` - `postgres` (default) or `memory`
//! - `CM_HOST` - Bind address (default: 127.0.0.1)
//! - `CM_PORT` - Listen port (default: 3000)
//! - `CM_TOKEN_TTL_SECS` - Token lifetime (default: 3600)
//! - `CM_ALLOWED_ORIGINS` - Comma-separated CORS origins
//! - `CM_FRONTEND_URL` - Extra CORS origin for the deployed front-end
//! - `CM_PUBLIC_URL` - Base URL used in password reset links
//! - `NOMINATIM_URL` - Geocoding provider base URL
//! - `GEOCODER_USER_AGENT` - `User-Agent` sent to the provider
//! - `GEOCODER_TIMEOUT_SECS` - Provider request timeout (default: 10)
//! - `CM_API_RATE_PERIOD_SECS` / `CM_API_RATE_BURST` - Public API rate limit
//! - `CM_AUTH_RATE_PERIOD_SECS` / `CM_AUTH_RATE_BURST` - Auth endpoint rate limit
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM` -
//!   Password reset mail (all of host, username, password and from are needed)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`,
//!   `SENTRY_TRACES_SAMPLE_RATE` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_TOKEN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:4200,http://localhost:3000";
const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_USER_AGENT: &str = "CustomerManager/2.0 (contact@example.com)";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Which store implementation backs the service.
#[derive(Clone)]
pub enum StoreBackend {
    /// `PostgreSQL` at the given URL (contains password).
    Postgres { database_url: SecretString },
    /// Process-local maps; data is lost on restart.
    Memory,
}

impl std::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres { .. } => f
                .debug_struct("Postgres")
                .field("database_url", &"[REDACTED]")
                .finish(),
            Self::Memory => f.write_str("Memory"),
        }
    }
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Store backend
    pub store: StoreBackend,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Access token settings
    pub token: TokenConfig,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
    /// Public base URL, used in emailed links
    pub public_url: String,
    /// Geocoding provider settings
    pub geocoder: GeocoderConfig,
    /// Per-IP rate limits
    pub rate_limits: RateLimitConfig,
    /// SMTP settings (password reset mail is only logged when absent)
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Access token signing configuration.
///
/// Implements `Debug` manually to redact the secret.
#[derive(Clone)]
pub struct TokenConfig {
    /// HS256 signing secret
    pub secret: SecretString,
    /// Token lifetime
    pub ttl: Duration,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Geocoding provider configuration.
#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    /// Provider base URL (the `/search` path is appended)
    pub base_url: Url,
    /// Identifying `User-Agent`, required by the provider's usage policy
    pub user_agent: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// A token-bucket rate limit: one request replenished every `period`, up to
/// `burst` outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Seconds per replenished request
    pub period_secs: u64,
    /// Bucket size
    pub burst: u32,
}

/// Rate limits for the two endpoint classes.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Every API route
    pub api: RateLimit,
    /// Sign-in, sign-up and password reset
    pub auth: RateLimit,
}

impl Default for RateLimitConfig {
    /// 100 requests per 15 minutes for the API, 5 per 15 minutes for auth.
    fn default() -> Self {
        Self {
            api: RateLimit {
                period_secs: 9,
                burst: 100,
            },
            auth: RateLimit {
                period_secs: 180,
                burst: 5,
            },
        }
    }
}

/// SMTP configuration for outgoing mail.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let store = match get_env_or_default("CM_STORE", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres {
                database_url: get_database_url("CM_DATABASE_URL")?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "CM_STORE".to_string(),
                    format!("expected `postgres` or `memory`, got `{other}`"),
                ));
            }
        };
        let host = parse_env("CM_HOST", "127.0.0.1")?;
        let port = parse_env("CM_PORT", "3000")?;

        let secret = get_validated_secret("CM_TOKEN_SECRET")?;
        validate_token_secret(&secret, "CM_TOKEN_SECRET")?;
        let token = TokenConfig {
            secret,
            ttl: Duration::from_secs(parse_env("CM_TOKEN_TTL_SECS", "3600")?),
        };

        let mut allowed_origins =
            split_list(&get_env_or_default("CM_ALLOWED_ORIGINS", DEFAULT_ALLOWED_ORIGINS));
        if let Some(frontend) = get_optional_env("CM_FRONTEND_URL")
            && !allowed_origins.contains(&frontend)
        {
            allowed_origins.push(frontend);
        }

        let public_url = get_env_or_default("CM_PUBLIC_URL", "http://localhost:4200");

        let geocoder = GeocoderConfig {
            base_url: parse_env("NOMINATIM_URL", DEFAULT_NOMINATIM_URL)?,
            user_agent: get_env_or_default("GEOCODER_USER_AGENT", DEFAULT_USER_AGENT),
            timeout: Duration::from_secs(parse_env("GEOCODER_TIMEOUT_SECS", "10")?),
        };

        let defaults = RateLimitConfig::default();
        let rate_limits = RateLimitConfig {
            api: RateLimit {
                period_secs: parse_env(
                    "CM_API_RATE_PERIOD_SECS",
                    &defaults.api.period_secs.to_string(),
                )?,
                burst: parse_env("CM_API_RATE_BURST", &defaults.api.burst.to_string())?,
            },
            auth: RateLimit {
                period_secs: parse_env(
                    "CM_AUTH_RATE_PERIOD_SECS",
                    &defaults.auth.period_secs.to_string(),
                )?,
                burst: parse_env("CM_AUTH_RATE_BURST", &defaults.auth.burst.to_string())?,
            },
        };

        let email = EmailConfig::from_env()?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            store,
            host,
            port,
            token,
            allowed_origins,
            public_url,
            geocoder,
            rate_limits,
            email,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// In-memory configuration with defaults for everything except the
    /// token secret. Used for local runs and tests.
    #[must_use]
    pub fn in_memory(token_secret: SecretString) -> Self {
        Self {
            store: StoreBackend::Memory,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            token: TokenConfig {
                secret: token_secret,
                ttl: Duration::from_secs(3600),
            },
            allowed_origins: split_list(DEFAULT_ALLOWED_ORIGINS),
            public_url: "http://localhost:4200".to_string(),
            geocoder: GeocoderConfig {
                base_url: Url::parse(DEFAULT_NOMINATIM_URL)
                    .unwrap_or_else(|_| unreachable!("default provider URL is valid")),
                user_agent: DEFAULT_USER_AGENT.to_string(),
                timeout: Duration::from_secs(10),
            },
            rate_limits: RateLimitConfig::default(),
            email: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl EmailConfig {
    /// SMTP is optional: `None` unless `SMTP_HOST` is set.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("SMTP_FROM")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Blank counts as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Split a comma-separated list, dropping blanks and trailing slashes.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Validate that a token secret meets minimum length requirements.
fn validate_token_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_TOKEN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-signing-key-here", "CM_TOKEN_SECRET").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength(&"ab".repeat(20), "CM_TOKEN_SECRET");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "CM_TOKEN_SECRET");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_token_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_token_secret(&secret, "CM_TOKEN_SECRET").is_err());
    }

    #[test]
    fn test_split_list_trims_and_drops_blanks() {
        assert_eq!(
            split_list(" http://a.test/ ,, http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn test_in_memory_defaults() {
        let config = ServerConfig::in_memory(SecretString::from("k".repeat(32)));
        assert!(matches!(config.store, StoreBackend::Memory));
        assert_eq!(config.socket_addr().port(), 3000);
        assert_eq!(config.rate_limits.auth.burst, 5);
        assert_eq!(
            config.geocoder.base_url.as_str(),
            "https://nominatim.openstreetmap.org/"
        );
        assert_eq!(config.allowed_origins.len(), 2);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = ServerConfig::in_memory(SecretString::from("super-signing-material-0123456789"));
        config.store = StoreBackend::Postgres {
            database_url: SecretString::from("postgres://user:hunter2@db/cm"),
        };
        config.email = Some(EmailConfig {
            smtp_host: "smtp.test".to_string(),
            smtp_port: 587,
            smtp_username: "mailer".to_string(),
            smtp_password: SecretString::from("smtp-pass-value"),
            from_address: "noreply@cm.test".to_string(),
        });

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("smtp.test"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super-signing-material"));
        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains("smtp-pass-value"));
    }
}
