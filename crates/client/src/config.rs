//! Client configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ClientError;

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_TOKEN_FILE: &str = ".cm-token";

/// Where the API lives and where the session token is kept.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, without the `/api/v1` prefix
    pub api_url: Url,
    /// File the bearer token is persisted to between runs
    pub token_file: PathBuf,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ClientConfig {
    /// Load configuration from `CM_API_URL` and `CM_TOKEN_FILE`.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` if `CM_API_URL` is not a URL.
    pub fn from_env() -> Result<Self, ClientError> {
        let _ = dotenvy::dotenv();

        let api_url = std::env::var("CM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let token_file =
            std::env::var("CM_TOKEN_FILE").unwrap_or_else(|_| DEFAULT_TOKEN_FILE.to_string());

        Ok(Self {
            api_url: Url::parse(&api_url)?,
            token_file: PathBuf::from(token_file),
            timeout: Duration::from_secs(15),
        })
    }

    /// Configuration for a server at `api_url`.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
            timeout: Duration::from_secs(15),
        }
    }
}
