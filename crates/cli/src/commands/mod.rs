//! Subcommand implementations.

pub mod auth;
pub mod customers;
pub mod geocode;
pub mod migrate;

use std::path::Path;

use customer_manager_client::{ApiClient, AuthSession, ClientConfig, ClientError};

/// Shared handles for commands that talk to the API.
pub struct Context {
    pub config: ClientConfig,
    pub session: AuthSession,
}

impl Context {
    /// Build the API client and restore the stored session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid or the server cannot be
    /// reached while validating a stored token.
    pub async fn load() -> Result<Self, ClientError> {
        let config = ClientConfig::from_env()?;
        let session = AuthSession::new(ApiClient::new(&config)?);
        session.restore(read_token(&config.token_file)).await?;
        Ok(Self { config, session })
    }

    /// Persist (or remove) the session token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token file cannot be written.
    pub fn save_token(&self) -> std::io::Result<()> {
        match self.session.token() {
            Some(token) => std::fs::write(&self.config.token_file, token),
            None => match std::fs::remove_file(&self.config.token_file) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        }
    }
}

fn read_token(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Print a value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    let rendered = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{rendered}");
    }
    Ok(())
}

/// Print a line of human-readable output.
pub fn say(message: &str) {
    #[allow(clippy::print_stdout)]
    {
        println!("{message}");
    }
}
