//! The client-side session holder.
//!
//! Starts in `loading` until [`AuthSession::restore`] either validates a
//! stored token or discards it. Every change is published on a watch
//! channel, so a front end can render from [`AuthSession::subscribe`].

use std::sync::Arc;

use tokio::sync::watch;
use tracing::instrument;

use customer_manager_core::SessionUser;

use crate::api::ApiClient;
use crate::error::ClientError;

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<SessionUser>,
    pub loading: bool,
}

impl SessionState {
    /// Whether someone is signed in.
    #[must_use]
    pub const fn authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Holds the current identity and its bearer token.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AuthSession {
    api: ApiClient,
    state: Arc<watch::Sender<SessionState>>,
}

impl AuthSession {
    /// Create a session in the `loading` state.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let (state, _) = watch::channel(SessionState {
            user: None,
            loading: true,
        });
        Self {
            api,
            state: Arc::new(state),
        }
    }

    /// The API client this session authenticates.
    #[must_use]
    pub const fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The signed-in identity, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<SessionUser> {
        self.state.borrow().user.clone()
    }

    /// The bearer token to persist, if signed in.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.current_user().and(self.api.token())
    }

    /// Resume from a stored token, or settle as signed out.
    ///
    /// An invalid or expired token is discarded without error.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached; the session is then
    /// signed out.
    #[instrument(skip_all)]
    pub async fn restore(&self, token: Option<String>) -> Result<(), ClientError> {
        let Some(token) = token else {
            self.set(None);
            return Ok(());
        };

        self.api.set_token(Some(token));
        match self.api.profile().await {
            Ok(profile) => {
                tracing::debug!(user_id = %profile.uid, "Session restored");
                self.set(Some(profile.session_user()));
                Ok(())
            }
            Err(e) if e.is_unauthorized() => {
                tracing::debug!("Stored token rejected, discarding");
                self.expire();
                Ok(())
            }
            Err(e) => {
                self.expire();
                Err(e)
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` for wrong credentials.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionUser, ClientError> {
        let auth = self.api.login(email, password).await?;
        self.api.set_token(Some(auth.token));
        self.set(Some(auth.user.clone()));
        Ok(auth.user)
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` or `ClientError::Conflict`.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<SessionUser, ClientError> {
        let auth = self.api.register(email, password, display_name).await?;
        self.api.set_token(Some(auth.token));
        self.set(Some(auth.user.clone()));
        Ok(auth.user)
    }

    /// Sign out, revoking the token on the server.
    ///
    /// The local session is cleared even if the server cannot be reached.
    ///
    /// # Errors
    ///
    /// Returns the server error, if any, after clearing the session.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        let result = if self.api.token().is_some() {
            match self.api.logout().await {
                Err(e) if e.is_unauthorized() => Ok(()),
                other => other,
            }
        } else {
            Ok(())
        };
        self.expire();
        result
    }

    /// Ask for a password reset email.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ClientError> {
        self.api.request_password_reset(email).await
    }

    /// Set a new password with the emailed token.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::BadRequest` for an invalid or expired token.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        password: &str,
    ) -> Result<(), ClientError> {
        self.api.confirm_password_reset(token, password).await
    }

    /// Drop the identity and token locally.
    pub fn expire(&self) {
        self.api.set_token(None);
        self.set(None);
    }

    fn set(&self, user: Option<SessionUser>) {
        self.state.send_replace(SessionState {
            user,
            loading: false,
        });
    }
}
