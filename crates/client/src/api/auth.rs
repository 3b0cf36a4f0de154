//! Authentication operations against the commerce API.
//!
//! `login` and `register` write the session store on success; the login
//! transition then reaches the cart reconciler through its session
//! subscription, never through a direct call from here.

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use pomelo_core::{Email, UserRecord};

use crate::error::ApiError;
use crate::pipeline::RequestPipeline;
use crate::session::SessionStore;
use crate::storage::StorageError;

/// Response shape shared by `POST /auth/login` and `POST /auth/register`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    user: UserRecord,
    access_token: String,
    refresh_token: String,
}

/// Errors raised by authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The API rejected the request.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The new session could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Client for the auth endpoints.
#[derive(Clone)]
pub struct AuthClient {
    pipeline: RequestPipeline,
    session: SessionStore,
}

impl AuthClient {
    /// Create an auth client sharing the given pipeline and session store.
    #[must_use]
    pub const fn new(pipeline: RequestPipeline, session: SessionStore) -> Self {
        Self { pipeline, session }
    }

    /// Log in with email and password, storing the returned session.
    ///
    /// A 401 from this endpoint is surfaced immediately; auth endpoints
    /// never trigger a token refresh.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the credentials are rejected or the session
    /// cannot be persisted.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &Email, password: &SecretString) -> Result<UserRecord, AuthError> {
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
        });
        let response: AuthResponse = self
            .pipeline
            .request(Method::POST, "/auth/login", Some(body))
            .await?;
        self.store_session(response)
    }

    /// Register a new account and log in as it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if registration is rejected or the session
    /// cannot be persisted.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        email: &Email,
        password: &SecretString,
        name: Option<&str>,
    ) -> Result<UserRecord, AuthError> {
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
            "name": name,
        });
        let response: AuthResponse = self
            .pipeline
            .request(Method::POST, "/auth/register", Some(body))
            .await?;
        self.store_session(response)
    }

    /// Log out locally, clearing the stored session.
    ///
    /// The server keeps its cart; it will be offered back on the next login.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the cleared session cannot be persisted.
    pub fn logout(&self) -> Result<(), AuthError> {
        debug!("logging out");
        self.session.clear_session()?;
        Ok(())
    }

    /// The currently authenticated user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<UserRecord> {
        self.session.user()
    }

    fn store_session(&self, response: AuthResponse) -> Result<UserRecord, AuthError> {
        let user = response.user.clone();
        self.session
            .set_session(response.user, response.access_token, response.refresh_token)?;
        debug!(user_id = %user.id, "session established");
        Ok(user)
    }
}
