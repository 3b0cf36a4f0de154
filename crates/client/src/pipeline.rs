//! Authenticated request pipeline.
//!
//! Wraps every outbound API call: attaches the current access token, detects
//! token expiry, performs a single-flight refresh, and replays calls that
//! were blocked on the refresh. Guarantees:
//!
//! - At most one refresh call is ever in flight, enforced by a flag and a
//!   waiter queue claimed synchronously under one lock before any await.
//! - Waiters queued during a refresh episode settle in registration order;
//!   their retried business calls race independently.
//! - A call retried after a refresh is retried at most once; a second
//!   failure is terminal.
//! - Auth endpoints (`/auth/...`) never trigger a refresh, so a rejected
//!   login or refresh call can never loop.

use std::sync::{Arc, Mutex};

use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::session::SessionStore;

/// The refresh endpoint. Exempt from refresh-on-401 like all auth endpoints.
const REFRESH_PATH: &str = "/auth/refresh";

/// Upper bound on refresh-and-retry cycles per call.
const MAX_RETRIES: u8 = 1;

/// Outcome of a refresh episode, fanned out to every queued waiter.
type RefreshOutcome = Result<String, ApiError>;

/// Request pipeline for the commerce API.
///
/// Cheap to clone; all clones share the HTTP connection pool, the session
/// store, and the refresh gate.
#[derive(Clone)]
pub struct RequestPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
    refresh_gate: Mutex<RefreshGate>,
}

/// Single-flight refresh state: a flag plus the queue of suspended callers.
///
/// Claimed and settled under a sync lock that is never held across an await,
/// so two tasks can never both observe "not refreshing".
#[derive(Default)]
struct RefreshGate {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

enum RefreshClaim {
    /// This caller runs the refresh and settles the queue.
    Leader,
    /// A refresh is already in flight; await its outcome.
    Follower(oneshot::Receiver<RefreshOutcome>),
}

/// Response shape of `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

impl RequestPipeline {
    /// Create a pipeline over a prebuilt HTTP client.
    ///
    /// `base_url` must not end with a slash; [`crate::config::ClientConfig`]
    /// normalizes this.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: String, session: SessionStore) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                http,
                base_url,
                session,
                refresh_gate: Mutex::new(RefreshGate::default()),
            }),
        }
    }

    /// Execute a request and decode the JSON response body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for network failures, non-success statuses
    /// (normalized from the API error payload), and undecodable bodies.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let (status, text) = self.send(method, path, body).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::decode(&e, status))
    }

    /// Execute a request, discarding any response body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] for network failures and non-success statuses.
    pub async fn request_unit(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(), ApiError> {
        self.send(method, path, body).await.map(|_| ())
    }

    /// Core send loop: perform, classify 401s, refresh once, retry once.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(u16, String), ApiError> {
        let auth_exempt = is_auth_endpoint(path);
        let mut attempt: u8 = 0;
        loop {
            let token = self.inner.session.access_token();
            let result = self
                .perform(&method, path, body.as_ref(), token.as_deref())
                .await;
            match result {
                Err(err) if attempt < MAX_RETRIES && !auth_exempt && err.is_refresh_eligible() => {
                    self.obtain_fresh_token().await?;
                    attempt += 1;
                    debug!(path, "retrying with refreshed access token");
                }
                other => return other,
            }
        }
    }

    /// One HTTP round-trip, no refresh handling.
    async fn perform(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<(u16, String), ApiError> {
        let url = format!("{}{}", self.inner.base_url, path);
        let mut request = self.inner.http.request(method.clone(), &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ApiError::network(&e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ApiError::network(&e))?;

        if (200..300).contains(&status) {
            Ok((status, text))
        } else {
            debug!(status, path, "request failed");
            Err(ApiError::from_response(status, &text))
        }
    }

    /// Obtain a usable access token after an expiry signal, joining an
    /// in-flight refresh if one exists.
    async fn obtain_fresh_token(&self) -> Result<String, ApiError> {
        let Some(refresh_token) = self.inner.session.refresh_token() else {
            // Nothing to refresh with: the session is over.
            if let Err(err) = self.inner.session.expire() {
                warn!(error = %err, "failed to persist cleared session");
            }
            return Err(ApiError::session_invalid());
        };

        match self.claim_refresh() {
            RefreshClaim::Follower(rx) => rx.await.map_err(|_| ApiError::session_invalid())?,
            RefreshClaim::Leader => {
                let outcome = self.run_refresh(refresh_token).await;
                self.settle_refresh(&outcome);
                outcome
            }
        }
    }

    /// Claim the refresh gate. Synchronous: the flag is set before the
    /// caller reaches any suspension point.
    fn claim_refresh(&self) -> RefreshClaim {
        let mut gate = self.inner.refresh_gate.lock().expect("refresh gate poisoned");
        if gate.refreshing {
            let (tx, rx) = oneshot::channel();
            gate.waiters.push(tx);
            RefreshClaim::Follower(rx)
        } else {
            gate.refreshing = true;
            RefreshClaim::Leader
        }
    }

    /// Settle the refresh gate, resolving waiters in registration order.
    fn settle_refresh(&self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut gate = self.inner.refresh_gate.lock().expect("refresh gate poisoned");
            gate.refreshing = false;
            std::mem::take(&mut gate.waiters)
        };
        for waiter in waiters {
            // A dropped receiver means the caller gave up; nothing to do
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Call the refresh endpoint and rotate the credential pair.
    ///
    /// Any failure here is terminal for the current pair: the session is
    /// cleared and the caller (and every waiter) receives `SESSION_INVALID`.
    async fn run_refresh(&self, refresh_token: String) -> RefreshOutcome {
        debug!("access token rejected; refreshing credentials");
        let body = serde_json::json!({ "refreshToken": refresh_token });
        let result = self
            .perform(&Method::POST, REFRESH_PATH, Some(&body), None)
            .await;

        let (status, text) = match result {
            Ok(ok) => ok,
            Err(err) => {
                warn!(error = %err, "credential refresh failed; forcing logout");
                if let Err(err) = self.inner.session.expire() {
                    warn!(error = %err, "failed to persist cleared session");
                }
                return Err(ApiError::session_invalid());
            }
        };

        let tokens: RefreshResponse = match serde_json::from_str(&text) {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(error = %err, status, "undecodable refresh response; forcing logout");
                if let Err(err) = self.inner.session.expire() {
                    warn!(error = %err, "failed to persist cleared session");
                }
                return Err(ApiError::session_invalid());
            }
        };

        let Some(user) = self.inner.session.user() else {
            // Tokens without a user is not a session we can continue
            if let Err(err) = self.inner.session.expire() {
                warn!(error = %err, "failed to persist cleared session");
            }
            return Err(ApiError::session_invalid());
        };

        if let Err(err) = self.inner.session.set_session(
            user,
            tokens.access_token.clone(),
            tokens.refresh_token,
        ) {
            warn!(error = %err, "failed to persist refreshed session");
        }
        debug!("credential refresh succeeded");
        Ok(tokens.access_token)
    }
}

/// Auth endpoints must fail immediately on 401 rather than trigger a
/// refresh, to avoid infinite loops.
fn is_auth_endpoint(path: &str) -> bool {
    path.starts_with("/auth/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn pipeline() -> RequestPipeline {
        let session = SessionStore::new(Arc::new(MemoryStorage::new()));
        RequestPipeline::new(
            reqwest::Client::new(),
            "http://localhost:0".to_string(),
            session,
        )
    }

    #[test]
    fn test_is_auth_endpoint() {
        assert!(is_auth_endpoint("/auth/login"));
        assert!(is_auth_endpoint("/auth/register"));
        assert!(is_auth_endpoint("/auth/refresh"));
        assert!(!is_auth_endpoint("/cart"));
        assert!(!is_auth_endpoint("/products/p_1"));
    }

    #[test]
    fn test_refresh_gate_single_leader() {
        let pipeline = pipeline();

        assert!(matches!(pipeline.claim_refresh(), RefreshClaim::Leader));
        // While the leader holds the gate, everyone else queues
        assert!(matches!(pipeline.claim_refresh(), RefreshClaim::Follower(_)));
        assert!(matches!(pipeline.claim_refresh(), RefreshClaim::Follower(_)));

        pipeline.settle_refresh(&Ok("token".to_string()));
        // Gate reopens after settle
        assert!(matches!(pipeline.claim_refresh(), RefreshClaim::Leader));
    }

    #[tokio::test]
    async fn test_refresh_gate_waiters_receive_outcome_in_order() {
        let pipeline = pipeline();

        assert!(matches!(pipeline.claim_refresh(), RefreshClaim::Leader));
        let mut receivers = Vec::new();
        for _ in 0..3 {
            match pipeline.claim_refresh() {
                RefreshClaim::Follower(rx) => receivers.push(rx),
                RefreshClaim::Leader => panic!("second leader while refreshing"),
            }
        }

        pipeline.settle_refresh(&Ok("fresh".to_string()));
        for rx in receivers {
            assert_eq!(rx.await.unwrap().unwrap(), "fresh");
        }
    }

    #[tokio::test]
    async fn test_refresh_gate_failure_fans_out() {
        let pipeline = pipeline();

        assert!(matches!(pipeline.claim_refresh(), RefreshClaim::Leader));
        let rx = match pipeline.claim_refresh() {
            RefreshClaim::Follower(rx) => rx,
            RefreshClaim::Leader => panic!("second leader while refreshing"),
        };

        pipeline.settle_refresh(&Err(ApiError::session_invalid()));
        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap_err(), ApiError::session_invalid());
    }
}
