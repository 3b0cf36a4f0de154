//! Process-wide session store.
//!
//! Holds the current credential pair and authenticated user, durable across
//! restarts, and is the single source of truth for "am I logged in". All
//! interested components observe it reactively: the cart reconciler takes a
//! [`watch`] subscription at construction, and UI layers can subscribe to
//! [`SessionEvent`]s to route to a login view when the session expires.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use pomelo_core::UserRecord;

use crate::storage::{Storage, StorageError};

/// Storage slot holding the persisted session.
const SESSION_SLOT: &str = "session.json";

/// Capacity of the session event channel; events are tiny and consumers are
/// expected to keep up.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// The current session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The authenticated user, if any.
    pub user: Option<UserRecord>,
    /// Bearer token attached to business requests.
    pub access_token: Option<String>,
    /// Token presented to the refresh endpoint when the access token expires.
    pub refresh_token: Option<String>,
    /// True once durable storage has been read at startup. Consumers must
    /// not make authorization decisions before this is set.
    #[serde(skip)]
    pub hydrated: bool,
}

/// Out-of-band session notifications for the surrounding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The credential pair is no longer usable; the UI should route to the
    /// login view with a "session expired" indicator.
    Expired,
}

/// Process-wide, durable session store.
///
/// Cheap to clone; all clones share the same state. Mutated only through
/// [`set_session`](Self::set_session) and
/// [`clear_session`](Self::clear_session).
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    storage: Arc<dyn Storage>,
    state: RwLock<Session>,
    watch_tx: watch::Sender<Session>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Create a session store backed by `storage`. The store starts
    /// unhydrated; call [`hydrate`](Self::hydrate) before making
    /// authorization decisions.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let (watch_tx, _) = watch::channel(Session::default());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SessionStoreInner {
                storage,
                state: RwLock::new(Session::default()),
                watch_tx,
                events_tx,
            }),
        }
    }

    /// Read persisted session state and mark the store hydrated.
    ///
    /// Runs exactly once at startup. Undecodable persisted state is treated
    /// as absent rather than fatal.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    pub fn hydrate(&self) -> Result<(), StorageError> {
        let mut session = match self.inner.storage.read(SESSION_SLOT)? {
            Some(contents) => match serde_json::from_str::<Session>(&contents) {
                Ok(session) => session,
                Err(err) => {
                    warn!(error = %err, "discarding undecodable persisted session");
                    Session::default()
                }
            },
            None => Session::default(),
        };
        session.hydrated = true;

        let snapshot = {
            let mut state = self.inner.state.write().expect("session lock poisoned");
            *state = session;
            state.clone()
        };
        debug!(authenticated = snapshot.user.is_some(), "session hydrated");
        self.inner.watch_tx.send_replace(snapshot);
        Ok(())
    }

    /// A snapshot of the current session.
    #[must_use]
    pub fn current(&self) -> Session {
        self.inner
            .state
            .read()
            .expect("session lock poisoned")
            .clone()
    }

    /// Whether a user is currently logged in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .state
            .read()
            .expect("session lock poisoned")
            .user
            .is_some()
    }

    /// The current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .expect("session lock poisoned")
            .access_token
            .clone()
    }

    /// The current refresh token, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .expect("session lock poisoned")
            .refresh_token
            .clone()
    }

    /// The current user, if any.
    #[must_use]
    pub fn user(&self) -> Option<UserRecord> {
        self.inner
            .state
            .read()
            .expect("session lock poisoned")
            .user
            .clone()
    }

    /// Replace the session with a new user and credential pair, persist it,
    /// and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the session cannot be persisted. The
    /// in-memory state is updated regardless, so an authenticated process
    /// keeps working even if the disk is read-only.
    pub fn set_session(
        &self,
        user: UserRecord,
        access_token: String,
        refresh_token: String,
    ) -> Result<(), StorageError> {
        let snapshot = {
            let mut state = self.inner.state.write().expect("session lock poisoned");
            state.user = Some(user);
            state.access_token = Some(access_token);
            state.refresh_token = Some(refresh_token);
            state.clone()
        };
        let result = self.persist(&snapshot);
        self.inner.watch_tx.send_replace(snapshot);
        result
    }

    /// Clear the session, persist the cleared state, and notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the cleared state cannot be persisted.
    pub fn clear_session(&self) -> Result<(), StorageError> {
        let snapshot = {
            let mut state = self.inner.state.write().expect("session lock poisoned");
            state.user = None;
            state.access_token = None;
            state.refresh_token = None;
            state.clone()
        };
        let result = self.inner.storage.remove(SESSION_SLOT);
        self.inner.watch_tx.send_replace(snapshot);
        result
    }

    /// Clear the session because its credentials are no longer usable, and
    /// broadcast [`SessionEvent::Expired`] so the UI can route to login.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the cleared state cannot be persisted.
    pub fn expire(&self) -> Result<(), StorageError> {
        warn!("session expired; clearing credentials");
        let result = self.clear_session();
        // No receivers is fine; the event is advisory
        let _ = self.inner.events_tx.send(SessionEvent::Expired);
        result
    }

    /// Subscribe to session state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.watch_tx.subscribe()
    }

    /// Subscribe to out-of-band session events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events_tx.subscribe()
    }

    fn persist(&self, session: &Session) -> Result<(), StorageError> {
        let json = serde_json::to_string(session).expect("session serialization is infallible");
        self.inner.storage.write(SESSION_SLOT, &json)
    }
}
