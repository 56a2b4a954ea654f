//! Authenticated-user state machine.
//!
//! `SessionManager` owns every transition of the session container:
//! bootstrap on app start, login/signup/logout, and the degrade paths when
//! identity resolution fails. Consumers (route guard, panels, CLI shell)
//! hold the [`SessionStore`] read view and never mutate it directly.

pub mod types;

pub use types::{Role, Session, SessionStatus, SessionStore, UserRef};

use crate::api::ApiClient;
use crate::credentials::CredentialStore;
use crate::gateway::GatewayError;
use std::sync::Arc;

pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn CredentialStore>,
    session: SessionStore,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: Arc<dyn CredentialStore>, session: SessionStore) -> Self {
        Self {
            api,
            store,
            session,
        }
    }

    /// Session to seed the container with at app start: `Loading` when a
    /// token pair is persisted (identity still has to be resolved), else
    /// `Anonymous`.
    pub fn initial_session(store: &dyn CredentialStore) -> Session {
        if store.load().is_some() {
            Session::loading()
        } else {
            Session::anonymous()
        }
    }

    /// Read view over the session state.
    pub fn session(&self) -> SessionStore {
        self.session.clone()
    }

    pub fn is_admin(&self) -> bool {
        self.session.is_admin()
    }

    /// Resolve identity for a persisted token, if any.
    ///
    /// Failure is non-fatal: the session degrades to `Anonymous` and the
    /// stale pair is dropped. The app is never left in `Loading`.
    pub async fn bootstrap(&self) -> SessionStatus {
        if self.store.load().is_none() {
            self.session.transition(Session::anonymous());
            return SessionStatus::Anonymous;
        }

        self.session.transition(Session::loading());
        match self.fetch_identity().await {
            Ok(user) => {
                tracing::info!("session restored for {}", user.username);
                SessionStatus::Authenticated
            }
            Err(e) => {
                tracing::warn!("identity fetch failed, degrading to anonymous: {e}");
                self.store.clear();
                self.session.transition(Session::anonymous());
                SessionStatus::Anonymous
            }
        }
    }

    /// Authenticate and resolve identity. On any failure the caller gets
    /// the displayable error and no partial session survives.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserRef, GatewayError> {
        let pair = self.api.login(username, password).await?;
        self.store.save(&pair);

        match self.fetch_identity().await {
            Ok(user) => Ok(user),
            Err(e) => {
                self.store.clear();
                self.session.transition(Session::anonymous());
                Err(e)
            }
        }
    }

    /// Register, then sign in with the same credentials. Registration does
    /// not itself authenticate, and the embedded login is only issued once
    /// registration has succeeded.
    pub async fn signup(&self, username: &str, password: &str) -> Result<UserRef, GatewayError> {
        self.api.signup(username, password).await?;
        self.login(username, password).await
    }

    /// Drop credentials and reset to `Anonymous`. Purely local; never
    /// waits on the network.
    pub fn logout(&self) {
        self.store.clear();
        self.session.transition(Session::anonymous());
        tracing::info!("signed out");
    }

    /// `GET /api/auth/me` and move to `Authenticated` on success.
    async fn fetch_identity(&self) -> Result<UserRef, GatewayError> {
        let user = self.api.me().await?;
        self.session
            .transition(Session::authenticated(user.clone()));
        Ok(user)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
