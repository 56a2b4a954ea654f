//! Request gateway: the single choke point for outbound API calls.
//!
//! Every request runs the same pipeline: attach the stored bearer token,
//! send, classify the response, and on an authorization denial run the
//! recovery protocol at most once. Recovery repairs future requests (and
//! retries the current one a single time when a refresh actually lands);
//! it never recurses.

mod pipeline;

use crate::credentials::{CredentialStore, TokenPair};
use crate::routes::{NavTarget, Navigator};
use crate::session::{Session, SessionStore};
use async_trait::async_trait;
use pipeline::ResponseClass;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Authorization denied and no session recovery applied; the detail is
    /// the server's displayable message (bad credentials and the like).
    #[error("{detail}")]
    Unauthorized { detail: String },

    /// Mid-session denial that ended in a forced sign-out.
    #[error("session expired, sign in again")]
    SessionExpired,

    /// Any other non-2xx, with the server's `{detail}` body when present.
    #[error("{detail}")]
    Api { status: u16, detail: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

// ── Token refresh capability ────────────────────────────────────────

/// Pluggable refresh step for the recovery protocol.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange a refresh token for a new pair.
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<TokenPair>;
}

/// Default refresher. The server exposes no refresh endpoint, so refresh
/// always fails and recovery degrades straight to sign-out, matching the
/// deployed behavior. Swap in a real implementation once the endpoint
/// exists; the rest of the protocol is unchanged.
pub struct NoRefresh;

#[async_trait]
impl TokenRefresher for NoRefresh {
    async fn refresh(&self, _refresh_token: &str) -> anyhow::Result<TokenPair> {
        anyhow::bail!("server exposes no token refresh endpoint")
    }
}

enum Recovery {
    /// New pair stored; the caller may retry the request once.
    Refreshed,
    /// Refresh failed mid-session; store cleared, session reset, login requested.
    LoggedOut,
    /// No refresh token existed; store cleared, caller decides what to do.
    NoSession,
}

// ── Gateway ─────────────────────────────────────────────────────────

pub struct Gateway {
    base_url: String,
    client: reqwest::Client,
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    session: SessionStore,
    navigator: Navigator,
}

impl Gateway {
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        session: SessionStore,
        navigator: Navigator,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            store,
            refresher,
            session,
            navigator,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Run one logical request through the pipeline.
    ///
    /// `build` constructs the request from the shared client; it is invoked
    /// again for the single post-refresh retry so credential attachment
    /// re-reads the store each time.
    pub async fn send<F>(&self, build: F) -> Result<reqwest::Response, GatewayError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut retried = false;
        loop {
            let mut request = build(&self.client);
            if let Some(bearer) = pipeline::bearer_value(self.store.as_ref()) {
                request = request.header(reqwest::header::AUTHORIZATION, bearer);
            }
            let resp = request.send().await?;

            match pipeline::classify(resp.status()) {
                ResponseClass::Ok => return Ok(resp),
                ResponseClass::Unauthorized => {
                    let detail = pipeline::error_detail(resp).await;
                    if retried {
                        // Second denial on the recovered request: final.
                        return Err(GatewayError::Unauthorized { detail });
                    }
                    retried = true;
                    match self.recover().await {
                        Recovery::Refreshed => continue,
                        Recovery::LoggedOut => return Err(GatewayError::SessionExpired),
                        Recovery::NoSession => return Err(GatewayError::Unauthorized { detail }),
                    }
                }
                ResponseClass::Api => {
                    let status = resp.status().as_u16();
                    let detail = pipeline::error_detail(resp).await;
                    return Err(GatewayError::Api { status, detail });
                }
            }
        }
    }

    /// Recovery protocol for an authorization denial.
    ///
    /// With a stored refresh token the pluggable refresher runs; failure
    /// means the session is over: clear credentials, reset the session and
    /// send the host to the login surface. Without one there was no session
    /// to expire: clear any half-state and leave navigation alone.
    async fn recover(&self) -> Recovery {
        match self.store.load() {
            Some(pair) => match self.refresher.refresh(&pair.refresh_token).await {
                Ok(fresh) => {
                    self.store.save(&fresh);
                    tracing::info!("access token refreshed");
                    Recovery::Refreshed
                }
                Err(e) => {
                    tracing::warn!("token refresh failed, signing out: {e}");
                    self.store.clear();
                    self.session.transition(Session::anonymous());
                    self.navigator.request(NavTarget::Login);
                    Recovery::LoggedOut
                }
            },
            None => {
                self.store.clear();
                Recovery::NoSession
            }
        }
    }

    // ── Convenience verbs ───────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let resp = self.send(|client| client.get(self.url(path))).await?;
        Ok(resp.json().await?)
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let resp = self
            .send(|client| client.post(self.url(path)).json(body))
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<(), GatewayError> {
        self.send(|client| client.delete(self.url(path))).await?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
