//! Typed wrappers over the server's REST surface.
//!
//! Every call goes through the request gateway, which owns credential
//! attachment and the expiry recovery protocol; nothing here touches
//! tokens or session state.

use crate::credentials::TokenPair;
use crate::gateway::{Gateway, GatewayError};
use crate::session::UserRef;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::sync::Arc;

// ── Wire shapes ─────────────────────────────────────────────────────

/// `POST /api/auth/login` response body.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl From<TokenResponse> for TokenPair {
    fn from(resp: TokenResponse) -> Self {
        TokenPair {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
        }
    }
}

/// One entry of `GET /api/files`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileInfo {
    pub id: i64,
    pub name: String,
    pub size: u64,
    pub created_at: NaiveDateTime,
    pub uploader_id: i64,
    pub uploader_username: String,
}

/// Parsed CSV payload from `GET /api/files/{id}/content`. Column order
/// lives in `headers`; rows are keyed by header name.
#[derive(Debug, Clone, Deserialize)]
pub struct CsvContent {
    pub headers: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

// ── Client ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ApiClient {
    gateway: Arc<Gateway>,
}

impl ApiClient {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    // ── Auth ────────────────────────────────────────────────────────

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, GatewayError> {
        let resp: TokenResponse = self
            .gateway
            .post_json(
                "/api/auth/login",
                &serde_json::json!({ "username": username, "password": password }),
            )
            .await?;
        Ok(resp.into())
    }

    pub async fn signup(&self, username: &str, password: &str) -> Result<UserRef, GatewayError> {
        self.gateway
            .post_json(
                "/api/auth/signup",
                &serde_json::json!({ "username": username, "password": password }),
            )
            .await
    }

    pub async fn me(&self) -> Result<UserRef, GatewayError> {
        self.gateway.get_json("/api/auth/me").await
    }

    // ── Files ───────────────────────────────────────────────────────

    pub async fn files(&self) -> Result<Vec<FileInfo>, GatewayError> {
        self.gateway.get_json("/api/files").await
    }

    pub async fn file_content(&self, id: i64) -> Result<CsvContent, GatewayError> {
        self.gateway
            .get_json(&format!("/api/files/{id}/content"))
            .await
    }

    pub async fn download_file(&self, id: i64) -> Result<Vec<u8>, GatewayError> {
        let resp = self
            .gateway
            .send(|client| client.get(self.gateway.url(&format!("/api/files/{id}"))))
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }

    // ── Admin ───────────────────────────────────────────────────────

    pub async fn upload_csv(
        &self,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<FileInfo, GatewayError> {
        let name = file_name.to_string();
        let resp = self
            .gateway
            .send(move |client| {
                // Rebuilt per attempt: multipart forms are single-use.
                let part = reqwest::multipart::Part::bytes(content.clone())
                    .file_name(name.clone());
                let form = reqwest::multipart::Form::new().part("file", part);
                client
                    .post(self.gateway.url("/api/admin/files/upload"))
                    .multipart(form)
            })
            .await?;
        Ok(resp.json().await?)
    }

    pub async fn delete_file(&self, id: i64) -> Result<(), GatewayError> {
        self.gateway.delete(&format!("/api/admin/files/{id}")).await
    }

    pub async fn users(&self) -> Result<Vec<UserRef>, GatewayError> {
        self.gateway.get_json("/api/admin/users").await
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), GatewayError> {
        self.gateway.delete(&format!("/api/admin/users/{id}")).await
    }
}

// ── Tests ───────────────────────────────────────────────────────────
