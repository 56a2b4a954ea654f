//! Pure middleware stages around the gateway's transport call: credential
//! attachment before send, response classification after receive. Kept free
//! of transport state so each stage tests in isolation.

use crate::credentials::CredentialStore;
use reqwest::StatusCode;
use serde::Deserialize;

/// Outcome buckets for a received response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseClass {
    /// 2xx.
    Ok,
    /// 401, candidate for the recovery protocol.
    Unauthorized,
    /// Any other non-2xx.
    Api,
}

pub(crate) fn classify(status: StatusCode) -> ResponseClass {
    if status.is_success() {
        ResponseClass::Ok
    } else if status == StatusCode::UNAUTHORIZED {
        ResponseClass::Unauthorized
    } else {
        ResponseClass::Api
    }
}

/// `Authorization` header value for the current token, if one is stored.
pub(crate) fn bearer_value(store: &dyn CredentialStore) -> Option<String> {
    store
        .load()
        .map(|pair| format!("Bearer {}", pair.access_token))
}

/// Error body shape used by the server for every 4xx.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiDetail {
    pub detail: String,
}

/// Extract a displayable message from an error response, consuming it.
/// Falls back to the raw body, then to the status line.
pub(crate) async fn error_detail(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiDetail>(&body) {
        Ok(parsed) => parsed.detail,
        Err(_) if !body.trim().is_empty() => body,
        Err(_) => status.to_string(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
