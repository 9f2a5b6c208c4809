//! Azure AD OAuth2 authentication.
//!
//! Supports the client-credentials (service-principal) flow against the
//! Microsoft identity platform v2.0 token endpoint.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::client::AzureClient;
use crate::config::AzureCredentials;
use crate::error::{AzureError, AzureResult};

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Cached bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AzureToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resource: Option<String>,
}

impl AzureToken {
    /// A token with no known expiry (e.g. one handed in by the caller).
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".into(),
            expires_at: None,
            resource: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::seconds(EXPIRY_SKEW_SECS))
    }

    pub fn expires_within(&self, window: Duration) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() + window >= exp,
            None => false,
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub resource: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".into()
}

/// Token endpoint URL for a given tenant.
fn token_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

/// Acquire a management-plane token using the client-credentials grant.
pub async fn acquire_token(
    client: &AzureClient,
    creds: &AzureCredentials,
) -> AzureResult<AzureToken> {
    if creds.client_id.is_empty() || creds.client_secret.is_empty() || creds.tenant_id.is_empty() {
        return Err(AzureError::validation(
            "client_id, client_secret, and tenant_id are all required",
        ));
    }

    let config = client.config();
    let url = token_url(&config.authority_host, &creds.tenant_id);
    let scope = config.management_scope();
    debug!("Azure token request → {}", url);

    let form: Vec<(&str, &str)> = vec![
        ("grant_type", "client_credentials"),
        ("client_id", &creds.client_id),
        ("client_secret", &creds.client_secret),
        ("scope", &scope),
    ];

    let resp: TokenResponse = client.post_form_unauthenticated(&url, &form).await?;
    Ok(token_from_response(resp))
}

fn token_from_response(resp: TokenResponse) -> AzureToken {
    let expires_at = resp
        .expires_in
        .map(|secs| Utc::now() + Duration::seconds(secs as i64));

    AzureToken {
        access_token: resp.access_token,
        token_type: resp.token_type,
        expires_at,
        resource: resp.resource,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
