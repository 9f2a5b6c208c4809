//! Client configuration and credential resolution.
//!
//! Configuration starts from [`AzureConfig::new`] defaults and can be
//! overridden from the environment. Credentials are a service principal
//! (tenant / client / secret) plus the subscription to operate in, taken
//! from explicit values, the standard `AZURE_*` environment variables, or an
//! SDK auth file as written by `az ad sp create-for-rbac --sdk-auth`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AzureError, AzureResult};

/// Azure management base URL.
pub const ARM_BASE: &str = "https://management.azure.com";

/// Microsoft identity platform host.
pub const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

pub mod api_versions {
    pub const COMPUTE: &str = "2024-03-01";
    pub const NETWORK: &str = "2024-01-01";
    pub const STORAGE: &str = "2023-05-01";
    pub const RESOURCES: &str = "2024-03-01";
    pub const SUBSCRIPTIONS: &str = "2022-12-01";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AzureConfig {
    pub management_endpoint: String,
    pub authority_host: String,
    pub api_version_compute: String,
    pub api_version_network: String,
    pub api_version_storage: String,
    pub api_version_resources: String,
    pub api_version_subscriptions: String,
    pub request_timeout_secs: u64,
    /// Retries for 429 / 5xx responses.
    pub max_retries: u32,
    /// Base delay between retries (doubled each attempt).
    pub retry_base_delay_ms: u64,
    pub long_running_poll_interval_ms: u64,
    pub long_running_max_polls: u32,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureConfig {
    pub fn new() -> Self {
        Self {
            management_endpoint: ARM_BASE.into(),
            authority_host: AUTHORITY_HOST.into(),
            api_version_compute: api_versions::COMPUTE.into(),
            api_version_network: api_versions::NETWORK.into(),
            api_version_storage: api_versions::STORAGE.into(),
            api_version_resources: api_versions::RESOURCES.into(),
            api_version_subscriptions: api_versions::SUBSCRIPTIONS.into(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 500,
            long_running_poll_interval_ms: 5_000,
            long_running_max_polls: 360,
        }
    }

    /// Defaults overridden by `AZURE_MANAGEMENT_ENDPOINT`,
    /// `AZURE_AUTHORITY_HOST`, `AZURE_MAX_RETRIES` and
    /// `AZURE_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> AzureResult<Self> {
        let mut config = Self::new();
        if let Some(v) = env_var("AZURE_MANAGEMENT_ENDPOINT") {
            config.management_endpoint = v;
        }
        if let Some(v) = env_var("AZURE_AUTHORITY_HOST") {
            config.authority_host = v;
        }
        if let Some(v) = env_var("AZURE_MAX_RETRIES") {
            config.max_retries = v.parse().map_err(|_| {
                AzureError::validation(format!("AZURE_MAX_RETRIES is not a number: {v}"))
            })?;
        }
        if let Some(v) = env_var("AZURE_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = v.parse().map_err(|_| {
                AzureError::validation(format!("AZURE_REQUEST_TIMEOUT_SECS is not a number: {v}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Point the client at another management endpoint (sovereign clouds,
    /// test servers).
    pub fn with_management_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.management_endpoint = endpoint.into();
        self
    }

    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into();
        self
    }

    pub fn validate(&self) -> AzureResult<()> {
        check_http_url("management_endpoint", &self.management_endpoint)?;
        check_http_url("authority_host", &self.authority_host)?;
        if self.long_running_max_polls == 0 {
            return Err(AzureError::validation("long_running_max_polls must be at least 1"));
        }
        Ok(())
    }

    /// Management endpoint without a trailing slash.
    pub fn management_base(&self) -> &str {
        self.management_endpoint.trim_end_matches('/')
    }

    /// OAuth2 scope for the management plane.
    pub fn management_scope(&self) -> String {
        format!("{}/.default", self.management_base())
    }
}

fn check_http_url(field: &str, value: &str) -> AzureResult<()> {
    let url = Url::parse(value)
        .map_err(|e| AzureError::validation(format!("{field} is not a valid URL ({value}): {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AzureError::validation(format!(
            "{field} must be http(s), got scheme '{other}'"
        ))),
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ─── Credentials ────────────────────────────────────────────────────

/// Service-principal credentials for Azure AD.
#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

impl AzureCredentials {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            subscription_id: subscription_id.into(),
        }
    }

    /// Read `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` and
    /// `AZURE_SUBSCRIPTION_ID`.
    pub fn from_env() -> AzureResult<Self> {
        let creds = Self {
            tenant_id: env_var("AZURE_TENANT_ID").unwrap_or_default(),
            client_id: env_var("AZURE_CLIENT_ID").unwrap_or_default(),
            client_secret: env_var("AZURE_CLIENT_SECRET").unwrap_or_default(),
            subscription_id: env_var("AZURE_SUBSCRIPTION_ID").unwrap_or_default(),
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Load an SDK auth file. Unknown keys (endpoint URLs and the like) are
    /// ignored.
    pub fn from_auth_file(path: impl AsRef<Path>) -> AzureResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AzureError::validation(format!("cannot read auth file {}: {e}", path.display()))
        })?;
        let creds: Self = serde_json::from_str(&raw)?;
        creds.validate()?;
        Ok(creds)
    }

    pub fn validate(&self) -> AzureResult<()> {
        let missing: Vec<&str> = [
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("subscription_id", &self.subscription_id),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AzureError::validation(format!(
                "missing credential fields: {}",
                missing.join(", ")
            )))
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AzureErrorKind;
    use std::io::Write;

    #[test]
    fn config_defaults() {
        let c = AzureConfig::new();
        assert_eq!(c.management_endpoint, ARM_BASE);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.api_version_compute, api_versions::COMPUTE);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn management_scope_strips_trailing_slash() {
        let c = AzureConfig::new().with_management_endpoint("https://management.azure.com/");
        assert_eq!(c.management_scope(), "https://management.azure.com/.default");
    }

    #[test]
    fn validate_rejects_bad_endpoint() {
        let c = AzureConfig::new().with_management_endpoint("not a url");
        assert_eq!(c.validate().unwrap_err().kind, AzureErrorKind::Validation);

        let c = AzureConfig::new().with_management_endpoint("ftp://example.com");
        assert!(c.validate().is_err());
    }

    #[test]
    fn credentials_validate_lists_missing_fields() {
        let c = AzureCredentials {
            tenant_id: "t".into(),
            ..Default::default()
        };
        let e = c.validate().unwrap_err();
        assert!(e.message.contains("client_id"));
        assert!(e.message.contains("subscription_id"));
        assert!(!e.message.contains("tenant_id"));
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let c = AzureCredentials::new("t", "c", "hunter2", "s");
        let dbg = format!("{:?}", c);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn credentials_from_auth_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "clientId": "cid",
                "clientSecret": "secret",
                "subscriptionId": "sub-1",
                "tenantId": "tid",
                "activeDirectoryEndpointUrl": "https://login.microsoftonline.com"
            }}"#
        )
        .unwrap();

        let c = AzureCredentials::from_auth_file(file.path()).unwrap();
        assert_eq!(c.client_id, "cid");
        assert_eq!(c.subscription_id, "sub-1");
        assert_eq!(c.tenant_id, "tid");
    }

    #[test]
    fn credentials_from_incomplete_auth_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"clientId": "cid"}}"#).unwrap();
        let e = AzureCredentials::from_auth_file(file.path()).unwrap_err();
        assert_eq!(e.kind, AzureErrorKind::Validation);
    }

    #[test]
    fn credentials_from_missing_file() {
        let e = AzureCredentials::from_auth_file("/nonexistent/azure.auth").unwrap_err();
        assert_eq!(e.kind, AzureErrorKind::Validation);
    }
}
