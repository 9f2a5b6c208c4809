//! HTTP client wrapper for Azure Resource Manager API.
//!
//! Handles bearer-token injection (acquiring a fresh token from the
//! configured credentials when needed), rate-limit retries with exponential
//! backoff, pagination via `nextLink`, long-running operation polling and
//! standard ARM error extraction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, ACCEPT, CONTENT_LENGTH, LOCATION, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{self, AzureToken};
use crate::config::{AzureConfig, AzureCredentials};
use crate::error::{AzureError, AzureErrorKind, AzureResult};
use crate::resource_id::ResourceId;
use crate::types::{ArmList, OperationStatus};

const CLIENT_REQUEST_ID: HeaderName = HeaderName::from_static("x-ms-client-request-id");
const ASYNC_OPERATION: HeaderName = HeaderName::from_static("azure-asyncoperation");

/// HTTP client with Azure-specific auth and retry logic.
///
/// Clones share the token slot, so a token acquired through one clone is
/// seen by all of them.
#[derive(Clone)]
pub struct AzureClient {
    http: Client,
    config: Arc<AzureConfig>,
    credentials: Option<Arc<AzureCredentials>>,
    subscription_id: Option<String>,
    token: Arc<RwLock<Option<AzureToken>>>,
    last_request_at: Arc<AtomicU64>,
}

impl std::fmt::Debug for AzureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureClient")
            .field("management_endpoint", &self.config.management_endpoint)
            .field("subscription_id", &self.subscription_id)
            .field("has_credentials", &self.credentials.is_some())
            .finish()
    }
}

impl AzureClient {
    pub fn new(config: AzureConfig) -> AzureResult<Self> {
        config.validate()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AzureError::network(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config: Arc::new(config),
            credentials: None,
            subscription_id: None,
            token: Arc::new(RwLock::new(None)),
            last_request_at: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Attach service-principal credentials; also selects their subscription.
    pub fn with_credentials(mut self, creds: AzureCredentials) -> Self {
        if !creds.subscription_id.is_empty() {
            self.subscription_id = Some(creds.subscription_id.clone());
        }
        self.credentials = Some(Arc::new(creds));
        self
    }

    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &AzureConfig {
        &self.config
    }

    pub fn credentials(&self) -> Option<&AzureCredentials> {
        self.credentials.as_deref()
    }

    pub async fn set_token(&self, token: AzureToken) {
        *self.token.write().await = Some(token);
    }

    pub async fn token(&self) -> Option<AzureToken> {
        self.token.read().await.clone()
    }

    pub async fn clear_token(&self) {
        *self.token.write().await = None;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .map(AzureToken::is_usable)
            .unwrap_or(false)
    }

    pub fn subscription_id(&self) -> AzureResult<&str> {
        self.subscription_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(AzureError::subscription_not_set)
    }

    /// Milliseconds since the epoch of the last authenticated request.
    pub fn last_request_at(&self) -> u64 {
        self.last_request_at.load(Ordering::Relaxed)
    }

    // ── URL builders ─────────────────────────────────────────────────

    pub fn arm_url(&self, path: &str) -> String {
        format!("{}{}", self.config.management_base(), path)
    }

    /// Subscription-scoped URL.
    pub fn subscription_url(&self, suffix: &str) -> AzureResult<String> {
        let sub = self.subscription_id()?;
        Ok(self.arm_url(&format!("/subscriptions/{}{}", sub, suffix)))
    }

    /// Resource-group-scoped URL.
    pub fn resource_group_url(&self, rg: &str, suffix: &str) -> AzureResult<String> {
        let sub = self.subscription_id()?;
        Ok(self.arm_url(&format!(
            "/subscriptions/{}/resourceGroups/{}{}",
            sub, rg, suffix
        )))
    }

    /// Full URL of a resource, `api-version` included.
    pub fn resource_url(&self, id: &ResourceId, api_version: &str) -> String {
        with_api_version(&self.arm_url(&id.to_string()), api_version)
    }

    // ── Token handling ───────────────────────────────────────────────

    /// Current access token, acquiring a new one from the credentials when
    /// the cached one is missing or about to expire.
    async fn bearer_token(&self) -> AzureResult<String> {
        if let Some(t) = self.token.read().await.as_ref().filter(|t| t.is_usable()) {
            return Ok(t.access_token.clone());
        }

        let creds = self
            .credentials
            .as_deref()
            .ok_or_else(AzureError::not_authenticated)?;

        let mut slot = self.token.write().await;
        // another task may have refreshed while we waited for the lock
        if let Some(t) = slot.as_ref().filter(|t| t.is_usable()) {
            return Ok(t.access_token.clone());
        }
        debug!("Azure token missing or expired; acquiring a new one");
        let fresh = auth::acquire_token(self, creds).await?;
        let access = fresh.access_token.clone();
        *slot = Some(fresh);
        Ok(access)
    }

    // ── Core request loop ────────────────────────────────────────────

    /// Forget `used` unless another task already replaced it.
    async fn discard_token(&self, used: &str) {
        let mut slot = self.token.write().await;
        if slot.as_ref().is_some_and(|t| t.access_token == used) {
            *slot = None;
        }
    }

    async fn execute(&self, method: Method, url: &str, body: Option<&Value>) -> AzureResult<Response> {
        let max_retries = self.config.max_retries;
        let mut attempt = 0u32;
        let mut renewed = false;
        loop {
            let token = self.bearer_token().await?;
            self.last_request_at.store(now_millis(), Ordering::Relaxed);
            let request_id = Uuid::new_v4().to_string();
            debug!("Azure {} {} (request {})", method, url, request_id);

            let mut req = self
                .http
                .request(method.clone(), url)
                .bearer_auth(&token)
                .header(ACCEPT, "application/json")
                .header(CLIENT_REQUEST_ID, request_id.as_str());
            req = match body {
                Some(b) => req.json(b),
                None if method == Method::POST => req.header(CONTENT_LENGTH, "0"),
                None => req,
            };

            let resp = req.send().await.map_err(transport_error)?;
            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }

            // a revoked token gets one retry with a fresh one
            if status == StatusCode::UNAUTHORIZED && !renewed && self.credentials.is_some() {
                warn!("Azure {} {} → 401 – renewing token", method, url);
                self.discard_token(&token).await;
                renewed = true;
                continue;
            }

            if should_retry(status.as_u16()) && attempt < max_retries {
                let delay = retry_after(resp.headers())
                    .unwrap_or_else(|| backoff(self.config.retry_base_delay_ms, attempt));
                warn!(
                    "Azure {} {} → {} – retrying in {}ms",
                    method,
                    url,
                    status,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let text = resp.text().await.unwrap_or_default();
            return Err(AzureError::from_status(status.as_u16(), &text));
        }
    }

    async fn execute_with<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> AzureResult<Response> {
        let value = serde_json::to_value(body)?;
        self.execute(method, url, Some(&value)).await
    }

    // ── Core HTTP verbs ──────────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> AzureResult<T> {
        let resp = self.execute(Method::GET, url, None).await?;
        read_json(resp).await
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> AzureResult<T> {
        let resp = self.execute_with(Method::PUT, url, body).await?;
        read_json(resp).await
    }

    pub async fn patch_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> AzureResult<T> {
        let resp = self.execute_with(Method::PATCH, url, body).await?;
        read_json(resp).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> AzureResult<T> {
        let resp = self.execute_with(Method::POST, url, body).await?;
        read_json(resp).await
    }

    /// POST without a body that accepts any 2xx. Used for actions such as
    /// VM start / stop.
    pub async fn post_action(&self, url: &str) -> AzureResult<()> {
        self.execute(Method::POST, url, None).await.map(|_| ())
    }

    /// POST action that also waits for the long-running operation it starts.
    pub async fn post_action_and_wait(&self, url: &str) -> AzureResult<()> {
        let resp = self.execute(Method::POST, url, None).await?;
        self.wait_for_operation(resp.status(), resp.headers()).await
    }

    /// DELETE accepting 200, 202 and 204.
    pub async fn delete(&self, url: &str) -> AzureResult<()> {
        self.execute(Method::DELETE, url, None).await.map(|_| ())
    }

    // ── Long-running operations ──────────────────────────────────────

    /// PUT, wait for provisioning to finish, then return the final resource.
    pub async fn put_and_wait<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> AzureResult<T> {
        let resp = self.execute_with(Method::PUT, url, body).await?;
        let status = resp.status();
        let headers = resp.headers().clone();

        if has_operation_header(&headers) && is_accepted(status) {
            self.wait_for_operation(status, &headers).await?;
            return self.get_json(url).await;
        }

        let text = resp.text().await.map_err(transport_error)?;
        if text.trim().is_empty() {
            return self.get_json(url).await;
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn delete_and_wait(&self, url: &str) -> AzureResult<()> {
        let resp = self.execute(Method::DELETE, url, None).await?;
        self.wait_for_operation(resp.status(), resp.headers()).await
    }

    /// Poll `Azure-AsyncOperation` (preferred) or `Location` until the
    /// operation reaches a terminal state.
    async fn wait_for_operation(&self, status: StatusCode, headers: &HeaderMap) -> AzureResult<()> {
        if !is_accepted(status) {
            return Ok(());
        }
        let (poll_url, via_status_resource) = match (
            header_str(headers, &ASYNC_OPERATION),
            header_str(headers, &LOCATION),
        ) {
            (Some(op), _) => (op, true),
            (None, Some(loc)) => (loc, false),
            (None, None) => return Ok(()),
        };

        let interval = Duration::from_millis(self.config.long_running_poll_interval_ms);
        let mut delay = retry_after(headers).unwrap_or(interval);

        for poll in 1..=self.config.long_running_max_polls {
            tokio::time::sleep(delay).await;
            let resp = self.execute(Method::GET, &poll_url, None).await?;
            delay = retry_after(resp.headers()).unwrap_or(interval);

            if via_status_resource {
                let op: OperationStatus = read_json(resp).await?;
                debug!("Azure operation poll {}: {}", poll, op.status);
                match op.status.to_ascii_lowercase().as_str() {
                    "succeeded" => return Ok(()),
                    "failed" | "canceled" | "cancelled" => {
                        let detail = op
                            .error
                            .and_then(|e| e.message.or(e.code))
                            .unwrap_or_else(|| "no error details".into());
                        return Err(AzureError::new(
                            AzureErrorKind::OperationFailed,
                            format!("operation {}: {}", op.status, detail),
                        ));
                    }
                    _ => continue,
                }
            } else if resp.status() != StatusCode::ACCEPTED {
                return Ok(());
            }
        }

        Err(AzureError::new(
            AzureErrorKind::Timeout,
            format!(
                "long-running operation did not finish after {} polls",
                self.config.long_running_max_polls
            ),
        ))
    }

    // ── Pagination helper ────────────────────────────────────────────

    /// Follow `nextLink` to collect **all** items from a paginated ARM list endpoint.
    pub async fn get_all_pages<T: DeserializeOwned>(&self, initial_url: &str) -> AzureResult<Vec<T>> {
        let mut all: Vec<T> = Vec::new();
        let mut url = initial_url.to_string();

        loop {
            debug!("Azure paginate: {}", url);
            let page: ArmList<T> = self.get_json(&url).await?;
            all.extend(page.value);
            match page.next_link {
                Some(next) if next == url => {
                    warn!("Azure paginate: nextLink points back at {}; stopping", url);
                    break;
                }
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        Ok(all)
    }

    /// POST unauthenticated form data (used by auth module for token exchange).
    pub async fn post_form_unauthenticated<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(impl AsRef<str>, impl AsRef<str>)],
    ) -> AzureResult<T> {
        let form_pairs: Vec<(&str, &str)> = form
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .collect();

        let resp = self
            .http
            .post(url)
            .form(&form_pairs)
            .send()
            .await
            .map_err(transport_error)?;

        if resp.status().is_success() {
            read_json(resp).await
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            let mut err = AzureError::from_status(status, &body);
            if matches!(status, 400 | 401) {
                err.kind = AzureErrorKind::Auth;
            }
            Err(err)
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Append `api-version` to a URL that may already carry a query string.
pub fn with_api_version(url: &str, api_version: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}api-version={}", url, sep, api_version)
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> AzureResult<T> {
    let text = resp.text().await.map_err(transport_error)?;
    serde_json::from_str(&text)
        .map_err(|e| AzureError::parse(format!("JSON parse: {e}")))
}

fn transport_error(e: reqwest::Error) -> AzureError {
    if e.is_timeout() {
        AzureError::new(AzureErrorKind::Timeout, e.to_string())
    } else {
        AzureError::network(e.to_string())
    }
}

fn should_retry(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_accepted(status: StatusCode) -> bool {
    status == StatusCode::CREATED || status == StatusCode::ACCEPTED
}

fn has_operation_header(headers: &HeaderMap) -> bool {
    headers.contains_key(&ASYNC_OPERATION) || headers.contains_key(LOCATION)
}

fn header_str(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `Retry-After` in delta-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn backoff(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << attempt.min(16)))
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ─── Tests ──────────────────────────────────────────────────────────
