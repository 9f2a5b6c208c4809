//! Shared setup for the HTTP-level tests.

#![allow(dead_code)]

use azure_fluent::{Azure, AzureConfig, AzureToken};
use wiremock::MockServer;

pub const SUB: &str = "sub1";
pub const TOKEN: &str = "test-token";

/// Config pointed at the mock server with near-zero delays.
pub fn mock_config(server: &MockServer) -> AzureConfig {
    let mut config = AzureConfig::new()
        .with_management_endpoint(server.uri())
        .with_authority_host(server.uri());
    config.retry_base_delay_ms = 1;
    config.long_running_poll_interval_ms = 1;
    config.long_running_max_polls = 5;
    config
}

/// `Azure` with a fixed bearer token, talking to the mock server.
pub async fn mock_azure(server: &MockServer) -> Azure {
    Azure::with_token(mock_config(server), SUB, AzureToken::bearer(TOKEN))
        .await
        .expect("mock Azure client")
}

pub fn rg_path(group: &str) -> String {
    format!("/subscriptions/{SUB}/resourceGroups/{group}")
}

pub fn arm_id(group: &str, provider: &str, kind: &str, name: &str) -> String {
    format!("/subscriptions/{SUB}/resourceGroups/{group}/providers/{provider}/{kind}/{name}")
}
