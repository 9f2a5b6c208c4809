//! Entry point tying an authenticated [`AzureClient`] to the resource
//! collections.

use log::info;

use crate::auth::{self, AzureToken};
use crate::availability_sets::AvailabilitySets;
use crate::client::{with_api_version, AzureClient};
use crate::config::{AzureConfig, AzureCredentials};
use crate::error::AzureResult;
use crate::load_balancers::LoadBalancers;
use crate::network_interfaces::NetworkInterfaces;
use crate::network_security_groups::NetworkSecurityGroups;
use crate::networks::Networks;
use crate::public_ip_addresses::PublicIpAddresses;
use crate::resource_groups::ResourceGroups;
use crate::storage_accounts::StorageAccounts;
use crate::types::SubscriptionInner;
use crate::virtual_machines::VirtualMachines;

/// Authenticated view of one subscription.
///
/// Cloning is cheap; clones share the token cache.
#[derive(Debug, Clone)]
pub struct Azure {
    client: AzureClient,
}

impl Azure {
    /// Service-principal access. The token is acquired on the first request.
    pub fn new(config: AzureConfig, credentials: AzureCredentials) -> AzureResult<Self> {
        credentials.validate()?;
        let client = AzureClient::new(config)?.with_credentials(credentials);
        Ok(Self { client })
    }

    /// Default configuration with the token acquired up front, so bad
    /// credentials fail here rather than on the first call.
    pub async fn authenticate(credentials: AzureCredentials) -> AzureResult<Self> {
        Self::authenticate_with(AzureConfig::new(), credentials).await
    }

    pub async fn authenticate_with(
        config: AzureConfig,
        credentials: AzureCredentials,
    ) -> AzureResult<Self> {
        let azure = Self::new(config, credentials)?;
        if let Some(creds) = azure.client.credentials() {
            let token = auth::acquire_token(&azure.client, creds).await?;
            azure.client.set_token(token).await;
        }
        info!(
            "Authenticated to Azure subscription {}",
            azure.client.subscription_id()?
        );
        Ok(azure)
    }

    /// Configuration and credentials from `AZURE_*` environment variables.
    pub fn from_env() -> AzureResult<Self> {
        Self::new(AzureConfig::from_env()?, AzureCredentials::from_env()?)
    }

    /// Use a token obtained elsewhere. Nothing re-acquires it on expiry.
    pub async fn with_token(
        config: AzureConfig,
        subscription_id: impl Into<String>,
        token: AzureToken,
    ) -> AzureResult<Self> {
        let client = AzureClient::new(config)?.with_subscription(subscription_id);
        client.set_token(token).await;
        Ok(Self { client })
    }

    pub fn subscription_id(&self) -> AzureResult<&str> {
        self.client.subscription_id()
    }

    pub fn client(&self) -> &AzureClient {
        &self.client
    }

    /// Subscriptions visible to the current identity.
    pub async fn list_subscriptions(&self) -> AzureResult<Vec<SubscriptionInner>> {
        let url = with_api_version(
            &self.client.arm_url("/subscriptions"),
            &self.client.config().api_version_subscriptions,
        );
        self.client.get_all_pages(&url).await
    }

    // ── Collections ──────────────────────────────────────────────────

    pub fn resource_groups(&self) -> ResourceGroups {
        ResourceGroups::new(self.client.clone())
    }

    pub fn availability_sets(&self) -> AvailabilitySets {
        AvailabilitySets::new(self.client.clone())
    }

    pub fn storage_accounts(&self) -> StorageAccounts {
        StorageAccounts::new(self.client.clone())
    }

    pub fn networks(&self) -> Networks {
        Networks::new(self.client.clone())
    }

    pub fn network_security_groups(&self) -> NetworkSecurityGroups {
        NetworkSecurityGroups::new(self.client.clone())
    }

    pub fn public_ip_addresses(&self) -> PublicIpAddresses {
        PublicIpAddresses::new(self.client.clone())
    }

    pub fn network_interfaces(&self) -> NetworkInterfaces {
        NetworkInterfaces::new(self.client.clone())
    }

    pub fn load_balancers(&self) -> LoadBalancers {
        LoadBalancers::new(self.client.clone())
    }

    pub fn virtual_machines(&self) -> VirtualMachines {
        VirtualMachines::new(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AzureErrorKind;

    #[test]
    fn new_rejects_incomplete_credentials() {
        let creds = AzureCredentials::new("tenant", "", "secret", "sub");
        let e = Azure::new(AzureConfig::new(), creds).unwrap_err();
        assert_eq!(e.kind, AzureErrorKind::Validation);
    }

    #[tokio::test]
    async fn new_is_lazy() {
        let creds = AzureCredentials::new("tenant", "app", "secret", "sub-9");
        let azure = Azure::new(AzureConfig::new(), creds).unwrap();
        assert_eq!(azure.subscription_id().unwrap(), "sub-9");
        assert!(!azure.client().is_authenticated().await);
    }

    #[tokio::test]
    async fn with_token_is_authenticated_and_shared() {
        let azure = Azure::with_token(AzureConfig::new(), "sub1", AzureToken::bearer("tok"))
            .await
            .unwrap();
        let other = azure.clone();
        assert!(other.client().is_authenticated().await);
        other.client().clear_token().await;
        assert!(!azure.client().is_authenticated().await);
    }
}
