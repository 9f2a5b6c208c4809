//! Plumbing shared by every fluent resource module.
//!
//! [`ArmType`] knows where a top-level resource type lives and issues the
//! REST calls common to all of them. The traits give wrappers, definitions
//! and updates their shared `with_*` surface.

use std::collections::HashMap;

use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::{with_api_version, AzureClient};
use crate::config::AzureConfig;
use crate::error::{AzureError, AzureResult};
use crate::region::normalize;
use crate::resource_id::{self, ResourceId};
use crate::types::{ResourceGroupInner, Tags};

// ─── ARM resource types ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFamily {
    Compute,
    Network,
    Storage,
    Resources,
}

impl ApiFamily {
    pub fn version(self, config: &AzureConfig) -> &str {
        match self {
            ApiFamily::Compute => &config.api_version_compute,
            ApiFamily::Network => &config.api_version_network,
            ApiFamily::Storage => &config.api_version_storage,
            ApiFamily::Resources => &config.api_version_resources,
        }
    }
}

/// A top-level, resource-group-scoped ARM resource type.
#[derive(Debug, Clone, Copy)]
pub struct ArmType {
    pub provider: &'static str,
    pub type_name: &'static str,
    pub api: ApiFamily,
}

impl ArmType {
    pub const fn new(provider: &'static str, type_name: &'static str, api: ApiFamily) -> Self {
        Self {
            provider,
            type_name,
            api,
        }
    }

    /// e.g. `Microsoft.Network/virtualNetworks`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.provider, self.type_name)
    }

    pub fn id(&self, client: &AzureClient, group: &str, name: &str) -> AzureResult<ResourceId> {
        Ok(ResourceId::new(
            client.subscription_id()?,
            group,
            self.provider,
            self.type_name,
            name,
        ))
    }

    pub fn api_version<'a>(&self, client: &'a AzureClient) -> &'a str {
        self.api.version(client.config())
    }

    pub fn url(&self, client: &AzureClient, group: &str, name: &str) -> AzureResult<String> {
        let id = self.id(client, group, name)?;
        Ok(client.resource_url(&id, self.api_version(client)))
    }

    /// URL for an ID handed in by the caller, after checking it names this type.
    pub fn url_for_id(&self, client: &AzureClient, id: &str) -> AzureResult<String> {
        let parsed = self.parse_id(id)?;
        Ok(client.resource_url(&parsed, self.api_version(client)))
    }

    pub fn parse_id(&self, id: &str) -> AzureResult<ResourceId> {
        let parsed = ResourceId::parse(id)?;
        let matches = parsed
            .provider()
            .map(|p| p.eq_ignore_ascii_case(self.provider))
            .unwrap_or(false)
            && parsed
                .resource_type()
                .map(|t| t.eq_ignore_ascii_case(self.type_name))
                .unwrap_or(false)
            && parsed.children().is_empty();
        if matches {
            Ok(parsed)
        } else {
            Err(AzureError::invalid_resource_id(
                id,
                &format!("expected a {} ID", self.full_name()),
            ))
        }
    }

    pub fn list_url(&self, client: &AzureClient) -> AzureResult<String> {
        let url = client.subscription_url(&format!(
            "/providers/{}/{}",
            self.provider, self.type_name
        ))?;
        Ok(with_api_version(&url, self.api_version(client)))
    }

    pub fn list_by_group_url(&self, client: &AzureClient, group: &str) -> AzureResult<String> {
        let url = client.resource_group_url(
            group,
            &format!("/providers/{}/{}", self.provider, self.type_name),
        )?;
        Ok(with_api_version(&url, self.api_version(client)))
    }

    // ── REST operations ──────────────────────────────────────────────

    pub async fn list<T: DeserializeOwned>(&self, client: &AzureClient) -> AzureResult<Vec<T>> {
        client.get_all_pages(&self.list_url(client)?).await
    }

    pub async fn list_by_group<T: DeserializeOwned>(
        &self,
        client: &AzureClient,
        group: &str,
    ) -> AzureResult<Vec<T>> {
        client
            .get_all_pages(&self.list_by_group_url(client, group)?)
            .await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        client: &AzureClient,
        group: &str,
        name: &str,
    ) -> AzureResult<T> {
        client.get_json(&self.url(client, group, name)?).await
    }

    pub async fn get_by_id<T: DeserializeOwned>(&self, client: &AzureClient, id: &str) -> AzureResult<T> {
        client.get_json(&self.url_for_id(client, id)?).await
    }

    /// PUT and wait for provisioning to finish.
    pub async fn create_or_update<B: Serialize, T: DeserializeOwned>(
        &self,
        client: &AzureClient,
        group: &str,
        name: &str,
        body: &B,
    ) -> AzureResult<T> {
        info!("Azure PUT {} '{}' in '{}'", self.type_name, name, group);
        client.put_and_wait(&self.url(client, group, name)?, body).await
    }

    /// PUT to an existing resource's ID and wait for provisioning.
    pub async fn put_by_id<B: Serialize, T: DeserializeOwned>(
        &self,
        client: &AzureClient,
        id: &str,
        body: &B,
    ) -> AzureResult<T> {
        info!("Azure PUT {}", id);
        client.put_and_wait(&self.url_for_id(client, id)?, body).await
    }

    pub async fn patch_by_id<B: Serialize, T: DeserializeOwned>(
        &self,
        client: &AzureClient,
        id: &str,
        body: &B,
    ) -> AzureResult<T> {
        client.patch_json(&self.url_for_id(client, id)?, body).await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        client: &AzureClient,
        group: &str,
        name: &str,
        body: &B,
    ) -> AzureResult<T> {
        client.patch_json(&self.url(client, group, name)?, body).await
    }

    pub async fn delete(&self, client: &AzureClient, group: &str, name: &str) -> AzureResult<()> {
        info!("Azure DELETE {} '{}' in '{}'", self.type_name, name, group);
        client.delete_and_wait(&self.url(client, group, name)?).await
    }

    pub async fn delete_by_id(&self, client: &AzureClient, id: &str) -> AzureResult<()> {
        info!("Azure DELETE {}", id);
        client.delete_and_wait(&self.url_for_id(client, id)?).await
    }
}

// ─── Wrapper trait ──────────────────────────────────────────────────

/// Read-only surface every resource wrapper exposes.
pub trait Resource {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn region(&self) -> &str;
    fn tags(&self) -> &Tags;
    /// Fully qualified type, e.g. `Microsoft.Compute/virtualMachines`.
    fn resource_type(&self) -> String;

    fn resource_group_name(&self) -> Option<String> {
        resource_id::resource_group_from_id(self.id())
    }

    fn resource_id(&self) -> AzureResult<ResourceId> {
        ResourceId::parse(self.id())
    }
}

/// Implements [`Resource`] for a wrapper whose `inner` has the usual
/// `id` / `name` / `location` / `tags` fields.
macro_rules! impl_resource {
    ($wrapper:ty, $arm_type:expr) => {
        impl $crate::resource::Resource for $wrapper {
            fn id(&self) -> &str {
                &self.inner.id
            }
            fn name(&self) -> &str {
                &self.inner.name
            }
            fn region(&self) -> &str {
                &self.inner.location
            }
            fn tags(&self) -> &$crate::types::Tags {
                &self.inner.tags
            }
            fn resource_type(&self) -> String {
                $arm_type.full_name()
            }
        }
    };
}
pub(crate) use impl_resource;

// ─── Definitions ────────────────────────────────────────────────────

/// State every groupable definition carries.
#[derive(Debug, Clone, Default)]
pub struct DefinitionBase {
    pub name: String,
    pub region: Option<String>,
    pub resource_group: Option<String>,
    pub create_resource_group: bool,
    pub tags: Tags,
}

impl DefinitionBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns `(region, resource_group)` once both are set.
    pub fn validate(&self, kind: &str) -> AzureResult<(&str, &str)> {
        if self.name.trim().is_empty() {
            return Err(AzureError::validation(format!("{kind}: name is required")));
        }
        let region = self
            .region
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                AzureError::validation(format!("{kind} '{}': region is required", self.name))
            })?;
        let group = self
            .resource_group
            .as_deref()
            .filter(|g| !g.is_empty())
            .ok_or_else(|| {
                AzureError::validation(format!(
                    "{kind} '{}': resource group is required",
                    self.name
                ))
            })?;
        Ok((region, group))
    }

    /// Create the resource group first when `with_new_resource_group` was used.
    pub async fn ensure_resource_group(&self, client: &AzureClient) -> AzureResult<()> {
        if !self.create_resource_group {
            return Ok(());
        }
        let (region, group) = self.validate("resource group")?;
        let body = ResourceGroupInner {
            location: region.to_string(),
            ..Default::default()
        };
        crate::resource_groups::create_or_update(client, group, &body).await?;
        Ok(())
    }
}

/// `with_*` methods shared by definitions of resource-group-scoped resources.
pub trait GroupableDefinition: Sized {
    fn base_mut(&mut self) -> &mut DefinitionBase;

    fn with_region(mut self, region: impl AsRef<str>) -> Self {
        self.base_mut().region = Some(normalize(region.as_ref()));
        self
    }

    fn with_existing_resource_group(mut self, group: impl Into<String>) -> Self {
        let base = self.base_mut();
        base.resource_group = Some(group.into());
        base.create_resource_group = false;
        self
    }

    /// The group is created in the definition's region before the resource.
    fn with_new_resource_group(mut self, group: impl Into<String>) -> Self {
        let base = self.base_mut();
        base.resource_group = Some(group.into());
        base.create_resource_group = true;
        self
    }

    fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_mut().tags.insert(key.into(), value.into());
        self
    }

    fn with_tags<K: Into<String>, V: Into<String>>(
        mut self,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.base_mut()
            .tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

// ─── Updates ────────────────────────────────────────────────────────

pub trait TaggableUpdate: Sized {
    fn tags_mut(&mut self) -> &mut Tags;

    fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags_mut().insert(key.into(), value.into());
        self
    }

    fn without_tag(mut self, key: &str) -> Self {
        self.tags_mut().remove(key);
        self
    }

    /// Replace all tags.
    fn with_tags<K: Into<String>, V: Into<String>>(
        mut self,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        *self.tags_mut() = tags
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<HashMap<_, _>>();
        self
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AzureErrorKind;

    const VNETS: ArmType = ArmType::new("Microsoft.Network", "virtualNetworks", ApiFamily::Network);

    struct Def {
        base: DefinitionBase,
    }

    impl GroupableDefinition for Def {
        fn base_mut(&mut self) -> &mut DefinitionBase {
            &mut self.base
        }
    }

    struct Upd {
        tags: Tags,
    }

    impl TaggableUpdate for Upd {
        fn tags_mut(&mut self) -> &mut Tags {
            &mut self.tags
        }
    }

    fn client() -> AzureClient {
        AzureClient::new(AzureConfig::new())
            .unwrap()
            .with_subscription("sub1")
    }

    #[test]
    fn groupable_definition_setters() {
        let d = Def {
            base: DefinitionBase::new("vnet1"),
        }
        .with_region("West Europe")
        .with_new_resource_group("rg1")
        .with_tag("env", "dev")
        .with_tags([("owner", "ops")]);

        assert_eq!(d.base.region.as_deref(), Some("westeurope"));
        assert_eq!(d.base.resource_group.as_deref(), Some("rg1"));
        assert!(d.base.create_resource_group);
        assert_eq!(d.base.tags.len(), 2);
        assert_eq!(d.base.validate("network").unwrap(), ("westeurope", "rg1"));
    }

    #[test]
    fn definition_requires_region_and_group() {
        let base = DefinitionBase::new("x");
        let e = base.validate("network").unwrap_err();
        assert_eq!(e.kind, AzureErrorKind::Validation);
        assert!(e.message.contains("region"));

        let d = Def { base }.with_region(crate::region::Region::US_EAST);
        let e = d.base.validate("network").unwrap_err();
        assert!(e.message.contains("resource group"));
    }

    #[test]
    fn existing_group_overrides_new() {
        let d = Def {
            base: DefinitionBase::new("x"),
        }
        .with_new_resource_group("a")
        .with_existing_resource_group("b");
        assert!(!d.base.create_resource_group);
        assert_eq!(d.base.resource_group.as_deref(), Some("b"));
    }

    #[test]
    fn taggable_update() {
        let mut tags = Tags::new();
        tags.insert("a".into(), "1".into());
        let u = Upd { tags }.with_tag("b", "2").without_tag("a");
        assert_eq!(u.tags.len(), 1);
        assert_eq!(u.tags.get("b").map(String::as_str), Some("2"));

        let u = u.with_tags([("c", "3")]);
        assert_eq!(u.tags.len(), 1);
        assert!(u.tags.contains_key("c"));
    }

    #[test]
    fn arm_type_urls() {
        let c = client();
        assert_eq!(
            VNETS.list_url(&c).unwrap(),
            "https://management.azure.com/subscriptions/sub1/providers/Microsoft.Network/virtualNetworks?api-version=2024-01-01"
        );
        assert_eq!(
            VNETS.list_by_group_url(&c, "rg1").unwrap(),
            "https://management.azure.com/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks?api-version=2024-01-01"
        );
        assert_eq!(
            VNETS.url(&c, "rg1", "v1").unwrap(),
            "https://management.azure.com/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/v1?api-version=2024-01-01"
        );
    }

    #[test]
    fn arm_type_rejects_foreign_ids() {
        let e = VNETS
            .parse_id("/subscriptions/s/resourceGroups/g/providers/Microsoft.Compute/virtualMachines/vm1")
            .unwrap_err();
        assert_eq!(e.kind, AzureErrorKind::InvalidResourceId);

        let subnet = "/subscriptions/s/resourceGroups/g/providers/Microsoft.Network/virtualNetworks/v/subnets/a";
        assert!(VNETS.parse_id(subnet).is_err());

        let ok = "/subscriptions/s/resourceGroups/g/providers/microsoft.network/virtualnetworks/v";
        assert!(VNETS.parse_id(ok).is_ok());
    }
}
