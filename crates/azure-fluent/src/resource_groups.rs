//! Azure Resource Groups – list, get, create, update tags, delete, list the
//! resources within a group.

use log::{debug, info};

use crate::client::AzureClient;
use crate::error::{AzureError, AzureResult};
use crate::region::normalize;
use crate::resource::{Resource, TaggableUpdate};
use crate::types::{GenericResourceInner, ResourceGroupInner, Tags};

// ─── REST operations ────────────────────────────────────────────────

fn group_url(client: &AzureClient, name: &str) -> AzureResult<String> {
    let api = &client.config().api_version_resources;
    client.subscription_url(&format!("/resourcegroups/{}?api-version={}", name, api))
}

/// List all resource groups in the subscription.
pub async fn list(client: &AzureClient) -> AzureResult<Vec<ResourceGroupInner>> {
    let api = &client.config().api_version_resources;
    let url = client.subscription_url(&format!("/resourcegroups?api-version={}", api))?;
    debug!("list_resource_groups → {}", url);
    client.get_all_pages(&url).await
}

pub async fn get(client: &AzureClient, name: &str) -> AzureResult<ResourceGroupInner> {
    let url = group_url(client, name)?;
    debug!("get_resource_group({}) → {}", name, url);
    client.get_json(&url).await
}

/// Create or update a resource group.
pub async fn create_or_update(
    client: &AzureClient,
    name: &str,
    body: &ResourceGroupInner,
) -> AzureResult<ResourceGroupInner> {
    let url = group_url(client, name)?;
    info!("create_resource_group({}) in {}", name, body.location);
    client.put_json(&url, body).await
}

pub async fn update_tags(
    client: &AzureClient,
    name: &str,
    tags: &Tags,
) -> AzureResult<ResourceGroupInner> {
    let url = group_url(client, name)?;
    debug!("update_resource_group_tags({}) → {}", name, url);
    let body = serde_json::json!({ "tags": tags });
    client.patch_json(&url, &body).await
}

/// Delete a resource group (and all its resources), waiting for completion.
pub async fn delete(client: &AzureClient, name: &str) -> AzureResult<()> {
    let url = group_url(client, name)?;
    info!("delete_resource_group({})", name);
    client.delete_and_wait(&url).await
}

pub async fn list_resources(
    client: &AzureClient,
    group: &str,
) -> AzureResult<Vec<GenericResourceInner>> {
    let api = &client.config().api_version_resources;
    let url = client.resource_group_url(group, &format!("/resources?api-version={}", api))?;
    debug!("list_resources_in_rg({}) → {}", group, url);
    client.get_all_pages(&url).await
}

pub async fn exists(client: &AzureClient, name: &str) -> AzureResult<bool> {
    match get(client, name).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

// ─── Collection ─────────────────────────────────────────────────────

/// Entry point for resource group operations.
#[derive(Debug, Clone)]
pub struct ResourceGroups {
    client: AzureClient,
}

impl ResourceGroups {
    pub(crate) fn new(client: AzureClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> AzureResult<Vec<ResourceGroup>> {
        Ok(list(&self.client)
            .await?
            .into_iter()
            .map(|inner| ResourceGroup::new(inner, self.client.clone()))
            .collect())
    }

    pub async fn get(&self, name: &str) -> AzureResult<ResourceGroup> {
        let inner = get(&self.client, name).await?;
        Ok(ResourceGroup::new(inner, self.client.clone()))
    }

    /// `false` on 404; other failures are returned as errors.
    pub async fn contains(&self, name: &str) -> AzureResult<bool> {
        exists(&self.client, name).await
    }

    pub fn define(&self, name: impl Into<String>) -> ResourceGroupDefinition {
        ResourceGroupDefinition {
            client: self.client.clone(),
            name: name.into(),
            region: None,
            tags: Tags::new(),
        }
    }

    pub async fn delete(&self, name: &str) -> AzureResult<()> {
        delete(&self.client, name).await
    }

    pub async fn list_resources(&self, name: &str) -> AzureResult<Vec<GenericResourceInner>> {
        list_resources(&self.client, name).await
    }
}

// ─── Wrapper ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ResourceGroup {
    inner: ResourceGroupInner,
    client: AzureClient,
}

impl Resource for ResourceGroup {
    fn id(&self) -> &str {
        &self.inner.id
    }
    fn name(&self) -> &str {
        &self.inner.name
    }
    fn region(&self) -> &str {
        &self.inner.location
    }
    fn tags(&self) -> &Tags {
        &self.inner.tags
    }
    fn resource_type(&self) -> String {
        "Microsoft.Resources/resourceGroups".into()
    }
    fn resource_group_name(&self) -> Option<String> {
        Some(self.inner.name.clone())
    }
}

impl ResourceGroup {
    pub(crate) fn new(inner: ResourceGroupInner, client: AzureClient) -> Self {
        Self { inner, client }
    }

    pub fn provisioning_state(&self) -> Option<&str> {
        self.inner
            .properties
            .as_ref()
            .and_then(|p| p.provisioning_state.as_deref())
    }

    pub fn inner(&self) -> &ResourceGroupInner {
        &self.inner
    }

    pub fn into_inner(self) -> ResourceGroupInner {
        self.inner
    }

    pub async fn refresh(&mut self) -> AzureResult<()> {
        self.inner = get(&self.client, &self.inner.name).await?;
        Ok(())
    }

    pub async fn list_resources(&self) -> AzureResult<Vec<GenericResourceInner>> {
        list_resources(&self.client, &self.inner.name).await
    }

    pub fn update(&self) -> ResourceGroupUpdate {
        ResourceGroupUpdate {
            client: self.client.clone(),
            name: self.inner.name.clone(),
            tags: self.inner.tags.clone(),
        }
    }
}

// ─── Definition ─────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "a definition does nothing until create() is awaited"]
pub struct ResourceGroupDefinition {
    client: AzureClient,
    name: String,
    region: Option<String>,
    tags: Tags,
}

impl ResourceGroupDefinition {
    pub fn with_region(mut self, region: impl AsRef<str>) -> Self {
        self.region = Some(normalize(region.as_ref()));
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_tags<K: Into<String>, V: Into<String>>(
        mut self,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub async fn create(self) -> AzureResult<ResourceGroup> {
        if self.name.trim().is_empty() {
            return Err(AzureError::validation("resource group: name is required"));
        }
        let region = self.region.filter(|r| !r.is_empty()).ok_or_else(|| {
            AzureError::validation(format!("resource group '{}': region is required", self.name))
        })?;
        let body = ResourceGroupInner {
            location: region,
            tags: self.tags,
            ..Default::default()
        };
        let inner = create_or_update(&self.client, &self.name, &body).await?;
        Ok(ResourceGroup::new(inner, self.client))
    }
}

// ─── Update ─────────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "an update does nothing until apply() is awaited"]
pub struct ResourceGroupUpdate {
    client: AzureClient,
    name: String,
    tags: Tags,
}

impl TaggableUpdate for ResourceGroupUpdate {
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }
}

impl ResourceGroupUpdate {
    pub async fn apply(self) -> AzureResult<ResourceGroup> {
        let inner = update_tags(&self.client, &self.name, &self.tags).await?;
        Ok(ResourceGroup::new(inner, self.client))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
