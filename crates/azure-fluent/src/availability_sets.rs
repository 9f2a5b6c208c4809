//! Azure Availability Sets.

use crate::client::AzureClient;
use crate::error::{AzureError, AzureResult};
use crate::resource::{impl_resource, ApiFamily, ArmType, DefinitionBase, GroupableDefinition, TaggableUpdate};
use crate::types::{AvailabilitySetInner, AvailabilitySetProperties, Sku, Tags};

pub(crate) const AVAILABILITY_SETS: ArmType =
    ArmType::new("Microsoft.Compute", "availabilitySets", ApiFamily::Compute);

/// `Aligned` is required for VMs with managed disks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilitySetSkuType {
    Aligned,
    Classic,
}

impl AvailabilitySetSkuType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilitySetSkuType::Aligned => "Aligned",
            AvailabilitySetSkuType::Classic => "Classic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aligned" => Some(AvailabilitySetSkuType::Aligned),
            "classic" => Some(AvailabilitySetSkuType::Classic),
            _ => None,
        }
    }
}

// ─── Collection ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AvailabilitySets {
    client: AzureClient,
}

impl AvailabilitySets {
    pub(crate) fn new(client: AzureClient) -> Self {
        Self { client }
    }

    fn wrap(&self, inner: AvailabilitySetInner) -> AvailabilitySet {
        AvailabilitySet {
            inner,
            client: self.client.clone(),
        }
    }

    pub async fn list(&self) -> AzureResult<Vec<AvailabilitySet>> {
        let items = AVAILABILITY_SETS.list(&self.client).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn list_by_resource_group(&self, group: &str) -> AzureResult<Vec<AvailabilitySet>> {
        let items = AVAILABILITY_SETS.list_by_group(&self.client, group).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn get_by_resource_group(&self, group: &str, name: &str) -> AzureResult<AvailabilitySet> {
        let inner = AVAILABILITY_SETS.get(&self.client, group, name).await?;
        Ok(self.wrap(inner))
    }

    pub async fn get_by_id(&self, id: &str) -> AzureResult<AvailabilitySet> {
        let inner = AVAILABILITY_SETS.get_by_id(&self.client, id).await?;
        Ok(self.wrap(inner))
    }

    pub fn define(&self, name: impl Into<String>) -> AvailabilitySetDefinition {
        AvailabilitySetDefinition {
            client: self.client.clone(),
            base: DefinitionBase::new(name),
            fault_domains: None,
            update_domains: None,
            sku: None,
        }
    }

    pub async fn delete_by_resource_group(&self, group: &str, name: &str) -> AzureResult<()> {
        AVAILABILITY_SETS.delete(&self.client, group, name).await
    }

    pub async fn delete_by_id(&self, id: &str) -> AzureResult<()> {
        AVAILABILITY_SETS.delete_by_id(&self.client, id).await
    }
}

// ─── Wrapper ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AvailabilitySet {
    inner: AvailabilitySetInner,
    client: AzureClient,
}

impl_resource!(AvailabilitySet, AVAILABILITY_SETS);

impl AvailabilitySet {
    pub fn fault_domain_count(&self) -> Option<u32> {
        self.inner.properties.platform_fault_domain_count
    }

    pub fn update_domain_count(&self) -> Option<u32> {
        self.inner.properties.platform_update_domain_count
    }

    pub fn sku(&self) -> Option<AvailabilitySetSkuType> {
        self.inner
            .sku
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .and_then(AvailabilitySetSkuType::parse)
    }

    pub fn virtual_machine_ids(&self) -> Vec<&str> {
        self.inner
            .properties
            .virtual_machines
            .iter()
            .map(|r| r.id.as_str())
            .collect()
    }

    pub fn inner(&self) -> &AvailabilitySetInner {
        &self.inner
    }

    pub fn into_inner(self) -> AvailabilitySetInner {
        self.inner
    }

    pub async fn refresh(&mut self) -> AzureResult<()> {
        self.inner = AVAILABILITY_SETS.get_by_id(&self.client, &self.inner.id).await?;
        Ok(())
    }

    pub fn update(&self) -> AvailabilitySetUpdate {
        AvailabilitySetUpdate {
            client: self.client.clone(),
            inner: self.inner.clone(),
        }
    }
}

// ─── Definition ─────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "a definition does nothing until create() is awaited"]
pub struct AvailabilitySetDefinition {
    client: AzureClient,
    base: DefinitionBase,
    fault_domains: Option<u32>,
    update_domains: Option<u32>,
    sku: Option<AvailabilitySetSkuType>,
}

impl GroupableDefinition for AvailabilitySetDefinition {
    fn base_mut(&mut self) -> &mut DefinitionBase {
        &mut self.base
    }
}

impl AvailabilitySetDefinition {
    /// 1 to 3.
    pub fn with_fault_domain_count(mut self, count: u32) -> Self {
        self.fault_domains = Some(count);
        self
    }

    /// 1 to 20.
    pub fn with_update_domain_count(mut self, count: u32) -> Self {
        self.update_domains = Some(count);
        self
    }

    pub fn with_sku(mut self, sku: AvailabilitySetSkuType) -> Self {
        self.sku = Some(sku);
        self
    }

    fn build(&self) -> AzureResult<AvailabilitySetInner> {
        let (region, _) = self.base.validate("availability set")?;
        validate_domain_counts(self.fault_domains, self.update_domains)?;
        Ok(AvailabilitySetInner {
            location: region.to_string(),
            tags: self.base.tags.clone(),
            sku: self.sku.map(|s| Sku::named(s.as_str())),
            properties: AvailabilitySetProperties {
                platform_fault_domain_count: self.fault_domains,
                platform_update_domain_count: self.update_domains,
                virtual_machines: Vec::new(),
            },
            ..Default::default()
        })
    }

    pub async fn create(self) -> AzureResult<AvailabilitySet> {
        let body = self.build()?;
        self.base.ensure_resource_group(&self.client).await?;
        let (_, group) = self.base.validate("availability set")?;
        let inner = AVAILABILITY_SETS
            .create_or_update(&self.client, group, &self.base.name, &body)
            .await?;
        Ok(AvailabilitySet {
            inner,
            client: self.client,
        })
    }
}

fn validate_domain_counts(fault: Option<u32>, update: Option<u32>) -> AzureResult<()> {
    if let Some(f) = fault {
        if !(1..=3).contains(&f) {
            return Err(AzureError::validation(format!(
                "fault domain count must be 1..=3, got {f}"
            )));
        }
    }
    if let Some(u) = update {
        if !(1..=20).contains(&u) {
            return Err(AzureError::validation(format!(
                "update domain count must be 1..=20, got {u}"
            )));
        }
    }
    Ok(())
}

// ─── Update ─────────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "an update does nothing until apply() is awaited"]
pub struct AvailabilitySetUpdate {
    client: AzureClient,
    inner: AvailabilitySetInner,
}

impl TaggableUpdate for AvailabilitySetUpdate {
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.inner.tags
    }
}

impl AvailabilitySetUpdate {
    pub async fn apply(self) -> AzureResult<AvailabilitySet> {
        let inner = AVAILABILITY_SETS
            .put_by_id(&self.client, &self.inner.id, &self.inner)
            .await?;
        Ok(AvailabilitySet {
            inner,
            client: self.client,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
