//! Azure Public IP Addresses.

use crate::client::AzureClient;
use crate::error::{AzureError, AzureResult};
use crate::resource::{
    impl_resource, ApiFamily, ArmType, DefinitionBase, GroupableDefinition, TaggableUpdate,
};
use crate::types::{PublicIpAddressInner, PublicIpAddressProperties, PublicIpDnsSettings, Sku, Tags};

pub(crate) const PUBLIC_IP_ADDRESSES: ArmType =
    ArmType::new("Microsoft.Network", "publicIPAddresses", ApiFamily::Network);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpAllocationMethod {
    Static,
    Dynamic,
}

impl IpAllocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpAllocationMethod::Static => "Static",
            IpAllocationMethod::Dynamic => "Dynamic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Some(IpAllocationMethod::Static),
            "dynamic" => Some(IpAllocationMethod::Dynamic),
            _ => None,
        }
    }
}

/// `Standard` addresses must be statically allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicIpSkuType {
    Basic,
    Standard,
}

impl PublicIpSkuType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicIpSkuType::Basic => "Basic",
            PublicIpSkuType::Standard => "Standard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Some(PublicIpSkuType::Basic),
            "standard" => Some(PublicIpSkuType::Standard),
            _ => None,
        }
    }
}

fn validate_idle_timeout(minutes: Option<u32>) -> AzureResult<()> {
    match minutes {
        Some(m) if !(4..=30).contains(&m) => Err(AzureError::validation(format!(
            "idle timeout must be 4..=30 minutes, got {m}"
        ))),
        _ => Ok(()),
    }
}

fn validate_properties(sku: Option<&Sku>, props: &PublicIpAddressProperties) -> AzureResult<()> {
    validate_idle_timeout(props.idle_timeout_in_minutes)?;
    let standard = sku
        .and_then(|s| s.name.as_deref())
        .and_then(PublicIpSkuType::parse)
        == Some(PublicIpSkuType::Standard);
    let dynamic = props
        .public_ip_allocation_method
        .as_deref()
        .and_then(IpAllocationMethod::parse)
        == Some(IpAllocationMethod::Dynamic);
    if standard && dynamic {
        return Err(AzureError::validation(
            "Standard SKU public IPs must use static allocation",
        ));
    }
    Ok(())
}

fn set_leaf_label(props: &mut PublicIpAddressProperties, label: Option<String>) {
    match label {
        Some(l) => {
            props
                .dns_settings
                .get_or_insert_with(PublicIpDnsSettings::default)
                .domain_name_label = Some(l);
        }
        None => props.dns_settings = None,
    }
}

// ─── Collection ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PublicIpAddresses {
    client: AzureClient,
}

impl PublicIpAddresses {
    pub(crate) fn new(client: AzureClient) -> Self {
        Self { client }
    }

    fn wrap(&self, inner: PublicIpAddressInner) -> PublicIpAddress {
        PublicIpAddress {
            inner,
            client: self.client.clone(),
        }
    }

    pub async fn list(&self) -> AzureResult<Vec<PublicIpAddress>> {
        let items = PUBLIC_IP_ADDRESSES.list(&self.client).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn list_by_resource_group(&self, group: &str) -> AzureResult<Vec<PublicIpAddress>> {
        let items = PUBLIC_IP_ADDRESSES.list_by_group(&self.client, group).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn get_by_resource_group(&self, group: &str, name: &str) -> AzureResult<PublicIpAddress> {
        let inner = PUBLIC_IP_ADDRESSES.get(&self.client, group, name).await?;
        Ok(self.wrap(inner))
    }

    pub async fn get_by_id(&self, id: &str) -> AzureResult<PublicIpAddress> {
        let inner = PUBLIC_IP_ADDRESSES.get_by_id(&self.client, id).await?;
        Ok(self.wrap(inner))
    }

    pub fn define(&self, name: impl Into<String>) -> PublicIpAddressDefinition {
        PublicIpAddressDefinition {
            client: self.client.clone(),
            base: DefinitionBase::new(name),
            allocation: IpAllocationMethod::Dynamic,
            leaf_domain_label: None,
            idle_timeout: None,
            sku: None,
        }
    }

    pub async fn delete_by_resource_group(&self, group: &str, name: &str) -> AzureResult<()> {
        PUBLIC_IP_ADDRESSES.delete(&self.client, group, name).await
    }

    pub async fn delete_by_id(&self, id: &str) -> AzureResult<()> {
        PUBLIC_IP_ADDRESSES.delete_by_id(&self.client, id).await
    }
}

// ─── Wrapper ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PublicIpAddress {
    inner: PublicIpAddressInner,
    client: AzureClient,
}

impl_resource!(PublicIpAddress, PUBLIC_IP_ADDRESSES);

impl PublicIpAddress {
    /// `None` until a dynamic address is attached to a running resource.
    pub fn ip_address(&self) -> Option<&str> {
        self.inner.properties.ip_address.as_deref()
    }

    pub fn fqdn(&self) -> Option<&str> {
        self.inner
            .properties
            .dns_settings
            .as_ref()
            .and_then(|d| d.fqdn.as_deref())
    }

    pub fn leaf_domain_label(&self) -> Option<&str> {
        self.inner
            .properties
            .dns_settings
            .as_ref()
            .and_then(|d| d.domain_name_label.as_deref())
    }

    pub fn allocation_method(&self) -> Option<IpAllocationMethod> {
        self.inner
            .properties
            .public_ip_allocation_method
            .as_deref()
            .and_then(IpAllocationMethod::parse)
    }

    pub fn idle_timeout_minutes(&self) -> Option<u32> {
        self.inner.properties.idle_timeout_in_minutes
    }

    /// IP configuration (NIC or load balancer frontend) using this address.
    pub fn ip_configuration_id(&self) -> Option<&str> {
        self.inner
            .properties
            .ip_configuration
            .as_ref()
            .map(|r| r.id.as_str())
    }

    pub fn has_assigned_network_interface(&self) -> bool {
        self.ip_configuration_id()
            .map(|id| id.contains("/networkInterfaces/"))
            .unwrap_or(false)
    }

    pub fn sku(&self) -> Option<PublicIpSkuType> {
        self.inner
            .sku
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .and_then(PublicIpSkuType::parse)
    }

    pub fn provisioning_state(&self) -> Option<&str> {
        self.inner.properties.provisioning_state.as_deref()
    }

    pub fn inner(&self) -> &PublicIpAddressInner {
        &self.inner
    }

    pub fn into_inner(self) -> PublicIpAddressInner {
        self.inner
    }

    pub async fn refresh(&mut self) -> AzureResult<()> {
        self.inner = PUBLIC_IP_ADDRESSES.get_by_id(&self.client, &self.inner.id).await?;
        Ok(())
    }

    pub fn update(&self) -> PublicIpAddressUpdate {
        PublicIpAddressUpdate {
            client: self.client.clone(),
            inner: self.inner.clone(),
        }
    }
}

// ─── Definition ─────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "a definition does nothing until create() is awaited"]
pub struct PublicIpAddressDefinition {
    client: AzureClient,
    base: DefinitionBase,
    allocation: IpAllocationMethod,
    leaf_domain_label: Option<String>,
    idle_timeout: Option<u32>,
    sku: Option<PublicIpSkuType>,
}

impl GroupableDefinition for PublicIpAddressDefinition {
    fn base_mut(&mut self) -> &mut DefinitionBase {
        &mut self.base
    }
}

impl PublicIpAddressDefinition {
    pub fn with_static_ip(mut self) -> Self {
        self.allocation = IpAllocationMethod::Static;
        self
    }

    pub fn with_dynamic_ip(mut self) -> Self {
        self.allocation = IpAllocationMethod::Dynamic;
        self
    }

    /// Leaf DNS label; the FQDN becomes `<label>.<region>.cloudapp.azure.com`.
    pub fn with_leaf_domain_label(mut self, label: impl Into<String>) -> Self {
        self.leaf_domain_label = Some(label.into());
        self
    }

    pub fn with_idle_timeout_minutes(mut self, minutes: u32) -> Self {
        self.idle_timeout = Some(minutes);
        self
    }

    pub fn with_sku(mut self, sku: PublicIpSkuType) -> Self {
        self.sku = Some(sku);
        self
    }

    fn build(&self) -> AzureResult<PublicIpAddressInner> {
        let (region, _) = self.base.validate("public IP address")?;
        let mut properties = PublicIpAddressProperties {
            public_ip_allocation_method: Some(self.allocation.as_str().into()),
            idle_timeout_in_minutes: self.idle_timeout,
            ..Default::default()
        };
        set_leaf_label(&mut properties, self.leaf_domain_label.clone());
        let sku = self.sku.map(|s| Sku::named(s.as_str()));
        validate_properties(sku.as_ref(), &properties)?;
        Ok(PublicIpAddressInner {
            location: region.to_string(),
            tags: self.base.tags.clone(),
            sku,
            properties,
            ..Default::default()
        })
    }

    pub async fn create(self) -> AzureResult<PublicIpAddress> {
        let body = self.build()?;
        self.base.ensure_resource_group(&self.client).await?;
        let (_, group) = self.base.validate("public IP address")?;
        let inner = PUBLIC_IP_ADDRESSES
            .create_or_update(&self.client, group, &self.base.name, &body)
            .await?;
        Ok(PublicIpAddress {
            inner,
            client: self.client,
        })
    }
}

// ─── Update ─────────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "an update does nothing until apply() is awaited"]
pub struct PublicIpAddressUpdate {
    client: AzureClient,
    inner: PublicIpAddressInner,
}

impl TaggableUpdate for PublicIpAddressUpdate {
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.inner.tags
    }
}

impl PublicIpAddressUpdate {
    pub fn with_static_ip(mut self) -> Self {
        self.inner.properties.public_ip_allocation_method =
            Some(IpAllocationMethod::Static.as_str().into());
        self
    }

    pub fn with_dynamic_ip(mut self) -> Self {
        self.inner.properties.public_ip_allocation_method =
            Some(IpAllocationMethod::Dynamic.as_str().into());
        self
    }

    pub fn with_leaf_domain_label(mut self, label: impl Into<String>) -> Self {
        set_leaf_label(&mut self.inner.properties, Some(label.into()));
        self
    }

    pub fn without_leaf_domain_label(mut self) -> Self {
        set_leaf_label(&mut self.inner.properties, None);
        self
    }

    pub fn with_idle_timeout_minutes(mut self, minutes: u32) -> Self {
        self.inner.properties.idle_timeout_in_minutes = Some(minutes);
        self
    }

    pub fn with_sku(mut self, sku: PublicIpSkuType) -> Self {
        self.inner.sku = Some(Sku::named(sku.as_str()));
        self
    }

    pub async fn apply(self) -> AzureResult<PublicIpAddress> {
        validate_properties(self.inner.sku.as_ref(), &self.inner.properties)?;
        let inner = PUBLIC_IP_ADDRESSES
            .put_by_id(&self.client, &self.inner.id, &self.inner)
            .await?;
        Ok(PublicIpAddress {
            inner,
            client: self.client,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AzureConfig;
    use crate::error::AzureErrorKind;

    fn pips() -> PublicIpAddresses {
        PublicIpAddresses::new(
            AzureClient::new(AzureConfig::new())
                .unwrap()
                .with_subscription("sub1"),
        )
    }

    #[test]
    fn definition_body() {
        let body = pips()
            .define("pip1")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .with_static_ip()
            .with_leaf_domain_label("web01")
            .with_idle_timeout_minutes(10)
            .with_sku(PublicIpSkuType::Standard)
            .build()
            .unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["properties"]["publicIPAllocationMethod"], "Static");
        assert_eq!(json["properties"]["dnsSettings"]["domainNameLabel"], "web01");
        assert_eq!(json["properties"]["idleTimeoutInMinutes"], 10);
        assert_eq!(json["sku"]["name"], "Standard");
    }

    #[test]
    fn dynamic_is_default() {
        let body = pips()
            .define("pip1")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .build()
            .unwrap();
        assert_eq!(body.properties.public_ip_allocation_method.as_deref(), Some("Dynamic"));
        assert!(body.properties.dns_settings.is_none());
    }

    #[test]
    fn idle_timeout_bounds() {
        for bad in [3, 31] {
            let e = pips()
                .define("pip1")
                .with_region("eastus")
                .with_existing_resource_group("rg1")
                .with_idle_timeout_minutes(bad)
                .build()
                .unwrap_err();
            assert_eq!(e.kind, AzureErrorKind::Validation);
        }
    }

    #[test]
    fn standard_sku_requires_static() {
        let e = pips()
            .define("pip1")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .with_sku(PublicIpSkuType::Standard)
            .build()
            .unwrap_err();
        assert!(e.message.contains("static"));
    }

    #[test]
    fn wrapper_getters_and_update() {
        let json = r#"{"id":"/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/publicIPAddresses/pip1","name":"pip1","location":"eastus","sku":{"name":"Basic"},"properties":{"ipAddress":"20.1.2.3","publicIPAllocationMethod":"Static","idleTimeoutInMinutes":4,"dnsSettings":{"domainNameLabel":"web01","fqdn":"web01.eastus.cloudapp.azure.com"},"ipConfiguration":{"id":"/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/networkInterfaces/nic1/ipConfigurations/primary"}}}"#;
        let pip = PublicIpAddress {
            inner: serde_json::from_str(json).unwrap(),
            client: pips().client,
        };
        assert_eq!(pip.ip_address(), Some("20.1.2.3"));
        assert_eq!(pip.fqdn(), Some("web01.eastus.cloudapp.azure.com"));
        assert_eq!(pip.leaf_domain_label(), Some("web01"));
        assert_eq!(pip.allocation_method(), Some(IpAllocationMethod::Static));
        assert_eq!(pip.idle_timeout_minutes(), Some(4));
        assert_eq!(pip.sku(), Some(PublicIpSkuType::Basic));
        assert!(pip.has_assigned_network_interface());

        let update = pip.update().without_leaf_domain_label().with_dynamic_ip();
        assert!(update.inner.properties.dns_settings.is_none());
        assert_eq!(
            update.inner.properties.public_ip_allocation_method.as_deref(),
            Some("Dynamic")
        );
    }
}
