//! Azure Network Interfaces.

use crate::client::AzureClient;
use crate::error::{AzureError, AzureResult};
use crate::networks::VIRTUAL_NETWORKS;
use crate::public_ip_addresses::{IpAllocationMethod, PublicIpAddress, PublicIpAddresses};
use crate::resource::{
    impl_resource, ApiFamily, ArmType, DefinitionBase, GroupableDefinition, TaggableUpdate,
};
use crate::types::{
    NetworkInterfaceInner, NetworkInterfaceProperties, NicDnsSettings, NicIpConfigurationInner,
    NicIpConfigurationProperties, SubResource, Tags,
};

pub(crate) const NETWORK_INTERFACES: ArmType =
    ArmType::new("Microsoft.Network", "networkInterfaces", ApiFamily::Network);

pub const PRIMARY_IP_CONFIGURATION: &str = "primary";

/// Where the primary IP configuration attaches.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SubnetChoice {
    None,
    /// Network ID plus a subnet name still to pick.
    Network(String, Option<String>),
    Existing(String),
}

fn subnet_id(network_id: &str, subnet: &str) -> AzureResult<String> {
    let network = VIRTUAL_NETWORKS.parse_id(network_id)?;
    Ok(network.child("subnets", subnet).to_string())
}

fn primary_config(props: &NetworkInterfaceProperties) -> Option<&NicIpConfigurationInner> {
    props
        .ip_configurations
        .iter()
        .find(|c| c.properties.primary == Some(true))
        .or_else(|| props.ip_configurations.first())
}

fn primary_config_mut(props: &mut NetworkInterfaceProperties) -> &mut NicIpConfigurationInner {
    if props.ip_configurations.is_empty() {
        props.ip_configurations.push(NicIpConfigurationInner {
            name: PRIMARY_IP_CONFIGURATION.into(),
            properties: NicIpConfigurationProperties {
                primary: Some(true),
                ..Default::default()
            },
            ..Default::default()
        });
    }
    let idx = props
        .ip_configurations
        .iter()
        .position(|c| c.properties.primary == Some(true))
        .unwrap_or(0);
    &mut props.ip_configurations[idx]
}

fn set_static_ip(cfg: &mut NicIpConfigurationProperties, ip: Option<String>) {
    match ip {
        Some(ip) => {
            cfg.private_ip_allocation_method = Some(IpAllocationMethod::Static.as_str().into());
            cfg.private_ip_address = Some(ip);
        }
        None => {
            cfg.private_ip_allocation_method = Some(IpAllocationMethod::Dynamic.as_str().into());
            cfg.private_ip_address = None;
        }
    }
}

// ─── Collection ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NetworkInterfaces {
    client: AzureClient,
}

impl NetworkInterfaces {
    pub(crate) fn new(client: AzureClient) -> Self {
        Self { client }
    }

    fn wrap(&self, inner: NetworkInterfaceInner) -> NetworkInterface {
        NetworkInterface {
            inner,
            client: self.client.clone(),
        }
    }

    pub async fn list(&self) -> AzureResult<Vec<NetworkInterface>> {
        let items = NETWORK_INTERFACES.list(&self.client).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn list_by_resource_group(&self, group: &str) -> AzureResult<Vec<NetworkInterface>> {
        let items = NETWORK_INTERFACES.list_by_group(&self.client, group).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn get_by_resource_group(&self, group: &str, name: &str) -> AzureResult<NetworkInterface> {
        let inner = NETWORK_INTERFACES.get(&self.client, group, name).await?;
        Ok(self.wrap(inner))
    }

    pub async fn get_by_id(&self, id: &str) -> AzureResult<NetworkInterface> {
        let inner = NETWORK_INTERFACES.get_by_id(&self.client, id).await?;
        Ok(self.wrap(inner))
    }

    pub fn define(&self, name: impl Into<String>) -> NetworkInterfaceDefinition {
        NetworkInterfaceDefinition {
            client: self.client.clone(),
            base: DefinitionBase::new(name),
            subnet: SubnetChoice::None,
            static_ip: None,
            public_ip_id: None,
            nsg_id: None,
            ip_forwarding: None,
            dns_servers: Vec::new(),
            internal_dns_label: None,
        }
    }

    pub async fn delete_by_resource_group(&self, group: &str, name: &str) -> AzureResult<()> {
        NETWORK_INTERFACES.delete(&self.client, group, name).await
    }

    pub async fn delete_by_id(&self, id: &str) -> AzureResult<()> {
        NETWORK_INTERFACES.delete_by_id(&self.client, id).await
    }
}

// ─── Wrapper ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NetworkInterface {
    inner: NetworkInterfaceInner,
    client: AzureClient,
}

impl_resource!(NetworkInterface, NETWORK_INTERFACES);

impl NetworkInterface {
    fn primary(&self) -> Option<&NicIpConfigurationProperties> {
        primary_config(&self.inner.properties).map(|c| &c.properties)
    }

    pub fn mac_address(&self) -> Option<&str> {
        self.inner.properties.mac_address.as_deref()
    }

    pub fn primary_private_ip(&self) -> Option<&str> {
        self.primary().and_then(|p| p.private_ip_address.as_deref())
    }

    pub fn private_ip_allocation_method(&self) -> Option<IpAllocationMethod> {
        self.primary()
            .and_then(|p| p.private_ip_allocation_method.as_deref())
            .and_then(IpAllocationMethod::parse)
    }

    pub fn primary_public_ip_id(&self) -> Option<&str> {
        self.primary()
            .and_then(|p| p.public_ip_address.as_ref())
            .map(|r| r.id.as_str())
    }

    pub fn primary_subnet_id(&self) -> Option<&str> {
        self.primary()
            .and_then(|p| p.subnet.as_ref())
            .map(|r| r.id.as_str())
    }

    pub fn network_security_group_id(&self) -> Option<&str> {
        self.inner
            .properties
            .network_security_group
            .as_ref()
            .map(|r| r.id.as_str())
    }

    pub fn virtual_machine_id(&self) -> Option<&str> {
        self.inner
            .properties
            .virtual_machine
            .as_ref()
            .map(|r| r.id.as_str())
    }

    pub fn is_ip_forwarding_enabled(&self) -> bool {
        self.inner.properties.enable_ip_forwarding.unwrap_or(false)
    }

    pub fn dns_servers(&self) -> &[String] {
        self.inner
            .properties
            .dns_settings
            .as_ref()
            .map(|d| d.dns_servers.as_slice())
            .unwrap_or(&[])
    }

    pub fn applied_dns_servers(&self) -> &[String] {
        self.inner
            .properties
            .dns_settings
            .as_ref()
            .map(|d| d.applied_dns_servers.as_slice())
            .unwrap_or(&[])
    }

    pub fn internal_dns_name_label(&self) -> Option<&str> {
        self.inner
            .properties
            .dns_settings
            .as_ref()
            .and_then(|d| d.internal_dns_name_label.as_deref())
    }

    /// Fetch the public IP referenced by the primary IP configuration.
    pub async fn primary_public_ip_address(&self) -> AzureResult<Option<PublicIpAddress>> {
        match self.primary_public_ip_id() {
            Some(id) => PublicIpAddresses::new(self.client.clone())
                .get_by_id(id)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    pub fn provisioning_state(&self) -> Option<&str> {
        self.inner.properties.provisioning_state.as_deref()
    }

    pub fn inner(&self) -> &NetworkInterfaceInner {
        &self.inner
    }

    pub fn into_inner(self) -> NetworkInterfaceInner {
        self.inner
    }

    pub async fn refresh(&mut self) -> AzureResult<()> {
        self.inner = NETWORK_INTERFACES.get_by_id(&self.client, &self.inner.id).await?;
        Ok(())
    }

    pub fn update(&self) -> NetworkInterfaceUpdate {
        NetworkInterfaceUpdate {
            client: self.client.clone(),
            inner: self.inner.clone(),
            subnet: SubnetChoice::None,
        }
    }
}

// ─── Definition ─────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "a definition does nothing until create() is awaited"]
pub struct NetworkInterfaceDefinition {
    client: AzureClient,
    base: DefinitionBase,
    subnet: SubnetChoice,
    static_ip: Option<String>,
    public_ip_id: Option<String>,
    nsg_id: Option<String>,
    ip_forwarding: Option<bool>,
    dns_servers: Vec<String>,
    internal_dns_label: Option<String>,
}

impl GroupableDefinition for NetworkInterfaceDefinition {
    fn base_mut(&mut self) -> &mut DefinitionBase {
        &mut self.base
    }
}

impl NetworkInterfaceDefinition {
    /// Pick the subnet with [`with_subnet`](Self::with_subnet).
    pub fn with_existing_primary_network(mut self, network_id: impl Into<String>) -> Self {
        let subnet = match self.subnet {
            SubnetChoice::Network(_, name) => name,
            _ => None,
        };
        self.subnet = SubnetChoice::Network(network_id.into(), subnet);
        self
    }

    pub fn with_subnet(mut self, name: impl Into<String>) -> Self {
        if let SubnetChoice::Network(network, _) = self.subnet {
            self.subnet = SubnetChoice::Network(network, Some(name.into()));
        } else {
            self.subnet = SubnetChoice::Network(String::new(), Some(name.into()));
        }
        self
    }

    pub fn with_existing_subnet(mut self, subnet_id: impl Into<String>) -> Self {
        self.subnet = SubnetChoice::Existing(subnet_id.into());
        self
    }

    pub fn with_primary_private_ip_dynamic(mut self) -> Self {
        self.static_ip = None;
        self
    }

    pub fn with_primary_private_ip_static(mut self, ip: impl Into<String>) -> Self {
        self.static_ip = Some(ip.into());
        self
    }

    pub fn with_existing_primary_public_ip(mut self, public_ip_id: impl Into<String>) -> Self {
        self.public_ip_id = Some(public_ip_id.into());
        self
    }

    pub fn with_existing_network_security_group(mut self, nsg_id: impl Into<String>) -> Self {
        self.nsg_id = Some(nsg_id.into());
        self
    }

    pub fn with_ip_forwarding(mut self) -> Self {
        self.ip_forwarding = Some(true);
        self
    }

    pub fn with_dns_server(mut self, ip: impl Into<String>) -> Self {
        self.dns_servers.push(ip.into());
        self
    }

    pub fn with_internal_dns_name_label(mut self, label: impl Into<String>) -> Self {
        self.internal_dns_label = Some(label.into());
        self
    }

    /// Fill in region and group from an enclosing definition when unset.
    pub(crate) fn inherit_placement(&mut self, region: &str, group: &str) {
        if self.base.region.is_none() {
            self.base.region = Some(region.to_string());
        }
        if self.base.resource_group.is_none() {
            self.base.resource_group = Some(group.to_string());
        }
    }

    fn resolve_subnet(&self) -> AzureResult<String> {
        match &self.subnet {
            SubnetChoice::Existing(id) => Ok(id.clone()),
            SubnetChoice::Network(network, Some(name)) if !network.is_empty() => {
                subnet_id(network, name)
            }
            SubnetChoice::Network(network, None) if !network.is_empty() => Err(AzureError::validation(
                format!(
                    "network interface '{}': call with_subnet to pick a subnet of {}",
                    self.base.name, network
                ),
            )),
            _ => Err(AzureError::validation(format!(
                "network interface '{}': a subnet is required",
                self.base.name
            ))),
        }
    }

    fn build(&self) -> AzureResult<NetworkInterfaceInner> {
        let (region, _) = self.base.validate("network interface")?;
        let subnet = self.resolve_subnet()?;

        let mut config = NicIpConfigurationProperties {
            subnet: Some(SubResource::new(subnet)),
            public_ip_address: self.public_ip_id.clone().map(SubResource::new),
            primary: Some(true),
            ..Default::default()
        };
        set_static_ip(&mut config, self.static_ip.clone());

        let dns_settings = if self.dns_servers.is_empty() && self.internal_dns_label.is_none() {
            None
        } else {
            Some(NicDnsSettings {
                dns_servers: self.dns_servers.clone(),
                internal_dns_name_label: self.internal_dns_label.clone(),
                ..Default::default()
            })
        };

        Ok(NetworkInterfaceInner {
            location: region.to_string(),
            tags: self.base.tags.clone(),
            properties: NetworkInterfaceProperties {
                ip_configurations: vec![NicIpConfigurationInner {
                    name: PRIMARY_IP_CONFIGURATION.into(),
                    properties: config,
                    ..Default::default()
                }],
                dns_settings,
                enable_ip_forwarding: self.ip_forwarding,
                network_security_group: self.nsg_id.clone().map(SubResource::new),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    /// Everything `create()` would reject, checked without sending anything.
    pub(crate) fn validate(&self) -> AzureResult<()> {
        self.build().map(|_| ())
    }

    pub async fn create(self) -> AzureResult<NetworkInterface> {
        let body = self.build()?;
        self.base.ensure_resource_group(&self.client).await?;
        let (_, group) = self.base.validate("network interface")?;
        let inner = NETWORK_INTERFACES
            .create_or_update(&self.client, group, &self.base.name, &body)
            .await?;
        Ok(NetworkInterface {
            inner,
            client: self.client,
        })
    }
}

// ─── Update ─────────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "an update does nothing until apply() is awaited"]
pub struct NetworkInterfaceUpdate {
    client: AzureClient,
    inner: NetworkInterfaceInner,
    subnet: SubnetChoice,
}

impl TaggableUpdate for NetworkInterfaceUpdate {
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.inner.tags
    }
}

impl NetworkInterfaceUpdate {
    fn primary_mut(&mut self) -> &mut NicIpConfigurationProperties {
        &mut primary_config_mut(&mut self.inner.properties).properties
    }

    pub fn with_existing_primary_network(mut self, network_id: impl Into<String>) -> Self {
        let subnet = match self.subnet {
            SubnetChoice::Network(_, name) => name,
            _ => None,
        };
        self.subnet = SubnetChoice::Network(network_id.into(), subnet);
        self
    }

    pub fn with_subnet(mut self, name: impl Into<String>) -> Self {
        let network = match self.subnet {
            SubnetChoice::Network(network, _) => network,
            _ => String::new(),
        };
        self.subnet = SubnetChoice::Network(network, Some(name.into()));
        self
    }

    pub fn with_existing_subnet(mut self, subnet_id: impl Into<String>) -> Self {
        self.subnet = SubnetChoice::Existing(subnet_id.into());
        self
    }

    pub fn with_primary_private_ip_dynamic(mut self) -> Self {
        set_static_ip(self.primary_mut(), None);
        self
    }

    pub fn with_primary_private_ip_static(mut self, ip: impl Into<String>) -> Self {
        set_static_ip(self.primary_mut(), Some(ip.into()));
        self
    }

    pub fn with_existing_primary_public_ip(mut self, public_ip_id: impl Into<String>) -> Self {
        self.primary_mut().public_ip_address = Some(SubResource::new(public_ip_id));
        self
    }

    pub fn without_primary_public_ip(mut self) -> Self {
        self.primary_mut().public_ip_address = None;
        self
    }

    pub fn with_existing_network_security_group(mut self, nsg_id: impl Into<String>) -> Self {
        self.inner.properties.network_security_group = Some(SubResource::new(nsg_id));
        self
    }

    pub fn without_network_security_group(mut self) -> Self {
        self.inner.properties.network_security_group = None;
        self
    }

    pub fn with_ip_forwarding(mut self) -> Self {
        self.inner.properties.enable_ip_forwarding = Some(true);
        self
    }

    pub fn without_ip_forwarding(mut self) -> Self {
        self.inner.properties.enable_ip_forwarding = Some(false);
        self
    }

    pub fn with_dns_server(mut self, ip: impl Into<String>) -> Self {
        self.inner
            .properties
            .dns_settings
            .get_or_insert_with(NicDnsSettings::default)
            .dns_servers
            .push(ip.into());
        self
    }

    pub fn without_dns_server(mut self, ip: &str) -> Self {
        if let Some(d) = self.inner.properties.dns_settings.as_mut() {
            d.dns_servers.retain(|s| s != ip);
        }
        self
    }

    pub fn with_internal_dns_name_label(mut self, label: impl Into<String>) -> Self {
        self.inner
            .properties
            .dns_settings
            .get_or_insert_with(NicDnsSettings::default)
            .internal_dns_name_label = Some(label.into());
        self
    }

    fn resolve(mut self) -> AzureResult<Self> {
        let subnet = match &self.subnet {
            SubnetChoice::None => None,
            SubnetChoice::Existing(id) => Some(id.clone()),
            SubnetChoice::Network(network, Some(name)) if !network.is_empty() => {
                Some(subnet_id(network, name)?)
            }
            SubnetChoice::Network(network, name) => {
                // subnet name only: stay in the current network
                let current = primary_config(&self.inner.properties)
                    .and_then(|c| c.properties.subnet.as_ref())
                    .and_then(|s| crate::resource_id::ResourceId::parse(&s.id).ok())
                    .and_then(|id| id.parent());
                match (network.is_empty(), name, current) {
                    (true, Some(name), Some(net)) => Some(net.child("subnets", name.as_str()).to_string()),
                    _ => {
                        return Err(AzureError::validation(format!(
                            "network interface '{}': both a network and a subnet name are required",
                            self.inner.name
                        )))
                    }
                }
            }
        };
        if let Some(id) = subnet {
            self.primary_mut().subnet = Some(SubResource::new(id));
        }
        Ok(self)
    }

    pub async fn apply(self) -> AzureResult<NetworkInterface> {
        let update = self.resolve()?;
        let inner = NETWORK_INTERFACES
            .put_by_id(&update.client, &update.inner.id, &update.inner)
            .await?;
        Ok(NetworkInterface {
            inner,
            client: update.client,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
