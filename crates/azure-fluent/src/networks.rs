//! Azure Virtual Networks and their subnets.

use std::collections::HashSet;

use crate::client::AzureClient;
use crate::error::{AzureError, AzureResult};
use crate::resource::{
    impl_resource, ApiFamily, ArmType, DefinitionBase, GroupableDefinition, TaggableUpdate,
};
use crate::types::{
    AddressSpace, DhcpOptions, SubResource, SubnetInner, SubnetProperties, Tags,
    VirtualNetworkInner, VirtualNetworkProperties,
};

pub(crate) const VIRTUAL_NETWORKS: ArmType =
    ArmType::new("Microsoft.Network", "virtualNetworks", ApiFamily::Network);

pub const DEFAULT_ADDRESS_SPACE: &str = "10.0.0.0/16";
pub const DEFAULT_SUBNET_NAME: &str = "subnet1";

// ─── Collection ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Networks {
    client: AzureClient,
}

impl Networks {
    pub(crate) fn new(client: AzureClient) -> Self {
        Self { client }
    }

    fn wrap(&self, inner: VirtualNetworkInner) -> Network {
        Network {
            inner,
            client: self.client.clone(),
        }
    }

    pub async fn list(&self) -> AzureResult<Vec<Network>> {
        let items = VIRTUAL_NETWORKS.list(&self.client).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn list_by_resource_group(&self, group: &str) -> AzureResult<Vec<Network>> {
        let items = VIRTUAL_NETWORKS.list_by_group(&self.client, group).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn get_by_resource_group(&self, group: &str, name: &str) -> AzureResult<Network> {
        let inner = VIRTUAL_NETWORKS.get(&self.client, group, name).await?;
        Ok(self.wrap(inner))
    }

    pub async fn get_by_id(&self, id: &str) -> AzureResult<Network> {
        let inner = VIRTUAL_NETWORKS.get_by_id(&self.client, id).await?;
        Ok(self.wrap(inner))
    }

    pub fn define(&self, name: impl Into<String>) -> NetworkDefinition {
        NetworkDefinition {
            client: self.client.clone(),
            base: DefinitionBase::new(name),
            address_spaces: Vec::new(),
            dns_servers: Vec::new(),
            subnets: Vec::new(),
        }
    }

    pub async fn delete_by_resource_group(&self, group: &str, name: &str) -> AzureResult<()> {
        VIRTUAL_NETWORKS.delete(&self.client, group, name).await
    }

    pub async fn delete_by_id(&self, id: &str) -> AzureResult<()> {
        VIRTUAL_NETWORKS.delete_by_id(&self.client, id).await
    }
}

// ─── Wrapper ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Network {
    inner: VirtualNetworkInner,
    client: AzureClient,
}

impl_resource!(Network, VIRTUAL_NETWORKS);

impl Network {
    pub fn address_spaces(&self) -> &[String] {
        self.inner
            .properties
            .address_space
            .as_ref()
            .map(|a| a.address_prefixes.as_slice())
            .unwrap_or(&[])
    }

    pub fn dns_servers(&self) -> &[String] {
        self.inner
            .properties
            .dhcp_options
            .as_ref()
            .map(|d| d.dns_servers.as_slice())
            .unwrap_or(&[])
    }

    pub fn subnets(&self) -> Vec<Subnet<'_>> {
        self.inner
            .properties
            .subnets
            .iter()
            .map(|inner| Subnet { inner })
            .collect()
    }

    pub fn subnet(&self, name: &str) -> Option<Subnet<'_>> {
        self.inner
            .properties
            .subnets
            .iter()
            .find(|s| s.name == name)
            .map(|inner| Subnet { inner })
    }

    pub fn provisioning_state(&self) -> Option<&str> {
        self.inner.properties.provisioning_state.as_deref()
    }

    pub fn inner(&self) -> &VirtualNetworkInner {
        &self.inner
    }

    pub fn into_inner(self) -> VirtualNetworkInner {
        self.inner
    }

    pub async fn refresh(&mut self) -> AzureResult<()> {
        self.inner = VIRTUAL_NETWORKS.get_by_id(&self.client, &self.inner.id).await?;
        Ok(())
    }

    pub fn update(&self) -> NetworkUpdate {
        NetworkUpdate {
            client: self.client.clone(),
            inner: self.inner.clone(),
        }
    }
}

/// Read-only view of one subnet of a [`Network`].
#[derive(Debug, Clone, Copy)]
pub struct Subnet<'a> {
    inner: &'a SubnetInner,
}

impl<'a> Subnet<'a> {
    pub fn name(&self) -> &'a str {
        &self.inner.name
    }

    pub fn id(&self) -> &'a str {
        &self.inner.id
    }

    pub fn address_prefix(&self) -> Option<&'a str> {
        self.inner.properties.address_prefix.as_deref()
    }

    pub fn network_security_group_id(&self) -> Option<&'a str> {
        self.inner
            .properties
            .network_security_group
            .as_ref()
            .map(|r| r.id.as_str())
    }

    pub fn ip_configuration_ids(&self) -> Vec<&'a str> {
        self.inner
            .properties
            .ip_configurations
            .iter()
            .map(|r| r.id.as_str())
            .collect()
    }

    pub fn inner(&self) -> &'a SubnetInner {
        self.inner
    }
}

fn new_subnet(name: String, prefix: String) -> SubnetInner {
    SubnetInner {
        name,
        properties: SubnetProperties {
            address_prefix: Some(prefix),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn validate_subnets(network: &str, subnets: &[SubnetInner]) -> AzureResult<()> {
    let mut seen = HashSet::new();
    for s in subnets {
        if s.name.trim().is_empty() {
            return Err(AzureError::validation(format!(
                "network '{network}': subnet name is required"
            )));
        }
        if !seen.insert(s.name.to_ascii_lowercase()) {
            return Err(AzureError::validation(format!(
                "network '{network}': duplicate subnet '{}'",
                s.name
            )));
        }
        let prefix_ok = s
            .properties
            .address_prefix
            .as_deref()
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false);
        if !prefix_ok {
            return Err(AzureError::validation(format!(
                "network '{network}': subnet '{}' has no address prefix",
                s.name
            )));
        }
    }
    Ok(())
}

// ─── Definition ─────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "a definition does nothing until create() is awaited"]
pub struct NetworkDefinition {
    client: AzureClient,
    base: DefinitionBase,
    address_spaces: Vec<String>,
    dns_servers: Vec<String>,
    subnets: Vec<SubnetInner>,
}

impl GroupableDefinition for NetworkDefinition {
    fn base_mut(&mut self) -> &mut DefinitionBase {
        &mut self.base
    }
}

impl NetworkDefinition {
    /// CIDR block, e.g. `10.1.0.0/16`. May be called more than once.
    pub fn with_address_space(mut self, cidr: impl Into<String>) -> Self {
        self.address_spaces.push(cidr.into());
        self
    }

    pub fn with_dns_server(mut self, ip: impl Into<String>) -> Self {
        self.dns_servers.push(ip.into());
        self
    }

    pub fn with_subnet(mut self, name: impl Into<String>, cidr: impl Into<String>) -> Self {
        self.subnets.push(new_subnet(name.into(), cidr.into()));
        self
    }

    /// Associate a network security group with a subnet declared by
    /// [`with_subnet`](Self::with_subnet).
    pub fn with_subnet_network_security_group(mut self, subnet: &str, nsg_id: impl Into<String>) -> Self {
        let nsg_id = nsg_id.into();
        if let Some(s) = self.subnets.iter_mut().find(|s| s.name == subnet) {
            s.properties.network_security_group = Some(SubResource::new(nsg_id));
        } else {
            // unknown subnet; reported by create()
            let mut s = new_subnet(subnet.to_string(), String::new());
            s.properties.network_security_group = Some(SubResource::new(nsg_id));
            self.subnets.push(s);
        }
        self
    }

    fn build(&self) -> AzureResult<VirtualNetworkInner> {
        let (region, _) = self.base.validate("network")?;

        let address_spaces = if self.address_spaces.is_empty() {
            vec![DEFAULT_ADDRESS_SPACE.to_string()]
        } else {
            self.address_spaces.clone()
        };
        let subnets = if self.subnets.is_empty() {
            vec![new_subnet(DEFAULT_SUBNET_NAME.into(), address_spaces[0].clone())]
        } else {
            self.subnets.clone()
        };
        validate_subnets(&self.base.name, &subnets)?;

        Ok(VirtualNetworkInner {
            location: region.to_string(),
            tags: self.base.tags.clone(),
            properties: VirtualNetworkProperties {
                address_space: Some(AddressSpace {
                    address_prefixes: address_spaces,
                }),
                dhcp_options: (!self.dns_servers.is_empty()).then(|| DhcpOptions {
                    dns_servers: self.dns_servers.clone(),
                }),
                subnets,
                provisioning_state: None,
            },
            ..Default::default()
        })
    }

    pub async fn create(self) -> AzureResult<Network> {
        let body = self.build()?;
        self.base.ensure_resource_group(&self.client).await?;
        let (_, group) = self.base.validate("network")?;
        let inner = VIRTUAL_NETWORKS
            .create_or_update(&self.client, group, &self.base.name, &body)
            .await?;
        Ok(Network {
            inner,
            client: self.client,
        })
    }
}

// ─── Update ─────────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "an update does nothing until apply() is awaited"]
pub struct NetworkUpdate {
    client: AzureClient,
    inner: VirtualNetworkInner,
}

impl TaggableUpdate for NetworkUpdate {
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.inner.tags
    }
}

impl NetworkUpdate {
    fn address_prefixes_mut(&mut self) -> &mut Vec<String> {
        &mut self
            .inner
            .properties
            .address_space
            .get_or_insert_with(AddressSpace::default)
            .address_prefixes
    }

    pub fn with_address_space(mut self, cidr: impl Into<String>) -> Self {
        let cidr = cidr.into();
        let prefixes = self.address_prefixes_mut();
        if !prefixes.contains(&cidr) {
            prefixes.push(cidr);
        }
        self
    }

    pub fn without_address_space(mut self, cidr: &str) -> Self {
        self.address_prefixes_mut().retain(|p| p != cidr);
        self
    }

    pub fn with_dns_server(mut self, ip: impl Into<String>) -> Self {
        self.inner
            .properties
            .dhcp_options
            .get_or_insert_with(DhcpOptions::default)
            .dns_servers
            .push(ip.into());
        self
    }

    pub fn without_dns_server(mut self, ip: &str) -> Self {
        if let Some(d) = self.inner.properties.dhcp_options.as_mut() {
            d.dns_servers.retain(|s| s != ip);
        }
        self
    }

    pub fn with_subnet(mut self, name: impl Into<String>, cidr: impl Into<String>) -> Self {
        self.inner
            .properties
            .subnets
            .push(new_subnet(name.into(), cidr.into()));
        self
    }

    pub fn without_subnet(mut self, name: &str) -> Self {
        self.inner.properties.subnets.retain(|s| s.name != name);
        self
    }

    pub async fn apply(self) -> AzureResult<Network> {
        validate_subnets(&self.inner.name, &self.inner.properties.subnets)?;
        let inner = VIRTUAL_NETWORKS
            .put_by_id(&self.client, &self.inner.id, &self.inner)
            .await?;
        Ok(Network {
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

    fn networks() -> Networks {
        Networks::new(
            AzureClient::new(AzureConfig::new())
                .unwrap()
                .with_subscription("sub1"),
        )
    }

    #[test]
    fn defaults_when_nothing_given() {
        let body = networks()
            .define("vnet1")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .build()
            .unwrap();
        let props = &body.properties;
        assert_eq!(
            props.address_space.as_ref().unwrap().address_prefixes,
            vec![DEFAULT_ADDRESS_SPACE]
        );
        assert_eq!(props.subnets.len(), 1);
        assert_eq!(props.subnets[0].name, DEFAULT_SUBNET_NAME);
        assert_eq!(
            props.subnets[0].properties.address_prefix.as_deref(),
            Some(DEFAULT_ADDRESS_SPACE)
        );
        assert!(props.dhcp_options.is_none());
    }

    #[test]
    fn default_subnet_covers_first_space() {
        let body = networks()
            .define("vnet1")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .with_address_space("192.168.0.0/24")
            .build()
            .unwrap();
        assert_eq!(
            body.properties.subnets[0].properties.address_prefix.as_deref(),
            Some("192.168.0.0/24")
        );
    }

    #[test]
    fn explicit_subnets_and_nsg() {
        let body = networks()
            .define("vnet1")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .with_address_space("10.1.0.0/16")
            .with_subnet("front", "10.1.1.0/24")
            .with_subnet("back", "10.1.2.0/24")
            .with_subnet_network_security_group("back", "/nsg/id")
            .with_dns_server("10.1.0.4")
            .build()
            .unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["properties"]["subnets"][1]["name"], "back");
        assert_eq!(
            json["properties"]["subnets"][1]["properties"]["networkSecurityGroup"]["id"],
            "/nsg/id"
        );
        assert_eq!(json["properties"]["dhcpOptions"]["dnsServers"][0], "10.1.0.4");
    }

    #[test]
    fn duplicate_subnet_rejected() {
        let e = networks()
            .define("vnet1")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .with_subnet("a", "10.0.1.0/24")
            .with_subnet("A", "10.0.2.0/24")
            .build()
            .unwrap_err();
        assert_eq!(e.kind, AzureErrorKind::Validation);
        assert!(e.message.contains("duplicate"));
    }

    #[test]
    fn nsg_on_unknown_subnet_rejected() {
        let e = networks()
            .define("vnet1")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .with_subnet("a", "10.0.1.0/24")
            .with_subnet_network_security_group("missing", "/nsg")
            .build()
            .unwrap_err();
        assert!(e.message.contains("missing"));
    }

    #[test]
    fn wrapper_subnet_view() {
        let json = r#"{"id":"/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1","name":"vnet1","location":"eastus","properties":{"addressSpace":{"addressPrefixes":["10.0.0.0/16"]},"subnets":[{"id":"/s1","name":"subnet1","properties":{"addressPrefix":"10.0.0.0/24","ipConfigurations":[{"id":"/cfg1"}]}}]}}"#;
        let net = Network {
            inner: serde_json::from_str(json).unwrap(),
            client: networks().client,
        };
        assert_eq!(net.address_spaces(), ["10.0.0.0/16".to_string()]);
        assert!(net.dns_servers().is_empty());
        let s = net.subnet("subnet1").unwrap();
        assert_eq!(s.address_prefix(), Some("10.0.0.0/24"));
        assert_eq!(s.ip_configuration_ids(), vec!["/cfg1"]);
        assert!(s.network_security_group_id().is_none());
        assert!(net.subnet("nope").is_none());
    }

    #[test]
    fn update_edits_spaces_and_subnets() {
        let net = Network {
            inner: VirtualNetworkInner {
                name: "vnet1".into(),
                properties: VirtualNetworkProperties {
                    address_space: Some(AddressSpace {
                        address_prefixes: vec!["10.0.0.0/16".into()],
                    }),
                    subnets: vec![new_subnet("subnet1".into(), "10.0.0.0/24".into())],
                    ..Default::default()
                },
                ..Default::default()
            },
            client: networks().client,
        };
        let update = net
            .update()
            .with_address_space("10.2.0.0/16")
            .with_address_space("10.2.0.0/16")
            .without_address_space("10.0.0.0/16")
            .with_subnet("extra", "10.2.1.0/24")
            .without_subnet("subnet1");
        let props = &update.inner.properties;
        assert_eq!(props.address_space.as_ref().unwrap().address_prefixes, vec!["10.2.0.0/16"]);
        assert_eq!(props.subnets.len(), 1);
        assert_eq!(props.subnets[0].name, "extra");
    }
}
