//! Azure Network Security Groups and their security rules.

use std::collections::HashSet;

use crate::client::AzureClient;
use crate::error::{AzureError, AzureResult};
use crate::resource::{
    impl_resource, ApiFamily, ArmType, DefinitionBase, GroupableDefinition, TaggableUpdate,
};
use crate::types::{
    NetworkSecurityGroupInner, NetworkSecurityGroupProperties, SecurityRuleInner,
    SecurityRuleProperties, Tags,
};

pub(crate) const NETWORK_SECURITY_GROUPS: ArmType =
    ArmType::new("Microsoft.Network", "networkSecurityGroups", ApiFamily::Network);

pub const MIN_RULE_PRIORITY: u32 = 100;
pub const MAX_RULE_PRIORITY: u32 = 4096;
const PRIORITY_STEP: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityRuleProtocol {
    Tcp,
    Udp,
    Icmp,
    Any,
}

impl SecurityRuleProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityRuleProtocol::Tcp => "Tcp",
            SecurityRuleProtocol::Udp => "Udp",
            SecurityRuleProtocol::Icmp => "Icmp",
            SecurityRuleProtocol::Any => "*",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityRuleDirection {
    Inbound,
    Outbound,
}

impl SecurityRuleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityRuleDirection::Inbound => "Inbound",
            SecurityRuleDirection::Outbound => "Outbound",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityRuleAccess {
    Allow,
    Deny,
}

impl SecurityRuleAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityRuleAccess::Allow => "Allow",
            SecurityRuleAccess::Deny => "Deny",
        }
    }
}

// ─── Security rules ─────────────────────────────────────────────────

/// Builder for one security rule. Addresses, ports and protocol default to
/// `*`; a missing priority is assigned when the group is built.
#[derive(Debug, Clone)]
#[must_use]
pub struct SecurityRuleDefinition {
    name: String,
    access: Option<SecurityRuleAccess>,
    direction: Option<SecurityRuleDirection>,
    protocol: SecurityRuleProtocol,
    source_address: String,
    source_port: String,
    destination_address: String,
    destination_port: String,
    priority: Option<u32>,
    description: Option<String>,
}

impl SecurityRuleDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access: None,
            direction: None,
            protocol: SecurityRuleProtocol::Any,
            source_address: "*".into(),
            source_port: "*".into(),
            destination_address: "*".into(),
            destination_port: "*".into(),
            priority: None,
            description: None,
        }
    }

    fn traffic(mut self, access: SecurityRuleAccess, direction: SecurityRuleDirection) -> Self {
        self.access = Some(access);
        self.direction = Some(direction);
        self
    }

    pub fn allow_inbound(self) -> Self {
        self.traffic(SecurityRuleAccess::Allow, SecurityRuleDirection::Inbound)
    }

    pub fn deny_inbound(self) -> Self {
        self.traffic(SecurityRuleAccess::Deny, SecurityRuleDirection::Inbound)
    }

    pub fn allow_outbound(self) -> Self {
        self.traffic(SecurityRuleAccess::Allow, SecurityRuleDirection::Outbound)
    }

    pub fn deny_outbound(self) -> Self {
        self.traffic(SecurityRuleAccess::Deny, SecurityRuleDirection::Outbound)
    }

    /// CIDR, IP or service tag such as `Internet`.
    pub fn from_address(mut self, address: impl Into<String>) -> Self {
        self.source_address = address.into();
        self
    }

    pub fn from_any_address(self) -> Self {
        self.from_address("*")
    }

    pub fn from_port(mut self, port: u16) -> Self {
        self.source_port = port.to_string();
        self
    }

    pub fn from_any_port(mut self) -> Self {
        self.source_port = "*".into();
        self
    }

    pub fn to_address(mut self, address: impl Into<String>) -> Self {
        self.destination_address = address.into();
        self
    }

    pub fn to_any_address(self) -> Self {
        self.to_address("*")
    }

    pub fn to_port(mut self, port: u16) -> Self {
        self.destination_port = port.to_string();
        self
    }

    pub fn to_port_range(mut self, from: u16, to: u16) -> Self {
        self.destination_port = format!("{from}-{to}");
        self
    }

    pub fn to_any_port(mut self) -> Self {
        self.destination_port = "*".into();
        self
    }

    pub fn with_protocol(mut self, protocol: SecurityRuleProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// 100 (evaluated first) to 4096.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn into_inner(self) -> AzureResult<SecurityRuleInner> {
        if self.name.trim().is_empty() {
            return Err(AzureError::validation("security rule: name is required"));
        }
        let (access, direction) = match (self.access, self.direction) {
            (Some(a), Some(d)) => (a, d),
            _ => {
                return Err(AzureError::validation(format!(
                    "security rule '{}': call allow_inbound/deny_inbound/allow_outbound/deny_outbound",
                    self.name
                )))
            }
        };
        Ok(SecurityRuleInner {
            name: self.name,
            properties: SecurityRuleProperties {
                description: self.description,
                protocol: Some(self.protocol.as_str().into()),
                source_port_range: Some(self.source_port),
                destination_port_range: Some(self.destination_port),
                source_address_prefix: Some(self.source_address),
                destination_address_prefix: Some(self.destination_address),
                access: Some(access.as_str().into()),
                priority: self.priority,
                direction: Some(direction.as_str().into()),
                provisioning_state: None,
            },
            ..Default::default()
        })
    }
}

/// Add a rule to `rules`. Its priority, if missing, is left for
/// `assign_priorities`.
fn add_rule(rules: &mut Vec<SecurityRuleInner>, rule: SecurityRuleDefinition) -> AzureResult<()> {
    let inner = rule.into_inner()?;
    if rules.iter().any(|r| r.name.eq_ignore_ascii_case(&inner.name)) {
        return Err(AzureError::validation(format!(
            "duplicate security rule '{}'",
            inner.name
        )));
    }
    rules.push(inner);
    Ok(())
}

/// Give every rule without a priority the first multiple of 10 from 100
/// not taken in its direction, once all explicit priorities are known.
fn assign_priorities(rules: &mut [SecurityRuleInner]) -> AzureResult<()> {
    let mut taken: HashSet<(Option<String>, u32)> = rules
        .iter()
        .filter_map(|r| Some((r.properties.direction.clone(), r.properties.priority?)))
        .collect();
    for rule in rules.iter_mut().filter(|r| r.properties.priority.is_none()) {
        let direction = rule.properties.direction.clone();
        let free = (MIN_RULE_PRIORITY..=MAX_RULE_PRIORITY)
            .step_by(PRIORITY_STEP as usize)
            .find(|p| !taken.contains(&(direction.clone(), *p)))
            .ok_or_else(|| AzureError::validation("no free security rule priority left"))?;
        taken.insert((direction, free));
        rule.properties.priority = Some(free);
    }
    Ok(())
}

/// Priorities must be in range and unique per direction.
fn validate_rules(rules: &[SecurityRuleInner]) -> AzureResult<()> {
    let mut seen: HashSet<(String, u32)> = HashSet::new();
    for r in rules {
        let priority = r.properties.priority.unwrap_or(0);
        if !(MIN_RULE_PRIORITY..=MAX_RULE_PRIORITY).contains(&priority) {
            return Err(AzureError::validation(format!(
                "security rule '{}': priority {} outside {}..={}",
                r.name, priority, MIN_RULE_PRIORITY, MAX_RULE_PRIORITY
            )));
        }
        let direction = r.properties.direction.clone().unwrap_or_default();
        if !seen.insert((direction.clone(), priority)) {
            return Err(AzureError::validation(format!(
                "security rule '{}': priority {} already used for {} rules",
                r.name, priority, direction
            )));
        }
    }
    Ok(())
}

// ─── Collection ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NetworkSecurityGroups {
    client: AzureClient,
}

impl NetworkSecurityGroups {
    pub(crate) fn new(client: AzureClient) -> Self {
        Self { client }
    }

    fn wrap(&self, inner: NetworkSecurityGroupInner) -> NetworkSecurityGroup {
        NetworkSecurityGroup {
            inner,
            client: self.client.clone(),
        }
    }

    pub async fn list(&self) -> AzureResult<Vec<NetworkSecurityGroup>> {
        let items = NETWORK_SECURITY_GROUPS.list(&self.client).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn list_by_resource_group(&self, group: &str) -> AzureResult<Vec<NetworkSecurityGroup>> {
        let items = NETWORK_SECURITY_GROUPS
            .list_by_group(&self.client, group)
            .await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn get_by_resource_group(
        &self,
        group: &str,
        name: &str,
    ) -> AzureResult<NetworkSecurityGroup> {
        let inner = NETWORK_SECURITY_GROUPS.get(&self.client, group, name).await?;
        Ok(self.wrap(inner))
    }

    pub async fn get_by_id(&self, id: &str) -> AzureResult<NetworkSecurityGroup> {
        let inner = NETWORK_SECURITY_GROUPS.get_by_id(&self.client, id).await?;
        Ok(self.wrap(inner))
    }

    pub fn define(&self, name: impl Into<String>) -> NetworkSecurityGroupDefinition {
        NetworkSecurityGroupDefinition {
            client: self.client.clone(),
            base: DefinitionBase::new(name),
            rules: Vec::new(),
            error: None,
        }
    }

    pub async fn delete_by_resource_group(&self, group: &str, name: &str) -> AzureResult<()> {
        NETWORK_SECURITY_GROUPS.delete(&self.client, group, name).await
    }

    pub async fn delete_by_id(&self, id: &str) -> AzureResult<()> {
        NETWORK_SECURITY_GROUPS.delete_by_id(&self.client, id).await
    }
}

// ─── Wrapper ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NetworkSecurityGroup {
    inner: NetworkSecurityGroupInner,
    client: AzureClient,
}

impl_resource!(NetworkSecurityGroup, NETWORK_SECURITY_GROUPS);

impl NetworkSecurityGroup {
    pub fn security_rules(&self) -> &[SecurityRuleInner] {
        &self.inner.properties.security_rules
    }

    pub fn security_rule(&self, name: &str) -> Option<&SecurityRuleInner> {
        self.security_rules().iter().find(|r| r.name == name)
    }

    /// Platform rules ARM adds to every group.
    pub fn default_security_rules(&self) -> &[SecurityRuleInner] {
        &self.inner.properties.default_security_rules
    }

    pub fn network_interface_ids(&self) -> Vec<&str> {
        self.inner
            .properties
            .network_interfaces
            .iter()
            .map(|r| r.id.as_str())
            .collect()
    }

    pub fn subnet_ids(&self) -> Vec<&str> {
        self.inner
            .properties
            .subnets
            .iter()
            .map(|r| r.id.as_str())
            .collect()
    }

    pub fn provisioning_state(&self) -> Option<&str> {
        self.inner.properties.provisioning_state.as_deref()
    }

    pub fn inner(&self) -> &NetworkSecurityGroupInner {
        &self.inner
    }

    pub fn into_inner(self) -> NetworkSecurityGroupInner {
        self.inner
    }

    pub async fn refresh(&mut self) -> AzureResult<()> {
        self.inner = NETWORK_SECURITY_GROUPS
            .get_by_id(&self.client, &self.inner.id)
            .await?;
        Ok(())
    }

    pub fn update(&self) -> NetworkSecurityGroupUpdate {
        NetworkSecurityGroupUpdate {
            client: self.client.clone(),
            inner: self.inner.clone(),
            error: None,
        }
    }
}

// ─── Definition ─────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "a definition does nothing until create() is awaited"]
pub struct NetworkSecurityGroupDefinition {
    client: AzureClient,
    base: DefinitionBase,
    rules: Vec<SecurityRuleInner>,
    // first rule error, reported by create()
    error: Option<AzureError>,
}

impl GroupableDefinition for NetworkSecurityGroupDefinition {
    fn base_mut(&mut self) -> &mut DefinitionBase {
        &mut self.base
    }
}

impl NetworkSecurityGroupDefinition {
    pub fn with_rule(mut self, rule: SecurityRuleDefinition) -> Self {
        if self.error.is_none() {
            if let Err(e) = add_rule(&mut self.rules, rule) {
                self.error = Some(e);
            }
        }
        self
    }

    fn build(&self) -> AzureResult<NetworkSecurityGroupInner> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        let (region, _) = self.base.validate("network security group")?;
        let mut rules = self.rules.clone();
        assign_priorities(&mut rules)?;
        validate_rules(&rules)?;
        Ok(NetworkSecurityGroupInner {
            location: region.to_string(),
            tags: self.base.tags.clone(),
            properties: NetworkSecurityGroupProperties {
                security_rules: rules,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    pub async fn create(self) -> AzureResult<NetworkSecurityGroup> {
        let body = self.build()?;
        self.base.ensure_resource_group(&self.client).await?;
        let (_, group) = self.base.validate("network security group")?;
        let inner = NETWORK_SECURITY_GROUPS
            .create_or_update(&self.client, group, &self.base.name, &body)
            .await?;
        Ok(NetworkSecurityGroup {
            inner,
            client: self.client,
        })
    }
}

// ─── Update ─────────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "an update does nothing until apply() is awaited"]
pub struct NetworkSecurityGroupUpdate {
    client: AzureClient,
    inner: NetworkSecurityGroupInner,
    error: Option<AzureError>,
}

impl TaggableUpdate for NetworkSecurityGroupUpdate {
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.inner.tags
    }
}

impl NetworkSecurityGroupUpdate {
    pub fn with_rule(mut self, rule: SecurityRuleDefinition) -> Self {
        if self.error.is_none() {
            if let Err(e) = add_rule(&mut self.inner.properties.security_rules, rule) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn without_rule(mut self, name: &str) -> Self {
        self.inner
            .properties
            .security_rules
            .retain(|r| !r.name.eq_ignore_ascii_case(name));
        self
    }

    fn build(mut self) -> AzureResult<(AzureClient, NetworkSecurityGroupInner)> {
        if let Some(e) = self.error {
            return Err(e);
        }
        assign_priorities(&mut self.inner.properties.security_rules)?;
        validate_rules(&self.inner.properties.security_rules)?;
        Ok((self.client, self.inner))
    }

    pub async fn apply(self) -> AzureResult<NetworkSecurityGroup> {
        let (client, body) = self.build()?;
        let inner = NETWORK_SECURITY_GROUPS
            .put_by_id(&client, &body.id, &body)
            .await?;
        Ok(NetworkSecurityGroup { inner, client })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
