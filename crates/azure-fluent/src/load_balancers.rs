//! Azure Load Balancers – frontends, backend pools, probes, load-balancing
//! and inbound NAT rules.
//!
//! Rules name their frontend, pool and probe; those names are turned into
//! child resource IDs under the load balancer's own ID when the definition
//! or update is sent.

use std::collections::HashSet;

use crate::client::AzureClient;
use crate::error::{AzureError, AzureResult};
use crate::resource::{
    impl_resource, ApiFamily, ArmType, DefinitionBase, GroupableDefinition, TaggableUpdate,
};
use crate::resource_id::{self, ResourceId};
use crate::types::{
    BackendAddressPool, FrontendIpConfiguration, FrontendIpConfigurationProperties,
    InboundNatRule, InboundNatRuleProperties, LoadBalancerInner, LoadBalancerProperties,
    LoadBalancingRule, LoadBalancingRuleProperties, Probe, ProbeProperties, Sku, SubResource, Tags,
};

pub(crate) const LOAD_BALANCERS: ArmType =
    ArmType::new("Microsoft.Network", "loadBalancers", ApiFamily::Network);

const FRONTENDS: &str = "frontendIPConfigurations";
const BACKEND_POOLS: &str = "backendAddressPools";
const PROBES: &str = "probes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    Tcp,
    Udp,
    All,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "Tcp",
            TransportProtocol::Udp => "Udp",
            TransportProtocol::All => "All",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancerSkuType {
    Basic,
    Standard,
}

impl LoadBalancerSkuType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancerSkuType::Basic => "Basic",
            LoadBalancerSkuType::Standard => "Standard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Some(LoadBalancerSkuType::Basic),
            "standard" => Some(LoadBalancerSkuType::Standard),
            _ => None,
        }
    }
}

// ─── Rule specs ─────────────────────────────────────────────────────

/// A load-balancing rule by child names. Frontend and pool may be left
/// unset when the load balancer has exactly one of each.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancingRuleSpec {
    pub name: String,
    pub protocol: TransportProtocol,
    pub frontend_port: u16,
    pub backend_port: u16,
    pub frontend: Option<String>,
    pub backend_pool: Option<String>,
    pub probe: Option<String>,
    pub idle_timeout_minutes: Option<u32>,
    pub floating_ip: bool,
}

impl LoadBalancingRuleSpec {
    pub fn new(
        name: impl Into<String>,
        protocol: TransportProtocol,
        frontend_port: u16,
        backend_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            protocol,
            frontend_port,
            backend_port,
            frontend: None,
            backend_pool: None,
            probe: None,
            idle_timeout_minutes: None,
            floating_ip: false,
        }
    }

    pub fn with_frontend(mut self, name: impl Into<String>) -> Self {
        self.frontend = Some(name.into());
        self
    }

    pub fn with_backend_pool(mut self, name: impl Into<String>) -> Self {
        self.backend_pool = Some(name.into());
        self
    }

    pub fn with_probe(mut self, name: impl Into<String>) -> Self {
        self.probe = Some(name.into());
        self
    }

    pub fn with_idle_timeout_minutes(mut self, minutes: u32) -> Self {
        self.idle_timeout_minutes = Some(minutes);
        self
    }

    pub fn with_floating_ip(mut self) -> Self {
        self.floating_ip = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundNatRuleSpec {
    pub name: String,
    pub protocol: TransportProtocol,
    pub frontend_port: u16,
    pub backend_port: u16,
    pub frontend: Option<String>,
}

impl InboundNatRuleSpec {
    pub fn new(
        name: impl Into<String>,
        protocol: TransportProtocol,
        frontend_port: u16,
        backend_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            protocol,
            frontend_port,
            backend_port,
            frontend: None,
        }
    }

    pub fn with_frontend(mut self, name: impl Into<String>) -> Self {
        self.frontend = Some(name.into());
        self
    }
}

// ─── Child resolution ───────────────────────────────────────────────

/// Pending child changes shared by definitions and updates.
#[derive(Debug, Clone, Default)]
struct PendingRules {
    rules: Vec<LoadBalancingRuleSpec>,
    nat_rules: Vec<InboundNatRuleSpec>,
}

fn pick_child(
    kind: &str,
    rule: &str,
    wanted: Option<&str>,
    available: &[&str],
) -> AzureResult<String> {
    match wanted {
        Some(name) if available.iter().any(|a| a.eq_ignore_ascii_case(name)) => Ok(name.to_string()),
        Some(name) => Err(AzureError::validation(format!(
            "rule '{rule}' references unknown {kind} '{name}'"
        ))),
        None if available.len() == 1 => Ok(available[0].to_string()),
        None => Err(AzureError::validation(format!(
            "rule '{rule}' must name its {kind}"
        ))),
    }
}

fn child_ref(lb: &ResourceId, child_type: &str, name: &str) -> SubResource {
    SubResource::new(lb.child(child_type, name).to_string())
}

/// Turn rule specs into child resources under `lb`.
fn resolve_rules(lb: &ResourceId, inner: &mut LoadBalancerInner, pending: PendingRules) -> AzureResult<()> {
    let props = &mut inner.properties;
    let frontends: Vec<String> = props.frontend_ip_configurations.iter().map(|f| f.name.clone()).collect();
    let pools: Vec<String> = props.backend_address_pools.iter().map(|p| p.name.clone()).collect();
    let probes: Vec<String> = props.probes.iter().map(|p| p.name.clone()).collect();
    let frontends: Vec<&str> = frontends.iter().map(String::as_str).collect();
    let pools: Vec<&str> = pools.iter().map(String::as_str).collect();

    for rule in pending.rules {
        let frontend = pick_child("frontend", &rule.name, rule.frontend.as_deref(), &frontends)?;
        let pool = pick_child("backend pool", &rule.name, rule.backend_pool.as_deref(), &pools)?;
        let probe = match rule.probe.as_deref() {
            Some(p) if probes.iter().any(|x| x.eq_ignore_ascii_case(p)) => Some(child_ref(lb, PROBES, p)),
            Some(p) => {
                return Err(AzureError::validation(format!(
                    "rule '{}' references unknown probe '{p}'",
                    rule.name
                )))
            }
            None => None,
        };
        props.load_balancing_rules.push(LoadBalancingRule {
            name: rule.name,
            properties: LoadBalancingRuleProperties {
                frontend_ip_configuration: Some(child_ref(lb, FRONTENDS, &frontend)),
                backend_address_pool: Some(child_ref(lb, BACKEND_POOLS, &pool)),
                probe,
                protocol: rule.protocol.as_str().into(),
                frontend_port: rule.frontend_port,
                backend_port: rule.backend_port,
                idle_timeout_in_minutes: rule.idle_timeout_minutes,
                enable_floating_ip: rule.floating_ip.then_some(true),
                load_distribution: None,
            },
            ..Default::default()
        });
    }

    for rule in pending.nat_rules {
        let frontend = pick_child("frontend", &rule.name, rule.frontend.as_deref(), &frontends)?;
        props.inbound_nat_rules.push(InboundNatRule {
            name: rule.name,
            properties: InboundNatRuleProperties {
                frontend_ip_configuration: Some(child_ref(lb, FRONTENDS, &frontend)),
                protocol: rule.protocol.as_str().into(),
                frontend_port: rule.frontend_port,
                backend_port: rule.backend_port,
                idle_timeout_in_minutes: None,
                enable_floating_ip: None,
            },
            ..Default::default()
        });
    }
    Ok(())
}

fn ref_name(r: &Option<SubResource>) -> Option<String> {
    r.as_ref().and_then(|s| resource_id::name_from_id(&s.id))
}

fn has_name<'a>(mut names: impl Iterator<Item = &'a str>, wanted: &str) -> bool {
    names.any(|n| n.eq_ignore_ascii_case(wanted))
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> AzureResult<()> {
    let mut seen = HashSet::new();
    for n in names {
        if !seen.insert(n.to_ascii_lowercase()) {
            return Err(AzureError::validation(format!("duplicate {kind} '{n}'")));
        }
    }
    Ok(())
}

/// At least one frontend; unique child names; rules only reference
/// children that exist.
fn validate(inner: &LoadBalancerInner) -> AzureResult<()> {
    let props = &inner.properties;
    if props.frontend_ip_configurations.is_empty() {
        return Err(AzureError::validation(format!(
            "load balancer '{}': at least one frontend is required",
            inner.name
        )));
    }
    check_unique("frontend", props.frontend_ip_configurations.iter().map(|f| f.name.as_str()))?;
    check_unique("backend pool", props.backend_address_pools.iter().map(|p| p.name.as_str()))?;
    check_unique("probe", props.probes.iter().map(|p| p.name.as_str()))?;
    check_unique(
        "rule",
        props
            .load_balancing_rules
            .iter()
            .map(|r| r.name.as_str())
            .chain(props.inbound_nat_rules.iter().map(|r| r.name.as_str())),
    )?;

    for rule in &props.load_balancing_rules {
        let p = &rule.properties;
        if let Some(f) = ref_name(&p.frontend_ip_configuration) {
            if !has_name(props.frontend_ip_configurations.iter().map(|x| x.name.as_str()), &f) {
                return Err(AzureError::validation(format!(
                    "rule '{}' references unknown frontend '{f}'",
                    rule.name
                )));
            }
        }
        if let Some(b) = ref_name(&p.backend_address_pool) {
            if !has_name(props.backend_address_pools.iter().map(|x| x.name.as_str()), &b) {
                return Err(AzureError::validation(format!(
                    "rule '{}' references unknown backend pool '{b}'",
                    rule.name
                )));
            }
        }
        if let Some(pr) = ref_name(&p.probe) {
            if !has_name(props.probes.iter().map(|x| x.name.as_str()), &pr) {
                return Err(AzureError::validation(format!(
                    "rule '{}' references unknown probe '{pr}'",
                    rule.name
                )));
            }
        }
    }
    for rule in &props.inbound_nat_rules {
        if let Some(f) = ref_name(&rule.properties.frontend_ip_configuration) {
            if !has_name(props.frontend_ip_configurations.iter().map(|x| x.name.as_str()), &f) {
                return Err(AzureError::validation(format!(
                    "NAT rule '{}' references unknown frontend '{f}'",
                    rule.name
                )));
            }
        }
    }
    Ok(())
}

fn public_frontend(name: String, public_ip_id: String) -> FrontendIpConfiguration {
    FrontendIpConfiguration {
        name,
        properties: FrontendIpConfigurationProperties {
            public_ip_address: Some(SubResource::new(public_ip_id)),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn private_frontend(name: String, subnet_id: String, ip: Option<String>) -> FrontendIpConfiguration {
    let method = if ip.is_some() { "Static" } else { "Dynamic" };
    FrontendIpConfiguration {
        name,
        properties: FrontendIpConfigurationProperties {
            subnet: Some(SubResource::new(subnet_id)),
            private_ip_address: ip,
            private_ip_allocation_method: Some(method.into()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn pool(name: String) -> BackendAddressPool {
    BackendAddressPool {
        name,
        ..Default::default()
    }
}

fn probe(name: String, protocol: &str, port: u16, path: Option<String>) -> Probe {
    Probe {
        name,
        properties: ProbeProperties {
            protocol: protocol.into(),
            port,
            request_path: path,
            ..Default::default()
        },
        ..Default::default()
    }
}

// ─── Collection ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoadBalancers {
    client: AzureClient,
}

impl LoadBalancers {
    pub(crate) fn new(client: AzureClient) -> Self {
        Self { client }
    }

    fn wrap(&self, inner: LoadBalancerInner) -> LoadBalancer {
        LoadBalancer {
            inner,
            client: self.client.clone(),
        }
    }

    pub async fn list(&self) -> AzureResult<Vec<LoadBalancer>> {
        let items = LOAD_BALANCERS.list(&self.client).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn list_by_resource_group(&self, group: &str) -> AzureResult<Vec<LoadBalancer>> {
        let items = LOAD_BALANCERS.list_by_group(&self.client, group).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn get_by_resource_group(&self, group: &str, name: &str) -> AzureResult<LoadBalancer> {
        let inner = LOAD_BALANCERS.get(&self.client, group, name).await?;
        Ok(self.wrap(inner))
    }

    pub async fn get_by_id(&self, id: &str) -> AzureResult<LoadBalancer> {
        let inner = LOAD_BALANCERS.get_by_id(&self.client, id).await?;
        Ok(self.wrap(inner))
    }

    pub fn define(&self, name: impl Into<String>) -> LoadBalancerDefinition {
        LoadBalancerDefinition {
            client: self.client.clone(),
            base: DefinitionBase::new(name),
            properties: LoadBalancerProperties::default(),
            pending: PendingRules::default(),
            sku: None,
        }
    }

    pub async fn delete_by_resource_group(&self, group: &str, name: &str) -> AzureResult<()> {
        LOAD_BALANCERS.delete(&self.client, group, name).await
    }

    pub async fn delete_by_id(&self, id: &str) -> AzureResult<()> {
        LOAD_BALANCERS.delete_by_id(&self.client, id).await
    }
}

// ─── Wrapper ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoadBalancer {
    inner: LoadBalancerInner,
    client: AzureClient,
}

impl_resource!(LoadBalancer, LOAD_BALANCERS);

impl LoadBalancer {
    pub fn frontend_names(&self) -> Vec<&str> {
        self.inner
            .properties
            .frontend_ip_configurations
            .iter()
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn backend_pool_names(&self) -> Vec<&str> {
        self.inner
            .properties
            .backend_address_pools
            .iter()
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn probe_names(&self) -> Vec<&str> {
        self.inner.properties.probes.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn load_balancing_rule_names(&self) -> Vec<&str> {
        self.inner
            .properties
            .load_balancing_rules
            .iter()
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn inbound_nat_rule_names(&self) -> Vec<&str> {
        self.inner
            .properties
            .inbound_nat_rules
            .iter()
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn public_ip_address_ids(&self) -> Vec<&str> {
        self.inner
            .properties
            .frontend_ip_configurations
            .iter()
            .filter_map(|f| f.properties.public_ip_address.as_ref())
            .map(|r| r.id.as_str())
            .collect()
    }

    pub fn sku(&self) -> Option<LoadBalancerSkuType> {
        self.inner
            .sku
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .and_then(LoadBalancerSkuType::parse)
    }

    pub fn provisioning_state(&self) -> Option<&str> {
        self.inner.properties.provisioning_state.as_deref()
    }

    pub fn inner(&self) -> &LoadBalancerInner {
        &self.inner
    }

    pub fn into_inner(self) -> LoadBalancerInner {
        self.inner
    }

    pub async fn refresh(&mut self) -> AzureResult<()> {
        self.inner = LOAD_BALANCERS.get_by_id(&self.client, &self.inner.id).await?;
        Ok(())
    }

    pub fn update(&self) -> LoadBalancerUpdate {
        LoadBalancerUpdate {
            client: self.client.clone(),
            inner: self.inner.clone(),
            pending: PendingRules::default(),
        }
    }
}

// ─── Definition ─────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "a definition does nothing until create() is awaited"]
pub struct LoadBalancerDefinition {
    client: AzureClient,
    base: DefinitionBase,
    properties: LoadBalancerProperties,
    pending: PendingRules,
    sku: Option<LoadBalancerSkuType>,
}

impl GroupableDefinition for LoadBalancerDefinition {
    fn base_mut(&mut self) -> &mut DefinitionBase {
        &mut self.base
    }
}

impl LoadBalancerDefinition {
    pub fn with_frontend_public_ip(mut self, name: impl Into<String>, public_ip_id: impl Into<String>) -> Self {
        self.properties
            .frontend_ip_configurations
            .push(public_frontend(name.into(), public_ip_id.into()));
        self
    }

    /// Internal frontend; `ip` of `None` means dynamic allocation.
    pub fn with_frontend_private_ip(
        mut self,
        name: impl Into<String>,
        subnet_id: impl Into<String>,
        ip: Option<String>,
    ) -> Self {
        self.properties
            .frontend_ip_configurations
            .push(private_frontend(name.into(), subnet_id.into(), ip));
        self
    }

    pub fn with_backend_pool(mut self, name: impl Into<String>) -> Self {
        self.properties.backend_address_pools.push(pool(name.into()));
        self
    }

    pub fn with_tcp_probe(mut self, name: impl Into<String>, port: u16) -> Self {
        self.properties.probes.push(probe(name.into(), "Tcp", port, None));
        self
    }

    pub fn with_http_probe(mut self, name: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        self.properties
            .probes
            .push(probe(name.into(), "Http", port, Some(path.into())));
        self
    }

    pub fn with_load_balancing_rule(mut self, rule: LoadBalancingRuleSpec) -> Self {
        self.pending.rules.push(rule);
        self
    }

    pub fn with_inbound_nat_rule(mut self, rule: InboundNatRuleSpec) -> Self {
        self.pending.nat_rules.push(rule);
        self
    }

    pub fn with_sku(mut self, sku: LoadBalancerSkuType) -> Self {
        self.sku = Some(sku);
        self
    }

    fn build(&self) -> AzureResult<LoadBalancerInner> {
        let (region, group) = self.base.validate("load balancer")?;
        let id = LOAD_BALANCERS.id(&self.client, group, &self.base.name)?;
        let mut inner = LoadBalancerInner {
            name: self.base.name.clone(),
            location: region.to_string(),
            tags: self.base.tags.clone(),
            sku: self.sku.map(|s| Sku::named(s.as_str())),
            properties: self.properties.clone(),
            ..Default::default()
        };
        resolve_rules(&id, &mut inner, self.pending.clone())?;
        validate(&inner)?;
        Ok(inner)
    }

    pub async fn create(self) -> AzureResult<LoadBalancer> {
        let body = self.build()?;
        self.base.ensure_resource_group(&self.client).await?;
        let (_, group) = self.base.validate("load balancer")?;
        let inner = LOAD_BALANCERS
            .create_or_update(&self.client, group, &self.base.name, &body)
            .await?;
        Ok(LoadBalancer {
            inner,
            client: self.client,
        })
    }
}

// ─── Update ─────────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "an update does nothing until apply() is awaited"]
pub struct LoadBalancerUpdate {
    client: AzureClient,
    inner: LoadBalancerInner,
    pending: PendingRules,
}

impl TaggableUpdate for LoadBalancerUpdate {
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.inner.tags
    }
}

impl LoadBalancerUpdate {
    pub fn with_backend_pool(mut self, name: impl Into<String>) -> Self {
        self.inner.properties.backend_address_pools.push(pool(name.into()));
        self
    }

    /// Rules still pointing at the pool make `apply()` fail.
    pub fn without_backend_pool(mut self, name: &str) -> Self {
        self.inner
            .properties
            .backend_address_pools
            .retain(|p| !p.name.eq_ignore_ascii_case(name));
        self
    }

    pub fn with_tcp_probe(mut self, name: impl Into<String>, port: u16) -> Self {
        self.inner.properties.probes.push(probe(name.into(), "Tcp", port, None));
        self
    }

    pub fn with_http_probe(mut self, name: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        self.inner
            .properties
            .probes
            .push(probe(name.into(), "Http", port, Some(path.into())));
        self
    }

    pub fn without_probe(mut self, name: &str) -> Self {
        self.inner
            .properties
            .probes
            .retain(|p| !p.name.eq_ignore_ascii_case(name));
        self
    }

    pub fn with_load_balancing_rule(mut self, rule: LoadBalancingRuleSpec) -> Self {
        self.pending.rules.push(rule);
        self
    }

    pub fn without_load_balancing_rule(mut self, name: &str) -> Self {
        self.inner
            .properties
            .load_balancing_rules
            .retain(|r| !r.name.eq_ignore_ascii_case(name));
        self
    }

    pub fn with_inbound_nat_rule(mut self, rule: InboundNatRuleSpec) -> Self {
        self.pending.nat_rules.push(rule);
        self
    }

    pub fn without_inbound_nat_rule(mut self, name: &str) -> Self {
        self.inner
            .properties
            .inbound_nat_rules
            .retain(|r| !r.name.eq_ignore_ascii_case(name));
        self
    }

    fn build(mut self) -> AzureResult<Self> {
        let id = LOAD_BALANCERS.parse_id(&self.inner.id)?;
        let pending = std::mem::take(&mut self.pending);
        resolve_rules(&id, &mut self.inner, pending)?;
        validate(&self.inner)?;
        Ok(self)
    }

    pub async fn apply(self) -> AzureResult<LoadBalancer> {
        let update = self.build()?;
        let inner = LOAD_BALANCERS
            .put_by_id(&update.client, &update.inner.id, &update.inner)
            .await?;
        Ok(LoadBalancer {
            inner,
            client: update.client,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
