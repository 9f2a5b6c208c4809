//! Structured ARM resource identifiers.
//!
//! `/subscriptions/{sub}/resourceGroups/{group}/providers/{namespace}/{type}/{name}[/{childType}/{childName}]*`
//!
//! Segments are located by name (`subscriptions`, `resourceGroups`,
//! `providers`), never by fixed position, so subscription-scoped provider
//! paths and nested child resources parse the same way.

use std::fmt;
use std::str::FromStr;

use crate::error::{AzureError, AzureResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    subscription_id: String,
    resource_group: Option<String>,
    provider: Option<String>,
    resource_type: Option<String>,
    name: Option<String>,
    children: Vec<(String, String)>,
}

impl ResourceId {
    /// Identifier of a top-level resource inside a resource group.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        provider: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: Some(resource_group.into()),
            provider: Some(provider.into()),
            resource_type: Some(resource_type.into()),
            name: Some(name.into()),
            children: Vec::new(),
        }
    }

    /// Identifier of a resource group.
    pub fn resource_group(subscription_id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: Some(group.into()),
            provider: None,
            resource_type: None,
            name: None,
            children: Vec::new(),
        }
    }

    pub fn parse(id: &str) -> AzureResult<Self> {
        let trimmed = id.trim().trim_end_matches('/');
        let rest = trimmed
            .strip_prefix('/')
            .ok_or_else(|| AzureError::invalid_resource_id(id, "must start with '/'"))?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(AzureError::invalid_resource_id(id, "empty path segment"));
        }

        let mut at = 0;
        let mut take_pair = |keyword: &str| -> AzureResult<Option<String>> {
            match segments.get(at) {
                Some(seg) if seg.eq_ignore_ascii_case(keyword) => {
                    let value = segments.get(at + 1).ok_or_else(|| {
                        AzureError::invalid_resource_id(id, &format!("'{keyword}' has no value"))
                    })?;
                    at += 2;
                    Ok(Some((*value).to_string()))
                }
                _ => Ok(None),
            }
        };

        let subscription_id = take_pair("subscriptions")?
            .ok_or_else(|| AzureError::invalid_resource_id(id, "missing 'subscriptions' segment"))?;
        let resource_group = take_pair("resourceGroups")?;

        let mut parsed = Self {
            subscription_id,
            resource_group,
            provider: None,
            resource_type: None,
            name: None,
            children: Vec::new(),
        };

        if at == segments.len() {
            return Ok(parsed);
        }

        if !segments[at].eq_ignore_ascii_case("providers") {
            return Err(AzureError::invalid_resource_id(
                id,
                &format!("unexpected segment '{}'", segments[at]),
            ));
        }
        let provider_part = segments.get(at + 1..at + 4).ok_or_else(|| {
            AzureError::invalid_resource_id(id, "expected providers/{namespace}/{type}/{name}")
        })?;
        parsed.provider = Some(provider_part[0].to_string());
        parsed.resource_type = Some(provider_part[1].to_string());
        parsed.name = Some(provider_part[2].to_string());
        at += 4;

        let tail = &segments[at..];
        if tail.len() % 2 != 0 {
            return Err(AzureError::invalid_resource_id(id, "child type without a name"));
        }
        parsed.children = tail
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();

        Ok(parsed)
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group_name(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    /// Provider namespace, e.g. `Microsoft.Network`.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Top-level resource type, e.g. `virtualNetworks`.
    pub fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    /// Full type including children, e.g. `Microsoft.Network/virtualNetworks/subnets`.
    pub fn full_resource_type(&self) -> Option<String> {
        let provider = self.provider.as_deref()?;
        let top = self.resource_type.as_deref()?;
        let mut full = format!("{provider}/{top}");
        for (child_type, _) in &self.children {
            full.push('/');
            full.push_str(child_type);
        }
        Some(full)
    }

    /// Name of the top-level resource.
    pub fn top_level_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name of the resource this identifier points at: the innermost child,
    /// the top-level resource, or the resource group for group identifiers.
    pub fn name(&self) -> Option<&str> {
        self.children
            .last()
            .map(|(_, n)| n.as_str())
            .or(self.name.as_deref())
            .or(self.resource_group.as_deref())
    }

    pub fn children(&self) -> &[(String, String)] {
        &self.children
    }

    pub fn child(&self, child_type: impl Into<String>, name: impl Into<String>) -> Self {
        let mut id = self.clone();
        id.children.push((child_type.into(), name.into()));
        id
    }

    /// Identifier one level up; `None` for top-level resources.
    pub fn parent(&self) -> Option<Self> {
        if self.children.is_empty() {
            return None;
        }
        let mut id = self.clone();
        id.children.pop();
        Some(id)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/subscriptions/{}", self.subscription_id)?;
        if let Some(rg) = &self.resource_group {
            write!(f, "/resourceGroups/{}", rg)?;
        }
        if let (Some(p), Some(t), Some(n)) = (&self.provider, &self.resource_type, &self.name) {
            write!(f, "/providers/{}/{}/{}", p, t, n)?;
            for (child_type, child_name) in &self.children {
                write!(f, "/{}/{}", child_type, child_name)?;
            }
        }
        Ok(())
    }
}

impl FromStr for ResourceId {
    type Err = AzureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ─── Lenient helpers ────────────────────────────────────────────────

pub fn subscription_from_id(id: &str) -> Option<String> {
    ResourceId::parse(id).ok().map(|r| r.subscription_id)
}

pub fn resource_group_from_id(id: &str) -> Option<String> {
    ResourceId::parse(id).ok().and_then(|r| r.resource_group)
}

pub fn provider_from_id(id: &str) -> Option<String> {
    ResourceId::parse(id).ok().and_then(|r| r.provider)
}

pub fn resource_type_from_id(id: &str) -> Option<String> {
    ResourceId::parse(id).ok().and_then(|r| r.resource_type)
}

pub fn name_from_id(id: &str) -> Option<String> {
    ResourceId::parse(id)
        .ok()
        .and_then(|r| r.name().map(str::to_string))
}

// ─── Tests ──────────────────────────────────────────────────────────
