//! Service Management `NetworkConfiguration` documents.
//!
//! The document is held as a generic element tree so that anything this
//! module does not model (DNS servers, local network sites, gateways)
//! survives a parse / edit / `to_xml()` round trip untouched. Only the
//! `VirtualNetworkSite` elements are read and written through typed views.

use std::io::Cursor;
use std::str;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{AzureError, AzureResult};

pub const NETWORK_CONFIGURATION_NS: &str =
    "http://schemas.microsoft.com/ServiceHosting/2011/07/NetworkConfiguration";

const ROOT: &str = "NetworkConfiguration";
const VNET_CONFIGURATION: &str = "VirtualNetworkConfiguration";
const SITES: &str = "VirtualNetworkSites";
const SITE: &str = "VirtualNetworkSite";

// ─── Typed views ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassicSubnet {
    pub name: String,
    pub address_prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualNetworkSite {
    pub name: String,
    pub location: Option<String>,
    pub affinity_group: Option<String>,
    pub address_prefixes: Vec<String>,
    pub subnets: Vec<ClassicSubnet>,
}

impl VirtualNetworkSite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_affinity_group(mut self, group: impl Into<String>) -> Self {
        self.affinity_group = Some(group.into());
        self
    }

    pub fn with_address_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.address_prefixes.push(prefix.into());
        self
    }

    pub fn with_subnet(mut self, name: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.subnets.push(ClassicSubnet {
            name: name.into(),
            address_prefix: prefix.into(),
        });
        self
    }

    fn from_element(el: &Element) -> Self {
        let address_prefixes = el
            .child(SITE_ADDRESS_SPACE)
            .map(|space| {
                space
                    .children_named(ADDRESS_PREFIX)
                    .map(|p| p.text.trim().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let subnets = el
            .child(SUBNETS)
            .map(|s| {
                s.children_named(SUBNET)
                    .map(|sub| ClassicSubnet {
                        name: sub.attr("name").unwrap_or_default().to_string(),
                        address_prefix: sub
                            .child(ADDRESS_PREFIX)
                            .map(|p| p.text.trim().to_string())
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name: el.attr("name").unwrap_or_default().to_string(),
            location: el.attr("Location").map(str::to_string),
            affinity_group: el.attr("AffinityGroup").map(str::to_string),
            address_prefixes,
            subnets,
        }
    }

    fn to_element(&self) -> Element {
        let mut el = Element::new(SITE);
        el.attrs.push(("name".into(), self.name.clone()));
        if let Some(loc) = &self.location {
            el.attrs.push(("Location".into(), loc.clone()));
        }
        if let Some(ag) = &self.affinity_group {
            el.attrs.push(("AffinityGroup".into(), ag.clone()));
        }

        let mut space = Element::new(SITE_ADDRESS_SPACE);
        for prefix in &self.address_prefixes {
            space.children.push(Element::with_text(ADDRESS_PREFIX, prefix));
        }
        el.children.push(space);

        if !self.subnets.is_empty() {
            let mut subnets = Element::new(SUBNETS);
            for s in &self.subnets {
                let mut sub = Element::new(SUBNET);
                sub.attrs.push(("name".into(), s.name.clone()));
                sub.children.push(Element::with_text(ADDRESS_PREFIX, &s.address_prefix));
                subnets.children.push(sub);
            }
            el.children.push(subnets);
        }
        el
    }
}

const SITE_ADDRESS_SPACE: &str = "AddressSpace";
const ADDRESS_PREFIX: &str = "AddressPrefix";
const SUBNETS: &str = "Subnets";
const SUBNET: &str = "Subnet";

// ─── Element tree ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn with_text(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| local_name(&c.name) == name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| local_name(&c.name) == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| local_name(&c.name) == name)
    }

    /// Child `name`, appended when missing.
    fn child_or_insert(&mut self, name: &str) -> &mut Element {
        let idx = match self.children.iter().position(|c| local_name(&c.name) == name) {
            Some(i) => i,
            None => {
                self.children.push(Element::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[idx]
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn start_element(e: &BytesStart) -> AzureResult<Element> {
    let name = str::from_utf8(e.name().as_ref())
        .map_err(|_| AzureError::xml("invalid UTF-8 in tag name"))?
        .to_string();
    let mut el = Element {
        name,
        ..Default::default()
    };
    for attr in e.attributes() {
        let attr = attr?;
        let key = str::from_utf8(attr.key.as_ref())
            .map_err(|_| AzureError::xml("invalid UTF-8 in attribute name"))?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

fn parse_tree(xml: &str) -> AzureResult<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(start_element(e)?),
            Ok(Event::Empty(ref e)) => {
                let el = start_element(e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            Ok(Event::Text(ref t)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&t.unescape()?);
                }
            }
            Ok(Event::CData(ref c)) => {
                if let Some(current) = stack.last_mut() {
                    let text = str::from_utf8(c)
                        .map_err(|_| AzureError::xml("invalid UTF-8 in CDATA"))?;
                    current.text.push_str(text);
                }
            }
            Ok(Event::End(_)) => {
                let Some(el) = stack.pop() else {
                    return Err(AzureError::xml("unbalanced closing tag"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AzureError::xml(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(AzureError::xml("unexpected end of document"));
    }
    root.ok_or_else(|| AzureError::xml("document has no root element"))
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, el: &Element) -> AzureResult<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if el.children.is_empty() && el.text.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| AzureError::xml(e.to_string()));
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| AzureError::xml(e.to_string()))?;
    if !el.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&el.text)))
            .map_err(|e| AzureError::xml(e.to_string()))?;
    }
    for child in &el.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(|e| AzureError::xml(e.to_string()))
}

// ─── Document ───────────────────────────────────────────────────────

/// A parsed `NetworkConfiguration` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfiguration {
    root: Element,
}

impl NetworkConfiguration {
    pub fn parse(xml: &str) -> AzureResult<Self> {
        let root = parse_tree(xml)?;
        if local_name(&root.name) != ROOT {
            return Err(AzureError::xml(format!(
                "expected <{ROOT}> root element, found <{}>",
                root.name
            )));
        }
        Ok(Self { root })
    }

    /// A document with no virtual network sites.
    pub fn empty() -> Self {
        let mut root = Element::new(ROOT);
        root.attrs
            .push(("xmlns".into(), NETWORK_CONFIGURATION_NS.into()));
        root.children.push(Element::new(VNET_CONFIGURATION));
        Self { root }
    }

    fn sites_element(&self) -> Option<&Element> {
        self.root.child(VNET_CONFIGURATION)?.child(SITES)
    }

    pub fn sites(&self) -> Vec<VirtualNetworkSite> {
        self.sites_element()
            .map(|s| s.children_named(SITE).map(VirtualNetworkSite::from_element).collect())
            .unwrap_or_default()
    }

    pub fn site(&self, name: &str) -> Option<VirtualNetworkSite> {
        self.sites_element()?
            .children_named(SITE)
            .find(|el| el.attr("name") == Some(name))
            .map(VirtualNetworkSite::from_element)
    }

    /// Append a site; the name must not already be in use.
    pub fn add_site(&mut self, site: VirtualNetworkSite) -> AzureResult<()> {
        if site.name.is_empty() {
            return Err(AzureError::validation("virtual network site name is required"));
        }
        if self.site(&site.name).is_some() {
            return Err(AzureError::new(
                crate::error::AzureErrorKind::Conflict,
                format!("virtual network site '{}' already exists", site.name),
            ));
        }
        self.root
            .child_or_insert(VNET_CONFIGURATION)
            .child_or_insert(SITES)
            .children
            .push(site.to_element());
        Ok(())
    }

    /// Remove the first site called `name`. Returns whether one was found.
    pub fn remove_site(&mut self, name: &str) -> bool {
        let Some(sites) = self
            .root
            .child_mut(VNET_CONFIGURATION)
            .and_then(|c| c.child_mut(SITES))
        else {
            return false;
        };
        let found = sites
            .children
            .iter()
            .position(|el| local_name(&el.name) == SITE && el.attr("name") == Some(name));
        match found {
            Some(idx) => {
                sites.children.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn to_xml(&self) -> AzureResult<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| AzureError::xml(e.to_string()))?;
        write_element(&mut writer, &self.root)?;
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| AzureError::xml(e.to_string()))
    }
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        Self::empty()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AzureErrorKind;

    const DOC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<NetworkConfiguration xmlns="http://schemas.microsoft.com/ServiceHosting/2011/07/NetworkConfiguration">
  <VirtualNetworkConfiguration>
    <Dns>
      <DnsServers>
        <DnsServer name="dns1" IPAddress="10.0.0.4" />
      </DnsServers>
    </Dns>
    <VirtualNetworkSites>
      <VirtualNetworkSite name="alpha" Location="West US">
        <AddressSpace>
          <AddressPrefix>10.1.0.0/16</AddressPrefix>
        </AddressSpace>
        <Subnets>
          <Subnet name="front">
            <AddressPrefix>10.1.0.0/24</AddressPrefix>
          </Subnet>
        </Subnets>
        <DnsServersRef>
          <DnsServerRef name="dns1" />
        </DnsServersRef>
      </VirtualNetworkSite>
      <VirtualNetworkSite name="beta" AffinityGroup="ag1">
        <AddressSpace>
          <AddressPrefix>10.2.0.0/16</AddressPrefix>
          <AddressPrefix>10.3.0.0/16</AddressPrefix>
        </AddressSpace>
      </VirtualNetworkSite>
    </VirtualNetworkSites>
  </VirtualNetworkConfiguration>
</NetworkConfiguration>"#;

    #[test]
    fn reads_sites() {
        let doc = NetworkConfiguration::parse(DOC).unwrap();
        let sites = doc.sites();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].name, "alpha");
        assert_eq!(sites[0].location.as_deref(), Some("West US"));
        assert_eq!(sites[0].subnets[0].address_prefix, "10.1.0.0/24");
        assert_eq!(sites[1].affinity_group.as_deref(), Some("ag1"));
        assert_eq!(sites[1].address_prefixes, vec!["10.2.0.0/16", "10.3.0.0/16"]);
        assert!(doc.site("gamma").is_none());
    }

    #[test]
    fn add_preserves_siblings_and_unknown_elements() {
        let mut doc = NetworkConfiguration::parse(DOC).unwrap();
        doc.add_site(
            VirtualNetworkSite::new("gamma")
                .with_location("East US")
                .with_address_prefix("10.4.0.0/16")
                .with_subnet("s1", "10.4.1.0/24"),
        )
        .unwrap();

        let xml = doc.to_xml().unwrap();
        let reparsed = NetworkConfiguration::parse(&xml).unwrap();
        let names: Vec<String> = reparsed.sites().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(reparsed.site("alpha"), NetworkConfiguration::parse(DOC).unwrap().site("alpha"));
        assert!(xml.contains(r#"<DnsServer name="dns1" IPAddress="10.0.0.4"/>"#));
        assert!(xml.contains("<DnsServerRef name=\"dns1\"/>"));
        assert!(xml.contains(NETWORK_CONFIGURATION_NS));
    }

    #[test]
    fn duplicate_site_rejected() {
        let mut doc = NetworkConfiguration::parse(DOC).unwrap();
        let e = doc.add_site(VirtualNetworkSite::new("beta")).unwrap_err();
        assert_eq!(e.kind, AzureErrorKind::Conflict);
        assert_eq!(doc.sites().len(), 2);
    }

    #[test]
    fn remove_takes_exactly_one() {
        let mut doc = NetworkConfiguration::parse(DOC).unwrap();
        // force a duplicate past add_site's check
        let dup = VirtualNetworkSite::new("alpha").with_address_prefix("10.9.0.0/16");
        doc.root
            .child_mut(VNET_CONFIGURATION)
            .and_then(|c| c.child_mut(SITES))
            .unwrap()
            .children
            .push(dup.to_element());

        assert!(doc.remove_site("alpha"));
        let sites = doc.sites();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].name, "beta");
        assert_eq!(sites[1].address_prefixes, vec!["10.9.0.0/16"]);
        assert!(!doc.remove_site("missing"));
    }

    #[test]
    fn empty_document_gains_sites_container() {
        let mut doc = NetworkConfiguration::empty();
        assert!(doc.sites().is_empty());
        assert!(!doc.remove_site("x"));
        doc.add_site(VirtualNetworkSite::new("only").with_address_prefix("192.168.0.0/24"))
            .unwrap();
        let xml = doc.to_xml().unwrap();
        let back = NetworkConfiguration::parse(&xml).unwrap();
        assert_eq!(back.sites().len(), 1);
        assert_eq!(back.site("only").unwrap().address_prefixes, vec!["192.168.0.0/24"]);
    }

    #[test]
    fn wrong_root_rejected() {
        let e = NetworkConfiguration::parse("<Other/>").unwrap_err();
        assert_eq!(e.kind, AzureErrorKind::Xml);
        assert!(NetworkConfiguration::parse("<NetworkConfiguration><Open>").is_err());
    }
}
