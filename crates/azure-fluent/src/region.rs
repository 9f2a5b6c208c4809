//! Azure regions.
//!
//! ARM accepts region names such as `eastus`; portals and older APIs use
//! display labels such as `East US`. Every `with_region` call normalises its
//! argument with [`normalize`] so both spellings work.

use std::fmt;

/// A public-cloud Azure region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    name: &'static str,
    label: &'static str,
}

impl Region {
    pub const US_EAST: Region = Region::known("eastus", "East US");
    pub const US_EAST2: Region = Region::known("eastus2", "East US 2");
    pub const US_CENTRAL: Region = Region::known("centralus", "Central US");
    pub const US_NORTH_CENTRAL: Region = Region::known("northcentralus", "North Central US");
    pub const US_SOUTH_CENTRAL: Region = Region::known("southcentralus", "South Central US");
    pub const US_WEST_CENTRAL: Region = Region::known("westcentralus", "West Central US");
    pub const US_WEST: Region = Region::known("westus", "West US");
    pub const US_WEST2: Region = Region::known("westus2", "West US 2");
    pub const US_WEST3: Region = Region::known("westus3", "West US 3");
    pub const CANADA_CENTRAL: Region = Region::known("canadacentral", "Canada Central");
    pub const CANADA_EAST: Region = Region::known("canadaeast", "Canada East");
    pub const BRAZIL_SOUTH: Region = Region::known("brazilsouth", "Brazil South");
    pub const EUROPE_NORTH: Region = Region::known("northeurope", "North Europe");
    pub const EUROPE_WEST: Region = Region::known("westeurope", "West Europe");
    pub const UK_SOUTH: Region = Region::known("uksouth", "UK South");
    pub const UK_WEST: Region = Region::known("ukwest", "UK West");
    pub const FRANCE_CENTRAL: Region = Region::known("francecentral", "France Central");
    pub const GERMANY_WEST_CENTRAL: Region =
        Region::known("germanywestcentral", "Germany West Central");
    pub const SWEDEN_CENTRAL: Region = Region::known("swedencentral", "Sweden Central");
    pub const ASIA_EAST: Region = Region::known("eastasia", "East Asia");
    pub const ASIA_SOUTHEAST: Region = Region::known("southeastasia", "Southeast Asia");
    pub const JAPAN_EAST: Region = Region::known("japaneast", "Japan East");
    pub const JAPAN_WEST: Region = Region::known("japanwest", "Japan West");
    pub const AUSTRALIA_EAST: Region = Region::known("australiaeast", "Australia East");
    pub const AUSTRALIA_SOUTHEAST: Region =
        Region::known("australiasoutheast", "Australia Southeast");
    pub const INDIA_CENTRAL: Region = Region::known("centralindia", "Central India");
    pub const INDIA_SOUTH: Region = Region::known("southindia", "South India");
    pub const KOREA_CENTRAL: Region = Region::known("koreacentral", "Korea Central");

    const fn known(name: &'static str, label: &'static str) -> Self {
        Self { name, label }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn values() -> &'static [Region] {
        ALL
    }

    /// Look up a region by ARM name or display label, ignoring case and
    /// spaces.
    pub fn find(name_or_label: &str) -> Option<Region> {
        let wanted = normalize(name_or_label);
        ALL.iter().copied().find(|r| r.name == wanted)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl AsRef<str> for Region {
    fn as_ref(&self) -> &str {
        self.name
    }
}

const ALL: &[Region] = &[
    Region::US_EAST,
    Region::US_EAST2,
    Region::US_CENTRAL,
    Region::US_NORTH_CENTRAL,
    Region::US_SOUTH_CENTRAL,
    Region::US_WEST_CENTRAL,
    Region::US_WEST,
    Region::US_WEST2,
    Region::US_WEST3,
    Region::CANADA_CENTRAL,
    Region::CANADA_EAST,
    Region::BRAZIL_SOUTH,
    Region::EUROPE_NORTH,
    Region::EUROPE_WEST,
    Region::UK_SOUTH,
    Region::UK_WEST,
    Region::FRANCE_CENTRAL,
    Region::GERMANY_WEST_CENTRAL,
    Region::SWEDEN_CENTRAL,
    Region::ASIA_EAST,
    Region::ASIA_SOUTHEAST,
    Region::JAPAN_EAST,
    Region::JAPAN_WEST,
    Region::AUSTRALIA_EAST,
    Region::AUSTRALIA_SOUTHEAST,
    Region::INDIA_CENTRAL,
    Region::INDIA_SOUTH,
    Region::KOREA_CENTRAL,
];

/// ARM form of a region: lowercase with whitespace removed.
pub fn normalize(region: &str) -> String {
    region
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_label() {
        assert_eq!(normalize("East US 2"), "eastus2");
        assert_eq!(normalize("westeurope"), "westeurope");
    }

    #[test]
    fn find_by_label_or_name() {
        assert_eq!(Region::find("West Europe"), Some(Region::EUROPE_WEST));
        assert_eq!(Region::find("WESTEUROPE"), Some(Region::EUROPE_WEST));
        assert_eq!(Region::find("atlantis"), None);
    }

    #[test]
    fn labels_normalize_to_names() {
        for r in Region::values() {
            assert_eq!(normalize(r.label()), r.name(), "{}", r.label());
        }
    }

    #[test]
    fn display_is_arm_name() {
        assert_eq!(Region::US_WEST2.to_string(), "westus2");
    }
}
