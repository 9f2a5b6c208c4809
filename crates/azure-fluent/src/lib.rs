//! # azure-fluent – fluent Azure Resource Manager client
//!
//! Define, create, inspect and update Azure resources through chained
//! builders over the ARM REST API.
//!
//! ## Features
//!
//! - **Authentication** – service-principal client credentials, token cache with automatic renewal
//! - **Transport** – retries on throttling and 5xx, `nextLink` paging, long-running operation polling
//! - **Resource Groups** – list, get, exists, create, update tags, delete, list contents
//! - **Availability Sets** – fault / update domains, aligned SKU
//! - **Storage Accounts** – SKU, kind, access tier, name availability, keys
//! - **Networking** – virtual networks and subnets, NSGs and rules, public IPs, NICs, load balancers
//! - **Virtual Machines** – popular images, new or existing NICs, data disks, power actions, sizes
//! - **Classic Network Configuration** – read and edit `NetworkConfiguration` XML documents
//!
//! ```no_run
//! use azure_fluent::prelude::*;
//!
//! # async fn demo() -> azure_fluent::AzureResult<()> {
//! let azure = Azure::from_env()?;
//! let network = azure
//!     .networks()
//!     .define("demo-vnet")
//!     .with_region("westus2")
//!     .with_new_resource_group("demo-rg")
//!     .with_address_space("10.1.0.0/16")
//!     .with_subnet("front", "10.1.1.0/24")
//!     .create()
//!     .await?;
//! println!("{} has {} subnets", network.name(), network.subnets().len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod config;
pub mod region;
pub mod resource_id;
pub mod types;
pub mod auth;
pub mod client;
pub mod resource;
pub mod resource_groups;
pub mod availability_sets;
pub mod storage_accounts;
pub mod networks;
pub mod network_security_groups;
pub mod public_ip_addresses;
pub mod network_interfaces;
pub mod load_balancers;
pub mod classic_network;
pub mod virtual_machines;
pub mod azure;

pub use auth::AzureToken;
pub use azure::Azure;
pub use client::AzureClient;
pub use config::{AzureConfig, AzureCredentials};
pub use error::{AzureError, AzureErrorKind, AzureResult};
pub use region::Region;
pub use resource_id::ResourceId;

/// Everything needed to drive the fluent builders.
pub mod prelude {
    pub use crate::resource::{GroupableDefinition, Resource, TaggableUpdate};
    pub use crate::{Azure, AzureConfig, AzureCredentials, AzureError, AzureResult, Region};
}
