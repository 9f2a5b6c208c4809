//! Azure Virtual Machines (Microsoft.Compute/virtualMachines).
//!
//! A definition needs an image, a primary network interface and an admin
//! account. The NIC may be an existing one or a [`NetworkInterfaceDefinition`]
//! that is created first, in the VM's region and resource group unless the
//! NIC definition says otherwise.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::info;

use crate::client::{with_api_version, AzureClient};
use crate::error::{AzureError, AzureResult};
use crate::network_interfaces::NetworkInterfaceDefinition;
use crate::region::normalize;
use crate::resource::{
    impl_resource, ApiFamily, ArmType, DefinitionBase, GroupableDefinition, TaggableUpdate,
};
use crate::types::{
    DataDisk, HardwareProfile, ImageReference, LinuxConfiguration, ManagedDiskParameters,
    NetworkInterfaceReference, NetworkInterfaceReferenceProperties, NetworkProfile, OsDisk,
    OsProfile, SshConfiguration, SshPublicKey, StorageProfile, SubResource, Tags,
    VirtualMachineInner, VmInstanceView, VmProperties, VmSize, WindowsConfiguration,
};

pub(crate) const VIRTUAL_MACHINES: ArmType =
    ArmType::new("Microsoft.Compute", "virtualMachines", ApiFamily::Compute);

pub const DEFAULT_VM_SIZE: &str = "Standard_D2s_v3";

const MAX_WINDOWS_COMPUTER_NAME: usize = 15;
const MAX_LINUX_COMPUTER_NAME: usize = 64;

// ─── Enums ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    Linux,
    Windows,
}

impl OsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Linux => "Linux",
            OsType::Windows => "Windows",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Some(OsType::Linux),
            "windows" => Some(OsType::Windows),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachingType {
    None,
    ReadOnly,
    ReadWrite,
}

impl CachingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachingType::None => "None",
            CachingType::ReadOnly => "ReadOnly",
            CachingType::ReadWrite => "ReadWrite",
        }
    }
}

/// Managed disk performance tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskStorageType {
    StandardLrs,
    StandardSsdLrs,
    PremiumLrs,
}

impl DiskStorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskStorageType::StandardLrs => "Standard_LRS",
            DiskStorageType::StandardSsdLrs => "StandardSSD_LRS",
            DiskStorageType::PremiumLrs => "Premium_LRS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Deallocating,
    Deallocated,
    Unknown,
}

impl PowerState {
    /// Parse an instance-view status code such as `PowerState/running`.
    pub fn from_code(code: &str) -> Option<Self> {
        let state = code.strip_prefix("PowerState/")?;
        Some(match state.to_ascii_lowercase().as_str() {
            "starting" => PowerState::Starting,
            "running" => PowerState::Running,
            "stopping" => PowerState::Stopping,
            "stopped" => PowerState::Stopped,
            "deallocating" => PowerState::Deallocating,
            "deallocated" => PowerState::Deallocated,
            _ => PowerState::Unknown,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownLinuxImage {
    UbuntuServer22_04Lts,
    UbuntuServer20_04Lts,
    Debian12,
    RhelServer9,
    SlesServer15,
}

impl KnownLinuxImage {
    pub fn image_reference(&self) -> ImageReference {
        let (publisher, offer, sku) = match self {
            KnownLinuxImage::UbuntuServer22_04Lts => {
                ("Canonical", "0001-com-ubuntu-server-jammy", "22_04-lts-gen2")
            }
            KnownLinuxImage::UbuntuServer20_04Lts => {
                ("Canonical", "0001-com-ubuntu-server-focal", "20_04-lts-gen2")
            }
            KnownLinuxImage::Debian12 => ("Debian", "debian-12", "12-gen2"),
            KnownLinuxImage::RhelServer9 => ("RedHat", "RHEL", "9-lvm-gen2"),
            KnownLinuxImage::SlesServer15 => ("SUSE", "sles-15-sp5", "gen2"),
        };
        image(publisher, offer, sku, "latest")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownWindowsImage {
    WindowsServer2022Datacenter,
    WindowsServer2019Datacenter,
    WindowsServer2016Datacenter,
}

impl KnownWindowsImage {
    pub fn image_reference(&self) -> ImageReference {
        let sku = match self {
            KnownWindowsImage::WindowsServer2022Datacenter => "2022-datacenter-azure-edition",
            KnownWindowsImage::WindowsServer2019Datacenter => "2019-Datacenter",
            KnownWindowsImage::WindowsServer2016Datacenter => "2016-Datacenter",
        };
        image("MicrosoftWindowsServer", "WindowsServer", sku, "latest")
    }
}

fn image(publisher: &str, offer: &str, sku: &str, version: &str) -> ImageReference {
    ImageReference {
        publisher: Some(publisher.into()),
        offer: Some(offer.into()),
        sku: Some(sku.into()),
        version: Some(version.into()),
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Lowest LUN not yet used.
fn next_lun(disks: &[DataDisk]) -> u32 {
    (0..)
        .find(|lun| !disks.iter().any(|d| d.lun == *lun))
        .unwrap_or(0)
}

fn empty_disk(lun: u32, size_gb: u32) -> DataDisk {
    DataDisk {
        lun,
        create_option: Some("Empty".into()),
        disk_size_gb: Some(size_gb),
        ..Default::default()
    }
}

fn validate_computer_name(name: &str, os: OsType) -> AzureResult<()> {
    let max = match os {
        OsType::Windows => MAX_WINDOWS_COMPUTER_NAME,
        OsType::Linux => MAX_LINUX_COMPUTER_NAME,
    };
    if name.is_empty() || name.len() > max {
        return Err(AzureError::validation(format!(
            "computer name '{name}' must be 1-{max} characters for a {} VM",
            os.as_str()
        )));
    }
    Ok(())
}

fn vm_action_url(client: &AzureClient, id: &str, action: &str) -> AzureResult<String> {
    let parsed = VIRTUAL_MACHINES.parse_id(id)?;
    let url = client.arm_url(&format!("{parsed}/{action}"));
    Ok(with_api_version(&url, VIRTUAL_MACHINES.api_version(client)))
}

// ─── Collection ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VirtualMachines {
    client: AzureClient,
}

impl VirtualMachines {
    pub(crate) fn new(client: AzureClient) -> Self {
        Self { client }
    }

    fn wrap(&self, inner: VirtualMachineInner) -> VirtualMachine {
        VirtualMachine {
            inner,
            client: self.client.clone(),
        }
    }

    pub async fn list(&self) -> AzureResult<Vec<VirtualMachine>> {
        let items = VIRTUAL_MACHINES.list(&self.client).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn list_by_resource_group(&self, group: &str) -> AzureResult<Vec<VirtualMachine>> {
        let items = VIRTUAL_MACHINES.list_by_group(&self.client, group).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn get_by_resource_group(&self, group: &str, name: &str) -> AzureResult<VirtualMachine> {
        let inner = VIRTUAL_MACHINES.get(&self.client, group, name).await?;
        Ok(self.wrap(inner))
    }

    pub async fn get_by_id(&self, id: &str) -> AzureResult<VirtualMachine> {
        let inner = VIRTUAL_MACHINES.get_by_id(&self.client, id).await?;
        Ok(self.wrap(inner))
    }

    /// Sizes offered in `region`.
    pub async fn list_available_sizes(&self, region: &str) -> AzureResult<Vec<VmSize>> {
        let url = self.client.subscription_url(&format!(
            "/providers/Microsoft.Compute/locations/{}/vmSizes",
            normalize(region)
        ))?;
        let url = with_api_version(&url, VIRTUAL_MACHINES.api_version(&self.client));
        self.client.get_all_pages(&url).await
    }

    pub fn define(&self, name: impl Into<String>) -> VirtualMachineDefinition {
        VirtualMachineDefinition {
            client: self.client.clone(),
            base: DefinitionBase::new(name),
            primary_nic: None,
            secondary_nics: Vec::new(),
            availability_set_id: None,
            image: None,
            os_type: None,
            admin_username: None,
            admin_password: None,
            ssh_keys: Vec::new(),
            computer_name: None,
            custom_data: None,
            size: DEFAULT_VM_SIZE.to_string(),
            os_disk_size_gb: None,
            os_disk_caching: None,
            os_disk_storage_type: None,
            data_disks: Vec::new(),
        }
    }

    pub async fn delete_by_resource_group(&self, group: &str, name: &str) -> AzureResult<()> {
        VIRTUAL_MACHINES.delete(&self.client, group, name).await
    }

    pub async fn delete_by_id(&self, id: &str) -> AzureResult<()> {
        VIRTUAL_MACHINES.delete_by_id(&self.client, id).await
    }
}

// ─── Wrapper ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VirtualMachine {
    inner: VirtualMachineInner,
    client: AzureClient,
}

impl_resource!(VirtualMachine, VIRTUAL_MACHINES);

impl VirtualMachine {
    fn storage(&self) -> Option<&StorageProfile> {
        self.inner.properties.storage_profile.as_ref()
    }

    fn os_profile(&self) -> Option<&OsProfile> {
        self.inner.properties.os_profile.as_ref()
    }

    pub fn size(&self) -> Option<&str> {
        self.inner
            .properties
            .hardware_profile
            .as_ref()
            .and_then(|h| h.vm_size.as_deref())
    }

    pub fn computer_name(&self) -> Option<&str> {
        self.os_profile().and_then(|o| o.computer_name.as_deref())
    }

    pub fn admin_username(&self) -> Option<&str> {
        self.os_profile().and_then(|o| o.admin_username.as_deref())
    }

    pub fn os_type(&self) -> Option<OsType> {
        let from_disk = self
            .storage()
            .and_then(|s| s.os_disk.as_ref())
            .and_then(|d| d.os_type.as_deref())
            .and_then(OsType::parse);
        from_disk.or_else(|| {
            let os = self.os_profile()?;
            if os.windows_configuration.is_some() {
                Some(OsType::Windows)
            } else if os.linux_configuration.is_some() {
                Some(OsType::Linux)
            } else {
                None
            }
        })
    }

    pub fn image_reference(&self) -> Option<&ImageReference> {
        self.storage().and_then(|s| s.image_reference.as_ref())
    }

    pub fn os_disk_size_gb(&self) -> Option<u32> {
        self.storage()
            .and_then(|s| s.os_disk.as_ref())
            .and_then(|d| d.disk_size_gb)
    }

    pub fn data_disks(&self) -> &[DataDisk] {
        self.storage().map(|s| s.data_disks.as_slice()).unwrap_or(&[])
    }

    pub fn network_interface_ids(&self) -> Vec<&str> {
        self.inner
            .properties
            .network_profile
            .as_ref()
            .map(|n| n.network_interfaces.iter().map(|r| r.id.as_str()).collect())
            .unwrap_or_default()
    }

    /// The NIC flagged primary, or the only one.
    pub fn primary_network_interface_id(&self) -> Option<&str> {
        let nics = &self.inner.properties.network_profile.as_ref()?.network_interfaces;
        nics.iter()
            .find(|r| r.properties.as_ref().map(|p| p.primary).unwrap_or(false))
            .or_else(|| if nics.len() == 1 { nics.first() } else { None })
            .map(|r| r.id.as_str())
    }

    pub fn availability_set_id(&self) -> Option<&str> {
        self.inner
            .properties
            .availability_set
            .as_ref()
            .map(|s| s.id.as_str())
    }

    pub fn vm_id(&self) -> Option<&str> {
        self.inner.properties.vm_id.as_deref()
    }

    pub fn provisioning_state(&self) -> Option<&str> {
        self.inner.properties.provisioning_state.as_deref()
    }

    /// From the last fetched instance view; `None` until one is loaded
    /// by [`refresh`](Self::refresh) or [`instance_view`](Self::instance_view).
    pub fn power_state(&self) -> Option<PowerState> {
        self.inner
            .properties
            .instance_view
            .as_ref()?
            .statuses
            .iter()
            .find_map(|s| PowerState::from_code(&s.code))
    }

    pub fn inner(&self) -> &VirtualMachineInner {
        &self.inner
    }

    pub fn into_inner(self) -> VirtualMachineInner {
        self.inner
    }

    /// Fetch the instance view and keep it for [`power_state`](Self::power_state).
    pub async fn instance_view(&mut self) -> AzureResult<&VmInstanceView> {
        let url = vm_action_url(&self.client, &self.inner.id, "instanceView")?;
        let view: VmInstanceView = self.client.get_json(&url).await?;
        Ok(self.inner.properties.instance_view.insert(view))
    }

    /// Reload the VM, instance view included.
    pub async fn refresh(&mut self) -> AzureResult<()> {
        let url = VIRTUAL_MACHINES.url_for_id(&self.client, &self.inner.id)?;
        self.inner = self
            .client
            .get_json(&format!("{url}&$expand=instanceView"))
            .await?;
        Ok(())
    }

    async fn action(&self, action: &str) -> AzureResult<()> {
        let url = vm_action_url(&self.client, &self.inner.id, action)?;
        info!("Virtual machine {}: {}", self.inner.name, action);
        self.client.post_action_and_wait(&url).await
    }

    pub async fn start(&self) -> AzureResult<()> {
        self.action("start").await
    }

    pub async fn power_off(&self) -> AzureResult<()> {
        self.action("powerOff").await
    }

    pub async fn restart(&self) -> AzureResult<()> {
        self.action("restart").await
    }

    pub async fn deallocate(&self) -> AzureResult<()> {
        self.action("deallocate").await
    }

    /// Mark a deallocated VM as generalized so it can be captured.
    pub async fn generalize(&self) -> AzureResult<()> {
        self.action("generalize").await
    }

    pub fn update(&self) -> VirtualMachineUpdate {
        VirtualMachineUpdate {
            client: self.client.clone(),
            inner: self.inner.clone(),
        }
    }
}

// ─── Definition ─────────────────────────────────────────────────────

#[derive(Debug)]
enum PrimaryNic {
    Existing(String),
    New(Box<NetworkInterfaceDefinition>),
}

#[derive(Debug)]
#[must_use = "a definition does nothing until create() is awaited"]
pub struct VirtualMachineDefinition {
    client: AzureClient,
    base: DefinitionBase,
    primary_nic: Option<PrimaryNic>,
    secondary_nics: Vec<String>,
    availability_set_id: Option<String>,
    image: Option<ImageReference>,
    os_type: Option<OsType>,
    admin_username: Option<String>,
    admin_password: Option<String>,
    ssh_keys: Vec<String>,
    computer_name: Option<String>,
    custom_data: Option<String>,
    size: String,
    os_disk_size_gb: Option<u32>,
    os_disk_caching: Option<CachingType>,
    os_disk_storage_type: Option<DiskStorageType>,
    data_disks: Vec<DataDisk>,
}

impl GroupableDefinition for VirtualMachineDefinition {
    fn base_mut(&mut self) -> &mut DefinitionBase {
        &mut self.base
    }
}

impl VirtualMachineDefinition {
    pub fn with_existing_primary_network_interface(mut self, id: impl Into<String>) -> Self {
        self.primary_nic = Some(PrimaryNic::Existing(id.into()));
        self
    }

    pub fn with_existing_secondary_network_interface(mut self, id: impl Into<String>) -> Self {
        self.secondary_nics.push(id.into());
        self
    }

    /// Created before the VM, defaulting to the VM's region and group.
    pub fn with_new_primary_network_interface(mut self, nic: NetworkInterfaceDefinition) -> Self {
        self.primary_nic = Some(PrimaryNic::New(Box::new(nic)));
        self
    }

    pub fn with_existing_availability_set(mut self, id: impl Into<String>) -> Self {
        self.availability_set_id = Some(id.into());
        self
    }

    pub fn with_popular_linux_image(mut self, image: KnownLinuxImage) -> Self {
        self.image = Some(image.image_reference());
        self.os_type = Some(OsType::Linux);
        self
    }

    pub fn with_popular_windows_image(mut self, image: KnownWindowsImage) -> Self {
        self.image = Some(image.image_reference());
        self.os_type = Some(OsType::Windows);
        self
    }

    /// Marketplace image. Publishers with "Windows" in their name are
    /// treated as Windows images, everything else as Linux.
    pub fn with_image(
        mut self,
        publisher: impl Into<String>,
        offer: impl Into<String>,
        sku: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let publisher = publisher.into();
        self.os_type = Some(if publisher.to_ascii_lowercase().contains("windows") {
            OsType::Windows
        } else {
            OsType::Linux
        });
        self.image = Some(ImageReference {
            publisher: Some(publisher),
            offer: Some(offer.into()),
            sku: Some(sku.into()),
            version: Some(version.into()),
        });
        self
    }

    pub fn with_admin_username(mut self, username: impl Into<String>) -> Self {
        self.admin_username = Some(username.into());
        self
    }

    pub fn with_admin_password(mut self, password: impl Into<String>) -> Self {
        self.admin_password = Some(password.into());
        self
    }

    pub fn with_ssh_public_key(mut self, key: impl Into<String>) -> Self {
        self.ssh_keys.push(key.into());
        self
    }

    pub fn with_computer_name(mut self, name: impl Into<String>) -> Self {
        self.computer_name = Some(name.into());
        self
    }

    /// Raw custom data; encoded to base64 on the wire.
    pub fn with_custom_data(mut self, data: impl AsRef<[u8]>) -> Self {
        self.custom_data = Some(BASE64.encode(data));
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn with_os_disk_size_gb(mut self, size_gb: u32) -> Self {
        self.os_disk_size_gb = Some(size_gb);
        self
    }

    pub fn with_os_disk_caching(mut self, caching: CachingType) -> Self {
        self.os_disk_caching = Some(caching);
        self
    }

    pub fn with_os_disk_storage_account_type(mut self, kind: DiskStorageType) -> Self {
        self.os_disk_storage_type = Some(kind);
        self
    }

    /// Empty managed data disk on the lowest free LUN.
    pub fn with_new_data_disk(mut self, size_gb: u32) -> Self {
        let lun = next_lun(&self.data_disks);
        self.data_disks.push(empty_disk(lun, size_gb));
        self
    }

    /// Everything checkable without talking to Azure.
    fn validate(&self) -> AzureResult<OsType> {
        self.base.validate("virtual machine")?;
        let (Some(_), Some(os)) = (&self.image, self.os_type) else {
            return Err(AzureError::validation(format!(
                "virtual machine '{}': an image is required",
                self.base.name
            )));
        };
        if self.primary_nic.is_none() {
            return Err(AzureError::validation(format!(
                "virtual machine '{}': a primary network interface is required",
                self.base.name
            )));
        }
        if self.admin_username.as_deref().map_or(true, str::is_empty) {
            return Err(AzureError::validation(format!(
                "virtual machine '{}': an admin username is required",
                self.base.name
            )));
        }
        match os {
            OsType::Linux if self.admin_password.is_none() && self.ssh_keys.is_empty() => {
                return Err(AzureError::validation(format!(
                    "virtual machine '{}': a Linux VM needs a password or an SSH key",
                    self.base.name
                )))
            }
            OsType::Windows if self.admin_password.is_none() => {
                return Err(AzureError::validation(format!(
                    "virtual machine '{}': a Windows VM needs an admin password",
                    self.base.name
                )))
            }
            _ => {}
        }
        let computer_name = self.computer_name.as_deref().unwrap_or(&self.base.name);
        validate_computer_name(computer_name, os)?;
        Ok(os)
    }

    fn build(&self, primary_nic_id: &str) -> AzureResult<VirtualMachineInner> {
        let os = self.validate()?;
        let (region, _) = self.base.validate("virtual machine")?;
        let username = self.admin_username.clone().unwrap_or_default();

        let mut os_profile = OsProfile {
            computer_name: Some(self.computer_name.clone().unwrap_or_else(|| self.base.name.clone())),
            admin_username: Some(username.clone()),
            admin_password: self.admin_password.clone(),
            custom_data: self.custom_data.clone(),
            ..Default::default()
        };
        match os {
            OsType::Linux => {
                let ssh = (!self.ssh_keys.is_empty()).then(|| SshConfiguration {
                    public_keys: self
                        .ssh_keys
                        .iter()
                        .map(|key| SshPublicKey {
                            path: format!("/home/{username}/.ssh/authorized_keys"),
                            key_data: key.clone(),
                        })
                        .collect(),
                });
                os_profile.linux_configuration = Some(LinuxConfiguration {
                    disable_password_authentication: self.admin_password.is_none(),
                    ssh,
                });
            }
            OsType::Windows => {
                os_profile.windows_configuration = Some(WindowsConfiguration {
                    provision_vm_agent: Some(true),
                    enable_automatic_updates: Some(true),
                    time_zone: None,
                });
            }
        }

        let os_disk = OsDisk {
            os_type: Some(os.as_str().into()),
            create_option: Some("FromImage".into()),
            caching: self.os_disk_caching.map(|c| c.as_str().into()),
            disk_size_gb: self.os_disk_size_gb,
            managed_disk: self.os_disk_storage_type.map(|t| ManagedDiskParameters {
                id: None,
                storage_account_type: Some(t.as_str().into()),
            }),
            ..Default::default()
        };

        let mut nics = vec![NetworkInterfaceReference {
            id: primary_nic_id.to_string(),
            properties: Some(NetworkInterfaceReferenceProperties { primary: true }),
        }];
        nics.extend(self.secondary_nics.iter().map(|id| NetworkInterfaceReference {
            id: id.clone(),
            properties: Some(NetworkInterfaceReferenceProperties { primary: false }),
        }));

        Ok(VirtualMachineInner {
            name: self.base.name.clone(),
            location: region.to_string(),
            tags: self.base.tags.clone(),
            properties: VmProperties {
                hardware_profile: Some(HardwareProfile {
                    vm_size: Some(self.size.clone()),
                }),
                storage_profile: Some(StorageProfile {
                    image_reference: self.image.clone(),
                    os_disk: Some(os_disk),
                    data_disks: self.data_disks.clone(),
                }),
                os_profile: Some(os_profile),
                network_profile: Some(NetworkProfile {
                    network_interfaces: nics,
                }),
                availability_set: self.availability_set_id.clone().map(SubResource::new),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    pub async fn create(mut self) -> AzureResult<VirtualMachine> {
        self.validate()?;
        let (region, group) = self.base.validate("virtual machine")?;
        let (region, group) = (region.to_string(), group.to_string());
        if let Some(PrimaryNic::New(nic)) = self.primary_nic.as_mut() {
            nic.inherit_placement(&region, &group);
            nic.validate()?;
        }
        self.base.ensure_resource_group(&self.client).await?;

        let primary_nic_id = match self.primary_nic.take() {
            Some(PrimaryNic::Existing(id)) => id,
            Some(PrimaryNic::New(nic)) => nic.create().await?.inner().id.clone(),
            None => {
                return Err(AzureError::validation(format!(
                    "virtual machine '{}': a primary network interface is required",
                    self.base.name
                )))
            }
        };
        // validate() runs again inside build() and needs a NIC to be set
        self.primary_nic = Some(PrimaryNic::Existing(primary_nic_id.clone()));

        let body = self.build(&primary_nic_id)?;
        let inner = VIRTUAL_MACHINES
            .create_or_update(&self.client, &group, &self.base.name, &body)
            .await?;
        Ok(VirtualMachine {
            inner,
            client: self.client,
        })
    }
}

// ─── Update ─────────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "an update does nothing until apply() is awaited"]
pub struct VirtualMachineUpdate {
    client: AzureClient,
    inner: VirtualMachineInner,
}

impl TaggableUpdate for VirtualMachineUpdate {
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.inner.tags
    }
}

impl VirtualMachineUpdate {
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.inner
            .properties
            .hardware_profile
            .get_or_insert_with(HardwareProfile::default)
            .vm_size = Some(size.into());
        self
    }

    pub fn with_new_data_disk(mut self, size_gb: u32) -> Self {
        let storage = self
            .inner
            .properties
            .storage_profile
            .get_or_insert_with(StorageProfile::default);
        let lun = next_lun(&storage.data_disks);
        storage.data_disks.push(empty_disk(lun, size_gb));
        self
    }

    pub fn without_data_disk(mut self, lun: u32) -> Self {
        if let Some(storage) = self.inner.properties.storage_profile.as_mut() {
            storage.data_disks.retain(|d| d.lun != lun);
        }
        self
    }

    /// Body for the PUT: secrets are never sent back.
    fn build(mut self) -> Self {
        if let Some(os) = self.inner.properties.os_profile.as_mut() {
            os.admin_password = None;
            os.custom_data = None;
        }
        self
    }

    pub async fn apply(self) -> AzureResult<VirtualMachine> {
        let update = self.build();
        let inner = VIRTUAL_MACHINES
            .put_by_id(&update.client, &update.inner.id, &update.inner)
            .await?;
        Ok(VirtualMachine {
            inner,
            client: update.client,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AzureConfig;
    use crate::error::AzureErrorKind;
    use crate::resource::Resource;

    const NIC: &str = "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/networkInterfaces/nic1";

    fn vms() -> VirtualMachines {
        VirtualMachines::new(
            AzureClient::new(AzureConfig::new())
                .unwrap()
                .with_subscription("sub1"),
        )
    }

    fn linux_vm() -> VirtualMachineDefinition {
        vms()
            .define("web1")
            .with_region("East US")
            .with_existing_resource_group("rg1")
            .with_existing_primary_network_interface(NIC)
            .with_popular_linux_image(KnownLinuxImage::UbuntuServer22_04Lts)
            .with_admin_username("azureuser")
    }

    #[test]
    fn linux_with_ssh_key() {
        let body = linux_vm()
            .with_ssh_public_key("ssh-rsa AAAA test")
            .with_custom_data("#cloud-config\n")
            .with_os_disk_size_gb(64)
            .with_os_disk_storage_account_type(DiskStorageType::PremiumLrs)
            .build(NIC)
            .unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["location"], "eastus");
        let os = &json["properties"]["osProfile"];
        assert_eq!(os["computerName"], "web1");
        assert_eq!(os["customData"], "I2Nsb3VkLWNvbmZpZwo=");
        assert_eq!(os["linuxConfiguration"]["disablePasswordAuthentication"], true);
        assert_eq!(
            os["linuxConfiguration"]["ssh"]["publicKeys"][0]["path"],
            "/home/azureuser/.ssh/authorized_keys"
        );
        let disk = &json["properties"]["storageProfile"]["osDisk"];
        assert_eq!(disk["diskSizeGB"], 64);
        assert_eq!(disk["managedDisk"]["storageAccountType"], "Premium_LRS");
        assert_eq!(
            json["properties"]["networkProfile"]["networkInterfaces"][0]["properties"]["primary"],
            true
        );
        assert_eq!(json["properties"]["hardwareProfile"]["vmSize"], DEFAULT_VM_SIZE);
    }

    #[test]
    fn credentials_required_per_os() {
        let e = linux_vm().build(NIC).unwrap_err();
        assert!(e.message.contains("password or an SSH key"));
        assert!(linux_vm().with_admin_password("P@ssw0rd!").build(NIC).is_ok());

        let win = vms()
            .define("win1")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .with_existing_primary_network_interface(NIC)
            .with_popular_windows_image(KnownWindowsImage::WindowsServer2022Datacenter)
            .with_admin_username("admin1")
            .with_ssh_public_key("ssh-rsa AAAA");
        let e = win.build(NIC).unwrap_err();
        assert!(e.message.contains("Windows VM needs an admin password"));
    }

    #[test]
    fn missing_pieces_rejected() {
        let e = vms()
            .define("vm")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .with_admin_username("u")
            .with_admin_password("p")
            .with_existing_primary_network_interface(NIC)
            .build(NIC)
            .unwrap_err();
        assert!(e.message.contains("image"));

        let e = vms()
            .define("vm")
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .with_popular_linux_image(KnownLinuxImage::Debian12)
            .with_admin_username("u")
            .with_admin_password("p")
            .build(NIC)
            .unwrap_err();
        assert!(e.message.contains("primary network interface"));

        let e = vms()
            .define("vm")
            .with_existing_resource_group("rg1")
            .build(NIC)
            .unwrap_err();
        assert_eq!(e.kind, AzureErrorKind::Validation);
    }

    #[test]
    fn computer_name_limits() {
        let long = "a".repeat(16);
        let win = vms()
            .define(long.clone())
            .with_region("eastus")
            .with_existing_resource_group("rg1")
            .with_existing_primary_network_interface(NIC)
            .with_image("MicrosoftWindowsServer", "WindowsServer", "2019-Datacenter", "latest")
            .with_admin_username("admin1")
            .with_admin_password("P@ssw0rd!");
        assert!(win.build(NIC).unwrap_err().message.contains("1-15"));

        let ok = linux_vm()
            .with_admin_password("p")
            .with_computer_name(long)
            .build(NIC)
            .unwrap();
        assert_eq!(
            ok.properties.os_profile.unwrap().computer_name.as_deref(),
            Some("aaaaaaaaaaaaaaaa")
        );
        assert!(linux_vm()
            .with_admin_password("p")
            .with_computer_name("b".repeat(65))
            .build(NIC)
            .is_err());
    }

    #[test]
    fn data_disk_luns_fill_gaps() {
        let def = linux_vm()
            .with_admin_password("p")
            .with_new_data_disk(32)
            .with_new_data_disk(64);
        let luns: Vec<u32> = def.data_disks.iter().map(|d| d.lun).collect();
        assert_eq!(luns, vec![0, 1]);

        let vm = VirtualMachine {
            inner: def.build(NIC).unwrap(),
            client: vms().client,
        };
        let update = vm.update().without_data_disk(0).with_new_data_disk(128);
        let disks = &update.inner.properties.storage_profile.as_ref().unwrap().data_disks;
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[1].lun, 0);
        assert_eq!(disks[1].disk_size_gb, Some(128));
    }

    #[test]
    fn power_state_codes() {
        assert_eq!(PowerState::from_code("PowerState/running"), Some(PowerState::Running));
        assert_eq!(PowerState::from_code("PowerState/deallocated"), Some(PowerState::Deallocated));
        assert_eq!(PowerState::from_code("PowerState/weird"), Some(PowerState::Unknown));
        assert_eq!(PowerState::from_code("ProvisioningState/succeeded"), None);
    }

    fn sample() -> VirtualMachine {
        let inner: VirtualMachineInner = serde_json::from_str(&format!(
            r#"{{
                "id": "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/web1",
                "name": "web1",
                "location": "eastus",
                "properties": {{
                    "vmId": "1111-2222",
                    "hardwareProfile": {{"vmSize": "Standard_B2s"}},
                    "storageProfile": {{
                        "imageReference": {{"publisher": "Canonical", "offer": "0001-com-ubuntu-server-jammy", "sku": "22_04-lts-gen2", "version": "latest"}},
                        "osDisk": {{"osType": "Linux", "diskSizeGB": 30, "createOption": "FromImage"}},
                        "dataDisks": [{{"lun": 0, "diskSizeGB": 10, "createOption": "Empty"}}]
                    }},
                    "osProfile": {{"computerName": "web1", "adminUsername": "azureuser", "linuxConfiguration": {{"disablePasswordAuthentication": true}}}},
                    "networkProfile": {{"networkInterfaces": [
                        {{"id": "/nic0"}},
                        {{"id": "{NIC}", "properties": {{"primary": true}}}}
                    ]}},
                    "availabilitySet": {{"id": "/as1"}},
                    "instanceView": {{"statuses": [
                        {{"code": "ProvisioningState/succeeded"}},
                        {{"code": "PowerState/stopped"}}
                    ]}}
                }}
            }}"#
        ))
        .unwrap();
        VirtualMachine {
            inner,
            client: vms().client,
        }
    }

    #[test]
    fn wrapper_getters() {
        let vm = sample();
        assert_eq!(vm.size(), Some("Standard_B2s"));
        assert_eq!(vm.computer_name(), Some("web1"));
        assert_eq!(vm.admin_username(), Some("azureuser"));
        assert_eq!(vm.os_type(), Some(OsType::Linux));
        assert_eq!(vm.image_reference().unwrap().publisher.as_deref(), Some("Canonical"));
        assert_eq!(vm.os_disk_size_gb(), Some(30));
        assert_eq!(vm.data_disks().len(), 1);
        assert_eq!(vm.primary_network_interface_id(), Some(NIC));
        assert_eq!(vm.network_interface_ids(), vec!["/nic0", NIC]);
        assert_eq!(vm.availability_set_id(), Some("/as1"));
        assert_eq!(vm.vm_id(), Some("1111-2222"));
        assert_eq!(vm.power_state(), Some(PowerState::Stopped));
        assert_eq!(vm.resource_group_name().as_deref(), Some("rg1"));
    }

    #[test]
    fn update_never_sends_secrets() {
        let mut vm = sample();
        if let Some(os) = vm.inner.properties.os_profile.as_mut() {
            os.admin_password = Some("secret".into());
            os.custom_data = Some("ZGF0YQ==".into());
        }
        let update = vm.update().with_size("Standard_D4s_v3").with_tag("env", "prod").build();
        let json = serde_json::to_value(&update.inner).unwrap();
        assert!(json["properties"]["osProfile"].get("adminPassword").is_none());
        assert!(json["properties"]["osProfile"].get("customData").is_none());
        assert!(json["properties"].get("instanceView").is_none());
        assert_eq!(json["properties"]["hardwareProfile"]["vmSize"], "Standard_D4s_v3");
        assert_eq!(json["tags"]["env"], "prod");
    }

    #[test]
    fn action_urls() {
        let client = vms().client;
        let url = vm_action_url(&client, &sample().inner.id, "powerOff").unwrap();
        assert!(url.ends_with("/virtualMachines/web1/powerOff?api-version=2024-03-01"));
        assert!(vm_action_url(&client, NIC, "start").is_err());
    }
}
