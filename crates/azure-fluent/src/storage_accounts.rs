//! Azure Storage Accounts – CRUD, name availability and access keys.

use log::debug;
use serde_json::{json, Map, Value};

use crate::client::{with_api_version, AzureClient};
use crate::error::{AzureError, AzureResult};
use crate::resource::{
    impl_resource, ApiFamily, ArmType, DefinitionBase, GroupableDefinition, TaggableUpdate,
};
use crate::types::{
    NameAvailability, Sku, StorageAccountInner, StorageAccountKey, StorageAccountProperties,
    StorageEndpoints, StorageKeyList, Tags,
};

pub(crate) const STORAGE_ACCOUNTS: ArmType =
    ArmType::new("Microsoft.Storage", "storageAccounts", ApiFamily::Storage);

// ─── Enums ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageSku {
    StandardLrs,
    StandardGrs,
    StandardRagrs,
    StandardZrs,
    StandardGzrs,
    StandardRagzrs,
    PremiumLrs,
    PremiumZrs,
}

impl StorageSku {
    const ALL: [StorageSku; 8] = [
        StorageSku::StandardLrs,
        StorageSku::StandardGrs,
        StorageSku::StandardRagrs,
        StorageSku::StandardZrs,
        StorageSku::StandardGzrs,
        StorageSku::StandardRagzrs,
        StorageSku::PremiumLrs,
        StorageSku::PremiumZrs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageSku::StandardLrs => "Standard_LRS",
            StorageSku::StandardGrs => "Standard_GRS",
            StorageSku::StandardRagrs => "Standard_RAGRS",
            StorageSku::StandardZrs => "Standard_ZRS",
            StorageSku::StandardGzrs => "Standard_GZRS",
            StorageSku::StandardRagzrs => "Standard_RAGZRS",
            StorageSku::PremiumLrs => "Premium_LRS",
            StorageSku::PremiumZrs => "Premium_ZRS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    StorageV2,
    Storage,
    BlobStorage,
    FileStorage,
    BlockBlobStorage,
}

impl StorageKind {
    const ALL: [StorageKind; 5] = [
        StorageKind::StorageV2,
        StorageKind::Storage,
        StorageKind::BlobStorage,
        StorageKind::FileStorage,
        StorageKind::BlockBlobStorage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::StorageV2 => "StorageV2",
            StorageKind::Storage => "Storage",
            StorageKind::BlobStorage => "BlobStorage",
            StorageKind::FileStorage => "FileStorage",
            StorageKind::BlockBlobStorage => "BlockBlobStorage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    Hot,
    Cool,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Hot => "Hot",
            AccessTier::Cool => "Cool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Some(AccessTier::Hot),
            "cool" => Some(AccessTier::Cool),
            _ => None,
        }
    }
}

/// Storage account names: 3-24 characters, lowercase letters and digits.
pub fn validate_account_name(name: &str) -> AzureResult<()> {
    let len_ok = (3..=24).contains(&name.len());
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if len_ok && chars_ok {
        Ok(())
    } else {
        Err(AzureError::validation(format!(
            "invalid storage account name '{name}': use 3-24 lowercase letters or digits"
        )))
    }
}

// ─── REST operations ────────────────────────────────────────────────

pub async fn check_name_availability(
    client: &AzureClient,
    name: &str,
) -> AzureResult<NameAvailability> {
    let url = client.subscription_url("/providers/Microsoft.Storage/checkNameAvailability")?;
    let url = with_api_version(&url, &client.config().api_version_storage);
    debug!("check_name_availability({}) → {}", name, url);
    let body = json!({ "name": name, "type": STORAGE_ACCOUNTS.full_name() });
    client.post_json(&url, &body).await
}

fn action_url(client: &AzureClient, id: &str, action: &str) -> AzureResult<String> {
    let parsed = STORAGE_ACCOUNTS.parse_id(id)?;
    let url = client.arm_url(&format!("{}/{}", parsed, action));
    Ok(with_api_version(&url, &client.config().api_version_storage))
}

pub async fn list_keys(client: &AzureClient, id: &str) -> AzureResult<Vec<StorageAccountKey>> {
    let url = action_url(client, id, "listKeys")?;
    let keys: StorageKeyList = client.post_json(&url, &json!({})).await?;
    Ok(keys.keys)
}

pub async fn regenerate_key(
    client: &AzureClient,
    id: &str,
    key_name: &str,
) -> AzureResult<Vec<StorageAccountKey>> {
    let url = action_url(client, id, "regenerateKey")?;
    let keys: StorageKeyList = client
        .post_json(&url, &json!({ "keyName": key_name }))
        .await?;
    Ok(keys.keys)
}

// ─── Collection ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StorageAccounts {
    client: AzureClient,
}

impl StorageAccounts {
    pub(crate) fn new(client: AzureClient) -> Self {
        Self { client }
    }

    fn wrap(&self, inner: StorageAccountInner) -> StorageAccount {
        StorageAccount {
            inner,
            client: self.client.clone(),
        }
    }

    pub async fn list(&self) -> AzureResult<Vec<StorageAccount>> {
        let items = STORAGE_ACCOUNTS.list(&self.client).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn list_by_resource_group(&self, group: &str) -> AzureResult<Vec<StorageAccount>> {
        let items = STORAGE_ACCOUNTS.list_by_group(&self.client, group).await?;
        Ok(items.into_iter().map(|i| self.wrap(i)).collect())
    }

    pub async fn get_by_resource_group(&self, group: &str, name: &str) -> AzureResult<StorageAccount> {
        let inner = STORAGE_ACCOUNTS.get(&self.client, group, name).await?;
        Ok(self.wrap(inner))
    }

    pub async fn get_by_id(&self, id: &str) -> AzureResult<StorageAccount> {
        let inner = STORAGE_ACCOUNTS.get_by_id(&self.client, id).await?;
        Ok(self.wrap(inner))
    }

    pub async fn check_name_availability(&self, name: &str) -> AzureResult<NameAvailability> {
        check_name_availability(&self.client, name).await
    }

    pub fn define(&self, name: impl Into<String>) -> StorageAccountDefinition {
        StorageAccountDefinition {
            client: self.client.clone(),
            base: DefinitionBase::new(name),
            sku: StorageSku::StandardLrs,
            kind: StorageKind::StorageV2,
            access_tier: None,
            https_only: None,
        }
    }

    pub async fn delete_by_resource_group(&self, group: &str, name: &str) -> AzureResult<()> {
        STORAGE_ACCOUNTS.delete(&self.client, group, name).await
    }

    pub async fn delete_by_id(&self, id: &str) -> AzureResult<()> {
        STORAGE_ACCOUNTS.delete_by_id(&self.client, id).await
    }
}

// ─── Wrapper ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StorageAccount {
    inner: StorageAccountInner,
    client: AzureClient,
}

impl_resource!(StorageAccount, STORAGE_ACCOUNTS);

impl StorageAccount {
    pub fn sku(&self) -> Option<StorageSku> {
        self.inner
            .sku
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .and_then(StorageSku::parse)
    }

    pub fn kind(&self) -> Option<StorageKind> {
        self.inner.kind.as_deref().and_then(StorageKind::parse)
    }

    pub fn access_tier(&self) -> Option<AccessTier> {
        self.inner
            .properties
            .access_tier
            .as_deref()
            .and_then(AccessTier::parse)
    }

    pub fn creation_time(&self) -> Option<&str> {
        self.inner.properties.creation_time.as_deref()
    }

    pub fn primary_location(&self) -> Option<&str> {
        self.inner.properties.primary_location.as_deref()
    }

    pub fn endpoints(&self) -> Option<&StorageEndpoints> {
        self.inner.properties.primary_endpoints.as_ref()
    }

    pub fn https_traffic_only(&self) -> bool {
        self.inner
            .properties
            .supports_https_traffic_only
            .unwrap_or(true)
    }

    pub fn provisioning_state(&self) -> Option<&str> {
        self.inner.properties.provisioning_state.as_deref()
    }

    pub async fn keys(&self) -> AzureResult<Vec<StorageAccountKey>> {
        list_keys(&self.client, &self.inner.id).await
    }

    /// Regenerate `key1` or `key2`; returns the new key set.
    pub async fn regenerate_key(&self, key_name: &str) -> AzureResult<Vec<StorageAccountKey>> {
        regenerate_key(&self.client, &self.inner.id, key_name).await
    }

    pub fn inner(&self) -> &StorageAccountInner {
        &self.inner
    }

    pub fn into_inner(self) -> StorageAccountInner {
        self.inner
    }

    pub async fn refresh(&mut self) -> AzureResult<()> {
        self.inner = STORAGE_ACCOUNTS.get_by_id(&self.client, &self.inner.id).await?;
        Ok(())
    }

    pub fn update(&self) -> StorageAccountUpdate {
        StorageAccountUpdate {
            client: self.client.clone(),
            id: self.inner.id.clone(),
            tags: self.inner.tags.clone(),
            sku: None,
            access_tier: None,
            https_only: None,
        }
    }
}

// ─── Definition ─────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "a definition does nothing until create() is awaited"]
pub struct StorageAccountDefinition {
    client: AzureClient,
    base: DefinitionBase,
    sku: StorageSku,
    kind: StorageKind,
    access_tier: Option<AccessTier>,
    https_only: Option<bool>,
}

impl GroupableDefinition for StorageAccountDefinition {
    fn base_mut(&mut self) -> &mut DefinitionBase {
        &mut self.base
    }
}

impl StorageAccountDefinition {
    pub fn with_sku(mut self, sku: StorageSku) -> Self {
        self.sku = sku;
        self
    }

    pub fn with_kind(mut self, kind: StorageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_access_tier(mut self, tier: AccessTier) -> Self {
        self.access_tier = Some(tier);
        self
    }

    pub fn with_only_https_traffic(mut self, enabled: bool) -> Self {
        self.https_only = Some(enabled);
        self
    }

    fn build(&self) -> AzureResult<StorageAccountInner> {
        validate_account_name(&self.base.name)?;
        let (region, _) = self.base.validate("storage account")?;
        Ok(StorageAccountInner {
            location: region.to_string(),
            kind: Some(self.kind.as_str().into()),
            tags: self.base.tags.clone(),
            sku: Some(Sku::named(self.sku.as_str())),
            properties: StorageAccountProperties {
                access_tier: self.access_tier.map(|t| t.as_str().into()),
                supports_https_traffic_only: self.https_only,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    pub async fn create(self) -> AzureResult<StorageAccount> {
        let body = self.build()?;
        self.base.ensure_resource_group(&self.client).await?;
        let (_, group) = self.base.validate("storage account")?;
        let inner = STORAGE_ACCOUNTS
            .create_or_update(&self.client, group, &self.base.name, &body)
            .await?;
        Ok(StorageAccount {
            inner,
            client: self.client,
        })
    }
}

// ─── Update ─────────────────────────────────────────────────────────

#[derive(Debug)]
#[must_use = "an update does nothing until apply() is awaited"]
pub struct StorageAccountUpdate {
    client: AzureClient,
    id: String,
    tags: Tags,
    sku: Option<StorageSku>,
    access_tier: Option<AccessTier>,
    https_only: Option<bool>,
}

impl TaggableUpdate for StorageAccountUpdate {
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }
}

impl StorageAccountUpdate {
    pub fn with_sku(mut self, sku: StorageSku) -> Self {
        self.sku = Some(sku);
        self
    }

    pub fn with_access_tier(mut self, tier: AccessTier) -> Self {
        self.access_tier = Some(tier);
        self
    }

    pub fn with_only_https_traffic(mut self, enabled: bool) -> Self {
        self.https_only = Some(enabled);
        self
    }

    /// PATCH body carrying only what changed (tags are always sent).
    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("tags".into(), json!(self.tags));
        if let Some(sku) = self.sku {
            body.insert("sku".into(), json!({ "name": sku.as_str() }));
        }
        let mut props = Map::new();
        if let Some(tier) = self.access_tier {
            props.insert("accessTier".into(), json!(tier.as_str()));
        }
        if let Some(https) = self.https_only {
            props.insert("supportsHttpsTrafficOnly".into(), json!(https));
        }
        if !props.is_empty() {
            body.insert("properties".into(), Value::Object(props));
        }
        Value::Object(body)
    }

    pub async fn apply(self) -> AzureResult<StorageAccount> {
        let body = self.body();
        let inner = STORAGE_ACCOUNTS
            .patch_by_id(&self.client, &self.id, &body)
            .await?;
        Ok(StorageAccount {
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

    fn accounts() -> StorageAccounts {
        StorageAccounts::new(
            AzureClient::new(AzureConfig::new())
                .unwrap()
                .with_subscription("sub1"),
        )
    }

    #[test]
    fn account_name_rule() {
        assert!(validate_account_name("abc").is_ok());
        assert!(validate_account_name("mystorage2024").is_ok());
        assert!(validate_account_name("ab").is_err());
        assert!(validate_account_name("MyStorage").is_err());
        assert!(validate_account_name("my-storage").is_err());
        assert!(validate_account_name(&"a".repeat(25)).is_err());
    }

    #[test]
    fn definition_defaults() {
        let body = accounts()
            .define("logs01")
            .with_region("westus2")
            .with_existing_resource_group("rg1")
            .build()
            .unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sku"]["name"], "Standard_LRS");
        assert_eq!(json["kind"], "StorageV2");
        assert!(json["properties"].get("accessTier").is_none());
    }

    #[test]
    fn definition_rejects_bad_name_first() {
        let e = accounts()
            .define("Bad_Name")
            .with_region("westus2")
            .with_existing_resource_group("rg1")
            .build()
            .unwrap_err();
        assert_eq!(e.kind, AzureErrorKind::Validation);
        assert!(e.message.contains("Bad_Name"));
    }

    #[test]
    fn definition_options() {
        let body = accounts()
            .define("logs01")
            .with_region("westus2")
            .with_existing_resource_group("rg1")
            .with_sku(StorageSku::StandardRagrs)
            .with_kind(StorageKind::BlobStorage)
            .with_access_tier(AccessTier::Cool)
            .with_only_https_traffic(true)
            .build()
            .unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sku"]["name"], "Standard_RAGRS");
        assert_eq!(json["kind"], "BlobStorage");
        assert_eq!(json["properties"]["accessTier"], "Cool");
        assert_eq!(json["properties"]["supportsHttpsTrafficOnly"], true);
    }

    #[test]
    fn wrapper_getters() {
        let json = r#"{"id":"/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Storage/storageAccounts/logs01","name":"logs01","location":"westus2","kind":"StorageV2","sku":{"name":"Standard_GRS","tier":"Standard"},"properties":{"provisioningState":"Succeeded","creationTime":"2024-01-01T00:00:00Z","primaryLocation":"westus2","accessTier":"Hot","primaryEndpoints":{"blob":"https://logs01.blob.core.windows.net/"}}}"#;
        let acct = StorageAccount {
            inner: serde_json::from_str(json).unwrap(),
            client: accounts().client,
        };
        assert_eq!(acct.sku(), Some(StorageSku::StandardGrs));
        assert_eq!(acct.kind(), Some(StorageKind::StorageV2));
        assert_eq!(acct.access_tier(), Some(AccessTier::Hot));
        assert_eq!(acct.primary_location(), Some("westus2"));
        assert!(acct.https_traffic_only());
        assert_eq!(
            acct.endpoints().and_then(|e| e.blob.as_deref()),
            Some("https://logs01.blob.core.windows.net/")
        );
    }

    #[test]
    fn update_body_only_sends_changes() {
        let acct = StorageAccount {
            inner: StorageAccountInner {
                id: "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Storage/storageAccounts/a1".into(),
                ..Default::default()
            },
            client: accounts().client,
        };
        let body = acct.update().with_access_tier(AccessTier::Cool).body();
        assert_eq!(body["properties"]["accessTier"], "Cool");
        assert!(body.get("sku").is_none());
        assert!(body["properties"].get("supportsHttpsTrafficOnly").is_none());
    }

    #[test]
    fn key_action_url() {
        let c = accounts().client;
        let url = action_url(
            &c,
            "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Storage/storageAccounts/a1",
            "listKeys",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://management.azure.com/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Storage/storageAccounts/a1/listKeys?api-version=2023-05-01"
        );
    }
}
