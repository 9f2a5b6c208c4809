//! Create / update / delete flows end to end against a mock management
//! endpoint, long-running operation polling included.

mod common;

use azure_fluent::network_security_groups::SecurityRuleDefinition;
use azure_fluent::prelude::*;
use azure_fluent::virtual_machines::{KnownLinuxImage, PowerState};
use azure_fluent::AzureErrorKind;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use common::{arm_id, mock_azure, SUB};

async fn mount_operation(server: &MockServer, op: &str, statuses: &[Value]) {
    let (last, pending) = statuses.split_last().expect("at least one status");
    for status in pending {
        Mock::given(method("GET"))
            .and(path(format!("/operations/{op}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(status))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/operations/{op}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(last))
        .mount(server)
        .await;
}

fn request_json(req: &Request) -> Value {
    serde_json::from_slice(&req.body).expect("JSON request body")
}

#[tokio::test]
async fn network_create_polls_async_operation_then_reads_back() {
    let server = MockServer::start().await;
    let vnet_id = arm_id("rg1", "Microsoft.Network", "virtualNetworks", "vnet1");
    let final_body = json!({
        "id": vnet_id,
        "name": "vnet1",
        "location": "westus2",
        "tags": {"env": "test"},
        "properties": {
            "provisioningState": "Succeeded",
            "addressSpace": {"addressPrefixes": ["10.1.0.0/16"]},
            "subnets": [
                {"id": format!("{vnet_id}/subnets/front"), "name": "front", "properties": {"addressPrefix": "10.1.1.0/24"}},
                {"id": format!("{vnet_id}/subnets/back"), "name": "back", "properties": {"addressPrefix": "10.1.2.0/24"}}
            ]
        }
    });

    Mock::given(method("PUT"))
        .and(path(format!("/subscriptions/{SUB}/resourcegroups/rg1")))
        .and(body_partial_json(json!({"location": "westus2"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": format!("/subscriptions/{SUB}/resourceGroups/rg1"), "name": "rg1", "location": "westus2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(vnet_id.as_str()))
        .and(body_partial_json(json!({
            "location": "westus2",
            "tags": {"env": "test"},
            "properties": {"addressSpace": {"addressPrefixes": ["10.1.0.0/16"]}}
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Azure-AsyncOperation", format!("{}/operations/op1", server.uri()).as_str())
                .set_body_json(json!({"id": vnet_id, "name": "vnet1", "properties": {"provisioningState": "Updating"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_operation(
        &server,
        "op1",
        &[json!({"status": "InProgress"}), json!({"status": "Succeeded"})],
    )
    .await;
    Mock::given(method("GET"))
        .and(path(vnet_id.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(final_body))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let network = azure
        .networks()
        .define("vnet1")
        .with_region("West US 2")
        .with_new_resource_group("rg1")
        .with_tag("env", "test")
        .with_address_space("10.1.0.0/16")
        .with_subnet("front", "10.1.1.0/24")
        .with_subnet("back", "10.1.2.0/24")
        .create()
        .await
        .unwrap();

    assert_eq!(network.id(), vnet_id);
    assert_eq!(network.provisioning_state(), Some("Succeeded"));
    assert_eq!(network.tags().get("env").map(String::as_str), Some("test"));
    assert_eq!(network.subnets().len(), 2);
    assert_eq!(
        network.subnet("back").and_then(|s| s.address_prefix()),
        Some("10.1.2.0/24")
    );

    let put = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.method.as_str() == "PUT" && r.url.path() == vnet_id)
        .unwrap();
    let sent = request_json(&put);
    assert_eq!(sent["properties"]["subnets"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn failed_operation_surfaces_as_error() {
    let server = MockServer::start().await;
    let pip_id = arm_id("rg1", "Microsoft.Network", "publicIPAddresses", "pip1");
    Mock::given(method("PUT"))
        .and(path(pip_id.as_str()))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Azure-AsyncOperation", format!("{}/operations/op2", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    mount_operation(
        &server,
        "op2",
        &[json!({"status": "Failed", "error": {"code": "QuotaExceeded", "message": "quota exceeded"}})],
    )
    .await;

    let azure = mock_azure(&server).await;
    let err = azure
        .public_ip_addresses()
        .define("pip1")
        .with_region("eastus")
        .with_existing_resource_group("rg1")
        .with_static_ip()
        .create()
        .await
        .unwrap_err();
    assert_eq!(err.kind, AzureErrorKind::OperationFailed);
    assert!(err.message.contains("quota exceeded"));
}

#[tokio::test]
async fn operation_that_never_finishes_times_out() {
    let server = MockServer::start().await;
    let nsg_id = arm_id("rg1", "Microsoft.Network", "networkSecurityGroups", "nsg1");
    Mock::given(method("PUT"))
        .and(path(nsg_id.as_str()))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Azure-AsyncOperation", format!("{}/operations/op3", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    mount_operation(&server, "op3", &[json!({"status": "InProgress"})]).await;

    let azure = mock_azure(&server).await;
    let err = azure
        .network_security_groups()
        .define("nsg1")
        .with_region("eastus")
        .with_existing_resource_group("rg1")
        .with_rule(
            SecurityRuleDefinition::new("ssh")
                .allow_inbound()
                .from_any_address()
                .from_any_port()
                .to_any_address()
                .to_port(22),
        )
        .create()
        .await
        .unwrap_err();
    assert_eq!(err.kind, AzureErrorKind::Timeout);

    let polls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/operations/op3")
        .count();
    assert_eq!(polls, 5);
}

#[tokio::test]
async fn vm_with_new_nic_creates_the_nic_first() {
    let server = MockServer::start().await;
    let nic_id = arm_id("rg1", "Microsoft.Network", "networkInterfaces", "vm1-nic");
    let vm_id = arm_id("rg1", "Microsoft.Compute", "virtualMachines", "vm1");
    let subnet_id = format!(
        "{}/subnets/front",
        arm_id("rg1", "Microsoft.Network", "virtualNetworks", "vnet1")
    );

    Mock::given(method("PUT"))
        .and(path(nic_id.as_str()))
        .and(body_partial_json(json!({"location": "eastus"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": nic_id, "name": "vm1-nic", "location": "eastus",
            "properties": {"ipConfigurations": [{"name": "primary", "properties": {"subnet": {"id": subnet_id}}}]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(vm_id.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": vm_id, "name": "vm1", "location": "eastus",
            "properties": {
                "vmId": "abcd",
                "hardwareProfile": {"vmSize": "Standard_B1s"},
                "networkProfile": {"networkInterfaces": [{"id": nic_id, "properties": {"primary": true}}]}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let nic = azure
        .network_interfaces()
        .define("vm1-nic")
        .with_existing_subnet(subnet_id.clone());
    let vm = azure
        .virtual_machines()
        .define("vm1")
        .with_region("eastus")
        .with_existing_resource_group("rg1")
        .with_new_primary_network_interface(nic)
        .with_popular_linux_image(KnownLinuxImage::UbuntuServer22_04Lts)
        .with_admin_username("azureuser")
        .with_ssh_public_key("ssh-rsa AAAAB3Nza test")
        .with_size("Standard_B1s")
        .create()
        .await
        .unwrap();

    assert_eq!(vm.size(), Some("Standard_B1s"));
    assert_eq!(vm.primary_network_interface_id(), Some(nic_id.as_str()));
    assert_eq!(vm.vm_id(), Some("abcd"));

    let requests = server.received_requests().await.unwrap();
    let paths: Vec<&str> = requests.iter().map(|r| r.url.path()).collect();
    assert_eq!(paths, vec![nic_id.as_str(), vm_id.as_str()]);
    let sent = request_json(&requests[1]);
    assert_eq!(sent["properties"]["networkProfile"]["networkInterfaces"][0]["id"], nic_id);
    assert_eq!(
        sent["properties"]["osProfile"]["linuxConfiguration"]["disablePasswordAuthentication"],
        true
    );
}

#[tokio::test]
async fn invalid_new_nic_fails_before_anything_is_created() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let nic = azure.network_interfaces().define("nic1");
    let err = azure
        .virtual_machines()
        .define("vm1")
        .with_region("eastus")
        .with_new_resource_group("rgnew")
        .with_new_primary_network_interface(nic)
        .with_popular_linux_image(KnownLinuxImage::UbuntuServer22_04Lts)
        .with_admin_username("azureuser")
        .with_ssh_public_key("ssh-rsa AAAAB3Nza test")
        .create()
        .await
        .unwrap_err();

    assert_eq!(err.kind, AzureErrorKind::Validation);
    assert!(err.message.contains("a subnet is required"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn vm_power_off_waits_and_refresh_reads_power_state() {
    let server = MockServer::start().await;
    let vm_id = arm_id("rg1", "Microsoft.Compute", "virtualMachines", "vm1");
    let vm_body = |power: &str| {
        json!({
            "id": vm_id, "name": "vm1", "location": "eastus",
            "properties": {"instanceView": {"statuses": [{"code": format!("PowerState/{power}")}]}}
        })
    };

    Mock::given(method("GET"))
        .and(path(vm_id.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(vm_body("running")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(vm_id.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(vm_body("stopped")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{vm_id}/powerOff")))
        .respond_with(
            ResponseTemplate::new(202).insert_header("Location", format!("{}/locations/l1", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/locations/l1"))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/locations/l1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let mut vm = azure.virtual_machines().get_by_id(&vm_id).await.unwrap();
    assert_eq!(vm.power_state(), Some(PowerState::Running));
    vm.power_off().await.unwrap();
    vm.refresh().await.unwrap();
    assert_eq!(vm.power_state(), Some(PowerState::Stopped));

    let polls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/locations/l1")
        .count();
    assert_eq!(polls, 2);
}

#[tokio::test]
async fn storage_update_patches_only_changes() {
    let server = MockServer::start().await;
    let st_id = arm_id("rg1", "Microsoft.Storage", "storageAccounts", "st1");
    let body = json!({
        "id": st_id, "name": "st1", "location": "eastus", "kind": "StorageV2",
        "sku": {"name": "Standard_LRS"},
        "properties": {"accessTier": "Hot"}
    });
    Mock::given(method("GET"))
        .and(path(st_id.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(st_id.as_str()))
        .and(body_partial_json(json!({"tags": {"env": "prod"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": st_id, "name": "st1", "location": "eastus", "kind": "StorageV2",
            "tags": {"env": "prod"},
            "sku": {"name": "Standard_LRS"},
            "properties": {"accessTier": "Hot"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let account = azure
        .storage_accounts()
        .get_by_resource_group("rg1", "st1")
        .await
        .unwrap();
    let updated = account.update().with_tag("env", "prod").apply().await.unwrap();
    assert_eq!(updated.tags().get("env").map(String::as_str), Some("prod"));

    let patch = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.method.as_str() == "PATCH")
        .unwrap();
    let sent = request_json(&patch);
    assert!(sent.get("properties").is_none());
    assert!(sent.get("sku").is_none());
}

#[tokio::test]
async fn delete_by_id_waits_for_location() {
    let server = MockServer::start().await;
    let lb_id = arm_id("rg1", "Microsoft.Network", "loadBalancers", "lb1");
    Mock::given(method("DELETE"))
        .and(path(lb_id.as_str()))
        .respond_with(
            ResponseTemplate::new(202).insert_header("Location", format!("{}/locations/d1", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/locations/d1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    azure.load_balancers().delete_by_id(&lb_id).await.unwrap();

    let err = azure
        .load_balancers()
        .delete_by_id("/subscriptions/sub1/resourceGroups/rg1")
        .await
        .unwrap_err();
    assert_eq!(err.kind, AzureErrorKind::InvalidResourceId);
}
