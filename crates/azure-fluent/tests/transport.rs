//! Transport behaviour against a mock management endpoint: paging,
//! retries, error mapping, request IDs and token acquisition.

mod common;

use azure_fluent::prelude::*;
use azure_fluent::AzureErrorKind;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{mock_azure, mock_config, SUB, TOKEN};

fn vnet(name: &str) -> serde_json::Value {
    json!({
        "id": common::arm_id("rg1", "Microsoft.Network", "virtualNetworks", name),
        "name": name,
        "location": "eastus",
        "properties": {"addressSpace": {"addressPrefixes": ["10.0.0.0/16"]}}
    })
}

#[tokio::test]
async fn list_follows_next_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/subscriptions/{SUB}/providers/Microsoft.Network/virtualNetworks")))
        .and(query_param("api-version", "2024-01-01"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [vnet("a")],
            "nextLink": format!("{}/page2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [vnet("b")]})))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let networks = azure.networks().list().await.unwrap();
    let names: Vec<&str> = networks.iter().map(|n| n.name()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(networks[0].address_spaces(), vec!["10.0.0.0/16"]);
}

#[tokio::test]
async fn missing_value_is_an_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/subscriptions/{SUB}/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let vms = azure
        .virtual_machines()
        .list_by_resource_group("rg1")
        .await
        .unwrap();
    assert!(vms.is_empty());
}

#[tokio::test]
async fn http_failure_is_an_error_not_an_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/subscriptions/{SUB}/resourcegroups")))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": "AuthorizationFailed", "message": "no access"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let err = azure.resource_groups().list().await.unwrap_err();
    assert_eq!(err.kind, AzureErrorKind::Forbidden);
    assert_eq!(err.status_code, Some(403));
}

#[tokio::test]
async fn throttled_request_is_retried() {
    let server = MockServer::start().await;
    let group_path = format!("/subscriptions/{SUB}/resourcegroups/rg1");
    Mock::given(method("GET"))
        .and(path(group_path.as_str()))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(group_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": format!("/subscriptions/{SUB}/resourceGroups/rg1"),
            "name": "rg1",
            "location": "westus",
            "properties": {"provisioningState": "Succeeded"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let group = azure.resource_groups().get("rg1").await.unwrap();
    assert_eq!(group.region(), "westus");
    assert_eq!(group.provisioning_state(), Some("Succeeded"));
}

#[tokio::test]
async fn server_errors_give_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/subscriptions/{SUB}/resourcegroups/rg1")))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let err = azure.resource_groups().get("rg1").await.unwrap_err();
    assert_eq!(err.kind, AzureErrorKind::ServerError);
}

#[tokio::test]
async fn not_found_maps_to_false_for_contains() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/subscriptions/{SUB}/resourcegroups/ghost")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    assert!(!azure.resource_groups().contains("ghost").await.unwrap());
}

#[tokio::test]
async fn every_request_carries_a_client_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .and(header_exists("x-ms-client-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "/subscriptions/sub1", "subscriptionId": "sub1", "displayName": "Dev", "state": "Enabled"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let subs = azure.list_subscriptions().await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].display_name, "Dev");

    let requests = server.received_requests().await.unwrap();
    let id = requests[0]
        .headers
        .get("x-ms-client-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn token_is_acquired_once_and_reused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/subscriptions/{SUB}/resourcegroups")))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(2)
        .mount(&server)
        .await;

    let creds = AzureCredentials::new("tenant1", "app", "s3cret", SUB);
    let azure = Azure::new(mock_config(&server), creds).unwrap();
    assert!(!azure.client().is_authenticated().await);
    azure.resource_groups().list().await.unwrap();
    azure.resource_groups().list().await.unwrap();
    assert!(azure.client().is_authenticated().await);
}

#[tokio::test]
async fn rejected_credentials_fail_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "bad secret"
        })))
        .mount(&server)
        .await;

    let creds = AzureCredentials::new("tenant1", "app", "wrong", SUB);
    let err = Azure::authenticate_with(mock_config(&server), creds)
        .await
        .unwrap_err();
    assert_eq!(err.kind, AzureErrorKind::Auth);
}

#[tokio::test]
async fn revoked_token_is_renewed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(2)
        .mount(&server)
        .await;
    let groups_path = format!("/subscriptions/{SUB}/resourcegroups");
    Mock::given(method("GET"))
        .and(path(groups_path.as_str()))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": "InvalidAuthenticationToken", "message": "token revoked"}
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(groups_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let creds = AzureCredentials::new("tenant1", "app", "s3cret", SUB);
    let azure = Azure::new(mock_config(&server), creds).unwrap();
    assert!(azure.resource_groups().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn unauthorized_without_credentials_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/subscriptions/{SUB}/resourcegroups")))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let err = azure.resource_groups().list().await.unwrap_err();
    assert_eq!(err.kind, AzureErrorKind::Auth);
}

#[tokio::test]
async fn next_link_pointing_at_itself_stops_paging() {
    let server = MockServer::start().await;
    let list_path = format!("/subscriptions/{SUB}/providers/Microsoft.Network/virtualNetworks");
    Mock::given(method("GET"))
        .and(path(list_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [vnet("a")],
            "nextLink": format!("{}{}?api-version=2024-01-01", server.uri(), list_path)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let networks = azure.networks().list().await.unwrap();
    assert_eq!(networks.len(), 1);
}

#[tokio::test]
async fn available_sizes_are_listed_for_the_normalized_region() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/subscriptions/{SUB}/providers/Microsoft.Compute/locations/westus2/vmSizes"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"name": "Standard_B1s", "numberOfCores": 1, "memoryInMB": 1024, "maxDataDiskCount": 2},
                {"name": "Standard_D2s_v3", "numberOfCores": 2, "memoryInMB": 8192, "maxDataDiskCount": 4}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let azure = mock_azure(&server).await;
    let sizes = azure
        .virtual_machines()
        .list_available_sizes("West US 2")
        .await
        .unwrap();
    assert_eq!(sizes.len(), 2);
    assert_eq!(sizes[1].name, "Standard_D2s_v3");
    assert_eq!(sizes[1].number_of_cores, 2);
    assert_eq!(sizes[1].memory_in_mb, 8192);
}
