//! azure-fluent samples.
//!
//! ```text
//! azure-fluent-samples [list]
//! azure-fluent-samples provision-demo <region>
//! ```
//!
//! Credentials come from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`,
//! `AZURE_CLIENT_SECRET` and `AZURE_SUBSCRIPTION_ID`. Set `RUST_LOG=debug`
//! to see every request.

use std::process::ExitCode;

use azure_fluent::network_interfaces::NetworkInterfaceDefinition;
use azure_fluent::network_security_groups::SecurityRuleDefinition;
use azure_fluent::prelude::*;
use azure_fluent::virtual_machines::KnownLinuxImage;
use log::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // log records from the library are bridged through tracing-log
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        None | Some("list") => run_list().await,
        Some("provision-demo") => match args.get(1) {
            Some(region) => run_provision_demo(region).await,
            None => {
                eprintln!("usage: azure-fluent-samples provision-demo <region>");
                return ExitCode::from(2);
            }
        },
        Some(other) => {
            eprintln!("unknown command '{other}'; expected 'list' or 'provision-demo <region>'");
            return ExitCode::from(2);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

// ─── list ───────────────────────────────────────────────────────────

async fn run_list() -> AzureResult<()> {
    let azure = Azure::from_env()?;
    info!("Subscription {}", azure.subscription_id()?);

    println!("Resource groups:");
    for group in azure.resource_groups().list().await? {
        println!("  {:<32} {}", group.name(), group.region());
    }

    println!("Virtual networks:");
    for network in azure.networks().list().await? {
        println!(
            "  {:<32} {:<12} {}",
            network.name(),
            network.region(),
            network.address_spaces().join(", ")
        );
        for subnet in network.subnets() {
            println!("    - {} {}", subnet.name(), subnet.address_prefix().unwrap_or("?"));
        }
    }

    println!("Virtual machines:");
    for vm in azure.virtual_machines().list().await? {
        println!(
            "  {:<32} {:<12} {}",
            vm.name(),
            vm.region(),
            vm.size().unwrap_or("?")
        );
    }
    Ok(())
}

// ─── provision-demo ─────────────────────────────────────────────────

async fn run_provision_demo(region: &str) -> AzureResult<()> {
    let azure = Azure::from_env()?;
    let suffix = &uuid_suffix();
    let group = format!("fluent-demo-{suffix}");

    let outcome = provision(&azure, region, &group, suffix).await;

    info!("Deleting resource group {group}");
    if let Err(e) = azure.resource_groups().delete(&group).await {
        warn!("teardown of {group} failed: {e}");
    }
    outcome
}

async fn provision(azure: &Azure, region: &str, group: &str, suffix: &str) -> AzureResult<()> {
    info!("Creating network in {region} / {group}");
    let nsg = azure
        .network_security_groups()
        .define(format!("nsg-{suffix}"))
        .with_region(region)
        .with_new_resource_group(group)
        .with_rule(
            SecurityRuleDefinition::new("allow-ssh")
                .allow_inbound()
                .from_any_address()
                .from_any_port()
                .to_any_address()
                .to_port(22),
        )
        .create()
        .await?;

    let network = azure
        .networks()
        .define(format!("vnet-{suffix}"))
        .with_region(region)
        .with_existing_resource_group(group)
        .with_address_space("10.20.0.0/16")
        .with_subnet("front", "10.20.1.0/24")
        .with_subnet_network_security_group("front", nsg.id())
        .create()
        .await?;

    let public_ip = azure
        .public_ip_addresses()
        .define(format!("pip-{suffix}"))
        .with_region(region)
        .with_existing_resource_group(group)
        .with_leaf_domain_label(format!("fluent-{suffix}"))
        .create()
        .await?;

    let nic: NetworkInterfaceDefinition = azure
        .network_interfaces()
        .define(format!("nic-{suffix}"))
        .with_existing_primary_network(network.id())
        .with_subnet("front")
        .with_existing_primary_public_ip(public_ip.id());

    let mut vm_def = azure
        .virtual_machines()
        .define(format!("vm-{suffix}"))
        .with_region(region)
        .with_existing_resource_group(group)
        .with_new_primary_network_interface(nic)
        .with_popular_linux_image(KnownLinuxImage::UbuntuServer22_04Lts)
        .with_admin_username("azureuser")
        .with_size("Standard_B1s")
        .with_tag("purpose", "azure-fluent demo");
    vm_def = match std::env::var("AZURE_DEMO_SSH_PUBLIC_KEY") {
        Ok(key) => vm_def.with_ssh_public_key(key),
        Err(_) => vm_def.with_admin_password(format!("Fl-{}!", uuid_suffix())),
    };

    let mut vm = vm_def.create().await?;
    info!(
        "Created VM {} ({}) with NIC {}",
        vm.name(),
        vm.size().unwrap_or("?"),
        vm.primary_network_interface_id().unwrap_or("?")
    );

    vm.refresh().await?;
    info!("Power state: {:?}", vm.power_state());
    vm.power_off().await?;
    vm.refresh().await?;
    info!("Power state after power off: {:?}", vm.power_state());
    Ok(())
}

fn uuid_suffix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
