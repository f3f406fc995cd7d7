//! Check command implementation.

use services_metrics_exporter::collector::{LabelResolver, ServiceFilter};
use services_metrics_exporter::config::validate_effective_config;
use services_metrics_exporter::Config;

use crate::setup;

/// Validates the configuration, the label templates and runtime access.
pub async fn command_check(offline: bool, config: &Config) -> anyhow::Result<()> {
    println!("🔍 services-metrics-exporter - System Check");
    println!("============================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(()) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n🏷️  Checking label templates...");
    match LabelResolver::compile(&config.labels) {
        Ok(resolver) => println!(
            "   ✅ {} templates compiled, labels: {}",
            config.labels.len(),
            resolver.label_names().join(", ")
        ),
        Err(e) => {
            println!("   ❌ {}", e);
            all_ok = false;
        }
    }

    if offline {
        println!("\n🐳 Skipping container runtime checks (--offline)");
    } else {
        println!("\n🐳 Checking container runtime...");
        match setup::connect_runtime(config).await {
            Ok(runtime) => {
                println!("   ✅ Connected to the Docker engine");
                match runtime.list_containers().await {
                    Ok(inventory) => {
                        let running = inventory.iter().filter(|c| c.state.is_running()).count();
                        println!(
                            "   ✅ {} containers listed ({} running)",
                            inventory.len(),
                            running
                        );
                        match ServiceFilter::new(&config.services, config.collect_all(), &inventory)
                        {
                            Ok(filter) if filter.collect_all() => {
                                println!("   ✅ All containers will be collected")
                            }
                            Ok(_) => println!(
                                "   ✅ All {} configured services found",
                                config.services.len()
                            ),
                            Err(e) => {
                                println!("   ❌ {}", e);
                                all_ok = false;
                            }
                        }
                    }
                    Err(e) => {
                        println!("   ❌ Cannot list containers: {}", e);
                        all_ok = false;
                    }
                }
            }
            Err(e) => {
                println!("   ❌ {:#}", e);
                all_ok = false;
            }
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - exporter is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the output above");
        std::process::exit(1);
    }
}
