//! Endpoint store subcommands.

use std::path::Path;

use tracing::info;

use apiwatch_engine::{EndpointRepository, MonitoredEndpoint};

use crate::cli::EndpointAction;

/// Handle endpoint subcommands.
pub(crate) async fn handle_endpoint_command(
    action: EndpointAction,
    repository: &dyn EndpointRepository,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        EndpointAction::List { format } => list_endpoints(repository, &format).await,
        EndpointAction::Import { file } => import_endpoints(repository, &file).await,
    }
}

async fn list_endpoints(
    repository: &dyn EndpointRepository,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let endpoints = repository.find_all().await?;

    if endpoints.is_empty() {
        println!("No endpoints stored.");
        return Ok(());
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&endpoints)?),
        _ => {
            println!("{:<24} {:<14} {:<9} {:<8} {}", "NAME", "KIND", "STATUS", "BEHIND", "LINK");
            println!("{}", "-".repeat(100));
            for endpoint in &endpoints {
                let status = if endpoint.is_inactive() { "inactive" } else { "active" };
                let behind = endpoint
                    .blocks_behind
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<24} {:<14} {:<9} {:<8} {}",
                    endpoint.name, endpoint.kind, status, behind, endpoint.link
                );
            }
        }
    }
    Ok(())
}

async fn import_endpoints(
    repository: &dyn EndpointRepository,
    file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let endpoints: Vec<MonitoredEndpoint> = serde_json::from_str(&content)?;

    for endpoint in endpoints {
        let endpoint = endpoint.normalized();
        repository.save(&endpoint).await?;
        info!(endpoint = %endpoint.name, kind = %endpoint.kind, "Imported endpoint");
    }
    println!("Imported endpoints from {}", file.display());
    Ok(())
}
