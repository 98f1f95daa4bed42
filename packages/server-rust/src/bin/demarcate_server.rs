use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use demarcate_core::{coordinator_component, LocalCoordinator, NamingDirectory};
use demarcate_server::cli::ServerArgs;
use demarcate_server::network::{AppState, NetworkModule};
use demarcate_server::telemetry::init_tracing;
use demarcate_server::TransactionLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_tracing(args.json_logs)?;

    let filter_config = args
        .filter_config()
        .context("invalid transaction filter configuration")?;

    let coordinator = Arc::new(LocalCoordinator::new());
    let directory = Arc::new(NamingDirectory::new());
    directory.bind_component(
        &filter_config.coordinator_name,
        coordinator_component(coordinator.clone()),
    );

    let coordinator_name = filter_config.coordinator_name.clone();
    let transactions = TransactionLayer::new(filter_config, directory.clone())
        .context("transaction filter failed to start")?;
    let state = AppState::new(coordinator, directory, coordinator_name)?;

    let mut module = NetworkModule::new(args.network_config(), state, transactions);
    let port = module.start().await?;
    info!(port, "demarcate server listening");

    module
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await
}
