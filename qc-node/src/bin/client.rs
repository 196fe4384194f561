use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use qc_faults::FaultConfig;
use qc_node::config::ClientConfig;
use qc_referendum::ReferendumManager;
use qc_transport::{ApplicationDispatcher, ConversationTable, DatagramIo};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = ClientConfig::parse();
    let faults = Arc::new(FaultConfig::new(cfg.loss_constant, cfg.duplicates_mode, cfg.defect_constant));

    let socket = Arc::new(DatagramIo::connect(cfg.server, faults.clone()).await?);
    info!(server = %cfg.server, "connecting");

    let table = ConversationTable::new();
    let manager = ReferendumManager::new(Arc::clone(&table), faults.clone());
    let dispatcher: Arc<dyn ApplicationDispatcher> = manager;

    tokio::spawn(qc_transport::run_listener(
        Arc::clone(&socket),
        Arc::clone(&table),
        Arc::clone(&dispatcher),
        false,
    ));

    qc_node::handshake::connect(&socket, &table, cfg.server).await;

    let conv = table
        .get(table.self_conv_id())
        .await
        .context("handshake completed but no conversation was registered")?;
    conv.send_hello().await;

    tokio::select! {
        _ = qc_node::cli::run(conv, faults) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown");
        }
    }

    Ok(())
}
