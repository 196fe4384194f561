use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use qc_faults::FaultConfig;
use qc_node::config::ServerConfig;
use qc_referendum::ReferendumManager;
use qc_transport::{ApplicationDispatcher, ConversationTable, DatagramIo};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = ServerConfig::parse();
    let faults = Arc::new(FaultConfig::new(cfg.loss_constant, cfg.duplicates_mode, cfg.defect_constant));

    let socket = Arc::new(DatagramIo::bind(cfg.listen, faults.clone()).await?);
    info!(listen = %cfg.listen, "server listening");

    let table = ConversationTable::new();
    table.set_self_conv_id(qc_transport::generate_conversation_id());

    let manager = ReferendumManager::new(Arc::clone(&table), faults);
    let dispatcher: Arc<dyn ApplicationDispatcher> = manager;

    tokio::select! {
        r = qc_transport::run_listener(socket, table, dispatcher, true) => {
            if let Err(e) = r {
                warn!(error = %e, "listener exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown");
        }
    }

    Ok(())
}
