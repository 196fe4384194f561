use std::net::SocketAddr;

use clap::Parser;

/// Server port in the production path (spec.md §6); the client's historical
/// reserved port (42069) is unused since the client connects from an
/// ephemeral local port.
pub const SERVER_PORT: u16 = 8080;

#[derive(Parser, Debug, Clone)]
#[command(name = "qc-node-server", about = "quorumcast referendum node, server role")]
pub struct ServerConfig {
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Probability in [0,1] that an outbound datagram is dropped before send.
    #[arg(long, default_value_t = 0.0)]
    pub loss_constant: f64,

    /// Number of extra duplicate datagrams emitted after every primary send.
    #[arg(long, default_value_t = 0)]
    pub duplicates_mode: u8,

    /// Probability in [0,1] of flipping a locally computed answer.
    #[arg(long, default_value_t = 0.0)]
    pub defect_constant: f64,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "qc-node-client", about = "quorumcast referendum node, client role")]
pub struct ClientConfig {
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub server: SocketAddr,

    #[arg(long, default_value_t = 0.0)]
    pub loss_constant: f64,

    #[arg(long, default_value_t = 0)]
    pub duplicates_mode: u8,

    #[arg(long, default_value_t = 0.0)]
    pub defect_constant: f64,
}
