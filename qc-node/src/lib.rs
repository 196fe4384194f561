//! Shared node-lifecycle pieces used by both binaries (spec.md §6): CLI
//! configuration, the client-side PING/SYN handshake, and the operator menu.

pub mod cli;
pub mod config;
pub mod handshake;
