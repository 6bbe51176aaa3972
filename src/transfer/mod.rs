pub mod client;
pub mod server;

pub use client::{download_file, is_node_alive, remote_file_exists};
pub use server::TransferServer;
