// RPC front door: wire protocol, client identities, registry and analyzer client

pub mod client;
pub mod client_id;
pub mod logs;
pub mod protocol;
pub mod server;

pub use client::HostClient;
pub use client_id::ClientId;
pub use server::HostServer;
