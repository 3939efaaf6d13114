pub mod network;
pub mod shell;

pub use network::{HostConfig, NetworkError, VirtualNetwork};
