pub mod global;
pub mod loader;

pub use global::{GatewayConfig, ServerConfig};
pub use loader::{ConfigLoader, ENV_VARS};
