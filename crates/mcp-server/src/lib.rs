//! Modbus MCP 服务
//!
//! 把六个 Modbus 操作注册为 MCP 工具，经 stdio 上按行分帧的 JSON-RPC 提供给外部代理。

pub mod prompts;
pub mod server;
pub mod signal;
pub mod sink;
pub mod tools;
pub mod transport;

pub use server::ModbusMcpServer;
pub use signal::{wait_for_shutdown, ShutdownSignal};
pub use sink::{LevelFilter, NotificationSink};
pub use tools::{parse_request, tool_definitions, ToolHandler};
pub use transport::line_transport;
