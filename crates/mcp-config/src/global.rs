use mcp_logging::LoggingConfig;
use mcp_modbus::ModbusDefaults;
use serde::{Deserialize, Serialize};

/// 网关全局配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub modbus: ModbusDefaults,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

/// MCP 服务配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// initialize 返回的服务名
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Modbus MCP Server".to_string(),
            instructions: None,
        }
    }
}

impl GatewayConfig {
    /// 以 TOML 形式输出生效配置
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
