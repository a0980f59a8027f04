use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Modbus 网关错误类型
#[derive(Error, Debug)]
pub enum ModbusError {
    /// 配置错误（未知传输类型、非法串口参数等）
    #[error("Configuration error: {0}")]
    Config(String),

    /// 连接错误（建连失败、连接后状态检查失败、超时、IO 错误）
    #[error("Connection error: {0}")]
    Connection(String),

    /// 协议错误（设备异常响应、响应不完整）
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 本地参数校验错误
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result 类型别名
pub type ModbusResult<T> = std::result::Result<T, ModbusError>;

/// 失败分类，调用方据此断言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Connection,
    Protocol,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Connection => "connection_error",
            Self::Protocol => "protocol_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ModbusError {
    pub fn config(msg: impl Into<String>) -> Self {
        ModbusError::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        ModbusError::Connection(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        ModbusError::Protocol(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ModbusError::Validation(msg.into())
    }

    /// 配置错误在调用层面归为连接错误
    pub fn kind(&self) -> FailureKind {
        match self {
            ModbusError::Config(_) | ModbusError::Connection(_) => FailureKind::Connection,
            ModbusError::Protocol(_) => FailureKind::Protocol,
            ModbusError::Validation(_) => FailureKind::Validation,
        }
    }

    /// 不带分类前缀的原始描述
    pub fn detail(&self) -> &str {
        match self {
            ModbusError::Config(msg)
            | ModbusError::Connection(msg)
            | ModbusError::Protocol(msg)
            | ModbusError::Validation(msg) => msg,
        }
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_is_connection_failure() {
        let err = ModbusError::config("Invalid transport: bluetooth");
        assert_eq!(err.kind(), FailureKind::Connection);
        assert_eq!(err.detail(), "Invalid transport: bluetooth");
        assert_eq!(err.to_string(), "Configuration error: Invalid transport: bluetooth");
    }

    #[test]
    fn test_io_error_maps_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: ModbusError = io.into();
        assert_eq!(err.kind(), FailureKind::Connection);
    }

    #[test]
    fn test_failure_kind_serialization() {
        let json = serde_json::to_string(&FailureKind::Protocol).unwrap();
        assert_eq!(json, "\"protocol\"");
        assert_eq!(FailureKind::Validation.to_string(), "validation_error");
    }
}
