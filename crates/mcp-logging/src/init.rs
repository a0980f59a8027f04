//! 日志初始化
//!
//! stdout 承载 MCP 消息，所有日志一律写到 stderr。

use crate::config::{LogFormat, LoggingConfig};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("Failed to initialize logging: {0}")]
    InitError(String),
}

/// 构造过滤器；设置了 `RUST_LOG` 时优先使用
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(level)
        .map_err(|e| LoggingError::InvalidFilter(level.to_string(), e.to_string()))
}

/// 安装全局 subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(&config.level)?;

    let result = match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_ansi(false),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init(),
    };

    result.map_err(|e| LoggingError::InitError(e.to_string()))?;

    tracing::debug!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter() {
        std::env::remove_var("RUST_LOG");
        assert!(build_filter("info,mcp_modbus=debug").is_ok());

        let err = build_filter("info,mcp_modbus=loud").unwrap_err();
        assert!(matches!(err, LoggingError::InvalidFilter(..)));
    }

    #[test]
    fn test_init_twice_fails() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);

        // 同一进程内只能安装一次
        let err = init_logging(&config).unwrap_err();
        assert!(matches!(err, LoggingError::InitError(_)));
    }
}
