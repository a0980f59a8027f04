use anyhow::{anyhow, Context, Result};
use config::{Config, File, FileFormat};
use mcp_modbus::TransportKind;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::GatewayConfig;

/// 环境变量到配置键的映射
pub const ENV_VARS: &[(&str, &str)] = &[
    ("MODBUS_TYPE", "modbus.transport"),
    ("MODBUS_HOST", "modbus.host"),
    ("MODBUS_PORT", "modbus.port"),
    ("MODBUS_SERIAL_PORT", "modbus.serial_port"),
    ("MODBUS_BAUDRATE", "modbus.baud_rate"),
    ("MODBUS_PARITY", "modbus.parity"),
    ("MODBUS_STOPBITS", "modbus.stop_bits"),
    ("MODBUS_BYTESIZE", "modbus.byte_size"),
    ("MODBUS_TIMEOUT", "modbus.timeout"),
    ("MODBUS_DEFAULT_SLAVE_ID", "modbus.default_slave_id"),
    ("LOG_LEVEL", "logging.level"),
    ("LOG_FORMAT", "logging.format"),
];

enum ValueType {
    Text,
    Integer,
    Float,
}

fn value_type(key: &str) -> ValueType {
    match key {
        "modbus.port"
        | "modbus.baud_rate"
        | "modbus.stop_bits"
        | "modbus.byte_size"
        | "modbus.default_slave_id" => ValueType::Integer,
        "modbus.timeout" => ValueType::Float,
        _ => ValueType::Text,
    }
}

/// 配置加载器
///
/// 优先级由低到高：内置默认值、TOML 文件、环境变量、命令行覆盖。
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    overrides: Vec<(String, String)>,
}

impl ConfigLoader {
    /// 创建配置加载器
    pub fn new<P: AsRef<Path>>(config_file: Option<P>) -> Self {
        Self {
            config_file: config_file.map(|p| p.as_ref().to_path_buf()),
            overrides: Vec::new(),
        }
    }

    /// 添加最高优先级的覆盖项，键形如 `logging.level`
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// 从进程环境加载
    pub fn load(&self) -> Result<GatewayConfig> {
        self.load_with_env(std::env::vars())
    }

    /// 使用给定的环境变量集合加载
    pub fn load_with_env<I>(&self, vars: I) -> Result<GatewayConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: HashMap<String, String> = vars.into_iter().collect();

        let mut builder =
            Config::builder().add_source(Config::try_from(&GatewayConfig::default())?);

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(anyhow!("Config file not found: {}", path.display()));
            }
            builder = builder.add_source(File::new(
                path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ));
        }

        for (var, key) in ENV_VARS {
            if let Some(raw) = env.get(*var) {
                builder = set_typed(builder, key, raw)
                    .with_context(|| format!("Invalid value for {}: {:?}", var, raw))?;
            }
        }

        for (key, raw) in &self.overrides {
            builder = set_typed(builder, key, raw)
                .with_context(|| format!("Invalid override for {}: {:?}", key, raw))?;
        }

        let config: GatewayConfig = builder
            .build()?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(config)
    }

    /// 加载并校验
    pub fn load_validated(&self) -> Result<GatewayConfig> {
        let config = self.load()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// 验证配置
    ///
    /// 单次调用中出现的未知传输类型不在此处拦截，按连接错误返回给调用方。
    pub fn validate(config: &GatewayConfig) -> Result<()> {
        let modbus = &config.modbus;

        modbus
            .transport
            .parse::<TransportKind>()
            .map_err(|e| anyhow!("{}", e.detail()))?;
        modbus
            .timeout_duration()
            .map_err(|e| anyhow!("{}", e.detail()))?;
        modbus
            .serial_settings()
            .map_err(|e| anyhow!("{}", e.detail()))?;

        if modbus.host.trim().is_empty() {
            return Err(anyhow!("modbus.host must not be empty"));
        }

        if config.logging.level.trim().is_empty() {
            return Err(anyhow!("logging.level must not be empty"));
        }

        Ok(())
    }
}

fn set_typed(
    builder: config::builder::ConfigBuilder<config::builder::DefaultState>,
    key: &str,
    raw: &str,
) -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>> {
    let raw = raw.trim();
    let builder = match value_type(key) {
        ValueType::Integer => {
            let value: i64 = raw.parse().context("expected an integer")?;
            builder.set_override(key, value)?
        }
        ValueType::Float => {
            let value: f64 = raw.parse().context("expected a number")?;
            builder.set_override(key, value)?
        }
        ValueType::Text => builder.set_override(key, raw.to_string())?,
    };
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_logging::LogFormat;
    use std::fs;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_defaults() {
        let loader = ConfigLoader::new(None::<&Path>);
        let config = loader.load_with_env(Vec::new()).unwrap();

        assert_eq!(config, GatewayConfig::default());
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("gateway.toml");
        fs::write(
            &path,
            r#"
[modbus]
transport = "udp"
host = "192.168.1.50"
port = 1502
timeout = 2.5

[logging]
format = "json"
"#,
        )
        .unwrap();

        let config = ConfigLoader::new(Some(&path))
            .load_with_env(Vec::new())
            .unwrap();

        assert_eq!(config.modbus.transport, "udp");
        assert_eq!(config.modbus.host, "192.168.1.50");
        assert_eq!(config.modbus.port, 1502);
        assert_eq!(config.modbus.timeout, 2.5);
        // 文件未给出的键保持默认值
        assert_eq!(config.modbus.baud_rate, 9600);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_beats_file_and_override_beats_env() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("gateway.toml");
        fs::write(&path, "[modbus]\nport = 1502\n\n[logging]\nlevel = \"warn\"\n").unwrap();

        let config = ConfigLoader::new(Some(&path))
            .with_override("logging.level", "trace")
            .load_with_env(env(&[
                ("MODBUS_PORT", "5020"),
                ("MODBUS_TYPE", "serial"),
                ("MODBUS_SERIAL_PORT", "/dev/ttyS1"),
                ("MODBUS_BAUDRATE", "19200"),
                ("MODBUS_PARITY", "E"),
                ("MODBUS_STOPBITS", "2"),
                ("MODBUS_BYTESIZE", "7"),
                ("MODBUS_TIMEOUT", "0.5"),
                ("MODBUS_DEFAULT_SLAVE_ID", "17"),
                ("LOG_LEVEL", "debug"),
            ]))
            .unwrap();

        assert_eq!(config.modbus.port, 5020);
        assert_eq!(config.modbus.transport, "serial");
        assert_eq!(config.modbus.serial_port, "/dev/ttyS1");
        assert_eq!(config.modbus.baud_rate, 19200);
        assert_eq!(config.modbus.parity, "E");
        assert_eq!(config.modbus.stop_bits, 2);
        assert_eq!(config.modbus.byte_size, 7);
        assert_eq!(config.modbus.timeout, 0.5);
        assert_eq!(config.modbus.default_slave_id, 17);
        assert_eq!(config.logging.level, "trace");
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_bad_env_value() {
        let err = ConfigLoader::new(None::<&Path>)
            .load_with_env(env(&[("MODBUS_PORT", "five")]))
            .unwrap_err();
        assert!(err.to_string().contains("MODBUS_PORT"));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new(Some("/nonexistent/gateway.toml"))
            .load_with_env(Vec::new())
            .unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let loader = ConfigLoader::new(None::<&Path>);

        for (var, value) in [
            ("MODBUS_TYPE", "bluetooth"),
            ("MODBUS_TIMEOUT", "0"),
            ("MODBUS_TIMEOUT", "1e300"),
            ("MODBUS_PARITY", "X"),
            ("MODBUS_STOPBITS", "3"),
            ("MODBUS_BYTESIZE", "9"),
        ] {
            let config = loader.load_with_env(env(&[(var, value)])).unwrap();
            assert!(
                ConfigLoader::validate(&config).is_err(),
                "{}={} should be rejected",
                var,
                value
            );
        }
    }
}
