use crate::error::{ModbusError, ModbusResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 传输类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
    Serial,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Serial => "serial",
        }
    }
}

impl FromStr for TransportKind {
    type Err = ModbusError;

    fn from_str(s: &str) -> ModbusResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "serial" => Ok(Self::Serial),
            _ => Err(ModbusError::config(format!(
                "Invalid transport: {}. Must be 'tcp', 'udp', or 'serial'.",
                s
            ))),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 串口校验位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl FromStr for Parity {
    type Err = ModbusError;

    fn from_str(s: &str) -> ModbusResult<Self> {
        match s.trim().to_uppercase().as_str() {
            "N" | "NONE" => Ok(Self::None),
            "E" | "EVEN" => Ok(Self::Even),
            "O" | "ODD" => Ok(Self::Odd),
            _ => Err(ModbusError::config(format!("Invalid parity: {}", s))),
        }
    }
}

/// 串口停止位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = ModbusError;

    fn try_from(value: u8) -> ModbusResult<Self> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            _ => Err(ModbusError::config(format!("Invalid stop bits: {}", value))),
        }
    }
}

/// 串口数据位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = ModbusError;

    fn try_from(value: u8) -> ModbusResult<Self> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            _ => Err(ModbusError::config(format!("Invalid byte size: {}", value))),
        }
    }
}

/// TCP/UDP 端点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEndpoint {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl fmt::Display for NetworkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 串口物理参数，只来自进程级配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub data_bits: DataBits,
    pub timeout: Duration,
}

/// 单次调用的传输配置
///
/// 每个变体只携带自己需要的字段。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    Tcp(NetworkEndpoint),
    Udp(NetworkEndpoint),
    Serial(SerialSettings),
}

impl TransportConfig {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Tcp(_) => TransportKind::Tcp,
            Self::Udp(_) => TransportKind::Udp,
            Self::Serial(_) => TransportKind::Serial,
        }
    }

    /// 连接与交换整体的超时
    pub fn timeout(&self) -> Duration {
        match self {
            Self::Tcp(endpoint) | Self::Udp(endpoint) => endpoint.timeout,
            Self::Serial(settings) => settings.timeout,
        }
    }

    /// 用于日志与错误信息的端点描述
    pub fn endpoint(&self) -> String {
        match self {
            Self::Tcp(endpoint) | Self::Udp(endpoint) => endpoint.to_string(),
            Self::Serial(settings) => settings.path.clone(),
        }
    }
}

/// 操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ReadHoldingRegister,
    WriteHoldingRegister,
    ReadCoils,
    WriteCoil,
    ReadInputRegisters,
    ReadMultipleHoldingRegisters,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        Self::ReadHoldingRegister,
        Self::WriteHoldingRegister,
        Self::ReadCoils,
        Self::WriteCoil,
        Self::ReadInputRegisters,
        Self::ReadMultipleHoldingRegisters,
    ];

    /// 对外暴露的工具名
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::ReadHoldingRegister => "read_register",
            Self::WriteHoldingRegister => "write_register",
            Self::ReadCoils => "read_coils",
            Self::WriteCoil => "write_coil",
            Self::ReadInputRegisters => "read_input_registers",
            Self::ReadMultipleHoldingRegisters => "read_multiple_holding_registers",
        }
    }

    pub fn from_tool_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tool_name() == name)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// 单次调用可覆盖的目标参数
///
/// 串口物理参数不在其中。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTarget {
    #[serde(default)]
    pub slave_id: Option<u8>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub transport: Option<String>,
}

impl CallTarget {
    pub fn slave(slave_id: u8) -> Self {
        Self {
            slave_id: Some(slave_id),
            ..Default::default()
        }
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }
}

/// 进程级 Modbus 默认配置
///
/// 启动时构建一次，之后只读共享。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusDefaults {
    /// 传输类型（tcp / udp / serial）
    pub transport: String,

    /// 服务器地址
    pub host: String,

    /// 端口
    pub port: u16,

    /// 串口设备路径
    pub serial_port: String,

    /// 波特率
    pub baud_rate: u32,

    /// 校验位（N / E / O）
    pub parity: String,

    /// 停止位
    pub stop_bits: u8,

    /// 数据位
    pub byte_size: u8,

    /// 超时（秒）
    pub timeout: f64,

    /// 默认从站 ID
    pub default_slave_id: u8,
}

impl Default for ModbusDefaults {
    fn default() -> Self {
        Self {
            transport: "tcp".to_string(),
            host: "127.0.0.1".to_string(),
            port: 502,
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            parity: "N".to_string(),
            stop_bits: 1,
            byte_size: 8,
            timeout: 1.0,
            default_slave_id: 1,
        }
    }
}

impl ModbusDefaults {
    pub fn timeout_duration(&self) -> ModbusResult<Duration> {
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(ModbusError::config(format!(
                "Invalid timeout: {} (must be a positive number of seconds)",
                self.timeout
            )));
        }
        Duration::try_from_secs_f64(self.timeout).map_err(|e| {
            ModbusError::config(format!("Invalid timeout: {} ({})", self.timeout, e))
        })
    }

    pub fn serial_settings(&self) -> ModbusResult<SerialSettings> {
        Ok(SerialSettings {
            path: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            parity: self.parity.parse()?,
            stop_bits: StopBits::try_from(self.stop_bits)?,
            data_bits: DataBits::try_from(self.byte_size)?,
            timeout: self.timeout_duration()?,
        })
    }

    pub fn slave_for(&self, target: &CallTarget) -> u8 {
        target.slave_id.unwrap_or(self.default_slave_id)
    }

    /// 解析失败时用于错误信息的名义端点
    pub fn nominal_endpoint(&self, target: &CallTarget) -> String {
        format!(
            "{}:{}",
            target.host.as_deref().unwrap_or(&self.host),
            target.port.unwrap_or(self.port)
        )
    }

    /// 合并默认配置与单次调用覆盖项，得到本次调用的传输配置
    ///
    /// 未知传输类型在这里失败，不会发生任何 IO。
    pub fn resolve(&self, target: &CallTarget) -> ModbusResult<TransportConfig> {
        let kind: TransportKind = target
            .transport
            .as_deref()
            .unwrap_or(&self.transport)
            .parse()?;

        match kind {
            TransportKind::Tcp => Ok(TransportConfig::Tcp(self.network_endpoint(target)?)),
            TransportKind::Udp => Ok(TransportConfig::Udp(self.network_endpoint(target)?)),
            TransportKind::Serial => Ok(TransportConfig::Serial(self.serial_settings()?)),
        }
    }

    fn network_endpoint(&self, target: &CallTarget) -> ModbusResult<NetworkEndpoint> {
        let host = target.host.clone().unwrap_or_else(|| self.host.clone());
        if host.trim().is_empty() {
            return Err(ModbusError::config("Host must not be empty"));
        }

        Ok(NetworkEndpoint {
            host,
            port: target.port.unwrap_or(self.port),
            timeout: self.timeout_duration()?,
        })
    }
}
