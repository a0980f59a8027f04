use crate::client::ModbusClient;
use crate::error::ModbusResult;
use crate::types::TransportConfig;
use async_trait::async_trait;

/// Modbus 传输接口
///
/// 对应外部 Modbus 库暴露的原语：建连、连接状态、关闭，以及五个交换操作。
/// 设备返回的异常响应以 `ModbusError::Protocol` 表示，传输故障以
/// `ModbusError::Connection` 表示。
#[async_trait]
pub trait ModbusTransport: Send {
    /// 建立连接
    async fn connect(&mut self) -> ModbusResult<()>;

    /// 建连后的连接状态
    fn is_connected(&self) -> bool;

    /// 关闭连接，重复调用无副作用
    fn close(&mut self);

    /// 读取保持寄存器
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        slave: u8,
    ) -> ModbusResult<Vec<u16>>;

    /// 读取输入寄存器
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
        slave: u8,
    ) -> ModbusResult<Vec<u16>>;

    /// 读取线圈
    async fn read_coils(&mut self, address: u16, count: u16, slave: u8)
        -> ModbusResult<Vec<bool>>;

    /// 写入单个保持寄存器
    async fn write_register(&mut self, address: u16, value: u16, slave: u8) -> ModbusResult<()>;

    /// 写入单个线圈
    async fn write_coil(&mut self, address: u16, value: bool, slave: u8) -> ModbusResult<()>;
}

/// 传输工厂
///
/// 按传输配置构造尚未连接的客户端。测试中以假实现替换。
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &TransportConfig) -> Box<dyn ModbusTransport>;
}

/// 基于 `tokio-modbus` 的默认工厂
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioModbusFactory;

impl TransportFactory for TokioModbusFactory {
    fn create(&self, config: &TransportConfig) -> Box<dyn ModbusTransport> {
        Box::new(ModbusClient::new(config.clone()))
    }
}
