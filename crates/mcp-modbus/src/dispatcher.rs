//! 操作分发
//!
//! 每个操作都是一次完整的 校验 → 建连 → 单次交换 → 断开 流程，调用之间
//! 没有共享状态。多个调用可以并发执行，各自持有独立连接；但针对同一台设备
//! 的并发调用在协议层面并不串行化，串口这类无法处理重叠事务的链路上可能
//! 出现帧交错。需要串行化的调用方应自行排队。
//!
//! 本层不做任何重试，一次交换失败即返回失败结果。

use crate::connection::ConnectionManager;
use crate::error::{FailureKind, ModbusError, ModbusResult};
use crate::event::{EventSink, OperationEvent};
use crate::transport::{TokioModbusFactory, TransportFactory};
use crate::types::{CallTarget, ModbusDefaults, OperationKind, TransportConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::warn;

/// 具体操作及其参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ReadHoldingRegister { address: u16 },
    WriteHoldingRegister { address: u16, value: u16 },
    ReadCoils { address: u16, count: i64 },
    WriteCoil { address: u16, value: bool },
    ReadInputRegisters { address: u16, count: i64 },
    ReadMultipleHoldingRegisters { address: u16, count: i64 },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::ReadHoldingRegister { .. } => OperationKind::ReadHoldingRegister,
            Self::WriteHoldingRegister { .. } => OperationKind::WriteHoldingRegister,
            Self::ReadCoils { .. } => OperationKind::ReadCoils,
            Self::WriteCoil { .. } => OperationKind::WriteCoil,
            Self::ReadInputRegisters { .. } => OperationKind::ReadInputRegisters,
            Self::ReadMultipleHoldingRegisters { .. } => {
                OperationKind::ReadMultipleHoldingRegisters
            }
        }
    }

    pub fn address(&self) -> u16 {
        match *self {
            Self::ReadHoldingRegister { address }
            | Self::WriteHoldingRegister { address, .. }
            | Self::ReadCoils { address, .. }
            | Self::WriteCoil { address, .. }
            | Self::ReadInputRegisters { address, .. }
            | Self::ReadMultipleHoldingRegisters { address, .. } => address,
        }
    }

    /// 多元素读取的数量
    pub fn count(&self) -> Option<i64> {
        match *self {
            Self::ReadCoils { count, .. }
            | Self::ReadInputRegisters { count, .. }
            | Self::ReadMultipleHoldingRegisters { count, .. } => Some(count),
            _ => None,
        }
    }

    /// 唯一的本地预检：数量必须为正
    pub fn validate(&self) -> ModbusResult<()> {
        match self.count() {
            Some(count) if count <= 0 => Err(ModbusError::validation("Count must be positive")),
            _ => Ok(()),
        }
    }

    /// 超出 16 位数量字段的请求无法成帧，按设备的非法数据值处理
    fn quantity(&self) -> ModbusResult<u16> {
        let count = self.count().unwrap_or(1);
        u16::try_from(count).map_err(|_| {
            ModbusError::protocol(format!(
                "Illegal data value: quantity {} does not fit in a Modbus request",
                count
            ))
        })
    }

    fn last_address(&self) -> i64 {
        i64::from(self.address()) + self.count().unwrap_or(1) - 1
    }
}

/// 一次操作请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub operation: Operation,
    pub target: CallTarget,
}

impl OperationRequest {
    pub fn new(operation: Operation, target: CallTarget) -> Self {
        Self { operation, target }
    }
}

/// 操作成功时的取值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OperationValue {
    Register(u16),
    Registers(Vec<u16>),
    Coils(Vec<bool>),
    Written,
}

/// 操作结果
///
/// 原始的 tokio-modbus 结果不会越过本层。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    Success {
        description: String,
        value: OperationValue,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn value(&self) -> Option<&OperationValue> {
        match self {
            Self::Success { value, .. } => Some(value),
            Self::Failure { .. } => None,
        }
    }

    /// 面向调用方的文本
    pub fn message(&self) -> &str {
        match self {
            Self::Success { description, .. } => description,
            Self::Failure { message, .. } => message,
        }
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// 操作分发器
pub struct OperationDispatcher {
    defaults: Arc<ModbusDefaults>,
    connections: ConnectionManager,
}

impl OperationDispatcher {
    pub fn new(defaults: Arc<ModbusDefaults>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            defaults,
            connections: ConnectionManager::new(factory),
        }
    }

    /// 使用 tokio-modbus 传输
    pub fn with_tokio_modbus(defaults: Arc<ModbusDefaults>) -> Self {
        Self::new(defaults, Arc::new(TokioModbusFactory))
    }

    pub fn defaults(&self) -> &ModbusDefaults {
        &self.defaults
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// 执行一次操作
    ///
    /// 所有错误都在这里转换为 `OperationResult::Failure`，不会向上传播。
    pub async fn execute(
        &self,
        request: &OperationRequest,
        sink: &dyn EventSink,
    ) -> OperationResult {
        let operation = &request.operation;
        let slave = self.defaults.slave_for(&request.target);

        if let Err(e) = operation.validate() {
            return OperationResult::Failure {
                kind: e.kind(),
                message: format!("Error: {}", e.detail()),
            };
        }

        let config = match self.defaults.resolve(&request.target) {
            Ok(config) => config,
            Err(e) => {
                let endpoint = self.defaults.nominal_endpoint(&request.target);
                return self.failure(operation, slave, &endpoint, e);
            }
        };
        let endpoint = config.endpoint();
        let deadline = config.timeout();

        let outcome = match timeout(deadline, self.perform(operation, slave, &config)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ModbusError::connection(format!(
                "Timed out after {:?} talking to {} device at {}",
                deadline,
                config.kind(),
                endpoint
            ))),
        };

        match outcome {
            Ok(value) => {
                sink.record(&OperationEvent {
                    operation: operation.kind(),
                    address: operation.address(),
                    slave_id: slave,
                    endpoint: endpoint.clone(),
                    message: trace_message(operation, slave, &endpoint, &value),
                });

                OperationResult::Success {
                    description: success_message(operation, slave, &value),
                    value,
                }
            }
            Err(e) => self.failure(operation, slave, &endpoint, e),
        }
    }

    /// 读取单个保持寄存器
    pub async fn read_register(
        &self,
        address: u16,
        target: &CallTarget,
        sink: &dyn EventSink,
    ) -> OperationResult {
        self.run(Operation::ReadHoldingRegister { address }, target, sink)
            .await
    }

    /// 写入单个保持寄存器
    pub async fn write_register(
        &self,
        address: u16,
        value: u16,
        target: &CallTarget,
        sink: &dyn EventSink,
    ) -> OperationResult {
        self.run(Operation::WriteHoldingRegister { address, value }, target, sink)
            .await
    }

    /// 读取线圈
    pub async fn read_coils(
        &self,
        address: u16,
        count: i64,
        target: &CallTarget,
        sink: &dyn EventSink,
    ) -> OperationResult {
        self.run(Operation::ReadCoils { address, count }, target, sink)
            .await
    }

    /// 写入单个线圈
    pub async fn write_coil(
        &self,
        address: u16,
        value: bool,
        target: &CallTarget,
        sink: &dyn EventSink,
    ) -> OperationResult {
        self.run(Operation::WriteCoil { address, value }, target, sink)
            .await
    }

    /// 读取输入寄存器
    pub async fn read_input_registers(
        &self,
        address: u16,
        count: i64,
        target: &CallTarget,
        sink: &dyn EventSink,
    ) -> OperationResult {
        self.run(Operation::ReadInputRegisters { address, count }, target, sink)
            .await
    }

    /// 读取多个保持寄存器
    pub async fn read_multiple_holding_registers(
        &self,
        address: u16,
        count: i64,
        target: &CallTarget,
        sink: &dyn EventSink,
    ) -> OperationResult {
        self.run(
            Operation::ReadMultipleHoldingRegisters { address, count },
            target,
            sink,
        )
        .await
    }

    async fn run(
        &self,
        operation: Operation,
        target: &CallTarget,
        sink: &dyn EventSink,
    ) -> OperationResult {
        self.execute(&OperationRequest::new(operation, target.clone()), sink)
            .await
    }

    /// 获取连接并执行唯一一次交换；连接在函数返回（或 future 被丢弃）时释放
    async fn perform(
        &self,
        operation: &Operation,
        slave: u8,
        config: &TransportConfig,
    ) -> ModbusResult<OperationValue> {
        let quantity = operation.quantity()?;
        let mut conn = self.connections.acquire(config).await?;

        let value = match *operation {
            Operation::ReadHoldingRegister { address } => {
                let registers = conn.read_holding_registers(address, 1, slave).await?;
                let value = registers
                    .first()
                    .copied()
                    .ok_or_else(|| short_response(1, 0))?;
                OperationValue::Register(value)
            }
            Operation::WriteHoldingRegister { address, value } => {
                conn.write_register(address, value, slave).await?;
                OperationValue::Written
            }
            Operation::ReadCoils { address, .. } => {
                let bits = conn.read_coils(address, quantity, slave).await?;
                OperationValue::Coils(take_exact(bits, quantity)?)
            }
            Operation::WriteCoil { address, value } => {
                conn.write_coil(address, value, slave).await?;
                OperationValue::Written
            }
            Operation::ReadInputRegisters { address, .. } => {
                let registers = conn.read_input_registers(address, quantity, slave).await?;
                OperationValue::Registers(take_exact(registers, quantity)?)
            }
            Operation::ReadMultipleHoldingRegisters { address, .. } => {
                let registers = conn
                    .read_holding_registers(address, quantity, slave)
                    .await?;
                OperationValue::Registers(take_exact(registers, quantity)?)
            }
        };

        conn.release();
        Ok(value)
    }

    fn failure(
        &self,
        operation: &Operation,
        slave: u8,
        endpoint: &str,
        error: ModbusError,
    ) -> OperationResult {
        warn!(
            operation = %operation.kind(),
            address = operation.address(),
            slave_id = slave,
            endpoint = %endpoint,
            error = %error,
            "Modbus operation failed"
        );

        OperationResult::Failure {
            kind: error.kind(),
            message: failure_message(operation, slave, endpoint, &error),
        }
    }
}

fn short_response(expected: u16, received: usize) -> ModbusError {
    ModbusError::protocol(format!(
        "Short response: expected {} values, received {}",
        expected, received
    ))
}

/// 多于请求数量时截断；少于请求数量视为协议错误
fn take_exact<T>(mut values: Vec<T>, quantity: u16) -> ModbusResult<Vec<T>> {
    let expected = usize::from(quantity);
    if values.len() < expected {
        return Err(short_response(quantity, values.len()));
    }
    values.truncate(expected);
    Ok(values)
}

fn success_message(operation: &Operation, slave: u8, value: &OperationValue) -> String {
    let address = operation.address();
    let last = operation.last_address();

    match (operation, value) {
        (Operation::ReadHoldingRegister { .. }, OperationValue::Register(v)) => {
            format!("Slave {}, Register {} Value: {}", slave, address, v)
        }
        (Operation::WriteHoldingRegister { value, .. }, _) => {
            format!("Successfully wrote {} to register {} on slave {}", value, address, slave)
        }
        (Operation::ReadCoils { .. }, OperationValue::Coils(bits)) => {
            format!("Slave {}, Coils {} to {}: {:?}", slave, address, last, bits)
        }
        (Operation::WriteCoil { value, .. }, _) => {
            format!("Successfully wrote {} to coil {} on slave {}", value, address, slave)
        }
        (Operation::ReadInputRegisters { .. }, OperationValue::Registers(regs)) => {
            format!("Slave {}, Input Registers {} to {}: {:?}", slave, address, last, regs)
        }
        (Operation::ReadMultipleHoldingRegisters { .. }, OperationValue::Registers(regs)) => {
            format!("Slave {}, Holding Registers {} to {}: {:?}", slave, address, last, regs)
        }
        (_, other) => format!("Slave {}, Address {}: {:?}", slave, address, other),
    }
}

fn trace_message(
    operation: &Operation,
    slave: u8,
    endpoint: &str,
    value: &OperationValue,
) -> String {
    let address = operation.address();
    let count = operation.count().unwrap_or(1);

    match (operation, value) {
        (Operation::ReadHoldingRegister { .. }, OperationValue::Register(v)) => format!(
            "Read register {} from slave {} at {}: {}",
            address, slave, endpoint, v
        ),
        (Operation::WriteHoldingRegister { value, .. }, _) => format!(
            "Wrote {} to register {} on slave {} at {}",
            value, address, slave, endpoint
        ),
        (Operation::ReadCoils { .. }, OperationValue::Coils(bits)) => format!(
            "Read {} coils starting at {} from slave {} at {}: {:?}",
            count, address, slave, endpoint, bits
        ),
        (Operation::WriteCoil { value, .. }, _) => format!(
            "Wrote {} to coil {} on slave {} at {}",
            value, address, slave, endpoint
        ),
        (Operation::ReadInputRegisters { .. }, OperationValue::Registers(regs)) => format!(
            "Read {} input registers starting at {} from slave {} at {}: {:?}",
            count, address, slave, endpoint, regs
        ),
        (Operation::ReadMultipleHoldingRegisters { .. }, OperationValue::Registers(regs)) => {
            format!(
                "Read {} holding registers starting at {} from slave {} at {}: {:?}",
                count, address, slave, endpoint, regs
            )
        }
        (_, other) => format!(
            "{} at address {} on slave {} at {}: {:?}",
            operation.kind(),
            address,
            slave,
            endpoint,
            other
        ),
    }
}

fn failure_message(
    operation: &Operation,
    slave: u8,
    endpoint: &str,
    error: &ModbusError,
) -> String {
    let address = operation.address();
    let detail = error.detail();

    match error.kind() {
        FailureKind::Validation => format!("Error: {}", detail),
        FailureKind::Connection => format!(
            "Error communicating with slave {} at {}: {}",
            slave, endpoint, detail
        ),
        FailureKind::Protocol => match operation {
            Operation::ReadHoldingRegister { .. } => format!(
                "Error reading register {} from slave {} at {}: {}",
                address, slave, endpoint, detail
            ),
            Operation::WriteHoldingRegister { .. } => format!(
                "Error writing to register {} on slave {} at {}: {}",
                address, slave, endpoint, detail
            ),
            Operation::ReadCoils { .. } => format!(
                "Error reading coils starting at {} from slave {} at {}: {}",
                address, slave, endpoint, detail
            ),
            Operation::WriteCoil { .. } => format!(
                "Error writing to coil {} on slave {} at {}: {}",
                address, slave, endpoint, detail
            ),
            Operation::ReadInputRegisters { .. } => format!(
                "Error reading input registers starting at {} from slave {} at {}: {}",
                address, slave, endpoint, detail
            ),
            Operation::ReadMultipleHoldingRegisters { .. } => format!(
                "Error reading holding registers starting at {} from slave {} at {}: {}",
                address, slave, endpoint, detail
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_count() {
        assert!(Operation::ReadCoils { address: 0, count: 0 }.validate().is_err());
        assert!(Operation::ReadInputRegisters { address: 0, count: -5 }.validate().is_err());
        assert!(Operation::ReadMultipleHoldingRegisters { address: 0, count: 1 }
            .validate()
            .is_ok());
        assert!(Operation::WriteCoil { address: 0, value: true }.validate().is_ok());
    }

    #[test]
    fn test_oversized_quantity_is_protocol_error() {
        let op = Operation::ReadCoils {
            address: 0,
            count: 70_000,
        };
        assert!(op.validate().is_ok());
        let err = op.quantity().unwrap_err();
        assert_eq!(err.kind(), FailureKind::Protocol);
    }

    #[test]
    fn test_take_exact() {
        assert_eq!(
            take_exact(vec![true, false, true, true], 3).unwrap(),
            vec![true, false, true]
        );
        let err = take_exact(vec![true], 3).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Protocol);
    }

    #[test]
    fn test_success_messages() {
        let op = Operation::ReadInputRegisters {
            address: 100,
            count: 3,
        };
        let msg = success_message(&op, 2, &OperationValue::Registers(vec![1, 2, 3]));
        assert_eq!(msg, "Slave 2, Input Registers 100 to 102: [1, 2, 3]");

        let op = Operation::WriteCoil {
            address: 5,
            value: true,
        };
        let msg = success_message(&op, 1, &OperationValue::Written);
        assert_eq!(msg, "Successfully wrote true to coil 5 on slave 1");
    }

    #[test]
    fn test_last_address_does_not_wrap() {
        let op = Operation::ReadMultipleHoldingRegisters {
            address: 65_535,
            count: 2,
        };
        assert_eq!(op.last_address(), 65_536);
    }

    #[test]
    fn test_operation_value_serialization() {
        let json = serde_json::to_value(OperationValue::Coils(vec![true, false])).unwrap();
        assert_eq!(json["type"], "coils");
        assert_eq!(json["value"], serde_json::json!([true, false]));
    }
}
