//! Modbus 网关核心
//!
//! 每次工具调用都会新建一个连接，执行一次 Modbus 交换，然后关闭连接。
//! 协议编解码由 `tokio-modbus` 完成，这里只负责传输选择、连接生命周期、
//! 参数校验与结果分类。

pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod transport;
pub mod types;
pub mod udp;

pub use client::ModbusClient;
pub use connection::{Connection, ConnectionManager};
pub use dispatcher::{
    Operation, OperationDispatcher, OperationRequest, OperationResult, OperationValue,
};
pub use error::{FailureKind, ModbusError, ModbusResult};
pub use event::{EventSink, OperationEvent, TracingSink};
pub use transport::{ModbusTransport, TokioModbusFactory, TransportFactory};
pub use types::{
    CallTarget, DataBits, ModbusDefaults, NetworkEndpoint, OperationKind, Parity, SerialSettings,
    StopBits, TransportConfig, TransportKind,
};
