#![allow(dead_code)]

use async_trait::async_trait;
use mcp_config::ServerConfig;
use mcp_modbus::{
    EventSink, ModbusDefaults, ModbusError, ModbusResult, ModbusTransport, OperationDispatcher,
    OperationEvent, TransportConfig, TransportFactory,
};
use mcp_server::{ModbusMcpServer, ToolHandler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 内存中的 Modbus 设备
#[derive(Default)]
pub struct MemoryDevice {
    holding: Mutex<HashMap<u16, u16>>,
    coils: Mutex<HashMap<u16, bool>>,
    pub fail_exchanges: AtomicBool,
    pub panic_exchanges: AtomicBool,
    pub stall_exchanges: AtomicBool,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MemoryDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_holding(&self, address: u16, value: u16) {
        self.holding.lock().unwrap().insert(address, value);
    }

    pub fn coil(&self, address: u16) -> Option<bool> {
        self.coils.lock().unwrap().get(&address).copied()
    }

    async fn check(&self) -> ModbusResult<()> {
        if self.panic_exchanges.load(Ordering::SeqCst) {
            panic!("device fault");
        }
        if self.stall_exchanges.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_exchanges.load(Ordering::SeqCst) {
            return Err(ModbusError::protocol("Exception Response (IllegalDataAddress)"));
        }
        Ok(())
    }
}

struct MemoryTransport {
    device: Arc<MemoryDevice>,
    connected: bool,
}

#[async_trait]
impl ModbusTransport for MemoryTransport {
    async fn connect(&mut self) -> ModbusResult<()> {
        self.device.opens.fetch_add(1, Ordering::SeqCst);
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.device.closes.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        _slave: u8,
    ) -> ModbusResult<Vec<u16>> {
        self.device.check().await?;
        let holding = self.device.holding.lock().unwrap();
        Ok((0..count)
            .map(|i| holding.get(&address.wrapping_add(i)).copied().unwrap_or(0))
            .collect())
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
        _slave: u8,
    ) -> ModbusResult<Vec<u16>> {
        self.device.check().await?;
        Ok((0..count).map(|i| address.wrapping_add(i)).collect())
    }

    async fn read_coils(
        &mut self,
        address: u16,
        count: u16,
        _slave: u8,
    ) -> ModbusResult<Vec<bool>> {
        self.device.check().await?;
        let coils = self.device.coils.lock().unwrap();
        Ok((0..count)
            .map(|i| coils.get(&address.wrapping_add(i)).copied().unwrap_or(false))
            .collect())
    }

    async fn write_register(&mut self, address: u16, value: u16, _slave: u8) -> ModbusResult<()> {
        self.device.check().await?;
        self.device.set_holding(address, value);
        Ok(())
    }

    async fn write_coil(&mut self, address: u16, value: bool, _slave: u8) -> ModbusResult<()> {
        self.device.check().await?;
        self.device.coils.lock().unwrap().insert(address, value);
        Ok(())
    }
}

struct MemoryFactory {
    device: Arc<MemoryDevice>,
}

impl TransportFactory for MemoryFactory {
    fn create(&self, _config: &TransportConfig) -> Box<dyn ModbusTransport> {
        Box::new(MemoryTransport {
            device: self.device.clone(),
            connected: false,
        })
    }
}

/// 记录事件的接收端
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<OperationEvent>>,
}

impl EventSink for RecordingSink {
    fn record(&self, event: &OperationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn dispatcher(device: &Arc<MemoryDevice>, defaults: ModbusDefaults) -> Arc<OperationDispatcher> {
    Arc::new(OperationDispatcher::new(
        Arc::new(defaults),
        Arc::new(MemoryFactory {
            device: device.clone(),
        }),
    ))
}

/// 创建连接到内存设备的工具处理器
pub fn create_tools(device: &Arc<MemoryDevice>) -> ToolHandler {
    ToolHandler::new(dispatcher(device, ModbusDefaults::default()))
}

/// 创建连接到内存设备的服务
pub fn create_server(device: &Arc<MemoryDevice>) -> ModbusMcpServer {
    create_server_with(device, ModbusDefaults::default())
}

pub fn create_server_with(device: &Arc<MemoryDevice>, defaults: ModbusDefaults) -> ModbusMcpServer {
    ModbusMcpServer::new(ServerConfig::default(), dispatcher(device, defaults))
}
