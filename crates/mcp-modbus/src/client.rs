use crate::error::{ModbusError, ModbusResult};
use crate::transport::ModbusTransport;
use crate::types::{DataBits, NetworkEndpoint, Parity, SerialSettings, StopBits, TransportConfig};
use crate::udp::UdpStream;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::{TcpStream, UdpSocket};
use tokio_modbus::prelude::*;
use tokio_serial::SerialPortBuilderExt;
use tracing::debug;

/// 建连时挂载的从站，每次交换前会按调用参数覆盖
const ATTACH_SLAVE: u8 = 1;

/// 基于 tokio-modbus 的 Modbus 客户端
///
/// 一个实例只服务一次调用：`connect` 按传输配置选择 TCP、UDP 或串口，
/// `close` 丢弃底层上下文，从而关闭 socket 或串口句柄。
pub struct ModbusClient {
    config: TransportConfig,
    context: Option<client::Context>,
}

impl ModbusClient {
    /// 创建新的 Modbus 客户端（未连接）
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            context: None,
        }
    }

    fn context(&mut self, slave: u8) -> ModbusResult<&mut client::Context> {
        let ctx = self
            .context
            .as_mut()
            .ok_or_else(|| ModbusError::connection("Not connected"))?;
        ctx.set_slave(Slave(slave));
        Ok(ctx)
    }
}

async fn connect_tcp(endpoint: &NetworkEndpoint) -> ModbusResult<client::Context> {
    let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| {
            ModbusError::connection(format!(
                "Failed to connect to Modbus tcp device at {}: {}",
                endpoint, e
            ))
        })?;
    stream.set_nodelay(true).ok();

    Ok(client::tcp::attach_slave(stream, Slave(ATTACH_SLAVE)))
}

async fn connect_udp(endpoint: &NetworkEndpoint) -> ModbusResult<client::Context> {
    let remote: SocketAddr = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| {
            ModbusError::connection(format!("Failed to resolve {}: {}", endpoint, e))
        })?
        .next()
        .ok_or_else(|| ModbusError::connection(format!("No address found for {}", endpoint)))?;

    let local = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(remote).await.map_err(|e| {
        ModbusError::connection(format!(
            "Failed to connect to Modbus udp device at {}: {}",
            endpoint, e
        ))
    })?;

    Ok(client::tcp::attach_slave(
        UdpStream::new(socket),
        Slave(ATTACH_SLAVE),
    ))
}

fn connect_serial(settings: &SerialSettings) -> ModbusResult<client::Context> {
    let serial = tokio_serial::new(&settings.path, settings.baud_rate)
        .parity(convert_parity(settings.parity))
        .stop_bits(convert_stop_bits(settings.stop_bits))
        .data_bits(convert_data_bits(settings.data_bits))
        .timeout(settings.timeout)
        .open_native_async()
        .map_err(|e| {
            ModbusError::connection(format!(
                "Failed to open serial port {}: {}",
                settings.path, e
            ))
        })?;

    Ok(client::rtu::attach_slave(serial, Slave(ATTACH_SLAVE)))
}

fn convert_parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

fn convert_stop_bits(bits: StopBits) -> tokio_serial::StopBits {
    match bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}

fn convert_data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Five => tokio_serial::DataBits::Five,
        DataBits::Six => tokio_serial::DataBits::Six,
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

/// 传输层错误归为连接错误，帧/响应不匹配归为协议错误
fn map_transport_error(error: tokio_modbus::Error) -> ModbusError {
    match error {
        tokio_modbus::Error::Transport(io_error) => {
            ModbusError::connection(format!("Modbus IO error: {}", io_error))
        }
        tokio_modbus::Error::Protocol(protocol_error) => {
            ModbusError::protocol(format!("Modbus protocol error: {:?}", protocol_error))
        }
        #[allow(unreachable_patterns)]
        other => ModbusError::connection(format!("Modbus error: {:?}", other)),
    }
}

fn map_exception<E: std::fmt::Debug>(exception: E) -> ModbusError {
    ModbusError::protocol(format!("Exception Response ({:?})", exception))
}

#[async_trait]
impl ModbusTransport for ModbusClient {
    async fn connect(&mut self) -> ModbusResult<()> {
        let context = match &self.config {
            TransportConfig::Tcp(endpoint) => connect_tcp(endpoint).await?,
            TransportConfig::Udp(endpoint) => connect_udp(endpoint).await?,
            TransportConfig::Serial(settings) => connect_serial(settings)?,
        };
        self.context = Some(context);

        debug!(
            transport = %self.config.kind(),
            endpoint = %self.config.endpoint(),
            "Connected to Modbus device"
        );

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    fn close(&mut self) {
        if self.context.take().is_some() {
            debug!(
                transport = %self.config.kind(),
                endpoint = %self.config.endpoint(),
                "Closed Modbus connection"
            );
        }
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        slave: u8,
    ) -> ModbusResult<Vec<u16>> {
        let ctx = self.context(slave)?;
        let values = ctx
            .read_holding_registers(address, count)
            .await
            .map_err(map_transport_error)?
            .map_err(map_exception)?;

        debug!(addr = %address, count = %count, slave = %slave, "Read holding registers");
        Ok(values)
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
        slave: u8,
    ) -> ModbusResult<Vec<u16>> {
        let ctx = self.context(slave)?;
        let values = ctx
            .read_input_registers(address, count)
            .await
            .map_err(map_transport_error)?
            .map_err(map_exception)?;

        debug!(addr = %address, count = %count, slave = %slave, "Read input registers");
        Ok(values)
    }

    async fn read_coils(
        &mut self,
        address: u16,
        count: u16,
        slave: u8,
    ) -> ModbusResult<Vec<bool>> {
        let ctx = self.context(slave)?;
        let values = ctx
            .read_coils(address, count)
            .await
            .map_err(map_transport_error)?
            .map_err(map_exception)?;

        debug!(addr = %address, count = %count, slave = %slave, "Read coils");
        Ok(values)
    }

    async fn write_register(&mut self, address: u16, value: u16, slave: u8) -> ModbusResult<()> {
        let ctx = self.context(slave)?;
        ctx.write_single_register(address, value)
            .await
            .map_err(map_transport_error)?
            .map_err(map_exception)?;

        debug!(addr = %address, value = %value, slave = %slave, "Wrote holding register");
        Ok(())
    }

    async fn write_coil(&mut self, address: u16, value: bool, slave: u8) -> ModbusResult<()> {
        let ctx = self.context(slave)?;
        ctx.write_single_coil(address, value)
            .await
            .map_err(map_transport_error)?
            .map_err(map_exception)?;

        debug!(addr = %address, value = %value, slave = %slave, "Wrote coil");
        Ok(())
    }
}

impl Drop for ModbusClient {
    fn drop(&mut self) {
        self.close();
    }
}
