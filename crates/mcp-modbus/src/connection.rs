use crate::error::{ModbusError, ModbusResult};
use crate::transport::{ModbusTransport, TokioModbusFactory, TransportFactory};
use crate::types::{TransportConfig, TransportKind};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 连接管理器
///
/// 每次 `acquire` 都构造并连接一个新的传输，不做池化也不跨调用复用。
pub struct ConnectionManager {
    factory: Arc<dyn TransportFactory>,
    active_connections: Arc<AtomicUsize>,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 获取一个只用于单次操作的连接
    ///
    /// 建连失败或建连后状态检查为 false 时返回连接错误，传输在返回前已关闭。
    /// 传输一经构造即交给 `Connection` 持有，建连过程中被取消也会释放。
    pub async fn acquire(&self, config: &TransportConfig) -> ModbusResult<Connection> {
        let transport = self.factory.create(config);
        let mut connection = Connection::new(
            transport,
            config.kind(),
            config.endpoint(),
            self.active_connections.clone(),
        );

        connection.transport.connect().await.map_err(|e| match e {
            ModbusError::Connection(_) | ModbusError::Config(_) => e,
            other => ModbusError::connection(other.detail().to_string()),
        })?;

        if !connection.transport.is_connected() {
            return Err(ModbusError::connection(format!(
                "Failed to connect to Modbus {} device at {}",
                config.kind(),
                config.endpoint()
            )));
        }

        Ok(connection)
    }

    /// 当前持有中的连接数
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Arc::new(TokioModbusFactory))
    }
}

/// 单次操作的连接句柄
///
/// 离开作用域时无条件关闭底层传输，且只关闭一次：
/// 正常返回、错误返回、panic 展开与 future 被丢弃都走同一条路径。
pub struct Connection {
    transport: Box<dyn ModbusTransport>,
    kind: TransportKind,
    endpoint: String,
    counter: Arc<AtomicUsize>,
    released: bool,
}

impl Connection {
    fn new(
        transport: Box<dyn ModbusTransport>,
        kind: TransportKind,
        endpoint: String,
        counter: Arc<AtomicUsize>,
    ) -> Self {
        let count = counter.fetch_add(1, Ordering::SeqCst);
        debug!(transport = %kind, endpoint = %endpoint, active = count + 1, "Connection acquired");

        Self {
            transport,
            kind,
            endpoint,
            counter,
            released: false,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 显式释放，等价于 drop
    pub fn release(self) {
        drop(self);
    }

    fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.transport.close();

        let prev = self.counter.fetch_sub(1, Ordering::SeqCst);
        debug!(
            transport = %self.kind,
            endpoint = %self.endpoint,
            active = prev.saturating_sub(1),
            "Connection released"
        );
    }
}

impl Deref for Connection {
    type Target = dyn ModbusTransport;

    fn deref(&self) -> &Self::Target {
        self.transport.as_ref()
    }
}

impl DerefMut for Connection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.transport.as_mut()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        connects: AtomicUsize,
        closes: AtomicUsize,
    }

    struct StubTransport {
        counters: Arc<Counters>,
        refuse: bool,
        connected: bool,
    }

    #[async_trait]
    impl ModbusTransport for StubTransport {
        async fn connect(&mut self) -> ModbusResult<()> {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(ModbusError::connection("refused"));
            }
            self.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn close(&mut self) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            self.connected = false;
        }

        async fn read_holding_registers(
            &mut self,
            _: u16,
            count: u16,
            _: u8,
        ) -> ModbusResult<Vec<u16>> {
            Ok(vec![0; count as usize])
        }

        async fn read_input_registers(
            &mut self,
            _: u16,
            count: u16,
            _: u8,
        ) -> ModbusResult<Vec<u16>> {
            Ok(vec![0; count as usize])
        }

        async fn read_coils(
            &mut self,
            _: u16,
            count: u16,
            _: u8,
        ) -> ModbusResult<Vec<bool>> {
            Ok(vec![false; count as usize])
        }

        async fn write_register(&mut self, _: u16, _: u16, _: u8) -> ModbusResult<()> {
            Ok(())
        }

        async fn write_coil(&mut self, _: u16, _: bool, _: u8) -> ModbusResult<()> {
            Ok(())
        }
    }

    struct StubFactory {
        counters: Arc<Counters>,
        refuse: AtomicBool,
    }

    impl TransportFactory for StubFactory {
        fn create(&self, _config: &TransportConfig) -> Box<dyn ModbusTransport> {
            Box::new(StubTransport {
                counters: self.counters.clone(),
                refuse: self.refuse.load(Ordering::SeqCst),
                connected: false,
            })
        }
    }

    fn tcp_config() -> TransportConfig {
        TransportConfig::Tcp(crate::types::NetworkEndpoint {
            host: "127.0.0.1".to_string(),
            port: 502,
            timeout: Duration::from_secs(1),
        })
    }

    fn manager(refuse: bool) -> (ConnectionManager, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let factory = Arc::new(StubFactory {
            counters: counters.clone(),
            refuse: AtomicBool::new(refuse),
        });
        (ConnectionManager::new(factory), counters)
    }

    #[tokio::test]
    async fn test_connection_released_on_drop() {
        let (manager, counters) = manager(false);

        let mut conn = manager.acquire(&tcp_config()).await.unwrap();
        assert_eq!(manager.active_connections(), 1);
        assert_eq!(conn.endpoint(), "127.0.0.1:502");
        assert_eq!(conn.read_coils(0, 2, 1).await.unwrap(), vec![false, false]);

        drop(conn);
        assert_eq!(manager.active_connections(), 0);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_explicit_release_closes_once() {
        let (manager, counters) = manager(false);

        let conn = manager.acquire(&tcp_config()).await.unwrap();
        conn.release();

        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_failed_connect_leaks_nothing() {
        let (manager, counters) = manager(true);

        let err = manager.acquire(&tcp_config()).await.err().unwrap();
        assert!(matches!(err, ModbusError::Connection(_)));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_each_acquire_is_fresh() {
        let (manager, counters) = manager(false);

        let first = manager.acquire(&tcp_config()).await.unwrap();
        let second = manager.acquire(&tcp_config()).await.unwrap();
        assert_eq!(manager.active_connections(), 2);
        assert_eq!(counters.connects.load(Ordering::SeqCst), 2);

        drop(first);
        drop(second);
        assert_eq!(manager.active_connections(), 0);
    }
}
