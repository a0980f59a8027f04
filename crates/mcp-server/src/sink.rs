use mcp_logging::{LogEntry, LogLevel};
use mcp_modbus::{EventSink, OperationEvent, TracingSink};
use rmcp::model::{LoggingLevel, LoggingMessageNotificationParam};
use rmcp::service::Peer;
use rmcp::RoleServer;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::warn;

const LOGGER: &str = "modbus";

/// syslog 严重程度，数值越大越严重
fn severity(level: &LoggingLevel) -> u8 {
    match level {
        LoggingLevel::Debug => 0,
        LoggingLevel::Info => 1,
        LoggingLevel::Notice => 2,
        LoggingLevel::Warning => 3,
        LoggingLevel::Error => 4,
        LoggingLevel::Critical => 5,
        LoggingLevel::Alert => 6,
        LoggingLevel::Emergency => 7,
    }
}

/// 客户端通过 logging/setLevel 设置的最低转发级别
#[derive(Clone)]
pub struct LevelFilter {
    minimum: Arc<AtomicU8>,
}

impl LevelFilter {
    pub fn new(level: LoggingLevel) -> Self {
        Self {
            minimum: Arc::new(AtomicU8::new(severity(&level))),
        }
    }

    pub fn set(&self, level: LoggingLevel) {
        self.minimum.store(severity(&level), Ordering::SeqCst);
    }

    pub fn allows(&self, level: &LoggingLevel) -> bool {
        severity(level) >= self.minimum.load(Ordering::SeqCst)
    }
}

impl Default for LevelFilter {
    fn default() -> Self {
        Self::new(LoggingLevel::Info)
    }
}

/// 操作事件对应的日志通知参数
pub fn log_message(
    event: &OperationEvent,
) -> Result<LoggingMessageNotificationParam, serde_json::Error> {
    let entry = LogEntry::new(LogLevel::Info, LOGGER, event.message.clone())
        .with_field("operation", serde_json::json!(event.operation))
        .with_field("address", serde_json::json!(event.address))
        .with_field("slave_id", serde_json::json!(event.slave_id))
        .with_field("endpoint", serde_json::json!(event.endpoint));

    Ok(LoggingMessageNotificationParam {
        level: LoggingLevel::Info,
        logger: Some(LOGGER.to_string()),
        data: entry.to_value()?,
    })
}

/// 将操作事件转发为 `notifications/message`，同时写入 tracing
pub struct NotificationSink {
    peer: Peer<RoleServer>,
    filter: LevelFilter,
}

impl NotificationSink {
    pub fn new(peer: Peer<RoleServer>, filter: LevelFilter) -> Self {
        Self { peer, filter }
    }
}

impl EventSink for NotificationSink {
    fn record(&self, event: &OperationEvent) {
        TracingSink.record(event);

        if !self.filter.allows(&LoggingLevel::Info) {
            return;
        }

        let params = match log_message(event) {
            Ok(params) => params,
            Err(e) => {
                warn!("Failed to serialize log entry: {}", e);
                return;
            }
        };

        let peer = self.peer.clone();
        tokio::spawn(async move {
            if let Err(e) = peer.notify_logging_message(params).await {
                warn!("Failed to send log notification: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_modbus::OperationKind;

    fn event() -> OperationEvent {
        OperationEvent {
            operation: OperationKind::ReadHoldingRegister,
            address: 10,
            slave_id: 1,
            endpoint: "127.0.0.1:502".to_string(),
            message: "Read register 10 from slave 1 at 127.0.0.1:502: 42".to_string(),
        }
    }

    #[test]
    fn test_log_message() {
        let params = log_message(&event()).unwrap();
        let value = serde_json::to_value(&params).unwrap();

        assert_eq!(value["level"], "info");
        assert_eq!(value["logger"], "modbus");
        assert_eq!(value["data"]["slave_id"], 1);
        assert_eq!(value["data"]["operation"], "read_holding_register");
        assert_eq!(
            value["data"]["message"],
            "Read register 10 from slave 1 at 127.0.0.1:502: 42"
        );
    }

    #[test]
    fn test_level_filter() {
        let filter = LevelFilter::default();
        assert!(filter.allows(&LoggingLevel::Info));
        assert!(!filter.allows(&LoggingLevel::Debug));

        filter.set(LoggingLevel::Warning);
        assert!(!filter.allows(&LoggingLevel::Info));
        assert!(filter.allows(&LoggingLevel::Emergency));

        filter.set(LoggingLevel::Debug);
        assert!(filter.allows(&LoggingLevel::Debug));
    }
}
