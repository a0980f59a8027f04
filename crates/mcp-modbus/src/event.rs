use crate::types::OperationKind;
use serde::{Deserialize, Serialize};
use tracing::info;

/// 操作成功后记录的观测事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEvent {
    pub operation: OperationKind,
    pub address: u16,
    pub slave_id: u8,
    pub endpoint: String,
    pub message: String,
}

/// 观测事件接收端
///
/// 仅用于观测，实现不得影响操作结果。
pub trait EventSink: Send + Sync {
    fn record(&self, event: &OperationEvent);
}

/// 写入 tracing 的事件接收端
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &OperationEvent) {
        info!(
            operation = %event.operation,
            address = event.address,
            slave_id = event.slave_id,
            endpoint = %event.endpoint,
            "{}",
            event.message
        );
    }
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn record(&self, event: &OperationEvent) {
        (**self).record(event);
    }
}
