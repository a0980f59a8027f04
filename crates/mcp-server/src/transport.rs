//! 按行分帧的 stdio 传输
//!
//! 读端逐行解码客户端消息，交给 rmcp 处理。非 UTF-8、非 JSON 或不是合法
//! JSON-RPC 消息的行就地回复错误并继续读取，不会终止会话。
//! 写端是唯一的写任务，rmcp 发出的消息和拒绝回复都经由它输出。

use futures::channel::mpsc as message_channel;
use futures::stream::{self, BoxStream, StreamExt};
use rmcp::service::{RxJsonRpcMessage, TxJsonRpcMessage};
use rmcp::RoleServer;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;

pub type MessageSink = message_channel::UnboundedSender<TxJsonRpcMessage<RoleServer>>;
pub type MessageStream = BoxStream<'static, RxJsonRpcMessage<RoleServer>>;

/// 无法交给 rmcp 的输入行
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {reason}")]
    Invalid { id: Value, reason: String },

    /// 无法解析的通知不回复
    #[error("Invalid notification: {0}")]
    Notification(String),
}

impl Rejection {
    pub fn code(&self) -> i64 {
        match self {
            Rejection::Parse(_) => PARSE_ERROR,
            Rejection::Invalid { .. } | Rejection::Notification(_) => INVALID_REQUEST,
        }
    }

    /// 回给客户端的 JSON-RPC 错误；通知没有回复
    pub fn response(&self) -> Option<Value> {
        let id = match self {
            Rejection::Parse(_) => Value::Null,
            Rejection::Invalid { id, .. } => id.clone(),
            Rejection::Notification(_) => return None,
        };

        Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": self.code(), "message": self.to_string()},
        }))
    }
}

/// 解码一行输入；空行返回 `None`
pub fn decode_line(line: &[u8]) -> Result<Option<RxJsonRpcMessage<RoleServer>>, Rejection> {
    let text = std::str::from_utf8(line).map_err(|e| Rejection::Parse(e.to_string()))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(text).map_err(|e| Rejection::Parse(e.to_string()))?;
    let id = value.get("id").cloned();
    let is_notification = id.is_none() && value.get("method").is_some();

    match serde_json::from_value(value) {
        Ok(message) => Ok(Some(message)),
        Err(e) if is_notification => Err(Rejection::Notification(e.to_string())),
        Err(e) => Err(Rejection::Invalid {
            id: id.unwrap_or(Value::Null),
            reason: e.to_string(),
        }),
    }
}

fn read_messages<R>(reader: R, rejects: mpsc::UnboundedSender<Value>) -> MessageStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(
        (BufReader::new(reader), rejects),
        |(mut reader, rejects)| async move {
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => {
                        debug!("Input closed");
                        return None;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        return None;
                    }
                }

                match decode_line(&buf) {
                    Ok(Some(message)) => return Some((message, (reader, rejects))),
                    Ok(None) => {}
                    Err(rejection) => {
                        warn!(code = rejection.code(), "Rejected inbound message: {}", rejection);
                        if let Some(response) = rejection.response() {
                            if rejects.send(response).is_err() {
                                debug!("Writer gone, dropping rejection");
                            }
                        }
                    }
                }
            }
        },
    )
    .boxed()
}

async fn write_messages<W>(
    mut writer: W,
    mut messages: message_channel::UnboundedReceiver<TxJsonRpcMessage<RoleServer>>,
    mut rejects: mpsc::UnboundedReceiver<Value>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let encoded = tokio::select! {
            Some(message) = messages.next() => serde_json::to_string(&message),
            Some(rejection) = rejects.recv() => serde_json::to_string(&rejection),
            else => break,
        };

        let line = match encoded {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize outbound message: {}", e);
                continue;
            }
        };

        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// 在给定读写端上建立传输
///
/// 返回交给 `ServiceExt::serve` 的 `(sink, stream)` 与写任务句柄；
/// 会话结束、两端通道都关闭后写任务退出。
pub fn line_transport<R, W>(
    reader: R,
    writer: W,
) -> ((MessageSink, MessageStream), JoinHandle<std::io::Result<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sink, messages) = message_channel::unbounded();
    let (rejects_tx, rejects) = mpsc::unbounded_channel();

    let stream = read_messages(reader, rejects_tx);
    let writer_task = tokio::spawn(write_messages(writer, messages, rejects));

    ((sink, stream), writer_task)
}
