//! Modbus 工具注册表
//!
//! 工具名与 `OperationKind::tool_name` 一一对应。参数错误和操作失败都以
//! `isError: true` 的文本结果返回，不产生 JSON-RPC 错误。

use mcp_modbus::{
    CallTarget, EventSink, Operation, OperationDispatcher, OperationKind, OperationRequest,
};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AddressArgs {
    address: u16,
    #[serde(flatten)]
    target: CallTarget,
}

#[derive(Debug, Deserialize)]
struct CountArgs {
    address: u16,
    count: i64,
    #[serde(flatten)]
    target: CallTarget,
}

#[derive(Debug, Deserialize)]
struct RegisterWriteArgs {
    address: u16,
    value: u16,
    #[serde(flatten)]
    target: CallTarget,
}

#[derive(Debug, Deserialize)]
struct CoilWriteArgs {
    address: u16,
    value: bool,
    #[serde(flatten)]
    target: CallTarget,
}

fn description(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::ReadHoldingRegister => "Read a single Modbus holding register.",
        OperationKind::WriteHoldingRegister => "Write a value to a Modbus holding register.",
        OperationKind::ReadCoils => "Read the status of multiple Modbus coils.",
        OperationKind::WriteCoil => "Write a value to a single Modbus coil.",
        OperationKind::ReadInputRegisters => "Read multiple Modbus input registers.",
        OperationKind::ReadMultipleHoldingRegisters => "Read multiple Modbus holding registers.",
    }
}

fn input_schema(kind: OperationKind) -> JsonObject {
    let mut properties = Map::new();
    let mut required = vec!["address"];

    properties.insert(
        "address".to_string(),
        json!({
            "type": "integer",
            "minimum": 0,
            "maximum": 65535,
            "description": "The starting address (0-65535)."
        }),
    );

    match kind {
        OperationKind::WriteHoldingRegister => {
            properties.insert(
                "value".to_string(),
                json!({
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 65535,
                    "description": "The value to write (0-65535)."
                }),
            );
            required.push("value");
        }
        OperationKind::WriteCoil => {
            properties.insert(
                "value".to_string(),
                json!({"type": "boolean", "description": "The coil state to write."}),
            );
            required.push("value");
        }
        OperationKind::ReadCoils
        | OperationKind::ReadInputRegisters
        | OperationKind::ReadMultipleHoldingRegisters => {
            properties.insert(
                "count".to_string(),
                json!({"type": "integer", "description": "Number of elements to read."}),
            );
            required.push("count");
        }
        OperationKind::ReadHoldingRegister => {}
    }

    properties.insert(
        "slave_id".to_string(),
        json!({
            "type": "integer",
            "minimum": 0,
            "maximum": 255,
            "description": "The Modbus slave ID (device ID)."
        }),
    );
    properties.insert(
        "host".to_string(),
        json!({"type": "string", "description": "The target host IP or hostname."}),
    );
    properties.insert(
        "port".to_string(),
        json!({
            "type": "integer",
            "minimum": 0,
            "maximum": 65535,
            "description": "The target port."
        }),
    );
    properties.insert(
        "transport".to_string(),
        json!({
            "type": "string",
            "enum": ["tcp", "udp", "serial"],
            "description": "The transport type."
        }),
    );

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    schema.insert("required".to_string(), json!(required));
    schema
}

/// 所有工具的描述
pub fn tool_definitions() -> Vec<Tool> {
    OperationKind::ALL
        .iter()
        .map(|kind| {
            Tool::new(
                kind.tool_name(),
                description(*kind),
                Arc::new(input_schema(*kind)),
            )
        })
        .collect()
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, String> {
    serde_json::from_value(arguments)
        .map_err(|e| format!("Error: Invalid arguments for {}: {}", tool, e))
}

/// 把工具调用参数转换为操作请求
pub fn parse_request(name: &str, arguments: Option<Value>) -> Result<OperationRequest, String> {
    let kind = OperationKind::from_tool_name(name)
        .ok_or_else(|| format!("Error: Unknown tool: {}", name))?;
    let arguments = arguments.unwrap_or_else(|| Value::Object(Map::new()));

    let request = match kind {
        OperationKind::ReadHoldingRegister => {
            let args: AddressArgs = parse_args(name, arguments)?;
            OperationRequest::new(
                Operation::ReadHoldingRegister {
                    address: args.address,
                },
                args.target,
            )
        }
        OperationKind::WriteHoldingRegister => {
            let args: RegisterWriteArgs = parse_args(name, arguments)?;
            OperationRequest::new(
                Operation::WriteHoldingRegister {
                    address: args.address,
                    value: args.value,
                },
                args.target,
            )
        }
        OperationKind::ReadCoils => {
            let args: CountArgs = parse_args(name, arguments)?;
            OperationRequest::new(
                Operation::ReadCoils {
                    address: args.address,
                    count: args.count,
                },
                args.target,
            )
        }
        OperationKind::WriteCoil => {
            let args: CoilWriteArgs = parse_args(name, arguments)?;
            OperationRequest::new(
                Operation::WriteCoil {
                    address: args.address,
                    value: args.value,
                },
                args.target,
            )
        }
        OperationKind::ReadInputRegisters => {
            let args: CountArgs = parse_args(name, arguments)?;
            OperationRequest::new(
                Operation::ReadInputRegisters {
                    address: args.address,
                    count: args.count,
                },
                args.target,
            )
        }
        OperationKind::ReadMultipleHoldingRegisters => {
            let args: CountArgs = parse_args(name, arguments)?;
            OperationRequest::new(
                Operation::ReadMultipleHoldingRegisters {
                    address: args.address,
                    count: args.count,
                },
                args.target,
            )
        }
    };

    Ok(request)
}

/// 工具调用处理器
#[derive(Clone)]
pub struct ToolHandler {
    dispatcher: Arc<OperationDispatcher>,
}

impl ToolHandler {
    pub fn new(dispatcher: Arc<OperationDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<OperationDispatcher> {
        &self.dispatcher
    }

    pub fn list(&self) -> Vec<Tool> {
        tool_definitions()
    }

    /// 执行工具调用
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        sink: &dyn EventSink,
    ) -> CallToolResult {
        debug!(tool = %name, "Tool call received");

        let request = match parse_request(name, arguments.map(Value::Object)) {
            Ok(request) => request,
            Err(message) => return CallToolResult::error(vec![Content::text(message)]),
        };

        let result = self.dispatcher.execute(&request, sink).await;
        let content = vec![Content::text(result.message())];
        if result.is_success() {
            CallToolResult::success(content)
        } else {
            CallToolResult::error(content)
        }
    }
}
