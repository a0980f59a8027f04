//! stdio 上的 MCP 服务
//!
//! 协议状态机、请求路由与取消由 rmcp 负责；这里提供工具、提示模板和
//! 日志级别的处理，以及会话的启动与收尾。

use crate::prompts::{self, AnalyzeRegisterArgs, ANALYZE_REGISTER};
use crate::sink::{LevelFilter, NotificationSink};
use crate::tools::ToolHandler;
use crate::transport::line_transport;
use anyhow::Context;
use mcp_config::ServerConfig;
use mcp_modbus::OperationDispatcher;
use rmcp::handler::server::router::prompt::PromptRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, GetPromptRequestParam, GetPromptResult, Implementation,
    ListPromptsResult, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, SetLevelRequestParam,
};
use rmcp::service::RequestContext;
use rmcp::{
    prompt, prompt_handler, prompt_router, ErrorData as McpError, RoleServer, ServerHandler,
    ServiceExt,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info};

/// Modbus MCP 服务
pub struct ModbusMcpServer {
    config: ServerConfig,
    tools: ToolHandler,
    log_filter: LevelFilter,
    prompt_router: PromptRouter<Self>,
}

impl ModbusMcpServer {
    pub fn new(config: ServerConfig, dispatcher: Arc<OperationDispatcher>) -> Self {
        Self {
            config,
            tools: ToolHandler::new(dispatcher),
            log_filter: LevelFilter::default(),
            prompt_router: Self::prompt_router(),
        }
    }

    /// 在给定的读写端上运行一次会话，直到输入结束或客户端断开
    pub async fn run<R, W>(self, reader: R, writer: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let dispatcher = self.tools.dispatcher().clone();
        let (transport, writer_task) = line_transport(reader, writer);

        let service = self
            .serve(transport)
            .await
            .context("MCP session failed to initialize")?;
        info!("MCP server listening on stdio");

        let reason = service.waiting().await?;
        info!(reason = ?reason, "MCP session ended");

        writer_task.await??;

        info!(
            active_connections = dispatcher.connections().active_connections(),
            "MCP server stopped"
        );
        Ok(())
    }
}

#[prompt_router]
impl ModbusMcpServer {
    #[prompt(
        name = "analyze_register",
        description = "Prompt to analyze a Modbus register value."
    )]
    async fn analyze_register(
        &self,
        Parameters(args): Parameters<AnalyzeRegisterArgs>,
    ) -> GetPromptResult {
        debug!(prompt = ANALYZE_REGISTER, "Prompt requested");
        prompts::analyze_register(&args)
    }
}

#[prompt_handler]
impl ServerHandler for ModbusMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .enable_logging()
                .build(),
            server_info: Implementation {
                name: self.config.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: self.config.instructions.clone(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools.list()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tools = self.tools.clone();
        let sink = NotificationSink::new(context.peer.clone(), self.log_filter.clone());
        let name = request.name.to_string();
        let arguments = request.arguments;

        // 独立任务执行：panic 变成内部错误，取消时中止任务以释放连接
        let mut task = tokio::spawn(async move { tools.call(&name, arguments, &sink).await });

        tokio::select! {
            joined = &mut task => joined.map_err(|e| {
                error!("Tool call task failed: {}", e);
                McpError::internal_error(e.to_string(), None)
            }),
            _ = context.ct.cancelled() => {
                task.abort();
                info!(tool = %request.name, "Tool call cancelled by client");
                Err(McpError::internal_error("Request cancelled", None))
            }
        }
    }

    async fn set_level(
        &self,
        request: SetLevelRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<(), McpError> {
        info!(level = ?request.level, "Client log level updated");
        self.log_filter.set(request.level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_modbus::ModbusDefaults;

    fn server() -> ModbusMcpServer {
        let dispatcher =
            OperationDispatcher::with_tokio_modbus(Arc::new(ModbusDefaults::default()));
        ModbusMcpServer::new(ServerConfig::default(), Arc::new(dispatcher))
    }

    #[test]
    fn test_server_info() {
        let info = server().get_info();
        let value = serde_json::to_value(&info).unwrap();

        assert_eq!(value["protocolVersion"], "2024-11-05");
        assert_eq!(value["serverInfo"]["name"], "Modbus MCP Server");
        assert!(value["capabilities"]["tools"].is_object());
        assert!(value["capabilities"]["prompts"].is_object());
        assert!(value["capabilities"]["logging"].is_object());
    }
}
