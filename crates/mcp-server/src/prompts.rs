use rmcp::model::{GetPromptResult, PromptMessage, PromptMessageRole};
use schemars::JsonSchema;
use serde::Deserialize;

pub const ANALYZE_REGISTER: &str = "analyze_register";

pub const ANALYZE_REGISTER_DESCRIPTION: &str = "Prompt to analyze a Modbus register value.";

/// `analyze_register` 的参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnalyzeRegisterArgs {
    /// The register value to analyze.
    pub value: String,
}

/// 渲染 `analyze_register`
pub fn analyze_register(args: &AnalyzeRegisterArgs) -> GetPromptResult {
    GetPromptResult {
        description: Some(ANALYZE_REGISTER_DESCRIPTION.to_string()),
        messages: vec![
            PromptMessage::new_text(
                PromptMessageRole::User,
                format!("I read this value from a Modbus register: {}", args.value),
            ),
            PromptMessage::new_text(
                PromptMessageRole::User,
                "Can you help me understand what it means?",
            ),
            PromptMessage::new_text(
                PromptMessageRole::Assistant,
                "I'll help analyze the register value. \
                 Please provide any context about the device or system.",
            ),
        ],
    }
}
