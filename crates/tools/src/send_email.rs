//! Email tool — stub that logs the message instead of sending it.

use async_trait::async_trait;
use delve_core::error::ToolError;
use delve_core::tool::{Tool, ToolArgs, string_arg};
use tracing::info;

pub struct SendEmailTool;

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "send_email(to: str, subject: str, body: str) -> str: Sends an email. The user must provide the recipient's email address."
    }

    async fn execute(&self, arguments: &ToolArgs) -> Result<String, ToolError> {
        let to = string_arg(arguments, "to");
        let subject = string_arg(arguments, "subject");
        let body = string_arg(arguments, "body");

        if to.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "Missing recipient address 'to'".into(),
            ));
        }

        info!(%to, %subject, body_len = body.len(), "Mock email sent");
        Ok(format!("Email successfully sent to {to}."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: serde_json::Value) -> ToolArgs {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn reports_recipient() {
        let output = SendEmailTool
            .execute(&args(serde_json::json!({
                "to": "ada@example.com",
                "subject": "Report",
                "body": "Attached."
            })))
            .await
            .unwrap();
        assert_eq!(output, "Email successfully sent to ada@example.com.");
    }

    #[tokio::test]
    async fn missing_recipient_is_an_error() {
        let result = SendEmailTool
            .execute(&args(serde_json::json!({"subject": "hi"})))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
