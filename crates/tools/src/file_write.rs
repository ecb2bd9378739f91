//! Report writer — saves markdown reports under a fixed directory.

use async_trait::async_trait;
use delve_core::error::ToolError;
use delve_core::tool::{Tool, ToolArgs, string_arg};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileWriteTool {
    /// Directory every report lands in. Created on first write.
    reports_dir: PathBuf,
}

impl FileWriteTool {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Resolve the target path: keep only the final path component and
    /// force a `.md` extension.
    fn target_path(&self, filename: &str) -> Result<PathBuf, ToolError> {
        let base = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'filename' argument".into()))?;

        let name = if base.ends_with(".md") {
            base.to_string()
        } else {
            format!("{base}.md")
        };
        Ok(self.reports_dir.join(name))
    }
}

impl Default for FileWriteTool {
    fn default() -> Self {
        Self::new("reports")
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "write_file(filename: str, content: str) -> str: Writes content to a file. IMPORTANT: You must ask the user for permission *before* calling this tool."
    }

    async fn execute(&self, arguments: &ToolArgs) -> Result<String, ToolError> {
        let path = self.target_path(&string_arg(arguments, "filename"))?;
        let content = string_arg(arguments, "content");

        tokio::fs::create_dir_all(&self.reports_dir).await?;
        tokio::fs::write(&path, &content).await?;

        let chars = content.chars().count();
        debug!(path = %path.display(), chars, "Report written");
        Ok(format!(
            "Successfully wrote content to {}. File size: {chars} characters.",
            path.display()
        ))
    }
}
