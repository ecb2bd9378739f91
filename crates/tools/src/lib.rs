//! Built-in tool implementations for Delve.
//!
//! Tools give the research loop the ability to act: search the web, check
//! the weather, write a report, send an email. All four are placeholders
//! that produce realistic output without touching third-party services.

pub mod file_write;
pub mod send_email;
pub mod weather_lookup;
pub mod web_search;

use delve_config::ToolsConfig;
use delve_core::tool::ToolRegistry;

pub use file_write::FileWriteTool;
pub use send_email::SendEmailTool;
pub use weather_lookup::WeatherLookupTool;
pub use web_search::WebSearchTool;

/// Create a registry with every built-in tool, reports going to `reports/`.
pub fn default_registry() -> ToolRegistry {
    registry_from_config(&ToolsConfig::default())
}

/// Create a registry with every built-in tool, honouring `[tools]` config.
pub fn registry_from_config(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WebSearchTool));
    registry.register(Box::new(FileWriteTool::new(&config.reports_dir)));
    registry.register(Box::new(WeatherLookupTool));
    registry.register(Box::new(SendEmailTool));
    registry
}
