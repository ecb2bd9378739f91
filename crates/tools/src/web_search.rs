//! Web search tool — stub that returns mock search results.
//!
//! In production this would call a real search API. The stub returns
//! plausible, query-shaped results so the research loop can be exercised
//! end-to-end without network access.

use async_trait::async_trait;
use delve_core::error::ToolError;
use delve_core::tool::{Tool, ToolArgs, string_arg};

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "search(query: str) -> str: Searches the web and returns summaries of top results."
    }

    async fn execute(&self, arguments: &ToolArgs) -> Result<String, ToolError> {
        let query = string_arg(arguments, "query");
        Ok(format_results(&mock_results(&query)))
    }
}

struct SearchResult {
    title: String,
    link: String,
    snippet: String,
}

fn mock_results(query: &str) -> Vec<SearchResult> {
    vec![
        SearchResult {
            title: format!("Latest developments in {query}"),
            link: "https://example.com/article1".into(),
            snippet: format!(
                "Comprehensive coverage of {query} with recent updates and expert analysis from leading researchers and industry experts."
            ),
        },
        SearchResult {
            title: format!("{query} - Breaking News and Updates"),
            link: "https://example.com/news".into(),
            snippet: format!(
                "Latest news and developments related to {query} from trusted sources, including recent breakthroughs and market trends."
            ),
        },
        SearchResult {
            title: format!("Complete Guide to {query}"),
            link: "https://example.com/guide".into(),
            snippet: format!(
                "In-depth guide covering everything you need to know about {query}, including best practices and future outlook."
            ),
        },
    ]
}

/// Numbered markdown list, one block per result.
fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No search results found.".into();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. **{}**\n   URL: {}\n   Summary: {}\n",
                i + 1,
                r.title,
                r.link,
                r.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
