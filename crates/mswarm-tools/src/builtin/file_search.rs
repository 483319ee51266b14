use std::path::PathBuf;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use mswarm_core::error::{MswarmError, Result};
use mswarm_core::traits::Tool;
use mswarm_core::types::ToolContext;

use super::{parse_input, resolve_path};

const MAX_FILES: usize = 200;

pub struct FileSearchTool;

#[derive(Deserialize)]
struct FileSearchInput {
    #[serde(alias = "pattern")]
    query: String,
    #[serde(default)]
    path: Option<String>,
}

impl Tool for FileSearchTool {
    fn name(&self) -> &str {
        "file_search"
    }

    fn description(&self) -> &str {
        "Find files by glob pattern or name fragment. Input: query, optional path."
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: FileSearchInput = parse_input("file_search", input)?;
            let base = params
                .path
                .as_deref()
                .map(|p| resolve_path(p, &ctx.working_dir))
                .unwrap_or_else(|| ctx.working_dir.clone());

            // A bare fragment matches anywhere below `base`.
            let relative = if params.query.contains(&['*', '?', '['][..]) {
                params.query.clone()
            } else {
                format!("**/*{}*", params.query)
            };
            let pattern = format!(
                "{}/{}",
                glob::Pattern::escape(&base.to_string_lossy()),
                relative
            );
            debug!(pattern = %pattern, "File search");

            let entries = glob::glob(&pattern)
                .map_err(|e| MswarmError::ToolValidation(format!("Invalid pattern: {}", e)))?;

            let mut files: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .filter(|p| p.is_file())
                .collect();
            files.sort();
            let total = files.len();
            files.truncate(MAX_FILES);

            let files: Vec<String> = files
                .iter()
                .map(|p| {
                    p.strip_prefix(&base)
                        .unwrap_or(p)
                        .to_string_lossy()
                        .to_string()
                })
                .collect();

            Ok(json!({
                "query": params.query,
                "files": files,
                "total": total,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("src/nested/report.md"), "# r").unwrap();
        std::fs::write(dir.path().join("README.md"), "hi").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_glob_query() {
        let dir = fixture();
        let out = FileSearchTool
            .execute(json!({"query": "**/*.md"}), ToolContext::new("a", dir.path()))
            .await
            .unwrap();
        let files: Vec<String> = serde_json::from_value(out["files"].clone()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.ends_with("report.md")));
    }

    #[tokio::test]
    async fn test_fragment_query() {
        let dir = fixture();
        let out = FileSearchTool
            .execute(json!({"query": "main"}), ToolContext::new("a", dir.path()))
            .await
            .unwrap();
        assert_eq!(out["total"], 1);
        assert!(out["files"][0].as_str().unwrap().ends_with("main.rs"));
    }
}
