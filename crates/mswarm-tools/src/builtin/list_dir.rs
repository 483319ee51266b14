use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use mswarm_core::error::Result;
use mswarm_core::traits::Tool;
use mswarm_core::types::ToolContext;

use super::{exec_error, parse_input, resolve_path};

const MAX_ENTRIES: usize = 500;

pub struct ListDirTool;

#[derive(Deserialize)]
struct ListDirInput {
    #[serde(default)]
    path: Option<String>,
}

impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List files and directories. Input: path (default: working directory)."
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: ListDirInput = parse_input("list_dir", input)?;
            let dir = params
                .path
                .map(|p| resolve_path(&p, &ctx.working_dir))
                .unwrap_or_else(|| ctx.working_dir.clone());

            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| exec_error("list_dir", format!("{}: {}", dir.display(), e)))?;

            let mut files = Vec::new();
            let mut directories = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| exec_error("list_dir", e))?
            {
                let name = entry.file_name().to_string_lossy().to_string();
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    directories.push(name);
                } else {
                    files.push(name);
                }
                if files.len() + directories.len() >= MAX_ENTRIES {
                    break;
                }
            }
            files.sort();
            directories.sort();

            Ok(json!({
                "path": dir.display().to_string(),
                "files": files,
                "directories": directories,
            }))
        })
    }
}
