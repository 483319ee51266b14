use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use mswarm_core::error::Result;
use mswarm_core::traits::Tool;
use mswarm_core::types::ToolContext;

use super::{exec_error, parse_input, resolve_path};

const MAX_BYTES: usize = 256 * 1024;

pub struct ReadFileTool;

#[derive(Deserialize)]
struct ReadFileInput {
    #[serde(alias = "path")]
    file_path: String,
}

impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file. Input: file_path."
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: ReadFileInput = parse_input("read_file", input)?;
            let path = resolve_path(&params.file_path, &ctx.working_dir);
            debug!(path = %path.display(), agent = %ctx.agent, "Reading file");

            let mut content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| exec_error("read_file", format!("{}: {}", path.display(), e)))?;

            let truncated = content.len() > MAX_BYTES;
            if truncated {
                let mut end = MAX_BYTES;
                while !content.is_char_boundary(end) {
                    end -= 1;
                }
                content.truncate(end);
            }

            Ok(json!({
                "file_path": path.display().to_string(),
                "lines": content.lines().count(),
                "truncated": truncated,
                "content": content,
            }))
        })
    }
}
