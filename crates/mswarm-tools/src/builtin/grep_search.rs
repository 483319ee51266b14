use std::path::Path;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use mswarm_core::error::{MswarmError, Result};
use mswarm_core::traits::Tool;
use mswarm_core::types::ToolContext;

use super::{parse_input, resolve_path};

pub struct GrepSearchTool;

#[derive(Deserialize)]
struct GrepSearchInput {
    #[serde(alias = "query")]
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    glob_filter: Option<String>,
    #[serde(default)]
    max_results: Option<usize>,
}

impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Search file contents with a regex. Input: pattern, optional path, glob_filter, max_results."
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: GrepSearchInput = parse_input("grep_search", input)?;

            let re = regex::Regex::new(&params.pattern)
                .map_err(|e| MswarmError::ToolValidation(format!("Invalid regex: {}", e)))?;

            let glob_pattern = params
                .glob_filter
                .as_deref()
                .map(glob::Pattern::new)
                .transpose()
                .map_err(|e| MswarmError::ToolValidation(format!("Invalid glob filter: {}", e)))?;

            let base = params
                .path
                .as_deref()
                .map(|p| resolve_path(p, &ctx.working_dir))
                .unwrap_or_else(|| ctx.working_dir.clone());
            let max_results = params.max_results.unwrap_or(50);

            debug!(pattern = %params.pattern, path = %base.display(), "Grep search");

            // Directory walking is blocking work.
            let (matches, total) = tokio::task::spawn_blocking(move || {
                let mut matches = Vec::new();
                let mut total = 0usize;

                if base.is_file() {
                    search_file(&base, &re, max_results, &mut matches, &mut total);
                } else {
                    for entry in walkdir::WalkDir::new(&base)
                        .into_iter()
                        .filter_map(|e| e.ok())
                        .filter(|e| e.file_type().is_file())
                    {
                        let path = entry.path();
                        if let Some(ref pat) = glob_pattern {
                            let name = path.file_name().unwrap_or_default().to_string_lossy();
                            if !pat.matches(&name) {
                                continue;
                            }
                        }
                        search_file(path, &re, max_results, &mut matches, &mut total);
                    }
                }
                (matches, total)
            })
            .await
            .map_err(|e| super::exec_error("grep_search", e))?;

            Ok(json!({
                "pattern": params.pattern,
                "matches": matches,
                "total": total,
            }))
        })
    }
}

fn search_file(
    path: &Path,
    re: &regex::Regex,
    max_results: usize,
    matches: &mut Vec<String>,
    total: &mut usize,
) {
    // Unreadable and non-UTF-8 files are skipped.
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };

    for (i, line) in content.lines().enumerate() {
        if re.is_match(line) {
            *total += 1;
            if matches.len() < max_results {
                matches.push(format!("{}:{}:{}", path.display(), i + 1, line));
            }
        }
    }
}
