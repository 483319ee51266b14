use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use mswarm_core::error::{MswarmError, Result};
use mswarm_core::traits::Tool;
use mswarm_core::types::ToolContext;

use super::{exec_error, parse_input};

const MAX_OUTPUT: usize = 30_000;

/// Shell execution. Only registered when `tools.allow_terminal` is set.
pub struct RunTerminalTool;

#[derive(Deserialize)]
struct RunTerminalInput {
    command: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_timeout() -> u64 { 120 }

impl Tool for RunTerminalTool {
    fn name(&self) -> &str {
        "run_terminal"
    }

    fn description(&self) -> &str {
        "Run a shell command in the working directory. Input: command, optional timeout."
    }

    fn timeout_secs(&self) -> u64 {
        300
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: RunTerminalInput = parse_input("run_terminal", input)?;
            debug!(command = %params.command, agent = %ctx.agent, "Running command");

            let result = tokio::time::timeout(
                Duration::from_secs(params.timeout),
                tokio::process::Command::new("sh")
                    .arg("-c")
                    .arg(&params.command)
                    .current_dir(&ctx.working_dir)
                    .kill_on_drop(true)
                    .output(),
            )
            .await;

            let output = match result {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(exec_error("run_terminal", e)),
                Err(_) => {
                    warn!(command = %params.command, "Command timed out");
                    return Err(MswarmError::ToolTimeout {
                        tool: "run_terminal".into(),
                        timeout_secs: params.timeout,
                    });
                }
            };

            let mut stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stdout.len() > MAX_OUTPUT {
                let mut end = MAX_OUTPUT;
                while !stdout.is_char_boundary(end) {
                    end -= 1;
                }
                stdout.truncate(end);
                stdout.push_str("\n... (output truncated)");
            }

            Ok(json!({
                "command": params.command,
                "output": stdout,
                "stderr": stderr,
                "exit_code": output.status.code().unwrap_or(-1),
            }))
        })
    }
}
