//! Text helpers for authoring M source: starter templates, the syntax guide,
//! and the prompt used to have a language model write a swarm.

use mswarm_lang::TokenKind;

/// Turn a free-form task description into a swarm identifier.
///
/// Words the lexer reserves (`loop`, `agent`, `true`, ...) get a `_swarm`
/// suffix so the result still lexes as an identifier.
pub fn swarm_identifier(task: &str) -> String {
    let mut ident: String = task
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if ident.is_empty() {
        return "task".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    let reserved = mswarm_lang::tokenize(&ident)
        .ok()
        .and_then(|tokens| tokens.first().map(|t| t.kind != TokenKind::Identifier))
        .unwrap_or(false);
    if reserved {
        ident.push_str("_swarm");
    }
    ident
}

/// A two-agent research-then-act swarm for `task`.
pub fn template(task: &str) -> String {
    format!(
        r#"// Task: {task}
swarm {name} {{
    agent research_agent {{
        role: "Research and analysis specialist"
        capabilities: "llm,research,analysis"
        inputs: "user_query,context"
        outputs: "research_results,insights"
        config: {{
            model: "gpt-4"
            temperature: 0.7
        }}
    }}

    agent action_agent {{
        role: "Action execution specialist"
        capabilities: "mcp,execution,tools"
        inputs: "research_results,action_plan"
        outputs: "execution_results,status"
        config: {{
            timeout: 300
            retry: 3
        }}
    }}

    workflow sequential {{
        research_agent(input: "user_query", output: "research_results")
        action_agent(input: "research_results", output: "execution_results")
    }}
}}
"#,
        task = task.replace('\n', " "),
        name = swarm_identifier(task),
    )
}

pub const LANGUAGE_GUIDE: &str = r#"M Language Syntax Guide
=======================

1. Swarm definition

   swarm swarm_name {
       agent agent_name {
           role: "Agent role description"
           capabilities: "llm,mcp,research,analysis"
           inputs: "input1,input2"
           outputs: "output1,output2"
           config: {
               model: "gpt-4"
               temperature: 0.7
               timeout: 300
           }
       }

       workflow sequential|parallel|conditional|loop {
           agent_name(input: "input_data", output: "output_data", transform: "to_string",
                      filter: "non_empty", timeout: 300, retry: 3, error: "retry")
       }
   }

   An agent body may hold a whole `swarm { ... }` instead of capabilities. The
   nested swarm runs with the step inputs as its data and returns its final data.

2. Agent types (derived from capabilities)
   - llm:    capabilities contain "llm"
   - mcp:    capabilities contain "mcp" but not "llm"; every other capability names a tool
   - hybrid: neither marker; runs the model and the tools

3. Workflow types
   - sequential:  steps run in order
   - parallel:    steps with no upstream producer run concurrently, the rest follow in order
   - conditional: `conditional ["key", ...]` gates step i on the truthiness of data[key_i]
   - loop:        `loop N` (or `max_iterations: N`) repeats until one iteration fully succeeds

4. Data flow
   - input/output: comma-separated data keys read and written by the step
   - transform:    to_string | to_json | extract_text
   - filter:       non_empty | unique

5. Error handling
   - retry: re-run the failed step (`retry: N` attempts, default from config)
   - skip:  record the failure and continue
   - abort: stop the whole workflow

6. Step limits
   - timeout: seconds allowed per attempt
   - retry:   extra attempts after a failure
"#;

/// Prompt asking a language model to design a swarm for `user_command`.
pub fn architect_prompt(user_command: &str) -> String {
    format!(
        r#"You are an expert agent swarm architect. Your task is to analyze a user request and create a detailed agent swarm specification using the M language.

USER REQUEST: "{user_command}"

Please create an M language specification that defines:
1. The agents needed to complete this task
2. Their roles and capabilities (LLM, MCP, or hybrid)
3. The workflow execution pattern (sequential, parallel, conditional, or loop)
4. Data flow between agents
5. Configuration for each agent

M LANGUAGE SYNTAX:
swarm swarm_name {{
    agent agent_name {{
        role: "Agent role description"
        capabilities: "llm,mcp,research,analysis"
        inputs: "input1,input2"
        outputs: "output1,output2"
        config: {{
            model: "gpt-4"
            temperature: 0.7
            timeout: 300
        }}
    }}

    workflow sequential|parallel|conditional|loop {{
        agent_name(input: "input_data", output: "output_data")
    }}
}}

AVAILABLE TOOLS (for mcp capabilities): read_file, list_dir, file_search, grep_search, run_terminal

The initial data holds one key, "user_command", with the user request.

Please respond ONLY with valid M language code. Do not include any explanations or markdown formatting."#
    )
}

/// Strip a surrounding markdown code fence, if the model added one anyway.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```m, ```text ...).
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swarm_identifier() {
        assert_eq!(swarm_identifier("Research task"), "research_task");
        assert_eq!(swarm_identifier("fix bug #12!"), "fix_bug__12_");
        assert_eq!(swarm_identifier("3d render"), "_3d_render");
        assert_eq!(swarm_identifier("   "), "task");
        assert_eq!(swarm_identifier("Loop"), "loop_swarm");
        assert_eq!(swarm_identifier("TRUE"), "true_swarm");
        assert_eq!(swarm_identifier("looping"), "looping");
    }

    #[test]
    fn test_template_compiles_for_reserved_words() {
        for task in ["Loop", "agent", "config", "true", "input", "workflow"] {
            let source = template(task);
            let spec = mswarm_lang::compile_source(&source)
                .unwrap_or_else(|e| panic!("template for {task:?} failed: {e}"));
            assert_eq!(spec.name, format!("{}_swarm", task.to_lowercase()));
        }
    }

    #[test]
    fn test_template_compiles() {
        let source = template("Research task");
        assert!(source.contains("swarm research_task"));
        assert!(source.contains("// Task: Research task"));

        let spec = mswarm_lang::compile_source(&source).unwrap();
        assert_eq!(spec.name, "research_task");
        assert_eq!(spec.agents.len(), 2);
        assert_eq!(spec.workflow.steps.len(), 2);
        assert_eq!(spec.agents["action_agent"].config["retry"], serde_json::json!(3));
    }

    #[test]
    fn test_architect_prompt_embeds_request() {
        let prompt = architect_prompt("summarize the repo");
        assert!(prompt.contains("USER REQUEST: \"summarize the repo\""));
        assert!(prompt.contains("swarm swarm_name {"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("swarm s {}"), "swarm s {}");
        assert_eq!(strip_code_fences("```m\nswarm s {}\n```"), "swarm s {}");
        assert_eq!(strip_code_fences("  ```\nswarm s {}\n```\n"), "swarm s {}");
        assert_eq!(strip_code_fences("```\nswarm s {}"), "swarm s {}");
    }
}
