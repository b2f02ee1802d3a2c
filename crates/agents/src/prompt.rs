//! System prompt assembly.
//!
//! Per the agent profile resolution step, a turn's system prompt is built
//! from the agent's bootstrap documents (`SOUL.md`, `MEMORY.md`, `TOOLS.md`),
//! the enabled tool set, and the host runtime context. Bootstrap documents
//! are injected once per turn, ahead of history, and count against the
//! bootstrap slice of the token budget (see `relaykit_memory::budget`).

use crate::tool_registry::ToolRegistry;

/// Runtime context for the host process running the current agent turn.
#[derive(Debug, Clone, Default)]
pub struct PromptHostRuntimeContext {
    pub host: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
    pub shell: Option<String>,
    /// Current datetime string for prompt context, localized when timezone is known.
    pub time: Option<String>,
    /// Current date string (`YYYY-MM-DD`) for prompt context.
    pub today: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub session_key: Option<String>,
}

/// Runtime context for sandbox execution routing used by the `exec` tool.
#[derive(Debug, Clone, Default)]
pub struct PromptSandboxRuntimeContext {
    pub exec_sandboxed: bool,
    pub backend: Option<String>,
    pub home: Option<String>,
    pub no_network: Option<bool>,
}

/// Combined runtime context injected into the system prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptRuntimeContext {
    pub host: PromptHostRuntimeContext,
    pub sandbox: Option<PromptSandboxRuntimeContext>,
}

/// An agent's bootstrap documents, read once per turn from
/// `agents/<agentId>/agent/{SOUL.md,MEMORY.md,TOOLS.md}`.
#[derive(Debug, Clone, Default)]
pub struct BootstrapDocuments<'a> {
    /// `SOUL.md` — persona and operating principles.
    pub soul: Option<&'a str>,
    /// `MEMORY.md` — long-term facts carried into every turn.
    pub memory: Option<&'a str>,
    /// `TOOLS.md` — workspace-specific tool usage notes.
    pub tools: Option<&'a str>,
}

/// Maximum characters from each bootstrap document injected into the
/// prompt; the context engine hands back the real budget, this is just a
/// hard backstop against one enormous file blowing the bootstrap slice.
const BOOTSTRAP_DOC_MAX_CHARS: usize = 8_000;

const TOOL_CALL_GUIDANCE: &str = concat!(
    "## How to call tools\n\n",
    "For a tool call, output ONLY this JSON block:\n\n",
    "```tool_call\n",
    "{\"tool\": \"<tool_name>\", \"arguments\": {<arguments>}}\n",
    "```\n\n",
    "No text before or after the block. After execution, continue normally.\n\n",
);

const GUIDELINES: &str = concat!(
    "## Guidelines\n\n",
    "- Start with a normal conversational response. Do not call tools for greetings, ",
    "small talk, or questions you can answer directly.\n",
    "- Before tool calls, briefly state what you are about to do.\n",
    "- For multi-step tasks, execute one step at a time and check results before proceeding.\n",
    "- Be careful with destructive operations; confirm with the user first.\n",
    "- When nothing meaningful remains to say after a tool call, return an empty response.\n",
);

/// Build the system prompt for an agent turn.
///
/// When `native_tools` is true, tool schemas are sent via the provider's
/// native tool-calling mechanism and this prompt only lists their names.
/// When false, full schemas are rendered in-prompt and the model is told to
/// emit tool calls as fenced `tool_call` JSON blocks for the runner to parse.
pub fn build_system_prompt(tools: &ToolRegistry, native_tools: bool, bootstrap: &BootstrapDocuments<'_>) -> String {
    build_system_prompt_with_runtime(tools, native_tools, bootstrap, None)
}

/// Build the system prompt with explicit host/sandbox runtime context.
pub fn build_system_prompt_with_runtime(
    tools: &ToolRegistry,
    native_tools: bool,
    bootstrap: &BootstrapDocuments<'_>,
    runtime_context: Option<&PromptRuntimeContext>,
) -> String {
    let tool_schemas = tools.list_schemas();
    let mut prompt = String::from("You are a helpful assistant. You can use tools when needed.\n\n");

    append_soul_section(&mut prompt, bootstrap.soul);
    append_memory_section(&mut prompt, bootstrap.memory, &tool_schemas);
    append_tools_md_section(&mut prompt, bootstrap.tools);
    append_available_tools_section(&mut prompt, native_tools, &tool_schemas);
    append_tool_call_guidance(&mut prompt, native_tools, &tool_schemas);
    append_runtime_section(&mut prompt, runtime_context);
    prompt.push_str(GUIDELINES);

    prompt
}

fn append_soul_section(prompt: &mut String, soul_text: Option<&str>) {
    let Some(text) = soul_text else { return };
    prompt.push_str("## Soul\n\n");
    append_truncated_text_block(prompt, text, BOOTSTRAP_DOC_MAX_CHARS, "\n*(SOUL.md truncated for prompt size.)*\n");
    prompt.push_str("\n\n");
}

fn append_memory_section(prompt: &mut String, memory_text: Option<&str>, tool_schemas: &[serde_json::Value]) {
    let has_memory_search = has_tool_schema(tool_schemas, "memory_search");
    let has_memory_save = has_tool_schema(tool_schemas, "memory_save");
    let memory_text = memory_text.filter(|text| !text.is_empty());
    if memory_text.is_none() && !has_memory_search && !has_memory_save {
        return;
    }

    prompt.push_str("## Long-Term Memory\n\n");
    if let Some(text) = memory_text {
        append_truncated_text_block(
            prompt,
            text,
            BOOTSTRAP_DOC_MAX_CHARS,
            "\n\n*(MEMORY.md truncated — use `memory_search` for full content)*\n",
        );
        prompt.push_str("\n\n**The facts above are already known about the user. Use them without re-asking.**\n");
    }
    if has_memory_search {
        prompt.push_str("\nYou also have `memory_search` to find older session history beyond what is shown above.\n");
    }
    if has_memory_save {
        prompt.push_str(
            "\nWhen the user asks you to remember something, you MUST call `memory_save` to persist it.\n",
        );
    }
    prompt.push('\n');
}

fn append_tools_md_section(prompt: &mut String, tools_text: Option<&str>) {
    let Some(text) = tools_text else { return };
    prompt.push_str("## Workspace Tool Notes (TOOLS.md)\n\n");
    append_truncated_text_block(prompt, text, BOOTSTRAP_DOC_MAX_CHARS, "\n*(TOOLS.md truncated for prompt size.)*\n");
    prompt.push_str("\n\n");
}

fn has_tool_schema(tool_schemas: &[serde_json::Value], tool_name: &str) -> bool {
    tool_schemas.iter().any(|schema| schema["name"].as_str() == Some(tool_name))
}

fn append_available_tools_section(prompt: &mut String, native_tools: bool, tool_schemas: &[serde_json::Value]) {
    if tool_schemas.is_empty() {
        return;
    }

    prompt.push_str("## Available Tools\n\n");
    if native_tools {
        // Native tool-calling providers already receive full schemas via the API.
        // Keep this section compact so we don't duplicate large JSON payloads.
        for schema in tool_schemas {
            let name = schema["name"].as_str().unwrap_or("unknown");
            let desc = truncate_prompt_text(schema["description"].as_str().unwrap_or(""), 160);
            if desc.is_empty() {
                prompt.push_str(&format!("- `{name}`\n"));
            } else {
                prompt.push_str(&format!("- `{name}`: {desc}\n"));
            }
        }
        prompt.push('\n');
        return;
    }

    for schema in tool_schemas {
        let name = schema["name"].as_str().unwrap_or("unknown");
        let desc = schema["description"].as_str().unwrap_or("");
        let params = &schema["parameters"];
        prompt.push_str(&format!(
            "### {name}\n{desc}\n\nParameters:\n```json\n{}\n```\n\n",
            serde_json::to_string(params).unwrap_or_default()
        ));
    }
}

fn append_tool_call_guidance(prompt: &mut String, native_tools: bool, tool_schemas: &[serde_json::Value]) {
    if !native_tools && !tool_schemas.is_empty() {
        prompt.push_str(TOOL_CALL_GUIDANCE);
    }
}

fn append_runtime_section(prompt: &mut String, runtime_context: Option<&PromptRuntimeContext>) {
    let Some(runtime) = runtime_context else { return };

    let host_line = format_host_runtime_line(&runtime.host);
    let sandbox_line = runtime.sandbox.as_ref().map(format_sandbox_runtime_line);
    if host_line.is_none() && sandbox_line.is_none() {
        return;
    }

    prompt.push_str("## Runtime\n\n");
    if let Some(line) = host_line {
        prompt.push_str(&line);
        prompt.push('\n');
    }
    if let Some(line) = sandbox_line {
        prompt.push_str(&line);
        prompt.push('\n');
    }
    prompt.push('\n');
}

fn push_non_empty_runtime_field(parts: &mut Vec<String>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        parts.push(format!("{key}={value}"));
    }
}

fn format_host_runtime_line(host: &PromptHostRuntimeContext) -> Option<String> {
    let mut parts = Vec::new();
    for (key, value) in [
        ("host", host.host.as_deref()),
        ("os", host.os.as_deref()),
        ("arch", host.arch.as_deref()),
        ("shell", host.shell.as_deref()),
        ("today", host.today.as_deref()),
        ("provider", host.provider.as_deref()),
        ("model", host.model.as_deref()),
        ("session", host.session_key.as_deref()),
    ] {
        push_non_empty_runtime_field(&mut parts, key, value);
    }
    (!parts.is_empty()).then(|| format!("Host: {}", parts.join(" | ")))
}

fn format_sandbox_runtime_line(sandbox: &PromptSandboxRuntimeContext) -> String {
    let mut parts = vec![format!("enabled={}", sandbox.exec_sandboxed)];
    push_non_empty_runtime_field(&mut parts, "backend", sandbox.backend.as_deref());
    push_non_empty_runtime_field(&mut parts, "home", sandbox.home.as_deref());
    if let Some(no_network) = sandbox.no_network {
        parts.push(format!("network={}", if no_network { "disabled" } else { "enabled" }));
    }
    format!("Sandbox(exec): {}", parts.join(" | "))
}

fn truncate_prompt_text(text: &str, max_chars: usize) -> String {
    if text.is_empty() || max_chars == 0 {
        return String::new();
    }
    let mut iter = text.chars();
    let taken: String = iter.by_ref().take(max_chars).collect();
    if iter.next().is_some() { format!("{taken}...") } else { taken }
}

fn append_truncated_text_block(prompt: &mut String, text: &str, max_chars: usize, truncated_notice: &str) {
    let truncated = truncate_prompt_text(text, max_chars);
    prompt.push_str(&truncated);
    if text.chars().count() > max_chars {
        prompt.push_str(truncated_notice);
    }
}
