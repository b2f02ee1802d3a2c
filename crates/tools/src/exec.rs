//! The `bash` tool: runs a shell command on the host, gated by the approval
//! broker's policy check and the dangerous-pattern safety floor.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use relaykit_agents::tool_registry::AgentTool;
use serde::{Deserialize, Serialize};
use tokio::{process::Command, sync::Mutex};
use tracing::{debug, warn};

use crate::approval::{ApprovalBroker, ApprovalDecision, ApprovalMode, PolicyAction, SecurityLevel, check_command_policy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone)]
pub struct ExecOpts {
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub working_dir: Option<PathBuf>,
}

impl Default for ExecOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_output_bytes: 200 * 1024,
            working_dir: None,
        }
    }
}

fn truncate_for_display(output: &mut String, max_output_bytes: usize) {
    if output.len() <= max_output_bytes {
        return;
    }
    output.truncate(output.floor_char_boundary(max_output_bytes));
    output.push_str("\n... [output truncated]");
}

/// Runs `command` with the given options. Not approval-gated by itself —
/// callers go through [`BashTool::execute`] for the policy check.
pub async fn run_command(command: &str, opts: &ExecOpts) -> std::io::Result<ExecResult> {
    debug!(command, timeout_secs = opts.timeout.as_secs(), "exec: running command");

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = &opts.working_dir {
        cmd.current_dir(dir);
    }

    let output = tokio::time::timeout(opts.timeout, cmd.output())
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "command timed out"))??;

    let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    truncate_for_display(&mut stdout, opts.max_output_bytes);
    truncate_for_display(&mut stderr, opts.max_output_bytes);

    Ok(ExecResult {
        stdout,
        stderr,
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// The `bash` tool, exposed to the agent runtime's tool registry.
pub struct BashTool {
    broker: Arc<ApprovalBroker>,
    mode: ApprovalMode,
    security_level: SecurityLevel,
    allowlist: Vec<String>,
    approved_this_session: Mutex<HashSet<String>>,
    opts: ExecOpts,
}

impl BashTool {
    pub fn new(broker: Arc<ApprovalBroker>, mode: ApprovalMode, security_level: SecurityLevel, allowlist: Vec<String>) -> Self {
        Self {
            broker,
            mode,
            security_level,
            allowlist,
            approved_this_session: Mutex::new(HashSet::new()),
            opts: ExecOpts::default(),
        }
    }
}

#[async_trait]
impl AgentTool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command on the host and return its stdout, stderr, and exit code."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "cmd": {"type": "string", "description": "Shell command to run"},
            },
            "required": ["cmd"],
        })
    }

    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let cmd = params["cmd"].as_str().ok_or_else(|| anyhow::anyhow!("missing 'cmd' parameter"))?;

        let approved_this_session = self.approved_this_session.lock().await.clone();
        let action = check_command_policy(cmd, self.mode, self.security_level, &self.allowlist, &approved_this_session)?;

        if action == PolicyAction::NeedsApproval {
            let (id, rx) = self.broker.request("bash", &params).await;
            let decision = self.broker.await_decision(rx).await;
            if decision == ApprovalDecision::Timeout {
                self.broker.decide(&id, decision).await.ok();
            }
            self.broker.consume(&id, "bash", &params).await?;
            if decision == ApprovalDecision::Approved {
                self.approved_this_session.lock().await.insert(cmd.to_string());
            } else {
                warn!(cmd, ?decision, "bash: command not approved");
                return Ok(serde_json::json!({"denied": true, "decision": format!("{decision:?}")}));
            }
        }

        let result = run_command(cmd, &self.opts).await.map_err(|e| anyhow::anyhow!("exec failed: {e}"))?;
        Ok(serde_json::to_value(result)?)
    }
}
