//! Approval broker: gates dangerous tool invocations behind an operator
//! decision.
//!
//! An `approvalId` is minted together with a digest over the tool name and
//! its canonicalised arguments. The digest is checked again at execution
//! time — if the agent (bug or attack) re-issues the same `approvalId` with
//! different arguments, the digest mismatch rejects the call instead of
//! silently executing the new arguments under the old approval.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, warn};

/// Outcome of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Denied,
    Timeout,
}

/// Approval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    Off,
    #[default]
    OnMiss,
    Always,
}

impl ApprovalMode {
    /// Parse approval mode from config value, accepting legacy aliases.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "never" => Some(Self::Off),
            "on-miss" | "on_miss" | "smart" => Some(Self::OnMiss),
            "always" => Some(Self::Always),
            _ => None,
        }
    }
}

/// Errors the broker can raise while minting or consuming an approval.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown approvalId")]
    Unknown,
    #[error("approval expired")]
    Expired,
    #[error("approval already consumed")]
    AlreadyConsumed,
    #[error("approval digest mismatch: arguments changed since approval was granted")]
    DigestMismatch,
    #[error("approval was denied")]
    Denied,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Dangerous patterns that force approval regardless of a tool's own policy.
/// Generalized across tools: any tool whose args, once flattened to a
/// string, match one of these is treated as dangerous. Shell-exec patterns
/// dominate the list because that's the highest-blast-radius surface, but
/// the check is not exec-specific.
static DANGEROUS_PATTERN_DEFS: &[(&str, &str)] = &[
    (r"rm\s+(-\S*[rR]\S*\s+)*/(\s|$|\*)", "rm -r on filesystem root"),
    (r"rm\s+(-\S*[rR]\S*\s+)+(~|\$HOME)", "rm -r on home directory"),
    (r"\bmkfs\b", "make filesystem"),
    (r"\bdd\b.*\bif=/dev/(zero|urandom)\b", "disk overwrite with dd"),
    (r":\(\)\s*\{.*\|.*&\s*\}\s*;", "fork bomb"),
    (r"git\s+reset\s+--hard", "git reset --hard"),
    (r"git\s+push\s+.*(-\S*f\S*|--force\b|--force-with-lease\b)", "git force push"),
    (r"git\s+clean\s+(-\S*f)", "git clean with force"),
    (r"(?i)\bDROP\s+(TABLE|DATABASE|SCHEMA)\b", "DROP TABLE/DATABASE"),
    (r"(?i)\bTRUNCATE\b", "TRUNCATE"),
    (r"docker\s+system\s+prune", "docker system prune"),
    (r"kubectl\s+delete\s+namespace", "kubectl delete namespace"),
    (r"terraform\s+destroy", "terraform destroy"),
    (r"chmod\s+(-\S*R\S*\s+)*777\s+/", "recursive chmod 777 on root"),
];

static DANGEROUS_SET: std::sync::LazyLock<regex::RegexSet> = std::sync::LazyLock::new(|| {
    regex::RegexSet::new(DANGEROUS_PATTERN_DEFS.iter().map(|(p, _)| *p))
        .unwrap_or_else(|e| panic!("built-in dangerous patterns must be valid regex: {e}"))
});

/// Checks `flattened` (any tool's arguments rendered to a single string)
/// against the dangerous-pattern safety floor. Returns the matched
/// description, if any.
pub fn check_dangerous(flattened: &str) -> Option<&'static str> {
    DANGEROUS_SET.matches(flattened).iter().next().map(|i| DANGEROUS_PATTERN_DEFS[i].1)
}

fn digest_of(tool: &str, args: &serde_json::Value) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update(b"\0");
    hasher.update(args.to_string().as_bytes());
    hasher.finalize().into()
}

fn new_approval_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

struct Record {
    digest: [u8; 32],
    expires_at: Instant,
    consumed: bool,
    decision: Option<ApprovalDecision>,
    waiter: Option<oneshot::Sender<ApprovalDecision>>,
}

/// Tracks outstanding approvals and the commands/args they were minted
/// against. One broker instance per gateway process; approvals don't
/// survive a restart.
pub struct ApprovalBroker {
    pending: RwLock<HashMap<String, Record>>,
    approved_before: RwLock<HashSet<String>>,
    ttl: Duration,
}

impl Default for ApprovalBroker {
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60))
    }
}

impl ApprovalBroker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            approved_before: RwLock::new(HashSet::new()),
            ttl,
        }
    }

    /// Mints a new `approvalId` bound to a digest over `tool`/`args`, and a
    /// receiver the caller awaits for the operator's decision. This is the
    /// point at which an `approval.requested` event should be emitted.
    pub async fn request(&self, tool: &str, args: &serde_json::Value) -> (String, oneshot::Receiver<ApprovalDecision>) {
        let id = new_approval_id();
        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(
            id.clone(),
            Record {
                digest: digest_of(tool, args),
                expires_at: Instant::now() + self.ttl,
                consumed: false,
                decision: None,
                waiter: Some(tx),
            },
        );
        debug!(id, tool, "approval requested");
        (id, rx)
    }

    /// Records the operator's decision for `id`. This is the point at which
    /// an `approval.decide` event has been received from the gateway.
    pub async fn decide(&self, id: &str, decision: ApprovalDecision) -> Result<()> {
        let mut pending = self.pending.write().await;
        let record = pending.get_mut(id).ok_or(Error::Unknown)?;
        if record.consumed {
            return Err(Error::AlreadyConsumed);
        }
        record.decision = Some(decision);
        if let Some(tx) = record.waiter.take() {
            let _ = tx.send(decision);
        }
        Ok(())
    }

    /// Waits out `request`'s receiver with the broker's TTL, converting a
    /// closed channel or elapsed deadline into `Timeout`/`Denied`.
    pub async fn await_decision(&self, rx: oneshot::Receiver<ApprovalDecision>) -> ApprovalDecision {
        match tokio::time::timeout(self.ttl, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => {
                warn!("approval channel closed before a decision arrived");
                ApprovalDecision::Denied
            },
            Err(_) => {
                warn!("approval timed out waiting for a decision");
                ApprovalDecision::Timeout
            },
        }
    }

    /// Consumes `id` for execution against `tool`/`args`. Fails with
    /// `DigestMismatch` if the arguments at execution time don't match what
    /// was approved, `Expired` past the TTL, and `AlreadyConsumed` on
    /// replay — each distinct case the approval-replay defence must catch.
    pub async fn consume(&self, id: &str, tool: &str, args: &serde_json::Value) -> Result<()> {
        let mut pending = self.pending.write().await;
        let record = pending.get_mut(id).ok_or(Error::Unknown)?;

        if record.consumed {
            return Err(Error::AlreadyConsumed);
        }
        if Instant::now() > record.expires_at {
            record.consumed = true;
            return Err(Error::Expired);
        }
        if record.digest != digest_of(tool, args) {
            warn!(id, tool, "approval digest mismatch, rejecting as replay");
            return Err(Error::DigestMismatch);
        }
        match record.decision {
            Some(ApprovalDecision::Approved) => {
                record.consumed = true;
                Ok(())
            },
            Some(ApprovalDecision::Denied) | Some(ApprovalDecision::Timeout) => {
                record.consumed = true;
                Err(Error::Denied)
            },
            None => Err(Error::Unknown),
        }
    }

    pub async fn pending_ids(&self) -> Vec<String> {
        self.pending.read().await.keys().cloned().collect()
    }
}

/// Security level for exec-style commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Deny,
    #[default]
    Allowlist,
    Full,
}

impl SecurityLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allowlist" => Some(Self::Allowlist),
            "permissive" | "full" => Some(Self::Full),
            "strict" | "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

pub const SAFE_BINS: &[&str] = &[
    "cat", "echo", "printf", "head", "tail", "wc", "sort", "uniq", "cut", "tr", "grep", "egrep", "fgrep", "awk", "sed",
    "jq", "yq", "date", "cal", "ls", "pwd", "whoami", "hostname", "uname", "env", "printenv", "basename", "dirname",
    "realpath", "readlink", "diff", "comm", "paste", "tee", "xargs", "true", "false", "test", "[", "seq", "yes", "rev",
    "fold", "expand", "unexpand", "md5sum", "sha256sum", "sha1sum", "b2sum", "file", "stat", "du", "df", "free",
    "which", "type", "command",
];

fn extract_first_bin(command: &str) -> Option<&str> {
    let trimmed = command.trim();
    for part in trimmed.split_whitespace() {
        if !part.contains('=') {
            return Some(part.rsplit('/').next().unwrap_or(part));
        }
    }
    None
}

pub fn is_safe_command(command: &str) -> bool {
    extract_first_bin(command).is_some_and(|bin| SAFE_BINS.contains(&bin))
}

pub fn matches_allowlist(command: &str, allowlist: &[String]) -> bool {
    let bin = extract_first_bin(command).unwrap_or("");
    allowlist.iter().any(|pattern| {
        pattern == "*"
            || pattern == bin
            || pattern.strip_suffix('*').is_some_and(|prefix| command.starts_with(prefix) || bin.starts_with(prefix))
    })
}

/// Action to take after checking a tool invocation against policy, before
/// minting an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Proceed,
    NeedsApproval,
}

/// Decides whether a shell command needs approval under `mode`/`security_level`,
/// given `allowlist` and `already_approved` (commands approved earlier this
/// session under `on-miss`).
pub fn check_command_policy(
    command: &str,
    mode: ApprovalMode,
    security_level: SecurityLevel,
    allowlist: &[String],
    already_approved: &HashSet<String>,
) -> Result<PolicyAction> {
    if let Some(desc) = check_dangerous(command) {
        if !matches_allowlist(command, allowlist) {
            warn!(command, pattern = %desc, "dangerous command detected, forcing approval");
            return Ok(PolicyAction::NeedsApproval);
        }
        debug!(command, pattern = %desc, "dangerous command allowed by explicit allowlist");
    }

    match security_level {
        SecurityLevel::Deny => return Err(Error::Denied),
        SecurityLevel::Full => return Ok(PolicyAction::Proceed),
        SecurityLevel::Allowlist => {},
    }

    match mode {
        ApprovalMode::Off => Ok(PolicyAction::Proceed),
        ApprovalMode::Always => Ok(PolicyAction::NeedsApproval),
        ApprovalMode::OnMiss => {
            if is_safe_command(command) || matches_allowlist(command, allowlist) || already_approved.contains(command) {
                Ok(PolicyAction::Proceed)
            } else {
                Ok(PolicyAction::NeedsApproval)
            }
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangerous_rm_rf_root_detected() {
        assert_eq!(check_dangerous("rm -rf /"), Some("rm -r on filesystem root"));
    }

    #[test]
    fn safe_commands_not_flagged() {
        assert!(check_dangerous("git status").is_none());
        assert!(check_dangerous("ls -la").is_none());
    }

    #[test]
    fn policy_always_mode_forces_approval() {
        let action = check_command_policy("echo hi", ApprovalMode::Always, SecurityLevel::Allowlist, &[], &HashSet::new());
        assert_eq!(action.unwrap(), PolicyAction::NeedsApproval);
    }

    #[test]
    fn policy_on_miss_proceeds_for_safe_bin() {
        let action = check_command_policy("echo hi", ApprovalMode::OnMiss, SecurityLevel::Allowlist, &[], &HashSet::new());
        assert_eq!(action.unwrap(), PolicyAction::Proceed);
    }

    #[test]
    fn policy_deny_security_level_rejects_outright() {
        let err = check_command_policy("echo hi", ApprovalMode::Off, SecurityLevel::Deny, &[], &HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::Denied));
    }

    #[test]
    fn policy_dangerous_forced_even_when_mode_off() {
        let action = check_command_policy("rm -rf /", ApprovalMode::Off, SecurityLevel::Allowlist, &[], &HashSet::new());
        assert_eq!(action.unwrap(), PolicyAction::NeedsApproval);
    }

    #[test]
    fn policy_dangerous_overridden_by_allowlist() {
        let allowlist = vec!["rm*".to_string()];
        let action = check_command_policy("rm -rf /", ApprovalMode::Off, SecurityLevel::Allowlist, &allowlist, &HashSet::new());
        assert_eq!(action.unwrap(), PolicyAction::Proceed);
    }

    #[tokio::test]
    async fn approved_decision_allows_consume() {
        let broker = ApprovalBroker::default();
        let args = serde_json::json!({"cmd": "rm -rf ~/a"});
        let (id, rx) = broker.request("bash", &args).await;
        broker.decide(&id, ApprovalDecision::Approved).await.unwrap();
        assert_eq!(broker.await_decision(rx).await, ApprovalDecision::Approved);
        broker.consume(&id, "bash", &args).await.unwrap();
    }

    #[tokio::test]
    async fn replay_with_different_args_is_rejected_as_digest_mismatch() {
        let broker = ApprovalBroker::default();
        let original = serde_json::json!({"cmd": "rm -rf ~/a"});
        let (id, _rx) = broker.request("bash", &original).await;
        broker.decide(&id, ApprovalDecision::Approved).await.unwrap();

        let tampered = serde_json::json!({"cmd": "rm -rf /"});
        let err = broker.consume(&id, "bash", &tampered).await.unwrap_err();
        assert!(matches!(err, Error::DigestMismatch));
    }

    #[tokio::test]
    async fn consuming_twice_is_rejected() {
        let broker = ApprovalBroker::default();
        let args = serde_json::json!({"cmd": "echo hi"});
        let (id, _rx) = broker.request("bash", &args).await;
        broker.decide(&id, ApprovalDecision::Approved).await.unwrap();
        broker.consume(&id, "bash", &args).await.unwrap();
        let err = broker.consume(&id, "bash", &args).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyConsumed));
    }

    #[tokio::test]
    async fn expired_approval_is_rejected() {
        let broker = ApprovalBroker::new(Duration::from_millis(1));
        let args = serde_json::json!({"cmd": "echo hi"});
        let (id, _rx) = broker.request("bash", &args).await;
        broker.decide(&id, ApprovalDecision::Approved).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = broker.consume(&id, "bash", &args).await.unwrap_err();
        assert!(matches!(err, Error::Expired));
    }

    #[tokio::test]
    async fn unknown_approval_id_is_rejected() {
        let broker = ApprovalBroker::default();
        let err = broker.consume("nonexistent", "bash", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Unknown));
    }

    #[tokio::test]
    async fn denied_decision_rejects_consume() {
        let broker = ApprovalBroker::default();
        let args = serde_json::json!({"cmd": "rm -rf /"});
        let (id, rx) = broker.request("bash", &args).await;
        broker.decide(&id, ApprovalDecision::Denied).await.unwrap();
        assert_eq!(broker.await_decision(rx).await, ApprovalDecision::Denied);
        let err = broker.consume(&id, "bash", &args).await.unwrap_err();
        assert!(matches!(err, Error::Denied));
    }
}
