use serde::{Deserialize, Serialize};

/// DM access policy for a channel account.
///
/// `Pairing` (the default) sends unknown senders a pairing challenge and
/// ignores their messages until paired; `Open` with an explicit `"*"` entry
/// in the allowlist passes unknown senders through; `Closed` drops them
/// silently.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    #[default]
    Pairing,
    Open,
    Closed,
}

/// What to do with an inbound message from `sender_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Sender is on the allowlist (or `"*"` is present).
    Allow,
    /// Sender is unknown under `Pairing`: issue a pairing challenge, drop
    /// the message until paired.
    ChallengePairing,
    /// Sender is unknown and the policy admits no one: drop silently.
    Deny,
}

/// Apply DM gating. `allowlist` entries are matched case-insensitively;
/// a literal `"*"` entry matches any sender.
pub fn gate(sender_id: &str, policy: DmPolicy, allowlist: &[String]) -> GateDecision {
    let sender_lower = sender_id.to_lowercase();
    let on_allowlist = allowlist.iter().any(|entry| {
        let entry = entry.to_lowercase();
        entry == "*" || entry == sender_lower
    });

    if on_allowlist {
        return GateDecision::Allow;
    }

    match policy {
        DmPolicy::Pairing => GateDecision::ChallengePairing,
        DmPolicy::Open | DmPolicy::Closed => GateDecision::Deny,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlisted_sender_always_passes() {
        let list = vec!["alice".to_string()];
        assert_eq!(gate("Alice", DmPolicy::Closed, &list), GateDecision::Allow);
    }

    #[test]
    fn open_with_wildcard_admits_unknown_senders() {
        let list = vec!["*".to_string()];
        assert_eq!(gate("stranger", DmPolicy::Open, &list), GateDecision::Allow);
    }

    #[test]
    fn open_without_wildcard_denies_unknown_senders() {
        assert_eq!(gate("stranger", DmPolicy::Open, &[]), GateDecision::Deny);
    }

    #[test]
    fn pairing_challenges_unknown_senders() {
        assert_eq!(gate("stranger", DmPolicy::Pairing, &[]), GateDecision::ChallengePairing);
    }

    #[test]
    fn closed_denies_unknown_senders() {
        assert_eq!(gate("stranger", DmPolicy::Closed, &[]), GateDecision::Deny);
    }
}
