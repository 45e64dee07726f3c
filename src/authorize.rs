//! Authorization decision engine.
//!
//! Walks the legacy rule list in declaration order (first match wins) and
//! emits an [`Authorization`] verdict: AUTO executes immediately on the
//! reader channel, MANUAL creates a pending approval, BLOCKED is a terminal
//! denial. Commands matching nothing fall through to default deny. Every
//! denial is recorded to the auto-learning collector, best-effort.

use std::{sync::Arc, time::Duration};

use regex::Regex;
use serde_derive::{Deserialize, Serialize};

use crate::learning::LearningStore;
use crate::lifecycle::{ApprovalRegistry, ApproveOutcome, Tracked};

/// Authorization levels for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    /// Execute immediately (read-only).
    Auto,
    /// Require human approval.
    Manual,
    /// Refuse execution.
    Blocked,
}

impl std::fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// The privilege-separated SSH identity a command is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SshRole {
    /// Low-privilege identity for read-only commands.
    Reader,
    /// Higher-privilege identity for state-changing commands.
    Executor,
    /// No identity; BLOCKED rules carry this.
    None,
}

impl std::fmt::Display for SshRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reader => write!(f, "reader"),
            Self::Executor => write!(f, "executor"),
            Self::None => write!(f, "none"),
        }
    }
}

/// A legacy whitelist rule. Declaration order is part of the policy
/// contract: the first matching rule wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRule {
    /// Anchored regular expression tested against the whole command.
    #[serde(with = "serde_regex")]
    pub pattern: Regex,
    /// Exemption: the rule does not apply when this also matches (e.g.
    /// `rm -rf` under `/tmp`).
    #[serde(with = "serde_regex", default, skip_serializing_if = "Option::is_none")]
    pub unless: Option<Regex>,
    pub level: AuthLevel,
    pub role: SshRole,
    pub description: String,
    pub rationale: String,
}

impl CommandRule {
    /// Whether this rule applies to `command`.
    #[must_use]
    pub fn matches(&self, command: &str) -> bool {
        if !self.pattern.is_match(command) {
            return false;
        }
        match &self.unless {
            Some(exempt) => !exempt.is_match(command),
            None => true,
        }
    }
}

/// Result of an authorization check.
#[derive(Debug, Clone, Serialize)]
pub struct Authorization {
    /// Can execute now?
    pub allowed: bool,
    pub level: AuthLevel,
    pub role: SshRole,
    pub needs_approval: bool,
    /// Present iff `level == Manual`.
    pub approval_id: Option<String>,
    pub reason: String,
    /// The matching rule, if any.
    pub rule: Option<CommandRule>,
}

/// Payload of a pending command awaiting approval.
#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest {
    pub host: String,
    pub command: String,
    pub role: SshRole,
    pub rule: CommandRule,
}

/// A pending command with its lifecycle metadata.
pub type PendingCommand = Tracked<CommandRequest>;

/// Whitelist organized by authorization level, for display.
#[derive(Debug, Clone, Serialize)]
pub struct WhitelistSummary {
    pub auto: Vec<RuleView>,
    pub manual: Vec<RuleView>,
    pub blocked: Vec<RuleView>,
}

/// Display form of a rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    pub pattern: String,
    pub level: AuthLevel,
    pub ssh_role: SshRole,
    pub description: String,
    pub rationale: String,
}

impl From<&CommandRule> for RuleView {
    fn from(rule: &CommandRule) -> Self {
        Self {
            pattern: rule.pattern.as_str().to_string(),
            level: rule.level,
            ssh_role: rule.role,
            description: rule.description.clone(),
            rationale: rule.rationale.clone(),
        }
    }
}

/// Engine for command authorization decisions.
///
/// Purely rule-driven for determinism: the risk classifier is consulted by
/// the executor facade to enrich denials, never by the engine itself.
pub struct AuthorizationEngine {
    rules: Vec<CommandRule>,
    pending: ApprovalRegistry<CommandRequest>,
    learning: Arc<LearningStore>,
}

impl AuthorizationEngine {
    #[must_use]
    pub fn new(rules: Vec<CommandRule>, learning: Arc<LearningStore>) -> Self {
        Self {
            rules,
            pending: ApprovalRegistry::new(),
            learning,
        }
    }

    /// Check whether a command is authorized on `host`.
    ///
    /// Deterministic: the same inputs always produce the same
    /// `(level, role)`; only the approval id differs between calls.
    pub fn check(&self, host: &str, command: &str, user: &str) -> Authorization {
        for rule in &self.rules {
            if rule.matches(command) {
                return self.process_match(host, command, user, rule);
            }
        }

        // No match: default deny. Denial volume is itself signal, so the
        // collector is always told, best-effort.
        self.learning.record(command, user, host);

        Authorization {
            allowed: false,
            level: AuthLevel::Blocked,
            role: SshRole::None,
            needs_approval: false,
            approval_id: None,
            reason: "Command not in whitelist (default deny policy)".to_string(),
            rule: None,
        }
    }

    fn process_match(
        &self,
        host: &str,
        command: &str,
        user: &str,
        rule: &CommandRule,
    ) -> Authorization {
        match rule.level {
            AuthLevel::Blocked => {
                self.learning.record(command, user, host);
                Authorization {
                    allowed: false,
                    level: AuthLevel::Blocked,
                    role: SshRole::None,
                    needs_approval: false,
                    approval_id: None,
                    reason: format!("BLOCKED: {}", rule.rationale),
                    rule: Some(rule.clone()),
                }
            }
            AuthLevel::Auto => Authorization {
                allowed: true,
                level: AuthLevel::Auto,
                role: rule.role,
                needs_approval: false,
                approval_id: None,
                reason: format!("Auto-approved: {}", rule.description),
                rule: Some(rule.clone()),
            },
            AuthLevel::Manual => {
                let id = ApprovalRegistry::<CommandRequest>::new_id("cmd");
                self.pending.propose(
                    id.clone(),
                    CommandRequest {
                        host: host.to_string(),
                        command: command.to_string(),
                        role: rule.role,
                        rule: rule.clone(),
                    },
                );
                Authorization {
                    allowed: false,
                    level: AuthLevel::Manual,
                    role: rule.role,
                    needs_approval: true,
                    approval_id: Some(id),
                    reason: format!("Approval required: {}", rule.description),
                    rule: Some(rule.clone()),
                }
            }
        }
    }

    /// Approve a pending command. Returns `None` if the id is unknown or
    /// the command was already executed. Approving twice is a no-op
    /// success.
    pub fn approve(&self, approval_id: &str) -> Option<PendingCommand> {
        match self.pending.approve(approval_id, "human") {
            ApproveOutcome::Approved(entry) => Some(entry),
            ApproveOutcome::Terminal(_) | ApproveOutcome::NotFound => None,
        }
    }

    /// Mark a pending command as executed. Terminal.
    pub fn mark_executed(&self, approval_id: &str) -> bool {
        self.pending.complete(approval_id, false, |_| {}).is_some()
    }

    /// Fetch a pending command by id.
    pub fn get_pending(&self, approval_id: &str) -> Option<PendingCommand> {
        self.pending.get(approval_id)
    }

    /// All pending commands that have not been executed yet.
    pub fn all_pending(&self) -> Vec<PendingCommand> {
        self.pending.list(|entry| !entry.executed())
    }

    /// Remove pending entries older than `max_age_hours` (default 24).
    pub fn cleanup(&self, max_age_hours: u64) -> usize {
        self.pending
            .cleanup(Duration::from_secs(max_age_hours * 3600))
    }

    /// The legacy rule list in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[CommandRule] {
        &self.rules
    }

    /// Whitelist organized by authorization level.
    #[must_use]
    pub fn whitelist_summary(&self) -> WhitelistSummary {
        let mut summary = WhitelistSummary {
            auto: Vec::new(),
            manual: Vec::new(),
            blocked: Vec::new(),
        };
        for rule in &self.rules {
            let view = RuleView::from(rule);
            match rule.level {
                AuthLevel::Auto => summary.auto.push(view),
                AuthLevel::Manual => summary.manual.push(view),
                AuthLevel::Blocked => summary.blocked.push(view),
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::classify::Classifier;
    use crate::whitelist;

    fn engine() -> AuthorizationEngine {
        let classifier = Arc::new(Classifier::new(Arc::new(Catalog::builtin().unwrap())));
        let temp = tempfile::tempdir().unwrap();
        let learning = Arc::new(LearningStore::new(
            temp.path().join("stats.json"),
            classifier,
        ));
        AuthorizationEngine::new(whitelist::default_rules(), learning)
    }

    #[test]
    fn test_auto_command_is_allowed() {
        let engine = engine();
        let auth = engine.check("coreos-11", "systemctl status unbound", "tester");
        assert!(auth.allowed);
        assert_eq!(auth.level, AuthLevel::Auto);
        assert_eq!(auth.role, SshRole::Reader);
        assert!(!auth.needs_approval);
        assert!(auth.approval_id.is_none());
    }

    #[test]
    fn test_manual_command_creates_pending() {
        let engine = engine();
        let auth = engine.check("coreos-11", "systemctl restart unbound", "tester");
        assert!(!auth.allowed);
        assert_eq!(auth.level, AuthLevel::Manual);
        assert_eq!(auth.role, SshRole::Executor);
        assert!(auth.needs_approval);

        let id = auth.approval_id.unwrap();
        let pending = engine.get_pending(&id).unwrap();
        assert_eq!(pending.payload.host, "coreos-11");
        assert_eq!(pending.payload.command, "systemctl restart unbound");
        assert!(!pending.approved());
    }

    #[test]
    fn test_blocked_command_is_denied() {
        let engine = engine();
        let auth = engine.check("coreos-11", "rm -rf /var", "tester");
        assert!(!auth.allowed);
        assert_eq!(auth.level, AuthLevel::Blocked);
        assert_eq!(auth.role, SshRole::None);
        assert!(auth.reason.starts_with("BLOCKED"));
    }

    #[test]
    fn test_tmp_cleanup_is_exempt_from_block() {
        let engine = engine();
        // /tmp and /var/tmp are exempt from the recursive-delete block, but
        // nothing whitelists rm either, so it lands on default deny.
        let auth = engine.check("coreos-11", "rm -rf /tmp/build-cache", "tester");
        assert_eq!(auth.level, AuthLevel::Blocked);
        assert!(auth.rule.is_none());
        assert!(auth.reason.contains("default deny"));
    }

    #[test]
    fn test_unknown_command_default_deny() {
        let engine = engine();
        let auth = engine.check("coreos-11", "frobnicate --widgets", "tester");
        assert!(!auth.allowed);
        assert_eq!(auth.level, AuthLevel::Blocked);
        assert!(auth.rule.is_none());
    }

    #[test]
    fn test_empty_command_default_deny() {
        let engine = engine();
        let auth = engine.check("coreos-11", "", "tester");
        assert_eq!(auth.level, AuthLevel::Blocked);
        assert!(auth.reason.contains("default deny"));
    }

    #[test]
    fn test_check_is_deterministic_ids_differ() {
        let engine = engine();
        let a = engine.check("coreos-11", "systemctl restart unbound", "tester");
        let b = engine.check("coreos-11", "systemctl restart unbound", "tester");
        assert_eq!(a.level, b.level);
        assert_eq!(a.role, b.role);
        // MANUAL is always individuated: two distinct pending entries.
        assert_ne!(a.approval_id, b.approval_id);
        assert_eq!(engine.all_pending().len(), 2);
    }

    #[test]
    fn test_approve_and_execute_lifecycle() {
        let engine = engine();
        let auth = engine.check("coreos-11", "systemctl restart unbound", "tester");
        let id = auth.approval_id.unwrap();

        let pending = engine.approve(&id).unwrap();
        assert!(pending.approved());

        // Idempotent second approval.
        assert!(engine.approve(&id).is_some());

        assert!(engine.mark_executed(&id));
        // Executed entries disappear from the pending listing...
        assert!(engine.all_pending().is_empty());
        // ...and cannot be re-approved.
        assert!(engine.approve(&id).is_none());
    }

    #[test]
    fn test_approve_unknown_id() {
        let engine = engine();
        assert!(engine.approve("cmd_deadbeef").is_none());
        assert!(!engine.mark_executed("cmd_deadbeef"));
    }

    #[test]
    fn test_blocked_records_to_learning() {
        let engine = engine();
        engine.check("coreos-11", "frobnicate --widgets", "mcp-user");
        engine.check("coreos-11", "frobnicate --widgets", "mcp-user");

        let stats = engine.learning.stats_for("frobnicate --widgets").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.users, vec!["mcp-user"]);
        assert_eq!(stats.hosts, vec!["coreos-11"]);
    }

    #[test]
    fn test_first_match_wins_over_later_rules() {
        let engine = engine();
        // "systemctl status" appears before any MANUAL systemctl rule.
        let auth = engine.check("coreos-11", "systemctl status nginx", "tester");
        assert_eq!(auth.level, AuthLevel::Auto);
    }

    #[test]
    fn test_whitelist_summary_groups_by_level() {
        let engine = engine();
        let summary = engine.whitelist_summary();
        assert!(!summary.auto.is_empty());
        assert!(!summary.manual.is_empty());
        assert!(!summary.blocked.is_empty());
        assert!(summary.auto.iter().all(|r| r.level == AuthLevel::Auto));
        assert!(summary
            .blocked
            .iter()
            .all(|r| r.ssh_role == SshRole::None));
    }

    #[test]
    fn test_cleanup_purges_stale_pending() {
        let engine = engine();
        engine.check("coreos-11", "systemctl restart unbound", "tester");
        assert_eq!(engine.cleanup(0), 1);
        assert!(engine.all_pending().is_empty());
    }
}
