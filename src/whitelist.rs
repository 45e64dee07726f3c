//! Legacy command whitelist.
//!
//! The built-in default rules plus a loader for the optional YAML override
//! document. The document has three top-level sections — `auto_approved`,
//! `manual_approval`, `blocked` — concatenated in that order; within a
//! section order is preserved as written.

use regex::Regex;
use serde_derive::Deserialize;

use crate::authorize::{AuthLevel, CommandRule, SshRole};
use crate::error::{Error, Result};

fn rule(
    pattern: &str,
    level: AuthLevel,
    role: SshRole,
    description: &str,
    rationale: &str,
) -> CommandRule {
    CommandRule {
        pattern: Regex::new(pattern).expect("builtin whitelist pattern"),
        unless: None,
        level,
        role,
        description: description.to_string(),
        rationale: rationale.to_string(),
    }
}

/// The built-in rule list. Ordering is part of the policy contract.
#[must_use]
pub fn default_rules() -> Vec<CommandRule> {
    use AuthLevel::{Auto, Blocked, Manual};
    use SshRole::{Executor, Reader};

    let mut rules = vec![
        // Read-only commands, dispatched via the reader identity.
        rule(
            r"^systemctl status\s+",
            Auto,
            Reader,
            "Check service status",
            "Read-only, no system impact",
        ),
        rule(
            r"^systemctl list-units",
            Auto,
            Reader,
            "List system units",
            "Read-only, diagnostic",
        ),
        rule(
            r"^journalctl(\s+.*)?$",
            Auto,
            Reader,
            "Read system logs",
            "Read-only, diagnostic purpose",
        ),
        rule(
            r"^ss\s+-[lntup]+",
            Auto,
            Reader,
            "List network connections",
            "Read-only network diagnostic",
        ),
        rule(
            r"^df\s+-h",
            Auto,
            Reader,
            "Check disk usage",
            "Read-only system info",
        ),
        rule(
            r"^free\s+-h",
            Auto,
            Reader,
            "Check memory usage",
            "Read-only system info",
        ),
        rule(
            r"^uptime",
            Auto,
            Reader,
            "Check system uptime",
            "Read-only system info",
        ),
        rule(
            r"^cat\s+/var/log/",
            Auto,
            Reader,
            "Read log files",
            "Read-only, diagnostic",
        ),
        rule(
            r"^cat\s+/opt/infra/",
            Auto,
            Reader,
            "Read infrastructure configuration",
            "Read-only, inventory and playbook inspection",
        ),
        rule(
            r"^(podman|docker)\s+ps",
            Auto,
            Reader,
            "List containers",
            "Read-only container info",
        ),
        rule(
            r"^(podman|docker)\s+inspect\s+",
            Auto,
            Reader,
            "Inspect container",
            "Read-only container info",
        ),
        rule(
            r"^(podman|docker)\s+logs\s+",
            Auto,
            Reader,
            "Read container logs",
            "Read-only container info",
        ),
        rule(
            r"^ansible-playbook\s+.*--check",
            Auto,
            Reader,
            "Ansible dry-run (check mode)",
            "Read-only, no system changes",
        ),
        rule(
            r"^(tail|head)\s+(-n\s+\d+\s+)?/var/log/",
            Auto,
            Reader,
            "Read log file head/tail",
            "Read-only, diagnostic",
        ),
        rule(
            r"^ip\s+(addr|route|link)",
            Auto,
            Reader,
            "Show network configuration",
            "Read-only network info",
        ),
        rule(
            r"^ping\s+",
            Auto,
            Reader,
            "Network connectivity test",
            "Read-only reachability probe",
        ),
        rule(
            r"^ls\s+",
            Auto,
            Reader,
            "List directory contents",
            "Read-only filesystem info",
        ),
        rule(
            r"^grep\s+",
            Auto,
            Reader,
            "Search file contents",
            "Read-only text search",
        ),
        // State-changing commands: approval required, executor identity.
        rule(
            r"^systemctl restart\s+",
            Manual,
            Executor,
            "Restart system service",
            "Service interruption, needs approval",
        ),
        rule(
            r"^systemctl reload\s+",
            Manual,
            Executor,
            "Reload service configuration",
            "Config change, minimal impact but needs review",
        ),
        rule(
            r"^systemctl start\s+",
            Manual,
            Executor,
            "Start system service",
            "System state change",
        ),
        rule(
            r"^systemctl stop\s+",
            Manual,
            Executor,
            "Stop system service",
            "Service interruption",
        ),
        rule(
            r"^systemctl (enable|disable)\s+",
            Manual,
            Executor,
            "Change service boot state",
            "Persistent boot configuration change",
        ),
        rule(
            r"^(podman|docker)\s+restart\s+",
            Manual,
            Executor,
            "Restart container",
            "Service interruption",
        ),
        rule(
            r"^(podman|docker)\s+stop\s+",
            Manual,
            Executor,
            "Stop container",
            "Service interruption",
        ),
        rule(
            r"^(podman|docker)\s+start\s+",
            Manual,
            Executor,
            "Start container",
            "System state change",
        ),
        rule(
            r"^ansible-playbook\s+",
            Manual,
            Executor,
            "Execute Ansible playbook",
            "Infrastructure changes, needs approval",
        ),
        rule(
            r"^reboot$",
            Manual,
            Executor,
            "Reboot system",
            "CRITICAL: Full system restart",
        ),
        rule(
            r"^shutdown\s+",
            Manual,
            Executor,
            "Shutdown system",
            "CRITICAL: System shutdown",
        ),
    ];

    // Dangerous commands. The recursive-delete rule exempts scratch space.
    rules.push(CommandRule {
        pattern: Regex::new(r"rm\s+-[a-zA-Z]*r[a-zA-Z]*f[a-zA-Z]*\s+/")
            .expect("builtin whitelist pattern"),
        unless: Some(
            Regex::new(r"rm\s+-[a-zA-Z]*r[a-zA-Z]*f[a-zA-Z]*\s+/(tmp|var/tmp)(/|\s|$)")
                .expect("builtin whitelist pattern"),
        ),
        level: AuthLevel::Blocked,
        role: SshRole::None,
        description: "Recursive delete from root".to_string(),
        rationale: "DANGEROUS: Could destroy system".to_string(),
    });
    rules.extend([
        rule(
            r"dd\s+.*of=/dev/[sv]d",
            Blocked,
            SshRole::None,
            "Direct disk write",
            "DANGEROUS: Could corrupt filesystem",
        ),
        rule(
            r"mkfs\.",
            Blocked,
            SshRole::None,
            "Format filesystem",
            "DANGEROUS: Data loss",
        ),
        rule(
            r"(fdisk|parted|wipefs)\s+",
            Blocked,
            SshRole::None,
            "Partition or signature manipulation",
            "DANGEROUS: Could corrupt partitions",
        ),
        rule(
            r":\(\)\{.*:\|:.*\};:",
            Blocked,
            SshRole::None,
            "Fork bomb",
            "DANGEROUS: Denial of service",
        ),
        rule(
            r">\s*/dev/sd[a-z]",
            Blocked,
            SshRole::None,
            "Redirect to raw disk",
            "DANGEROUS: Could corrupt filesystem",
        ),
        rule(
            r"chown\s+-R\s+.*\s+/\s*$",
            Blocked,
            SshRole::None,
            "Recursive ownership change from root",
            "DANGEROUS: Breaks system permissions",
        ),
        rule(
            r"chmod\s+-R\s+777",
            Blocked,
            SshRole::None,
            "World-writable permissions",
            "DANGEROUS: Security risk",
        ),
    ]);

    rules
}

// ---------------------------------------------------------------------------
// YAML override document
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WhitelistDocument {
    #[serde(default)]
    auto_approved: Vec<RuleEntry>,
    #[serde(default)]
    manual_approval: Vec<RuleEntry>,
    #[serde(default)]
    blocked: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    pattern: String,
    description: String,
    #[serde(default)]
    ssh_user: Option<String>,
    rationale: String,
}

/// Parse a whitelist override document.
///
/// Sections are concatenated AUTO, MANUAL, BLOCKED in that order; within a
/// section the written order is preserved.
///
/// # Errors
/// Returns an error when the YAML is malformed, a pattern does not compile,
/// or an `ssh_user` value is not recognized.
pub fn parse_whitelist(content: &str) -> Result<Vec<CommandRule>> {
    let doc: WhitelistDocument = serde_yaml::from_str(content)?;

    let mut rules = Vec::new();
    for (entries, level, default_role) in [
        (&doc.auto_approved, AuthLevel::Auto, SshRole::Reader),
        (&doc.manual_approval, AuthLevel::Manual, SshRole::Executor),
        (&doc.blocked, AuthLevel::Blocked, SshRole::None),
    ] {
        for entry in entries {
            let role = match entry.ssh_user.as_deref() {
                None => default_role,
                Some(user) => parse_ssh_user(user)?,
            };
            let pattern = Regex::new(&entry.pattern).map_err(|e| {
                Error::Config(format!("invalid whitelist pattern '{}': {e}", entry.pattern))
            })?;
            rules.push(CommandRule {
                pattern,
                unless: None,
                level,
                role,
                description: entry.description.clone(),
                rationale: entry.rationale.clone(),
            });
        }
    }

    Ok(rules)
}

/// Map the document's `ssh_user` spelling to a role. The deprecated
/// `pra-runner` spelling is accepted as an alias for the executor.
fn parse_ssh_user(user: &str) -> Result<SshRole> {
    match user {
        "mcp-reader" | "reader" => Ok(SshRole::Reader),
        "exec-runner" | "executor" | "pra-runner" => Ok(SshRole::Executor),
        "none" => Ok(SshRole::None),
        other => Err(Error::Config(format!(
            "unknown ssh_user '{other}' in whitelist document"
        ))),
    }
}
