//! Risk classifier — pure, side-effect-free command assessment.
//!
//! Classification order is strict and first-match-wins: catalog lookup,
//! then the dangerous-pattern denylist, then medium-risk patterns, then
//! read-only patterns, and finally UNKNOWN with a manual-review
//! recommendation. Used by the executor facade to enrich denials and by
//! the auto-learning collector to grade blocked commands.

use std::sync::{Arc, OnceLock};

use regex::{Regex, RegexBuilder};
use serde_derive::{Deserialize, Serialize};

use crate::authorize::{AuthLevel, SshRole};
use crate::catalog::Catalog;

/// Risk levels for commands. Orthogonal to authorization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl RiskLevel {
    /// Ordering rank for threshold comparisons. UNKNOWN ranks above
    /// CRITICAL so that unclassifiable commands never pass a risk ceiling.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
            Self::Unknown => 4,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// What the classifier recommends doing with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    AddAuto,
    AddManual,
    BlockPermanently,
    ManualReview,
    AlreadyWhitelisted,
}

/// Result of command analysis.
#[derive(Debug, Clone, Serialize)]
pub struct CommandAnalysis {
    pub command: String,
    pub risk: RiskLevel,
    pub category: String,
    pub is_readonly: bool,
    /// The authorization level the classifier would grant, if any.
    pub suggested_level: Option<AuthLevel>,
    pub suggested_role: SshRole,
    pub rationale: String,
    pub recommended_action: RecommendedAction,
    /// Set when the catalog produced the verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_plugin: Option<String>,
}

struct DenyPattern {
    pattern: Regex,
    unless: Option<Regex>,
    reason: &'static str,
}

fn deny(pattern: &str, unless: Option<&str>, reason: &'static str) -> DenyPattern {
    DenyPattern {
        pattern: case_insensitive(pattern),
        unless: unless.map(case_insensitive),
        reason,
    }
}

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("builtin classifier pattern")
}

/// CRITICAL shapes. Case-insensitive; matching anywhere in the command.
fn dangerous_patterns() -> &'static [DenyPattern] {
    static PATTERNS: OnceLock<Vec<DenyPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            deny(
                r"rm\s+-[a-z]*r[a-z]*f[a-z]*\s+/",
                Some(r"rm\s+-[a-z]*r[a-z]*f[a-z]*\s+/(tmp|var/tmp)(/|\s|$)"),
                "Recursive delete from a system root",
            ),
            deny(
                r"dd\s+.*of=/dev/[sv]d",
                None,
                "Direct disk write - extremely dangerous",
            ),
            deny(r"mkfs\.", None, "Format filesystem - data loss"),
            deny(r"fdisk\s+", None, "Partition manipulation - data loss risk"),
            deny(r"parted\s+", None, "Partition manipulation - data loss risk"),
            deny(r"wipefs\s+", None, "Wipe filesystem signatures - data loss"),
            deny(r":\(\)\{.*:\|:.*\};:", None, "Fork bomb - denial of service"),
            deny(r">\s*/dev/sd[a-z]", None, "Direct write to disk - dangerous"),
            deny(
                r"chown\s+-R\s+.*\s+/\s*$",
                None,
                "Recursive ownership change from root",
            ),
            deny(
                r"chmod\s+-R\s+777",
                None,
                "World-writable permissions - security risk",
            ),
        ]
    })
}

/// MEDIUM shapes — state changes that require approval.
fn medium_risk_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                r"systemctl\s+(restart|reload|start|stop)\s+",
                "Service state change",
            ),
            (
                r"(podman|docker)\s+(restart|stop|start)\s+",
                "Container state change",
            ),
            (r"^reboot", "System reboot"),
            (r"^shutdown", "System shutdown"),
            (r"systemctl\s+enable\s+", "Enable service at boot"),
            (r"systemctl\s+disable\s+", "Disable service at boot"),
        ]
        .into_iter()
        .map(|(p, reason)| (case_insensitive(p), reason))
        .collect()
    })
}

/// LOW shapes — read-only token prefixes.
fn readonly_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"^(htop|top|iotop|iftop|nethogs)(\s|$)",
            r"^(ls|cat|head|tail|less|more|grep|find)\s+",
            r"^(ps|pstree|pgrep)(\s|$)",
            r"^(df|du|free|uptime|w|who)(\s|$)",
            r"^(netstat|ss|ip\s+(addr|route|link))(\s|$)",
            r"^systemctl\s+(status|list-\S+|show)(\s|$)",
            r"^journalctl(\s|$)",
            r"^(podman|docker)\s+(ps|inspect|images|logs)(\s|$)",
            r"^ansible-playbook\s+.*--check",
        ]
        .into_iter()
        .map(|p| Regex::new(p).expect("builtin classifier pattern"))
        .collect()
    })
}

/// The classifier. Pure function of its input; owns only a catalog handle.
pub struct Classifier {
    catalog: Arc<Catalog>,
}

impl Classifier {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Classify a command string.
    #[must_use]
    pub fn classify(&self, command: &str) -> CommandAnalysis {
        // 1. Catalog lookup.
        if let Some((plugin, spec)) = self.catalog.find(command) {
            let is_readonly = spec.risk == RiskLevel::Low && spec.level == AuthLevel::Auto;
            return CommandAnalysis {
                command: command.to_string(),
                risk: spec.risk,
                category: plugin.category.clone(),
                is_readonly,
                suggested_level: Some(spec.level),
                suggested_role: spec.role,
                rationale: spec.rationale.clone(),
                recommended_action: if spec.level == AuthLevel::Auto {
                    RecommendedAction::AddAuto
                } else {
                    RecommendedAction::AddManual
                },
                matched_plugin: Some(plugin.name.clone()),
            };
        }

        // 2. Dangerous pattern denylist.
        for entry in dangerous_patterns() {
            if entry.pattern.is_match(command)
                && !entry.unless.as_ref().is_some_and(|u| u.is_match(command))
            {
                return CommandAnalysis {
                    command: command.to_string(),
                    risk: RiskLevel::Critical,
                    category: "destructive".to_string(),
                    is_readonly: false,
                    suggested_level: Some(AuthLevel::Blocked),
                    suggested_role: SshRole::None,
                    rationale: entry.reason.to_string(),
                    recommended_action: RecommendedAction::BlockPermanently,
                    matched_plugin: None,
                };
            }
        }

        // 3. Medium-risk state changes.
        for (pattern, reason) in medium_risk_patterns() {
            if pattern.is_match(command) {
                return CommandAnalysis {
                    command: command.to_string(),
                    risk: RiskLevel::Medium,
                    category: "system_modification".to_string(),
                    is_readonly: false,
                    suggested_level: Some(AuthLevel::Manual),
                    suggested_role: SshRole::Executor,
                    rationale: reason.to_string(),
                    recommended_action: RecommendedAction::AddManual,
                    matched_plugin: None,
                };
            }
        }

        // 4. Read-only prefixes.
        for pattern in readonly_patterns() {
            if pattern.is_match(command) {
                return CommandAnalysis {
                    command: command.to_string(),
                    risk: RiskLevel::Low,
                    category: "monitoring".to_string(),
                    is_readonly: true,
                    suggested_level: Some(AuthLevel::Auto),
                    suggested_role: SshRole::Reader,
                    rationale: "Read-only operation".to_string(),
                    recommended_action: RecommendedAction::AddAuto,
                    matched_plugin: None,
                };
            }
        }

        // 5. Unknown.
        CommandAnalysis {
            command: command.to_string(),
            risk: RiskLevel::Unknown,
            category: "unknown".to_string(),
            is_readonly: false,
            suggested_level: None,
            suggested_role: SshRole::Executor,
            rationale: "Command not recognized - manual review required".to_string(),
            recommended_action: RecommendedAction::ManualReview,
            matched_plugin: None,
        }
    }

    /// Whether a risk level can be auto-added to the whitelist.
    #[must_use]
    pub const fn can_auto_add(risk: RiskLevel) -> bool {
        matches!(risk, RiskLevel::Low)
    }
}
