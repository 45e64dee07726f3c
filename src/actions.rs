//! Remediation actions — named, bounded-vocabulary operations.
//!
//! Unlike free-form commands, remediation actions come from a small static
//! catalog and dispatch straight to the executor channel, where the remote
//! side's forced-command wrapper accepts only the fixed vocabulary. The
//! propose → approve → execute workflow uses the full six-state lifecycle,
//! observable through the `status` field.

use std::{str::FromStr, sync::Arc, time::Duration};

use serde_derive::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{AuditLog, EventType, LogLevel, Status};
use crate::config::Settings;
use crate::error::Result;
use crate::lifecycle::{ApprovalRegistry, ApprovalState, ApproveOutcome, Tracked};
use crate::transport::{ExecOutput, SshBroker};

/// Impact level of a remediation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionImpact {
    Low,
    Medium,
    High,
}

impl ExecutionImpact {
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }
}

impl std::fmt::Display for ExecutionImpact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ExecutionImpact {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(crate::error::Error::Config(format!(
                "unknown impact level '{other}'"
            ))),
        }
    }
}

/// One entry in the static action catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ActionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub impact: ExecutionImpact,
    /// Forced-command token sent to the executor channel as-is.
    pub command: &'static str,
}

/// The fixed remediation catalog.
#[must_use]
pub const fn catalog() -> &'static [ActionSpec] {
    &[
        ActionSpec {
            name: "restart_unbound",
            description: "Restart the Unbound DNS service",
            impact: ExecutionImpact::Low,
            command: "restart_unbound",
        },
        ActionSpec {
            name: "reload_caddy",
            description: "Reload the Caddy reverse proxy configuration",
            impact: ExecutionImpact::Low,
            command: "reload_caddy",
        },
        ActionSpec {
            name: "flush_dns_cache",
            description: "Flush the DNS cache (systemd-resolved)",
            impact: ExecutionImpact::Low,
            command: "flush_dns_cache",
        },
        ActionSpec {
            name: "restart_container",
            description: "Restart a Podman container",
            impact: ExecutionImpact::Medium,
            command: "restart_container",
        },
        ActionSpec {
            name: "rotate_logs",
            description: "Force log rotation",
            impact: ExecutionImpact::Low,
            command: "rotate_logs",
        },
    ]
}

fn find_action(name: &str) -> Option<&'static ActionSpec> {
    catalog().iter().find(|spec| spec.name == name)
}

/// Payload of a tracked remediation action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRequest {
    pub name: String,
    pub host: String,
    pub impact: ExecutionImpact,
    pub rationale: String,
    /// Forced-command token from the catalog.
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serializable snapshot of a tracked action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionView {
    pub id: String,
    pub name: String,
    pub host: String,
    pub impact: ExecutionImpact,
    pub rationale: String,
    pub status: ApprovalState,
    pub proposed_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Tracked<ActionRequest>> for ActionView {
    fn from(entry: Tracked<ActionRequest>) -> Self {
        Self {
            id: entry.id,
            name: entry.payload.name,
            host: entry.payload.host,
            impact: entry.payload.impact,
            rationale: entry.payload.rationale,
            status: entry.state,
            proposed_at: entry.created_at,
            approved_by: entry.approved_by,
            approved_at: entry.approved_at,
            executed_at: entry.executed_at,
            result: entry.payload.result,
            error: entry.payload.error,
        }
    }
}

/// Outcome of `propose`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProposeOutcome {
    Proposed {
        action: ActionView,
        next_steps: Vec<String>,
    },
    AutoApproved {
        action: ActionView,
        next_steps: Vec<String>,
    },
    Denied {
        reason: String,
    },
}

/// Outcome of `approve`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApproveActionOutcome {
    Approved { action: ActionView },
    Rejected { action: ActionView },
    Denied { reason: String },
}

/// Outcome of `execute`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecuteActionOutcome {
    Completed { action: ActionView },
    Failed { action: ActionView },
    Denied { reason: String },
}

/// Manager for the remediation workflow.
pub struct ActionManager {
    settings: Arc<Settings>,
    broker: Arc<SshBroker>,
    audit: Arc<AuditLog>,
    registry: ApprovalRegistry<ActionRequest>,
}

impl ActionManager {
    #[must_use]
    pub fn new(settings: Arc<Settings>, broker: Arc<SshBroker>, audit: Arc<AuditLog>) -> Self {
        Self {
            settings,
            broker,
            audit,
            registry: ApprovalRegistry::new(),
        }
    }

    /// Propose an action for human validation. Auto-approval is honored
    /// only for LOW-impact actions.
    #[must_use]
    pub fn propose(
        &self,
        name: &str,
        host: &str,
        rationale: &str,
        auto_approve: bool,
    ) -> ProposeOutcome {
        let Some(spec) = find_action(name) else {
            let available: Vec<&str> = catalog().iter().map(|s| s.name).collect();
            return ProposeOutcome::Denied {
                reason: format!(
                    "Unknown remediation action '{name}'. Available: {}",
                    available.join(", ")
                ),
            };
        };

        let max_impact = ExecutionImpact::from_str(&self.settings.exec_max_impact)
            .unwrap_or(ExecutionImpact::Medium);
        if spec.impact.rank() > max_impact.rank() {
            return ProposeOutcome::Denied {
                reason: format!(
                    "Action '{name}' has {} impact, above the configured maximum ({max_impact})",
                    spec.impact
                ),
            };
        }

        let id = ApprovalRegistry::<ActionRequest>::new_id("");
        let proposed = self.registry.propose(
            id.clone(),
            ActionRequest {
                name: spec.name.to_string(),
                host: host.to_string(),
                impact: spec.impact,
                rationale: rationale.to_string(),
                command: spec.command.to_string(),
                result: None,
                error: None,
            },
        );

        self.audit.event(
            EventType::ExecProposed,
            Status::Pending,
            json!({ "action": name, "host": host, "rationale": rationale, "impact": spec.impact.to_string() }),
            LogLevel::Info,
        );

        if auto_approve && spec.impact == ExecutionImpact::Low {
            if let ApproveOutcome::Approved(entry) = self.registry.approve(&id, "auto") {
                self.audit.event(
                    EventType::ExecApproved,
                    Status::Success,
                    json!({ "action": name, "host": host, "approver": "auto" }),
                    LogLevel::Info,
                );
                return ProposeOutcome::AutoApproved {
                    next_steps: vec![format!(
                        "Execute with: execute_remote_execution(action_id=\"{}\")",
                        entry.id
                    )],
                    action: entry.into(),
                };
            }
        }

        ProposeOutcome::Proposed {
            next_steps: vec![
                format!(
                    "A human reviews and calls approve_remote_execution(action_id=\"{id}\", approved=true)"
                ),
                format!("Then execute with execute_remote_execution(action_id=\"{id}\")"),
            ],
            action: proposed.into(),
        }
    }

    /// Approve or reject a proposed action. Rejection is terminal and
    /// removes the entry.
    #[must_use]
    pub fn approve(&self, action_id: &str, approved: bool, approver: &str) -> ApproveActionOutcome {
        if approved {
            match self.registry.approve(action_id, approver) {
                ApproveOutcome::Approved(entry) => {
                    self.audit.event(
                        EventType::ExecApproved,
                        Status::Success,
                        json!({ "action": entry.payload.name, "host": entry.payload.host, "approver": approver }),
                        LogLevel::Info,
                    );
                    ApproveActionOutcome::Approved {
                        action: entry.into(),
                    }
                }
                ApproveOutcome::Terminal(state) => ApproveActionOutcome::Denied {
                    reason: format!("Action {action_id} is not approvable (state: {state})"),
                },
                ApproveOutcome::NotFound => ApproveActionOutcome::Denied {
                    reason: format!("Unknown action id: {action_id}"),
                },
            }
        } else {
            match self.registry.reject(action_id, approver) {
                Some(entry) => {
                    self.audit.event(
                        EventType::ExecRejected,
                        Status::Denied,
                        json!({ "action": entry.payload.name, "host": entry.payload.host, "approver": approver }),
                        LogLevel::Info,
                    );
                    ApproveActionOutcome::Rejected {
                        action: entry.into(),
                    }
                }
                None => ApproveActionOutcome::Denied {
                    reason: format!(
                        "Action {action_id} cannot be rejected (unknown id or not in proposed state)"
                    ),
                },
            }
        }
    }

    /// Execute an approved action. On success the entry is removed after
    /// the result is returned; on failure it is retained for inspection.
    ///
    /// # Errors
    /// Auth and host-allowlist failures propagate as errors; a non-zero
    /// remote exit code is the FAILED outcome, not an error.
    pub async fn execute(&self, action_id: &str) -> Result<ExecuteActionOutcome> {
        let Some(entry) = self.registry.begin_execution(action_id) else {
            let reason = match self.registry.get(action_id) {
                Some(entry) => format!(
                    "Action {action_id} is not approved (state: {}). Cannot execute.",
                    entry.state
                ),
                None => format!("Unknown action id: {action_id}"),
            };
            return Ok(ExecuteActionOutcome::Denied { reason });
        };

        let dispatch = self
            .broker
            .execute_action(&entry.payload.host, &entry.payload.command, None)
            .await;

        match dispatch {
            Ok(output) if output.success() => {
                let snapshot = self
                    .registry
                    .complete(action_id, true, |payload| payload.result = Some(output.clone()))
                    .expect("entry was executing");
                self.audit.event(
                    EventType::ExecExecuted,
                    Status::Success,
                    json!({ "action": snapshot.payload.name, "host": snapshot.payload.host, "exit_code": 0 }),
                    LogLevel::Info,
                );
                Ok(ExecuteActionOutcome::Completed {
                    action: snapshot.into(),
                })
            }
            Ok(output) => {
                let error = if output.stderr.is_empty() {
                    "Non-zero exit code".to_string()
                } else {
                    output.stderr.clone()
                };
                let snapshot = self
                    .registry
                    .fail(action_id, |payload| {
                        payload.result = Some(output.clone());
                        payload.error = Some(error.clone());
                    })
                    .expect("entry was executing");
                self.audit.event(
                    EventType::ExecFailed,
                    Status::Failure,
                    json!({ "action": snapshot.payload.name, "host": snapshot.payload.host, "exit_code": output.exit_code }),
                    LogLevel::Warning,
                );
                Ok(ExecuteActionOutcome::Failed {
                    action: snapshot.into(),
                })
            }
            Err(e) => {
                let message = e.to_string();
                let snapshot = self
                    .registry
                    .fail(action_id, |payload| payload.error = Some(message.clone()))
                    .expect("entry was executing");
                self.audit.event(
                    EventType::ExecFailed,
                    Status::Failure,
                    json!({ "action": snapshot.payload.name, "host": snapshot.payload.host, "error": message }),
                    LogLevel::Warning,
                );
                Ok(ExecuteActionOutcome::Failed {
                    action: snapshot.into(),
                })
            }
        }
    }

    /// All non-terminal actions, oldest first.
    #[must_use]
    pub fn list_pending(&self) -> Vec<ActionView> {
        self.registry
            .list(|entry| !entry.state.is_terminal())
            .into_iter()
            .map(ActionView::from)
            .collect()
    }

    /// Fetch one action by id (terminal FAILED entries included).
    #[must_use]
    pub fn get(&self, action_id: &str) -> Option<ActionView> {
        self.registry.get(action_id).map(ActionView::from)
    }

    /// Purge entries older than `max_age_hours`.
    pub fn cleanup(&self, max_age_hours: u64) -> usize {
        self.registry
            .cleanup(Duration::from_secs(max_age_hours * 3600))
    }
}
