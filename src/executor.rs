//! Command executor facade.
//!
//! Orchestrates the classifier, the decision engine, and the transport
//! behind a single `execute` entry point. The engine stays deterministic
//! and side-effect-free; this facade owns every side effect — SSH
//! dispatch, audit, suggestion rendering — and is the piece to replace for
//! dry-run or offline modes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_derive::Serialize;
use serde_json::json;

use crate::audit::AuditLog;
use crate::authorize::{AuthLevel, AuthorizationEngine, SshRole, WhitelistSummary};
use crate::classify::{Classifier, CommandAnalysis, RecommendedAction, RiskLevel};
use crate::config::Settings;
use crate::error::Result;
use crate::transport::SshBroker;

/// Identity recorded against command-path learning entries.
pub const TOOL_USER: &str = "mcp-user";

/// Response envelope for `execute`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecuteResponse {
    /// The command ran (AUTO, or MANUAL with the approval bypassed).
    Executed {
        command: String,
        host: String,
        ssh_user: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
        /// True when a MANUAL command was force-dispatched.
        approval_bypassed: bool,
    },
    /// MANUAL: a pending approval was created.
    ApprovalRequired {
        command: String,
        host: String,
        ssh_user: String,
        approval_id: String,
        description: String,
        rationale: String,
        instructions: Vec<String>,
    },
    /// BLOCKED: terminal denial, enriched with the classifier's verdict.
    Blocked {
        command: String,
        host: String,
        reason: String,
        risk_level: RiskLevel,
        category: String,
        recommendation: RecommendedAction,
        suggestion: String,
    },
}

/// Response envelope for `approve`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApproveResponse {
    Executed {
        approval_id: String,
        command: String,
        host: String,
        ssh_user: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    NotFound {
        approval_id: String,
        reason: String,
    },
}

/// Listing entry for pending approvals.
#[derive(Debug, Clone, Serialize)]
pub struct PendingView {
    pub approval_id: String,
    pub command: String,
    pub host: String,
    pub ssh_role: SshRole,
    pub description: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

/// The facade. Holds explicit handles to every collaborator; nothing here
/// is a global.
pub struct CommandExecutor {
    settings: Arc<Settings>,
    classifier: Arc<Classifier>,
    engine: Arc<AuthorizationEngine>,
    broker: Arc<SshBroker>,
    audit: Arc<AuditLog>,
}

impl CommandExecutor {
    #[must_use]
    pub fn new(
        settings: Arc<Settings>,
        classifier: Arc<Classifier>,
        engine: Arc<AuthorizationEngine>,
        broker: Arc<SshBroker>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            settings,
            classifier,
            engine,
            broker,
            audit,
        }
    }

    /// Execute a command on `host` under the authorization policy.
    ///
    /// # Errors
    /// Transport and auth failures propagate; policy outcomes (BLOCKED,
    /// approval required) are ordinary response variants, never errors.
    pub async fn execute(
        &self,
        host: &str,
        command: &str,
        force_approval: bool,
    ) -> Result<ExecuteResponse> {
        // The classifier only enriches BLOCKED responses; the decision
        // itself is purely rule-driven.
        let analysis = self.classifier.classify(command);
        let auth = self.engine.check(host, command, TOOL_USER);

        match auth.level {
            AuthLevel::Blocked => Ok(ExecuteResponse::Blocked {
                command: command.to_string(),
                host: host.to_string(),
                reason: auth.reason,
                risk_level: analysis.risk,
                category: analysis.category.clone(),
                recommendation: analysis.recommended_action,
                suggestion: render_suggestion(&analysis),
            }),

            AuthLevel::Auto => {
                let output = self
                    .broker
                    .execute_read(host, &[command.to_string()], None)
                    .await?;
                Ok(ExecuteResponse::Executed {
                    command: command.to_string(),
                    host: host.to_string(),
                    ssh_user: self.settings.user.clone(),
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    approval_bypassed: false,
                })
            }

            AuthLevel::Manual => {
                let approval_id = auth
                    .approval_id
                    .unwrap_or_else(|| "missing-approval-id".to_string());

                if force_approval {
                    // Any bypass of the manual step is a CRITICAL security
                    // event, executed or not.
                    self.audit.security_violation(
                        "manual_approval_bypassed",
                        Some(host),
                        json!({ "command": command, "approval_id": approval_id, "user": TOOL_USER }),
                    );
                    let output = self.broker.execute_action(host, command, None).await?;
                    // Consume the pending entry so it cannot be replayed.
                    self.engine.approve(&approval_id);
                    self.engine.mark_executed(&approval_id);
                    return Ok(ExecuteResponse::Executed {
                        command: command.to_string(),
                        host: host.to_string(),
                        ssh_user: self.settings.exec_user.clone(),
                        exit_code: output.exit_code,
                        stdout: output.stdout,
                        stderr: output.stderr,
                        approval_bypassed: true,
                    });
                }

                let (description, rationale) = auth
                    .rule
                    .as_ref()
                    .map(|r| (r.description.clone(), r.rationale.clone()))
                    .unwrap_or_default();
                Ok(ExecuteResponse::ApprovalRequired {
                    command: command.to_string(),
                    host: host.to_string(),
                    ssh_user: self.settings.exec_user.clone(),
                    approval_id: approval_id.clone(),
                    description,
                    rationale,
                    instructions: vec![
                        format!("To execute: approve_command(approval_id=\"{approval_id}\")"),
                        "To review the queue: list_pending_approvals()".to_string(),
                    ],
                })
            }
        }
    }

    /// Approve and execute a pending command.
    ///
    /// # Errors
    /// Transport failures propagate; the approval stays valid (approved,
    /// not executed) so the caller can retry.
    pub async fn approve(&self, approval_id: &str) -> Result<ApproveResponse> {
        let Some(pending) = self.engine.approve(approval_id) else {
            return Ok(ApproveResponse::NotFound {
                approval_id: approval_id.to_string(),
                reason: "Invalid approval id, already executed, or expired. \
                         Approval ids do not survive a broker restart."
                    .to_string(),
            });
        };

        let output = self
            .broker
            .execute_action(&pending.payload.host, &pending.payload.command, None)
            .await?;

        self.engine.mark_executed(approval_id);

        Ok(ApproveResponse::Executed {
            approval_id: approval_id.to_string(),
            command: pending.payload.command,
            host: pending.payload.host,
            ssh_user: self.settings.exec_user.clone(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// All non-executed pending approvals.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingView> {
        self.engine
            .all_pending()
            .into_iter()
            .map(|entry| PendingView {
                approval_id: entry.id.clone(),
                command: entry.payload.command.clone(),
                host: entry.payload.host.clone(),
                ssh_role: entry.payload.role,
                description: entry.payload.rule.description.clone(),
                approved: entry.approved(),
                created_at: entry.created_at,
            })
            .collect()
    }

    /// The whitelist organized by authorization level.
    #[must_use]
    pub fn whitelist(&self) -> WhitelistSummary {
        self.engine.whitelist_summary()
    }

    /// Classify a command, marking it as already whitelisted when a legacy
    /// AUTO rule covers it.
    #[must_use]
    pub fn analyze(&self, command: &str) -> CommandAnalysis {
        let mut analysis = self.classifier.classify(command);
        if let Some(rule) = self.engine.rules().iter().find(|r| r.matches(command)) {
            if rule.level == AuthLevel::Auto {
                analysis.recommended_action = RecommendedAction::AlreadyWhitelisted;
            }
        }
        analysis
    }
}

/// Human-readable next step attached to a denial.
fn render_suggestion(analysis: &CommandAnalysis) -> String {
    match analysis.recommended_action {
        RecommendedAction::AddAuto | RecommendedAction::AlreadyWhitelisted => {
            "This command looks read-only. Inspect it with analyze_command() \
             and consider adding it to the auto-approved whitelist."
                .to_string()
        }
        RecommendedAction::AddManual => {
            "This command changes system state. Consider adding it to the \
             manual-approval whitelist, or run it once through the \
             remediation workflow."
                .to_string()
        }
        RecommendedAction::BlockPermanently => {
            "This command is dangerous. Use an Ansible playbook or a \
             bounded remediation action instead."
                .to_string()
        }
        RecommendedAction::ManualReview => {
            "Command not recognized. Inspect it with analyze_command() and \
             request a whitelist review if it is needed regularly."
                .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::catalog::Catalog;
    use crate::env::MockEnvironment;
    use crate::learning::LearningStore;
    use crate::transport::{ExecOutput, MockConnector, SshAuthMode};
    use crate::whitelist;

    pub(crate) struct Fixture {
        pub executor: CommandExecutor,
        pub connector: Arc<MockConnector>,
        _temp: tempfile::TempDir,
    }

    pub(crate) fn fixture() -> Fixture {
        fixture_with(MockConnector::new())
    }

    pub(crate) fn fixture_with(connector: MockConnector) -> Fixture {
        let mut env = MockEnvironment::default();
        env.env_vars.insert("USER".into(), "mcp-reader".into());
        let settings = Arc::new(Settings::from_env(&env).unwrap());
        let audit = Arc::new(AuditLog::new(None));
        let temp = tempfile::tempdir().unwrap();

        let catalog = Arc::new(Catalog::builtin().unwrap());
        let classifier = Arc::new(Classifier::new(catalog));
        let learning = Arc::new(LearningStore::new(
            temp.path().join("stats.json"),
            Arc::clone(&classifier),
        ));
        let engine = Arc::new(AuthorizationEngine::new(
            whitelist::default_rules(),
            learning,
        ));
        let connector = Arc::new(connector);
        let broker = Arc::new(SshBroker::with_connector(
            Arc::clone(&settings),
            Arc::clone(&audit),
            SshAuthMode::Agent,
            Box::new(Arc::clone(&connector)),
        ));

        Fixture {
            executor: CommandExecutor::new(settings, classifier, engine, broker, audit),
            connector,
            _temp: temp,
        }
    }

    #[tokio::test]
    async fn test_auto_path_dispatches_reader() {
        let mut connector = MockConnector::new();
        connector.script(
            "mcp-reader",
            "coreos-11",
            "systemctl status unbound",
            ExecOutput {
                exit_code: 0,
                stdout: "active (running)".into(),
                stderr: String::new(),
            },
        );
        let f = fixture_with(connector);

        let response = f
            .executor
            .execute("coreos-11", "systemctl status unbound", false)
            .await
            .unwrap();
        match response {
            ExecuteResponse::Executed {
                exit_code,
                stdout,
                ssh_user,
                approval_bypassed,
                ..
            } => {
                assert_eq!(exit_code, 0);
                assert_eq!(stdout, "active (running)");
                assert_eq!(ssh_user, "mcp-reader");
                assert!(!approval_bypassed);
            }
            other => panic!("expected Executed, got {other:?}"),
        }
        // No pending approval was created.
        assert!(f.executor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_manual_path_returns_approval_envelope() {
        let f = fixture();
        let response = f
            .executor
            .execute("coreos-11", "systemctl restart unbound", false)
            .await
            .unwrap();
        let approval_id = match response {
            ExecuteResponse::ApprovalRequired {
                approval_id,
                ssh_user,
                ..
            } => {
                assert_eq!(ssh_user, "exec-runner");
                approval_id
            }
            other => panic!("expected ApprovalRequired, got {other:?}"),
        };
        assert!(!approval_id.is_empty());
        // Nothing was dispatched.
        assert!(f.connector.executed_commands().is_empty());

        let pending = f.executor.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].approval_id, approval_id);
        assert!(!pending[0].approved);
    }

    #[tokio::test]
    async fn test_full_manual_lifecycle() {
        let f = fixture();
        let response = f
            .executor
            .execute("coreos-11", "systemctl restart unbound", false)
            .await
            .unwrap();
        let ExecuteResponse::ApprovalRequired { approval_id, .. } = response else {
            panic!("expected approval envelope");
        };

        let approved = f.executor.approve(&approval_id).await.unwrap();
        match approved {
            ApproveResponse::Executed {
                command, ssh_user, ..
            } => {
                assert_eq!(command, "systemctl restart unbound");
                assert_eq!(ssh_user, "exec-runner");
            }
            other => panic!("expected Executed, got {other:?}"),
        }

        // Dispatched on the executor channel with the executor identity.
        assert_eq!(
            f.connector.executed_commands(),
            vec!["exec-runner@coreos-11 systemctl restart unbound"]
        );
        // Queue is drained.
        assert!(f.executor.pending().is_empty());

        // The consumed id cannot be approved again.
        let again = f.executor.approve(&approval_id).await.unwrap();
        assert!(matches!(again, ApproveResponse::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_blocked_path_carries_classifier_verdict() {
        let f = fixture();
        let response = f
            .executor
            .execute("coreos-11", "rm -rf /var", false)
            .await
            .unwrap();
        match response {
            ExecuteResponse::Blocked {
                risk_level,
                category,
                recommendation,
                reason,
                ..
            } => {
                assert_eq!(risk_level, RiskLevel::Critical);
                assert_eq!(category, "destructive");
                assert_eq!(recommendation, RecommendedAction::BlockPermanently);
                assert!(reason.starts_with("BLOCKED"));
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
        assert!(f.connector.executed_commands().is_empty());
    }

    #[tokio::test]
    async fn test_force_approval_bypasses_and_tags() {
        let f = fixture();
        let response = f
            .executor
            .execute("coreos-11", "systemctl restart unbound", true)
            .await
            .unwrap();
        match response {
            ExecuteResponse::Executed {
                approval_bypassed,
                ssh_user,
                ..
            } => {
                assert!(approval_bypassed);
                assert_eq!(ssh_user, "exec-runner");
            }
            other => panic!("expected Executed, got {other:?}"),
        }
        // Dispatched straight to the executor channel.
        assert_eq!(
            f.connector.executed_commands(),
            vec!["exec-runner@coreos-11 systemctl restart unbound"]
        );
        // The pending entry was consumed, not left to dangle.
        assert!(f.executor.pending().is_empty());
    }

    #[tokio::test]
    async fn test_approve_unknown_id_is_structured() {
        let f = fixture();
        let response = f.executor.approve("cmd_deadbeef").await.unwrap();
        match response {
            ApproveResponse::NotFound { approval_id, .. } => {
                assert_eq!(approval_id, "cmd_deadbeef");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_approval_retryable() {
        let mut connector = MockConnector::new();
        connector
            .connect_failures
            .insert("coreos-11".into(), "connection refused".into());
        let f = fixture_with(connector);

        let response = f
            .executor
            .execute("coreos-11", "systemctl restart unbound", false)
            .await
            .unwrap();
        let ExecuteResponse::ApprovalRequired { approval_id, .. } = response else {
            panic!("expected approval envelope");
        };

        // Execution fails at the transport, the error propagates...
        assert!(f.executor.approve(&approval_id).await.is_err());
        // ...and the pending command is still approved, not executed.
        let pending = f.executor.pending();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].approved);
    }

    #[test]
    fn test_analyze_marks_whitelisted_commands() {
        let f = fixture();
        let analysis = f.executor.analyze("systemctl status unbound");
        assert_eq!(
            analysis.recommended_action,
            RecommendedAction::AlreadyWhitelisted
        );

        let analysis = f.executor.analyze("frobnicate --widgets");
        assert_eq!(analysis.recommended_action, RecommendedAction::ManualReview);
    }

    #[test]
    fn test_suggestion_rendering() {
        let f = fixture();
        insta::assert_snapshot!(
            render_suggestion(&f.executor.analyze("rm -rf /var")),
            @"This command is dangerous. Use an Ansible playbook or a bounded remediation action instead."
        );
        insta::assert_snapshot!(
            render_suggestion(&f.executor.analyze("frobnicate --widgets")),
            @"Command not recognized. Inspect it with analyze_command() and request a whitelist review if it is needed regularly."
        );
    }

    #[test]
    fn test_whitelist_summary_exposed() {
        let f = fixture();
        let summary = f.executor.whitelist();
        assert!(!summary.auto.is_empty());
        assert!(!summary.blocked.is_empty());
    }
}
