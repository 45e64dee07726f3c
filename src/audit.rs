//! Audit trail — structured record of every security-relevant event.
//!
//! Events are appended as JSON lines to `audit.jsonl` under the configured
//! log directory and mirrored to `tracing`. Sensitive keys (passphrases,
//! secrets, tokens, keys, passwords) are redacted before anything reaches
//! the sink. Sink failures are logged and swallowed; auditing must never
//! block a decision.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde_derive::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SshConnect,
    SshDisconnect,
    SshCommand,
    ExecProposed,
    ExecApproved,
    ExecRejected,
    ExecExecuted,
    ExecFailed,
    ToolCall,
    ToolSuccess,
    ToolError,
    SecurityViolation,
}

/// Execution status attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Failure,
    Pending,
    Denied,
}

/// Severity of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// A single audit entry, one JSON object per line on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event_type: EventType,
    pub status: Status,
    pub level: LogLevel,
    pub details: Value,
}

/// The audit sink. Cheap to clone behind an `Arc`.
#[derive(Debug)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Create a sink writing under `log_dir`, or a tracing-only sink when
    /// no directory is configured.
    #[must_use]
    pub fn new(log_dir: Option<&Path>) -> Self {
        Self {
            path: log_dir.map(|d| d.join("audit.jsonl")),
        }
    }

    /// Record an event. Redacts sensitive keys, mirrors to `tracing`, and
    /// appends to the JSONL file when configured.
    pub fn event(&self, event_type: EventType, status: Status, details: Value, level: LogLevel) {
        let mut details = details;
        redact(&mut details);

        let event = AuditEvent {
            timestamp: Utc::now().to_rfc3339(),
            event_type,
            status,
            level,
            details,
        };

        match level {
            LogLevel::Debug => tracing::debug!(target: "fleetgate::audit", event = ?event.event_type, status = ?event.status, details = %event.details),
            LogLevel::Info => tracing::info!(target: "fleetgate::audit", event = ?event.event_type, status = ?event.status, details = %event.details),
            LogLevel::Warning => tracing::warn!(target: "fleetgate::audit", event = ?event.event_type, status = ?event.status, details = %event.details),
            LogLevel::Error | LogLevel::Critical => tracing::error!(target: "fleetgate::audit", event = ?event.event_type, status = ?event.status, details = %event.details),
        }

        if let Some(path) = &self.path {
            if let Err(e) = append_line(path, &event) {
                warn!("audit sink write failed: {e}");
            }
        }
    }

    /// Log an SSH connection attempt.
    pub fn ssh_connect(&self, host: &str, username: &str, status: Status, reused: bool) {
        self.event(
            EventType::SshConnect,
            status,
            json!({ "host": host, "username": username, "reused": reused }),
            LogLevel::Info,
        );
    }

    /// Log an SSH command dispatch.
    pub fn ssh_command(&self, host: &str, username: &str, command: &str, exit_code: i32) {
        let status = if exit_code == 0 {
            Status::Success
        } else {
            Status::Failure
        };
        self.event(
            EventType::SshCommand,
            status,
            json!({
                "host": host,
                "username": username,
                "command": command,
                "exit_code": exit_code,
            }),
            LogLevel::Info,
        );
    }

    /// Log a security violation at CRITICAL level.
    pub fn security_violation(&self, violation: &str, host: Option<&str>, details: Value) {
        let mut payload = json!({ "violation": violation, "host": host });
        if let (Some(obj), Some(extra)) = (payload.as_object_mut(), details.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        self.event(
            EventType::SecurityViolation,
            Status::Denied,
            payload,
            LogLevel::Critical,
        );
    }
}

fn append_line(path: &Path, event: &AuditEvent) -> crate::error::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(event)?;
    writeln!(file, "{line}")?;
    Ok(())
}

const SENSITIVE_KEYS: [&str; 7] = [
    "password",
    "passphrase",
    "token",
    "secret",
    "key",
    "api_key",
    "private_key",
];

/// Recursively replace values under sensitive keys with a redaction marker.
pub fn redact(value: &mut Value) {
    if let Value::Object(map) = value {
        for (key, val) in map.iter_mut() {
            let lowered = key.to_lowercase();
            if SENSITIVE_KEYS.iter().any(|s| lowered.contains(s)) {
                *val = Value::String("***REDACTED***".into());
            } else {
                redact(val);
            }
        }
    } else if let Value::Array(items) = value {
        for item in items {
            redact(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_sensitive_keys() {
        let mut details = json!({
            "host": "coreos-11",
            "key_passphrase": "hunter2",
            "nested": { "api_key": "sk-123", "count": 3 },
        });
        redact(&mut details);
        assert_eq!(details["host"], "coreos-11");
        assert_eq!(details["key_passphrase"], "***REDACTED***");
        assert_eq!(details["nested"]["api_key"], "***REDACTED***");
        assert_eq!(details["nested"]["count"], 3);
    }

    #[test]
    fn test_events_append_as_json_lines() {
        let temp = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(Some(temp.path()));

        audit.ssh_connect("coreos-11", "mcp-reader", Status::Success, false);
        audit.ssh_command("coreos-11", "mcp-reader", "uptime", 0);

        let content = fs::read_to_string(temp.path().join("audit.jsonl")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.event_type, EventType::SshConnect);
        assert_eq!(first.status, Status::Success);

        let second: AuditEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.event_type, EventType::SshCommand);
        assert_eq!(second.details["command"], "uptime");
    }

    #[test]
    fn test_security_violation_is_critical() {
        let temp = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(Some(temp.path()));

        audit.security_violation(
            "host_not_allowed",
            Some("rogue-host"),
            json!({ "command": "uptime" }),
        );

        let content = fs::read_to_string(temp.path().join("audit.jsonl")).unwrap();
        let event: AuditEvent = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(event.event_type, EventType::SecurityViolation);
        assert_eq!(event.level, LogLevel::Critical);
        assert_eq!(event.details["host"], "rogue-host");
    }

    #[test]
    fn test_no_sink_does_not_panic() {
        let audit = AuditLog::new(None);
        audit.ssh_connect("coreos-11", "mcp-reader", Status::Failure, false);
    }
}
