//! Environment-driven configuration.
//!
//! All settings are read from `FLEETGATE_*` environment variables through
//! the [`Environment`](crate::env::Environment) abstraction. Path values
//! expand `~` and `$VAR` references. The deprecated `PRA_*` spellings of the
//! executor settings are accepted on read as aliases for `EXEC_*` and never
//! emitted.

use std::path::PathBuf;

use serde_derive::Serialize;

use crate::env::Environment;
use crate::error::{Error, Result};

/// Prefix for every configuration environment variable.
pub const ENV_PREFIX: &str = "FLEETGATE_";

/// Default remote identity for the executor channel.
pub const DEFAULT_EXEC_USER: &str = "exec-runner";

/// Global settings loaded once at startup.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Default reader identity (falls back to the current OS user).
    pub user: String,

    /// Reader private key (DIRECT mode).
    pub ssh_key_path: Option<PathBuf>,
    /// Passphrase for the reader key.
    pub key_passphrase: Option<String>,

    /// Executor private key (DIRECT mode).
    pub exec_key_path: Option<PathBuf>,
    /// Executor remote identity.
    pub exec_user: String,
    /// Passphrase for the executor key.
    pub exec_key_passphrase: Option<String>,

    /// SSH connect timeout in seconds.
    pub ssh_connection_timeout: u64,
    /// SSH keepalive interval in seconds.
    pub ssh_keepalive_interval: u64,
    /// Advisory upper bound on pooled connections per role.
    pub ssh_max_connections: usize,

    /// Directory for the audit sink. `None` disables the file sink.
    pub log_dir: Option<PathBuf>,
    /// Logging level (DEBUG..CRITICAL).
    pub log_level: String,

    /// Allowed hosts. `None` means all hosts are permitted; any non-empty
    /// list is exact-match, no wildcards.
    pub allowed_hosts: Option<Vec<String>>,
    /// Glob whitelist for remote log file reads.
    pub allowed_log_paths: String,

    /// Require human approval for state-changing executions.
    pub require_approval_for_exec: bool,
    /// Maximum impact level accepted when proposing remediation actions
    /// (`low`, `medium`, or `high`).
    pub exec_max_impact: String,

    /// Default number of log lines fetched by diagnostics.
    pub default_log_lines: u32,
    /// Default command timeout in seconds.
    pub default_command_timeout: u64,

    /// Explicitly disable SSH agent authentication even when available.
    pub disable_ssh_agent: bool,
    /// Optional whitelist override document (YAML).
    pub whitelist_path: Option<PathBuf>,
    /// Require strict known-hosts verification. Off by default as a
    /// development affordance; production deployments should set it.
    pub strict_host_keys: bool,
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for unparseable numeric or boolean values
    /// and for an invalid `EXEC_MAX_IMPACT`. Configuration errors are fatal
    /// at startup.
    pub fn from_env(env: &dyn Environment) -> Result<Self> {
        let user = lookup(env, "USER")
            .or_else(|| env.var("USER"))
            .or_else(|| env.var("LOGNAME"))
            .unwrap_or_else(|| "root".to_string());

        // Deprecated pra_* spellings are read-time aliases for exec_*.
        let exec_key_path = lookup(env, "EXEC_KEY_PATH").or_else(|| lookup(env, "PRA_KEY_PATH"));
        let exec_user = lookup(env, "EXEC_USER")
            .or_else(|| lookup(env, "PRA_USER"))
            .unwrap_or_else(|| DEFAULT_EXEC_USER.to_string());
        let exec_key_passphrase =
            lookup(env, "EXEC_KEY_PASSPHRASE").or_else(|| lookup(env, "PRA_KEY_PASSPHRASE"));

        let exec_max_impact = lookup(env, "EXEC_MAX_IMPACT")
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|| "medium".to_string());
        if !matches!(exec_max_impact.as_str(), "low" | "medium" | "high") {
            return Err(Error::Config(format!(
                "EXEC_MAX_IMPACT must be one of low/medium/high, got '{exec_max_impact}'"
            )));
        }

        let log_level = lookup(env, "LOG_LEVEL")
            .map(|v| v.to_uppercase())
            .unwrap_or_else(|| "INFO".to_string());
        if !matches!(
            log_level.as_str(),
            "DEBUG" | "INFO" | "WARNING" | "ERROR" | "CRITICAL"
        ) {
            return Err(Error::Config(format!(
                "LOG_LEVEL must be one of DEBUG/INFO/WARNING/ERROR/CRITICAL, got '{log_level}'"
            )));
        }

        Ok(Self {
            user,
            ssh_key_path: lookup(env, "SSH_KEY_PATH").map(|v| expand_path(&v, env)),
            key_passphrase: lookup(env, "KEY_PASSPHRASE"),
            exec_key_path: exec_key_path.map(|v| expand_path(&v, env)),
            exec_user,
            exec_key_passphrase,
            ssh_connection_timeout: parse_num(env, "SSH_CONNECTION_TIMEOUT", 30)?,
            ssh_keepalive_interval: parse_num(env, "SSH_KEEPALIVE_INTERVAL", 60)?,
            ssh_max_connections: parse_num(env, "SSH_MAX_CONNECTIONS", 10)? as usize,
            log_dir: lookup(env, "LOG_DIR").map(|v| expand_path(&v, env)),
            log_level,
            allowed_hosts: parse_allowed_hosts(lookup(env, "ALLOWED_HOSTS")),
            allowed_log_paths: lookup(env, "ALLOWED_LOG_PATHS")
                .unwrap_or_else(|| "/var/log/*".to_string()),
            require_approval_for_exec: parse_bool(env, "REQUIRE_APPROVAL_FOR_EXEC", true)?,
            exec_max_impact,
            default_log_lines: parse_num(env, "DEFAULT_LOG_LINES", 100)? as u32,
            default_command_timeout: parse_num(env, "DEFAULT_COMMAND_TIMEOUT", 120)?,
            disable_ssh_agent: parse_bool(env, "DISABLE_SSH_AGENT", false)?,
            whitelist_path: lookup(env, "WHITELIST_PATH").map(|v| expand_path(&v, env)),
            strict_host_keys: parse_bool(env, "STRICT_HOST_KEYS", false)?,
        })
    }

    /// Check if a host is permitted by the allowlist.
    #[must_use]
    pub fn is_host_allowed(&self, host: &str) -> bool {
        match &self.allowed_hosts {
            None => true,
            Some(hosts) => hosts.iter().any(|h| h == host),
        }
    }
}

/// Look up a prefixed variable, tolerating lowercase spellings.
fn lookup(env: &dyn Environment, key: &str) -> Option<String> {
    let upper = format!("{ENV_PREFIX}{key}");
    env.var(&upper)
        .or_else(|| env.var(&upper.to_lowercase()))
        .filter(|v| !v.is_empty())
}

fn parse_num(env: &dyn Environment, key: &str, default: u64) -> Result<u64> {
    match lookup(env, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be an integer, got '{raw}'"))),
    }
}

fn parse_bool(env: &dyn Environment, key: &str, default: bool) -> Result<bool> {
    match lookup(env, key) {
        None => Ok(default),
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!(
                "{key} must be a boolean, got '{raw}'"
            ))),
        },
    }
}

/// `*` or unset means every host is permitted.
fn parse_allowed_hosts(raw: Option<String>) -> Option<Vec<String>> {
    let raw = raw?;
    if raw == "*" {
        return None;
    }
    let hosts: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(String::from)
        .collect();
    if hosts.is_empty() {
        None
    } else {
        Some(hosts)
    }
}

/// Expand `~` and `$VAR` references in a path value.
fn expand_path(raw: &str, env: &dyn Environment) -> PathBuf {
    let mut value = raw.to_string();

    if value.starts_with('~') {
        if let Some(home) = env.home_dir() {
            value = value.replacen('~', &home.display().to_string(), 1);
        }
    }

    // Bounded so a variable expanding to another `$` reference cannot loop.
    for _ in 0..8 {
        let Some(start) = value.find('$') else { break };
        let rest = &value[start + 1..];
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        if end == 0 {
            break;
        }
        let name = &rest[..end];
        let replacement = env.var(name).unwrap_or_default();
        value = format!("{}{}{}", &value[..start], replacement, &rest[end..]);
    }

    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnvironment;
    use std::path::Path;

    fn env_with(vars: &[(&str, &str)]) -> MockEnvironment {
        let mut env = MockEnvironment::default();
        for (k, v) in vars {
            env.env_vars.insert((*k).to_string(), (*v).to_string());
        }
        env
    }

    #[test]
    fn test_defaults() {
        let env = env_with(&[("USER", "ops")]);
        let settings = Settings::from_env(&env).unwrap();
        assert_eq!(settings.user, "ops");
        assert_eq!(settings.exec_user, "exec-runner");
        assert_eq!(settings.ssh_connection_timeout, 30);
        assert_eq!(settings.ssh_keepalive_interval, 60);
        assert_eq!(settings.ssh_max_connections, 10);
        assert_eq!(settings.exec_max_impact, "medium");
        assert_eq!(settings.default_log_lines, 100);
        assert_eq!(settings.default_command_timeout, 120);
        assert!(settings.require_approval_for_exec);
        assert!(settings.allowed_hosts.is_none());
        assert_eq!(settings.allowed_log_paths, "/var/log/*");
    }

    #[test]
    fn test_allowed_hosts_star_and_unset_are_equivalent() {
        let unset = Settings::from_env(&env_with(&[])).unwrap();
        let star = Settings::from_env(&env_with(&[("FLEETGATE_ALLOWED_HOSTS", "*")])).unwrap();
        assert!(unset.is_host_allowed("anything"));
        assert!(star.is_host_allowed("anything"));

        let restricted = Settings::from_env(&env_with(&[(
            "FLEETGATE_ALLOWED_HOSTS",
            "coreos-11, coreos-12",
        )]))
        .unwrap();
        assert!(restricted.is_host_allowed("coreos-11"));
        assert!(restricted.is_host_allowed("coreos-12"));
        assert!(!restricted.is_host_allowed("coreos-13"));
        // Exact match only, no wildcards.
        assert!(!restricted.is_host_allowed("coreos-1"));
    }

    #[test]
    fn test_pra_aliases_are_read() {
        let env = env_with(&[
            ("FLEETGATE_PRA_KEY_PATH", "/etc/keys/exec.key"),
            ("FLEETGATE_PRA_USER", "pra-runner"),
        ]);
        let settings = Settings::from_env(&env).unwrap();
        assert_eq!(
            settings.exec_key_path.as_deref(),
            Some(Path::new("/etc/keys/exec.key"))
        );
        assert_eq!(settings.exec_user, "pra-runner");
    }

    #[test]
    fn test_exec_spelling_wins_over_pra() {
        let env = env_with(&[
            ("FLEETGATE_EXEC_KEY_PATH", "/etc/keys/new.key"),
            ("FLEETGATE_PRA_KEY_PATH", "/etc/keys/old.key"),
        ]);
        let settings = Settings::from_env(&env).unwrap();
        assert_eq!(
            settings.exec_key_path.as_deref(),
            Some(Path::new("/etc/keys/new.key"))
        );
    }

    #[test]
    fn test_tilde_expansion() {
        let mut env = env_with(&[("FLEETGATE_SSH_KEY_PATH", "~/.ssh/reader.key")]);
        env.home = Some(PathBuf::from("/home/ops"));
        let settings = Settings::from_env(&env).unwrap();
        assert_eq!(
            settings.ssh_key_path.as_deref(),
            Some(Path::new("/home/ops/.ssh/reader.key"))
        );
    }

    #[test]
    fn test_env_var_expansion() {
        let env = env_with(&[
            ("FLEETGATE_LOG_DIR", "$STATE_DIR/fleetgate"),
            ("STATE_DIR", "/var/lib"),
        ]);
        let settings = Settings::from_env(&env).unwrap();
        assert_eq!(
            settings.log_dir.as_deref(),
            Some(Path::new("/var/lib/fleetgate"))
        );
    }

    #[test]
    fn test_invalid_numeric_is_fatal() {
        let env = env_with(&[("FLEETGATE_SSH_CONNECTION_TIMEOUT", "soon")]);
        assert!(matches!(
            Settings::from_env(&env),
            Err(Error::Config(msg)) if msg.contains("SSH_CONNECTION_TIMEOUT")
        ));
    }

    #[test]
    fn test_invalid_impact_is_fatal() {
        let env = env_with(&[("FLEETGATE_EXEC_MAX_IMPACT", "extreme")]);
        assert!(matches!(Settings::from_env(&env), Err(Error::Config(_))));
    }

    #[test]
    fn test_lowercase_keys_accepted() {
        let env = env_with(&[("fleetgate_exec_user", "runner2")]);
        let settings = Settings::from_env(&env).unwrap();
        assert_eq!(settings.exec_user, "runner2");
    }
}
