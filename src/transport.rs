//! Dual-channel SSH transport.
//!
//! Two independent pools — `reader` for diagnostics, `executor` for
//! state-changing actions — with shared lifecycle management but distinct
//! credentials and distinct remote identities. Authentication is detected
//! once at startup in strict order: SSH agent (preferred), direct key
//! files (fallback, audited as reduced security), or nothing (every
//! dispatch fails). Every dispatch checks the host allowlist before a
//! connection is opened or reused.
//!
//! The actual SSH client (the `openssh` crate, which drives the system
//! binary) sits behind the [`Connector`]/[`RemoteHandle`] traits so the
//! broker is testable without a network.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::audit::{AuditLog, EventType, LogLevel, Status};
use crate::config::Settings;
use crate::env::Environment;
use crate::error::{Error, Result};

/// SSH authentication mode, detected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SshAuthMode {
    /// Keys stay in the SSH agent; the broker delegates signatures.
    Agent,
    /// Key files read from disk. Works, but audited as reduced security.
    Direct,
    /// Nothing available; every connection attempt fails.
    None,
}

impl std::fmt::Display for SshAuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Direct => write!(f, "direct"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Which of the two privilege-separated channels a dispatch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Reader,
    Executor,
}

impl ChannelRole {
    const fn name(self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Executor => "executor",
        }
    }
}

/// Credential material handed to the connector.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Ambient agent authentication (`SSH_AUTH_SOCK`).
    Agent,
    /// A private key file on disk.
    Key { path: PathBuf },
}

/// Output of one remote command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A live remote session.
#[async_trait]
pub trait RemoteHandle: Send + Sync {
    /// Run a command line on the remote side.
    async fn run(&self, command: &str) -> Result<ExecOutput>;

    /// Whether the underlying transport reports closure.
    fn is_closed(&self) -> bool;

    /// Tear the session down.
    async fn close(&self);
}

/// Opens remote sessions. Implemented by [`OpensshConnector`] in
/// production and by [`MockConnector`] in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        auth: &AuthMethod,
    ) -> Result<Arc<dyn RemoteHandle>>;
}

/// Detect the best available authentication mode, in strict order.
#[must_use]
pub fn detect_auth_mode(settings: &Settings, env: &dyn Environment) -> SshAuthMode {
    if !settings.disable_ssh_agent {
        if let Some(sock) = env.var("SSH_AUTH_SOCK") {
            if env.path_exists(std::path::Path::new(&sock)) {
                return SshAuthMode::Agent;
            }
        }
    }

    if let Some(reader_key) = &settings.ssh_key_path {
        if env.path_exists(reader_key) {
            return SshAuthMode::Direct;
        }
    }

    SshAuthMode::None
}

struct PoolEntry {
    handle: Arc<dyn RemoteHandle>,
    last_used: Instant,
}

#[derive(Default)]
struct Pools {
    reader: HashMap<String, PoolEntry>,
    executor: HashMap<String, PoolEntry>,
}

impl Pools {
    fn for_role(&mut self, role: ChannelRole) -> &mut HashMap<String, PoolEntry> {
        match role {
            ChannelRole::Reader => &mut self.reader,
            ChannelRole::Executor => &mut self.executor,
        }
    }
}

/// The dual-channel SSH broker.
pub struct SshBroker {
    settings: Arc<Settings>,
    audit: Arc<AuditLog>,
    mode: SshAuthMode,
    connector: Box<dyn Connector>,
    pools: tokio::sync::Mutex<Pools>,
}

impl SshBroker {
    /// Build a production broker. Detects the auth mode once and emits a
    /// single prominent audit record describing the choice.
    #[must_use]
    pub fn new(settings: Arc<Settings>, audit: Arc<AuditLog>, env: &dyn Environment) -> Self {
        let mode = detect_auth_mode(&settings, env);
        let connector = Box::new(OpensshConnector::from_settings(&settings));
        Self::assemble(settings, audit, mode, connector)
    }

    /// Build a broker with an explicit mode and connector (tests, dry-run).
    #[must_use]
    pub fn with_connector(
        settings: Arc<Settings>,
        audit: Arc<AuditLog>,
        mode: SshAuthMode,
        connector: Box<dyn Connector>,
    ) -> Self {
        Self::assemble(settings, audit, mode, connector)
    }

    fn assemble(
        settings: Arc<Settings>,
        audit: Arc<AuditLog>,
        mode: SshAuthMode,
        connector: Box<dyn Connector>,
    ) -> Self {
        let broker = Self {
            settings,
            audit,
            mode,
            connector,
            pools: tokio::sync::Mutex::new(Pools::default()),
        };
        broker.log_auth_mode();
        broker
    }

    fn log_auth_mode(&self) {
        match self.mode {
            SshAuthMode::Agent => self.audit.event(
                EventType::ToolCall,
                Status::Success,
                json!({
                    "component": "ssh_broker",
                    "auth_mode": "agent",
                    "security_level": "MAXIMUM",
                    "message": "Using SSH agent; private keys never enter broker memory",
                }),
                LogLevel::Info,
            ),
            SshAuthMode::Direct => self.audit.event(
                EventType::SecurityViolation,
                Status::Pending,
                json!({
                    "component": "ssh_broker",
                    "auth_mode": "direct",
                    "security_level": "REDUCED",
                    "warning": "SSH agent not available, using direct key files",
                    "recommendation": "Start an agent and load the keys: eval $(ssh-agent) && ssh-add <key>",
                }),
                LogLevel::Warning,
            ),
            SshAuthMode::None => self.audit.event(
                EventType::SecurityViolation,
                Status::Failure,
                json!({
                    "component": "ssh_broker",
                    "auth_mode": "none",
                    "error": "No SSH authentication method available",
                    "required": "Start an SSH agent or set FLEETGATE_SSH_KEY_PATH",
                }),
                LogLevel::Critical,
            ),
        }
    }

    /// The detected authentication mode.
    #[must_use]
    pub const fn auth_mode(&self) -> SshAuthMode {
        self.mode
    }

    /// Execute a read-only command on the reader channel. The argv is
    /// joined by single spaces into a remote command line.
    ///
    /// # Errors
    /// `HostNotAllowed`, the auth failure taxonomy, or `Transport`.
    pub async fn execute_read(
        &self,
        host: &str,
        argv: &[String],
        user: Option<&str>,
    ) -> Result<ExecOutput> {
        let user = user.unwrap_or(&self.settings.user).to_string();
        let command = argv.join(" ");
        self.dispatch(ChannelRole::Reader, host, &user, &command)
            .await
    }

    /// Execute an action token on the executor channel. The token is sent
    /// as-is; the remote side's forced-command wrapper interprets it
    /// against its fixed vocabulary.
    ///
    /// # Errors
    /// `HostNotAllowed`, the auth failure taxonomy, or `Transport`.
    pub async fn execute_action(
        &self,
        host: &str,
        action: &str,
        user: Option<&str>,
    ) -> Result<ExecOutput> {
        let user = user.unwrap_or(&self.settings.exec_user).to_string();
        self.dispatch(ChannelRole::Executor, host, &user, action)
            .await
    }

    async fn dispatch(
        &self,
        role: ChannelRole,
        host: &str,
        user: &str,
        command: &str,
    ) -> Result<ExecOutput> {
        if !self.settings.is_host_allowed(host) {
            self.audit.security_violation(
                "host_not_allowed",
                Some(host),
                json!({ "role": role.name(), "command": command }),
            );
            return Err(Error::HostNotAllowed {
                host: host.to_string(),
            });
        }

        let handle = self.connection(role, host, user).await?;

        let timeout = Duration::from_secs(self.settings.default_command_timeout);
        let output = match tokio::time::timeout(timeout, handle.run(command)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::Transport {
                    host: host.to_string(),
                    role: role.name().to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                // Cancelled by timeout: close the channel and discard any
                // partial output so a retry starts clean.
                handle.close().await;
                return Err(Error::Transport {
                    host: host.to_string(),
                    role: role.name().to_string(),
                    message: format!(
                        "command timed out after {}s",
                        self.settings.default_command_timeout
                    ),
                });
            }
        };

        self.audit
            .ssh_command(host, user, command, output.exit_code);
        Ok(output)
    }

    /// Return a live pooled handle, opening a new connection if needed.
    /// Pool mutations are serialized by one mutex.
    async fn connection(
        &self,
        role: ChannelRole,
        host: &str,
        user: &str,
    ) -> Result<Arc<dyn RemoteHandle>> {
        let key = format!("{user}@{host}");
        let mut pools = self.pools.lock().await;
        let pool = pools.for_role(role);

        let stale = pool.get(&key).is_some_and(|e| e.handle.is_closed());
        if stale {
            pool.remove(&key);
        }
        if let Some(entry) = pool.get_mut(&key) {
            entry.last_used = Instant::now();
            let handle = Arc::clone(&entry.handle);
            self.audit.ssh_connect(host, user, Status::Success, true);
            return Ok(handle);
        }

        let auth = self.auth_for(role)?;
        let handle = match self.connector.connect(host, user, &auth).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.translate_connect_error(role, host, user, e)),
        };

        // Advisory bound: drop closed handles first, then the
        // least-recently-used live one.
        if pool.len() >= self.settings.ssh_max_connections {
            pool.retain(|_, entry| !entry.handle.is_closed());
        }
        if pool.len() >= self.settings.ssh_max_connections {
            if let Some(lru_key) = pool
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone())
            {
                debug!("ssh pool at capacity, evicting {lru_key}");
                if let Some(evicted) = pool.remove(&lru_key) {
                    evicted.handle.close().await;
                }
            }
        }

        pool.insert(
            key,
            PoolEntry {
                handle: Arc::clone(&handle),
                last_used: Instant::now(),
            },
        );
        self.audit.ssh_connect(host, user, Status::Success, false);
        Ok(handle)
    }

    /// Credential material for a channel under the detected mode.
    fn auth_for(&self, role: ChannelRole) -> Result<AuthMethod> {
        match self.mode {
            SshAuthMode::Agent => Ok(AuthMethod::Agent),
            SshAuthMode::Direct => match role {
                ChannelRole::Reader => self
                    .settings
                    .ssh_key_path
                    .clone()
                    .map(|path| AuthMethod::Key { path })
                    .ok_or_else(|| Error::NoAuthMethod(no_auth_guidance())),
                ChannelRole::Executor => self
                    .settings
                    .exec_key_path
                    .clone()
                    .map(|path| AuthMethod::Key { path })
                    .ok_or(Error::ExecKeyNotConfigured),
            },
            SshAuthMode::None => Err(Error::NoAuthMethod(no_auth_guidance())),
        }
    }

    /// Translate a connect failure, disambiguating the agent-key-missing
    /// case into its own error with the exact remediation command.
    fn translate_connect_error(
        &self,
        role: ChannelRole,
        host: &str,
        user: &str,
        error: Error,
    ) -> Error {
        let message = error.to_string();
        if self.mode == SshAuthMode::Agent
            && message.to_lowercase().contains("permission denied (publickey")
        {
            let key_path = match role {
                ChannelRole::Reader => self.settings.ssh_key_path.as_ref(),
                ChannelRole::Executor => self.settings.exec_key_path.as_ref(),
            };
            let remediation = format!(
                "ssh-add {}",
                key_path.map_or_else(
                    || format!("/path/to/{}.key", role.name()),
                    |p| p.display().to_string()
                )
            );
            self.audit.security_violation(
                "ssh_agent_key_missing",
                Some(host),
                json!({ "role": role.name(), "username": user, "solution": remediation }),
            );
            return Error::AgentKeyMissing {
                role: role.name().to_string(),
                remediation,
            };
        }

        self.audit.event(
            EventType::SshConnect,
            Status::Failure,
            json!({ "host": host, "username": user, "role": role.name(), "error": message }),
            LogLevel::Error,
        );
        match error {
            e @ (Error::NoAuthMethod(_) | Error::ExecKeyNotConfigured) => e,
            other => Error::Transport {
                host: host.to_string(),
                role: role.name().to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Close every handle in both pools and empty the maps.
    pub async fn close_all(&self) {
        let mut pools = self.pools.lock().await;
        for (_, entry) in pools.reader.drain() {
            entry.handle.close().await;
        }
        for (_, entry) in pools.executor.drain() {
            entry.handle.close().await;
        }
    }

    /// Drop pool entries whose handles are no longer live.
    pub async fn cleanup_closed(&self) {
        let mut pools = self.pools.lock().await;
        pools.reader.retain(|_, entry| !entry.handle.is_closed());
        pools.executor.retain(|_, entry| !entry.handle.is_closed());
    }

    /// Number of pooled entries (both roles), for introspection.
    pub async fn pooled_connections(&self) -> usize {
        let pools = self.pools.lock().await;
        pools.reader.len() + pools.executor.len()
    }
}

fn no_auth_guidance() -> String {
    "Either start an SSH agent and load keys (ssh-add /path/to/key) \
     or set FLEETGATE_SSH_KEY_PATH and FLEETGATE_EXEC_KEY_PATH"
        .to_string()
}

// ---------------------------------------------------------------------------
// openssh-backed connector (production)
// ---------------------------------------------------------------------------

/// Production connector driving the system `ssh` through the `openssh`
/// crate. Agent authentication is ambient (`SSH_AUTH_SOCK`); direct keys
/// are passed as identity files.
pub struct OpensshConnector {
    connect_timeout: Duration,
    keepalive_interval: Duration,
    strict_host_keys: bool,
}

impl OpensshConnector {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            connect_timeout: Duration::from_secs(settings.ssh_connection_timeout),
            keepalive_interval: Duration::from_secs(settings.ssh_keepalive_interval),
            strict_host_keys: settings.strict_host_keys,
        }
    }
}

#[async_trait]
impl Connector for OpensshConnector {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        auth: &AuthMethod,
    ) -> Result<Arc<dyn RemoteHandle>> {
        let mut builder = openssh::SessionBuilder::default();
        builder
            .user(user.to_string())
            .connect_timeout(self.connect_timeout)
            .server_alive_interval(self.keepalive_interval)
            .known_hosts_check(if self.strict_host_keys {
                openssh::KnownHosts::Strict
            } else {
                openssh::KnownHosts::Accept
            });

        if let AuthMethod::Key { path } = auth {
            builder.keyfile(path);
        }

        let session = builder.connect(host).await.map_err(|e| Error::Transport {
            host: host.to_string(),
            role: String::new(),
            message: e.to_string(),
        })?;

        Ok(Arc::new(OpensshHandle {
            session: tokio::sync::Mutex::new(Some(session)),
            closed: AtomicBool::new(false),
        }))
    }
}

struct OpensshHandle {
    session: tokio::sync::Mutex<Option<openssh::Session>>,
    closed: AtomicBool,
}

#[async_trait]
impl RemoteHandle for OpensshHandle {
    async fn run(&self, command: &str) -> Result<ExecOutput> {
        let guard = self.session.lock().await;
        let Some(session) = guard.as_ref() else {
            return Err(Error::Transport {
                host: String::new(),
                role: String::new(),
                message: "session already closed".to_string(),
            });
        };

        match session.shell(command).output().await {
            Ok(output) => Ok(ExecOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Err(e) => {
                // A failed exchange usually means the master went away.
                self.closed.store(true, Ordering::SeqCst);
                Err(Error::Transport {
                    host: String::new(),
                    role: String::new(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(session) = self.session.lock().await.take() {
            let _ = session.close().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Mock connector (tests — zero network I/O)
// ---------------------------------------------------------------------------

/// A scripted [`Connector`] for sandboxed testing.
///
/// Outputs are keyed `"user@host command"`, with a configurable default
/// for everything unscripted. Connect failures are scripted per host.
#[derive(Default)]
pub struct MockConnector {
    /// `"user@host command"` → scripted output.
    pub outputs: HashMap<String, ExecOutput>,
    /// Hosts whose connect attempts fail with the given message.
    pub connect_failures: HashMap<String, String>,
    /// Log of every executed `"user@host command"`.
    pub executed: std::sync::Mutex<Vec<String>>,
    /// Count of connections opened.
    pub connects: std::sync::Mutex<usize>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script an output for `user@host` running `command`.
    pub fn script(&mut self, user: &str, host: &str, command: &str, output: ExecOutput) {
        self.outputs
            .insert(format!("{user}@{host} {command}"), output);
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.executed.lock().expect("mock lock poisoned").clone()
    }

    pub fn connect_count(&self) -> usize {
        *self.connects.lock().expect("mock lock poisoned")
    }
}

#[async_trait]
impl Connector for Arc<MockConnector> {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        _auth: &AuthMethod,
    ) -> Result<Arc<dyn RemoteHandle>> {
        if let Some(message) = self.connect_failures.get(host) {
            return Err(Error::Transport {
                host: host.to_string(),
                role: String::new(),
                message: message.clone(),
            });
        }
        *self.connects.lock().expect("mock lock poisoned") += 1;

        Ok(Arc::new(MockHandle {
            key_prefix: format!("{user}@{host}"),
            parent: Arc::clone(self),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockHandle {
    key_prefix: String,
    parent: Arc<MockConnector>,
    closed: AtomicBool,
}

#[async_trait]
impl RemoteHandle for MockHandle {
    async fn run(&self, command: &str) -> Result<ExecOutput> {
        let key = format!("{} {command}", self.key_prefix);
        self.parent
            .executed
            .lock()
            .expect("mock lock poisoned")
            .push(key.clone());

        Ok(self.parent.outputs.get(&key).cloned().unwrap_or(ExecOutput {
            exit_code: 0,
            stdout: format!("mock output for: {command}"),
            stderr: String::new(),
        }))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MockEnvironment;

    fn settings_with(vars: &[(&str, &str)]) -> Arc<Settings> {
        let mut env = MockEnvironment::default();
        for (k, v) in vars {
            env.env_vars.insert((*k).to_string(), (*v).to_string());
        }
        Arc::new(Settings::from_env(&env).unwrap())
    }

    fn broker(mode: SshAuthMode, connector: Arc<MockConnector>) -> SshBroker {
        broker_with_settings(settings_with(&[("USER", "mcp-reader")]), mode, connector)
    }

    fn broker_with_settings(
        settings: Arc<Settings>,
        mode: SshAuthMode,
        connector: Arc<MockConnector>,
    ) -> SshBroker {
        SshBroker::with_connector(
            settings,
            Arc::new(AuditLog::new(None)),
            mode,
            Box::new(connector),
        )
    }

    #[test]
    fn test_detect_agent_mode() {
        let mut env = MockEnvironment::default();
        env.env_vars
            .insert("SSH_AUTH_SOCK".into(), "/run/agent.sock".into());
        env.existing_paths.insert("/run/agent.sock".into());
        let settings = settings_with(&[]);
        assert_eq!(detect_auth_mode(&settings, &env), SshAuthMode::Agent);
    }

    #[test]
    fn test_detect_agent_requires_live_socket() {
        let mut env = MockEnvironment::default();
        env.env_vars
            .insert("SSH_AUTH_SOCK".into(), "/run/gone.sock".into());
        let settings = settings_with(&[]);
        assert_eq!(detect_auth_mode(&settings, &env), SshAuthMode::None);
    }

    #[test]
    fn test_detect_direct_fallback() {
        let mut env = MockEnvironment::default();
        env.files
            .insert("/etc/keys/reader.key".into(), "---".into());
        let settings = settings_with(&[
            ("FLEETGATE_SSH_KEY_PATH", "/etc/keys/reader.key"),
            ("FLEETGATE_EXEC_KEY_PATH", "/etc/keys/exec.key"),
        ]);
        assert_eq!(detect_auth_mode(&settings, &env), SshAuthMode::Direct);
    }

    #[test]
    fn test_agent_preferred_over_keys_unless_disabled() {
        let mut env = MockEnvironment::default();
        env.env_vars
            .insert("SSH_AUTH_SOCK".into(), "/run/agent.sock".into());
        env.existing_paths.insert("/run/agent.sock".into());
        env.files
            .insert("/etc/keys/reader.key".into(), "---".into());

        let settings = settings_with(&[("FLEETGATE_SSH_KEY_PATH", "/etc/keys/reader.key")]);
        assert_eq!(detect_auth_mode(&settings, &env), SshAuthMode::Agent);

        let settings = settings_with(&[
            ("FLEETGATE_SSH_KEY_PATH", "/etc/keys/reader.key"),
            ("FLEETGATE_DISABLE_SSH_AGENT", "true"),
        ]);
        assert_eq!(detect_auth_mode(&settings, &env), SshAuthMode::Direct);
    }

    #[tokio::test]
    async fn test_execute_read_joins_argv() {
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
        let connector = Arc::new(connector);
        let broker = broker(SshAuthMode::Agent, Arc::clone(&connector));

        let output = broker
            .execute_read(
                "coreos-11",
                &["systemctl".into(), "status".into(), "unbound".into()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "active (running)");
        assert_eq!(
            connector.executed_commands(),
            vec!["mcp-reader@coreos-11 systemctl status unbound"]
        );
    }

    #[tokio::test]
    async fn test_executor_uses_exec_identity() {
        let connector = Arc::new(MockConnector::new());
        let broker = broker(SshAuthMode::Agent, Arc::clone(&connector));

        broker
            .execute_action("coreos-11", "restart_unbound", None)
            .await
            .unwrap();
        assert_eq!(
            connector.executed_commands(),
            vec!["exec-runner@coreos-11 restart_unbound"]
        );
    }

    #[tokio::test]
    async fn test_host_allowlist_blocks_before_connect() {
        let connector = Arc::new(MockConnector::new());
        let settings = settings_with(&[
            ("USER", "mcp-reader"),
            ("FLEETGATE_ALLOWED_HOSTS", "coreos-11"),
        ]);
        let broker = broker_with_settings(settings, SshAuthMode::Agent, Arc::clone(&connector));

        let err = broker
            .execute_read("rogue-host", &["uptime".into()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HostNotAllowed { host } if host == "rogue-host"));
        // No connection was ever opened.
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_connections_are_pooled_per_user_host() {
        let connector = Arc::new(MockConnector::new());
        let broker = broker(SshAuthMode::Agent, Arc::clone(&connector));

        broker
            .execute_read("coreos-11", &["uptime".into()], None)
            .await
            .unwrap();
        broker
            .execute_read("coreos-11", &["free -h".into()], None)
            .await
            .unwrap();
        assert_eq!(connector.connect_count(), 1);

        broker
            .execute_read("coreos-12", &["uptime".into()], None)
            .await
            .unwrap();
        assert_eq!(connector.connect_count(), 2);

        // Reader and executor pools are independent even on one host.
        broker
            .execute_action("coreos-11", "rotate_logs", None)
            .await
            .unwrap();
        assert_eq!(connector.connect_count(), 3);
        assert_eq!(broker.pooled_connections().await, 3);
    }

    #[tokio::test]
    async fn test_none_mode_fails_with_no_auth_method() {
        let connector = Arc::new(MockConnector::new());
        let broker = broker(SshAuthMode::None, connector);

        let err = broker
            .execute_read("coreos-11", &["uptime".into()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoAuthMethod(_)));
    }

    #[tokio::test]
    async fn test_direct_mode_without_exec_key() {
        let connector = Arc::new(MockConnector::new());
        let settings = settings_with(&[
            ("USER", "mcp-reader"),
            ("FLEETGATE_SSH_KEY_PATH", "/etc/keys/reader.key"),
        ]);
        let broker = broker_with_settings(settings, SshAuthMode::Direct, connector);

        let err = broker
            .execute_action("coreos-11", "rotate_logs", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecKeyNotConfigured));
    }

    #[tokio::test]
    async fn test_agent_key_missing_translation() {
        let mut connector = MockConnector::new();
        connector.connect_failures.insert(
            "coreos-11".into(),
            "ssh: Permission denied (publickey).".into(),
        );
        let settings = settings_with(&[
            ("USER", "mcp-reader"),
            ("FLEETGATE_SSH_KEY_PATH", "/etc/keys/reader.key"),
        ]);
        let broker = broker_with_settings(settings, SshAuthMode::Agent, Arc::new(connector));

        let err = broker
            .execute_read("coreos-11", &["uptime".into()], None)
            .await
            .unwrap_err();
        match err {
            Error::AgentKeyMissing { role, remediation } => {
                assert_eq!(role, "reader");
                assert_eq!(remediation, "ssh-add /etc/keys/reader.key");
            }
            other => panic!("expected AgentKeyMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plain_connect_failure_is_transport_error() {
        let mut connector = MockConnector::new();
        connector
            .connect_failures
            .insert("coreos-11".into(), "connection refused".into());
        let broker = broker(SshAuthMode::Agent, Arc::new(connector));

        let err = broker
            .execute_read("coreos-11", &["uptime".into()], None)
            .await
            .unwrap_err();
        match err {
            Error::Transport { host, role, message } => {
                assert_eq!(host, "coreos-11");
                assert_eq!(role, "reader");
                assert!(message.contains("connection refused"));
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_all_empties_pools() {
        let connector = Arc::new(MockConnector::new());
        let broker = broker(SshAuthMode::Agent, Arc::clone(&connector));

        broker
            .execute_read("coreos-11", &["uptime".into()], None)
            .await
            .unwrap();
        broker
            .execute_action("coreos-11", "rotate_logs", None)
            .await
            .unwrap();
        assert_eq!(broker.pooled_connections().await, 2);

        broker.close_all().await;
        assert_eq!(broker.pooled_connections().await, 0);
    }

    #[tokio::test]
    async fn test_pool_eviction_at_capacity() {
        let connector = Arc::new(MockConnector::new());
        let settings = settings_with(&[
            ("USER", "mcp-reader"),
            ("FLEETGATE_SSH_MAX_CONNECTIONS", "2"),
        ]);
        let broker = broker_with_settings(settings, SshAuthMode::Agent, Arc::clone(&connector));

        for host in ["h1", "h2", "h3"] {
            broker
                .execute_read(host, &["uptime".into()], None)
                .await
                .unwrap();
        }
        // Bound is advisory per role: the reader pool stays at 2.
        assert_eq!(broker.pooled_connections().await, 2);
    }
}
