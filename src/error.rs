//! Typed error types for fleetgate.

/// All errors produced by the fleetgate library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Unparseable settings or invalid paths. Fatal during startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown action names, unknown approval ids, state-transition
    /// violations. Surfaced to callers as structured denials.
    #[error("policy error: {0}")]
    Policy(String),

    /// No SSH authentication method is available at all.
    #[error("no SSH authentication method available. {0}")]
    NoAuthMethod(String),

    /// The SSH agent is active but does not hold the key for this role.
    /// `remediation` is the exact command that loads the missing key.
    #[error("SSH agent has no identity for the {role} role. Fix: {remediation}")]
    AgentKeyMissing { role: String, remediation: String },

    /// Direct-key mode without an executor private key configured.
    #[error("executor key not configured; set FLEETGATE_EXEC_KEY_PATH or load the key into the SSH agent")]
    ExecKeyNotConfigured,

    /// Dispatch was attempted against a host outside the allowlist.
    #[error("host '{host}' is not in the allowed hosts list")]
    HostNotAllowed { host: String },

    /// Connect, channel, or remote I/O failure, with host and role context.
    #[error("transport failure on {host} ({role}): {message}")]
    Transport {
        host: String,
        role: String,
        message: String,
    },

    /// Learning-stats file problems. Always downgraded to a warning by the
    /// collector; this variant only exists for internal propagation.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("{0}")]
    Mcp(String),
}

/// A `Result` alias where the error type is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error should additionally be reported to the audit sink
    /// as a security event.
    #[must_use]
    pub const fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::NoAuthMethod(_)
                | Self::AgentKeyMissing { .. }
                | Self::ExecKeyNotConfigured
                | Self::HostNotAllowed { .. }
        )
    }
}
