//! POSIX process plugin — process inspection and signalling.

use super::{CommandPlugin, CommandSpec};
use crate::authorize::{AuthLevel, SshRole};
use crate::classify::RiskLevel;

fn readonly(pattern: &str, description: &str, rationale: &str) -> CommandSpec {
    CommandSpec::builtin(
        pattern,
        RiskLevel::Low,
        AuthLevel::Auto,
        SshRole::Reader,
        description,
        rationale,
    )
}

pub(super) fn plugin() -> CommandPlugin {
    CommandPlugin::new(
        "posix-process",
        "process",
        "Process inspection and signalling",
    )
    .command(
        "ps",
        readonly(
            r"^ps(\s[^|;&>]*)?$",
            "Process status",
            "Read-only process listing",
        )
        .with_examples(&["ps aux", "ps -ef --forest"]),
    )
    .command(
        "pgrep",
        readonly(
            r"^pgrep(\s[^|;&>]*)?$",
            "Find processes by name",
            "Read-only process search",
        ),
    )
    .command(
        "pstree",
        readonly(
            r"^pstree(\s[^|;&>]*)?$",
            "Process tree",
            "Read-only hierarchy view",
        ),
    )
    .command(
        "pidof",
        readonly(
            r"^pidof(\s[^|;&>]*)?$",
            "PID of a named program",
            "Read-only process lookup",
        ),
    )
    .command(
        "lsof",
        readonly(
            r"^lsof(\s[^|;&>]*)?$",
            "Open files and sockets",
            "Read-only descriptor listing",
        ),
    )
    .command(
        "fuser",
        readonly(
            r"^fuser(\s[^|;&>]*)?$",
            "Processes using a file",
            "Read-only by default; -k sends signals and is caught by the denylist layer",
        ),
    )
    .command(
        "timeout",
        readonly(
            r"^timeout(\s[^|;&>]*)?$",
            "Run with a time limit",
            "Wrapper only; the wrapped command is classified separately",
        ),
    )
    .command(
        "time",
        readonly(
            r"^time(\s[^|;&>]*)?$",
            "Measure command duration",
            "Wrapper only; the wrapped command is classified separately",
        ),
    )
    .command(
        "watch",
        readonly(
            r"^watch(\s[^|;&>]*)?$",
            "Repeat a command periodically",
            "Wrapper only; the wrapped command is classified separately",
        ),
    )
    .command(
        "kill",
        CommandSpec::builtin(
            r"^kill(\s[^|;&>]*)?$",
            RiskLevel::High,
            AuthLevel::Manual,
            SshRole::Executor,
            "Signal a process",
            "Can terminate critical services",
        ),
    )
    .command(
        "killall",
        CommandSpec::builtin(
            r"^killall(\s[^|;&>]*)?$",
            RiskLevel::High,
            AuthLevel::Manual,
            SshRole::Executor,
            "Signal processes by name",
            "Can terminate whole service groups",
        ),
    )
    .command(
        "pkill",
        CommandSpec::builtin(
            r"^pkill(\s[^|;&>]*)?$",
            RiskLevel::High,
            AuthLevel::Manual,
            SshRole::Executor,
            "Signal processes by pattern",
            "Pattern matching can hit unintended processes",
        ),
    )
    .command(
        "nice",
        CommandSpec::builtin(
            r"^nice(\s[^|;&>]*)?$",
            RiskLevel::Medium,
            AuthLevel::Manual,
            SshRole::Executor,
            "Run with adjusted priority",
            "Launches an arbitrary command",
        ),
    )
    .command(
        "renice",
        CommandSpec::builtin(
            r"^renice(\s[^|;&>]*)?$",
            RiskLevel::Medium,
            AuthLevel::Manual,
            SshRole::Executor,
            "Change running process priority",
            "Alters scheduler behavior of live processes",
        ),
    )
    .command(
        "nohup",
        CommandSpec::builtin(
            r"^nohup(\s[^|;&>]*)?$",
            RiskLevel::Medium,
            AuthLevel::Manual,
            SshRole::Executor,
            "Run detached from the terminal",
            "Launches an arbitrary long-lived command",
        ),
    )
    .command(
        "strace",
        CommandSpec::builtin(
            r"^strace(\s[^|;&>]*)?$",
            RiskLevel::Medium,
            AuthLevel::Manual,
            SshRole::Executor,
            "Trace system calls",
            "Attaches to processes; can slow or destabilize them",
        ),
    )
}
