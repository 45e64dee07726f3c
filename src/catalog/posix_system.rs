//! POSIX system plugin — identity, environment, and shell built-in probes.

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
    let entries: &[(&str, &str, &str, &str)] = &[
        ("uname", r"^uname(\s[^|;&>]*)?$", "Kernel and system information", "Read-only system identity"),
        ("hostname", r"^hostname(\s[^|;&>]*)?$", "Show hostname", "Read-only system identity"),
        ("uptime", r"^uptime(\s[^|;&>]*)?$", "System uptime and load", "Read-only system info"),
        ("who", r"^who(\s[^|;&>]*)?$", "Logged-in users", "Read-only session info"),
        ("w", r"^w(\s[^|;&>]*)?$", "Logged-in users with activity", "Read-only session info"),
        ("whoami", r"^whoami(\s[^|;&>]*)?$", "Effective user name", "Read-only identity probe"),
        ("id", r"^id(\s[^|;&>]*)?$", "User and group ids", "Read-only identity probe"),
        ("date", r"^date(\s[^|;&>]*)?$", "System date and time", "Read-only clock probe; setting the clock needs arguments the denylist rejects"),
        ("env", r"^env$", "Show environment", "Read-only environment dump without a command operand"),
        ("printenv", r"^printenv(\s[^|;&>]*)?$", "Show environment variables", "Read-only environment dump"),
        ("echo", r"^echo(\s[^|;&>]*)?$", "Print arguments", "Pure output; redirection misuse is caught by the denylist layer"),
        ("printf", r"^printf(\s[^|;&>]*)?$", "Formatted print", "Pure output"),
        ("pwd", r"^pwd(\s[^|;&>]*)?$", "Working directory", "Read-only path probe"),
        ("which", r"^which(\s[^|;&>]*)?$", "Locate a command", "Read-only path search"),
        ("whereis", r"^whereis(\s[^|;&>]*)?$", "Locate binaries and manuals", "Read-only path search"),
        ("type", r"^type(\s[^|;&>]*)?$", "Describe a command name", "Read-only shell lookup"),
        ("sleep", r"^sleep(\s[^|;&>]*)?$", "Delay", "No side effects"),
        ("true", r"^true$", "Succeed", "No side effects"),
        ("false", r"^false$", "Fail", "No side effects"),
        ("test", r"^test(\s[^|;&>]*)?$", "Evaluate an expression", "Read-only condition check"),
        ("basename", r"^basename(\s[^|;&>]*)?$", "Strip directory from a path", "Pure string operation"),
        ("dirname", r"^dirname(\s[^|;&>]*)?$", "Directory part of a path", "Pure string operation"),
        ("expr", r"^expr(\s[^|;&>]*)?$", "Evaluate an expression", "Pure computation"),
    ];

    let mut plugin = CommandPlugin::new(
        "posix-system",
        "system",
        "POSIX system identity and environment probes (read-only)",
    );
    for (key, pattern, description, rationale) in entries {
        plugin = plugin.command(key, readonly(pattern, description, rationale));
    }
    plugin
}
