//! Systemd plugin — unit inspection and controlled service state changes.

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

fn state_change(pattern: &str, description: &str, rationale: &str) -> CommandSpec {
    CommandSpec::builtin(
        pattern,
        RiskLevel::Medium,
        AuthLevel::Manual,
        SshRole::Executor,
        description,
        rationale,
    )
}

pub(super) fn plugin() -> CommandPlugin {
    CommandPlugin::new(
        "systemd",
        "services",
        "Systemd unit inspection and service state management",
    )
    .command(
        "systemctl status",
        readonly(
            r"^systemctl\s+status(\s[^|;&>]*)?$",
            "Show unit status",
            "Read-only unit state and recent log excerpt",
        )
        .with_examples(&["systemctl status unbound", "systemctl status nginx --no-pager"]),
    )
    .command(
        "systemctl list-units",
        readonly(
            r"^systemctl\s+list-units(\s[^|;&>]*)?$",
            "List loaded units",
            "Read-only unit inventory",
        ),
    )
    .command(
        "systemctl list-unit-files",
        readonly(
            r"^systemctl\s+list-unit-files(\s[^|;&>]*)?$",
            "List installed unit files",
            "Read-only unit file inventory",
        ),
    )
    .command(
        "systemctl show",
        readonly(
            r"^systemctl\s+show(\s[^|;&>]*)?$",
            "Show unit properties",
            "Read-only property dump",
        ),
    )
    .command(
        "systemctl is-active",
        readonly(
            r"^systemctl\s+is-active(\s[^|;&>]*)?$",
            "Probe unit activity",
            "Read-only state probe",
        ),
    )
    .command(
        "systemctl is-enabled",
        readonly(
            r"^systemctl\s+is-enabled(\s[^|;&>]*)?$",
            "Probe unit boot state",
            "Read-only state probe",
        ),
    )
    .command(
        "systemctl cat",
        readonly(
            r"^systemctl\s+cat(\s[^|;&>]*)?$",
            "Print unit file",
            "Read-only unit file dump",
        ),
    )
    .command(
        "systemctl list-dependencies",
        readonly(
            r"^systemctl\s+list-dependencies(\s[^|;&>]*)?$",
            "Show unit dependency tree",
            "Read-only dependency info",
        ),
    )
    .command(
        "journalctl",
        readonly(
            r"^journalctl(\s[^|;&>]*)?$",
            "Read the systemd journal",
            "Read-only log access",
        )
        .with_examples(&["journalctl -u unbound -n 100", "journalctl -p err --since -1h"])
        .with_flags(&["-u UNIT: Filter by unit", "-p PRIO: Filter by priority", "--since TIME: Time window"]),
    )
    .command(
        "systemctl restart",
        state_change(
            r"^systemctl\s+restart(\s[^|;&>]*)?$",
            "Restart a unit",
            "Interrupts the service; requires approval",
        ),
    )
    .command(
        "systemctl reload",
        state_change(
            r"^systemctl\s+reload(\s[^|;&>]*)?$",
            "Reload unit configuration",
            "Applies new configuration; requires approval",
        ),
    )
    .command(
        "systemctl start",
        state_change(
            r"^systemctl\s+start(\s[^|;&>]*)?$",
            "Start a unit",
            "Changes system state; requires approval",
        ),
    )
    .command(
        "systemctl stop",
        state_change(
            r"^systemctl\s+stop(\s[^|;&>]*)?$",
            "Stop a unit",
            "Interrupts the service; requires approval",
        ),
    )
    .command(
        "systemctl enable",
        state_change(
            r"^systemctl\s+enable(\s[^|;&>]*)?$",
            "Enable a unit at boot",
            "Persistent boot configuration change",
        ),
    )
    .command(
        "systemctl disable",
        state_change(
            r"^systemctl\s+disable(\s[^|;&>]*)?$",
            "Disable a unit at boot",
            "Persistent boot configuration change",
        ),
    )
}
