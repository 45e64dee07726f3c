//! Containers plugin — podman/docker inspection and lifecycle control.

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
        "containers",
        "containers",
        "Container runtime inspection and lifecycle management (podman/docker)",
    )
    .command(
        "ps",
        readonly(
            r"^(podman|docker)\s+ps(\s[^|;&>]*)?$",
            "List containers",
            "Read-only container inventory",
        )
        .with_examples(&["podman ps -a", "docker ps --format '{{.Names}}'"]),
    )
    .command(
        "inspect",
        readonly(
            r"^(podman|docker)\s+inspect(\s[^|;&>]*)?$",
            "Inspect container or image",
            "Read-only configuration dump",
        ),
    )
    .command(
        "logs",
        readonly(
            r"^(podman|docker)\s+logs(\s[^|;&>]*)?$",
            "Read container logs",
            "Read-only log access",
        )
        .with_flags(&["--tail N: Last N lines", "-f: Follow output"]),
    )
    .command(
        "images",
        readonly(
            r"^(podman|docker)\s+images(\s[^|;&>]*)?$",
            "List images",
            "Read-only image inventory",
        ),
    )
    .command(
        "stats",
        readonly(
            r"^(podman|docker)\s+stats(\s[^|;&>]*)?$",
            "Container resource usage",
            "Read-only resource monitoring",
        ),
    )
    .command(
        "top",
        readonly(
            r"^(podman|docker)\s+top(\s[^|;&>]*)?$",
            "Processes inside a container",
            "Read-only process listing",
        ),
    )
    .command(
        "restart",
        CommandSpec::builtin(
            r"^(podman|docker)\s+restart(\s[^|;&>]*)?$",
            RiskLevel::Medium,
            AuthLevel::Manual,
            SshRole::Executor,
            "Restart container",
            "Interrupts the containerized service",
        ),
    )
    .command(
        "start",
        CommandSpec::builtin(
            r"^(podman|docker)\s+start(\s[^|;&>]*)?$",
            RiskLevel::Medium,
            AuthLevel::Manual,
            SshRole::Executor,
            "Start container",
            "Changes runtime state",
        ),
    )
    .command(
        "stop",
        CommandSpec::builtin(
            r"^(podman|docker)\s+stop(\s[^|;&>]*)?$",
            RiskLevel::Medium,
            AuthLevel::Manual,
            SshRole::Executor,
            "Stop container",
            "Interrupts the containerized service",
        ),
    )
    .command(
        "rm",
        CommandSpec::builtin(
            r"^(podman|docker)\s+rm(\s[^|;&>]*)?$",
            RiskLevel::High,
            AuthLevel::Manual,
            SshRole::Executor,
            "Remove container",
            "Destroys container state; volumes may be lost with -v",
        ),
    )
}
