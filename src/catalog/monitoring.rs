//! Monitoring plugin — process, CPU, memory, and I/O monitoring tools.
//!
//! Everything here is read-only and safe for continuous observation.

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
        "monitoring",
        "monitoring",
        "Process, CPU, memory, and I/O monitoring tools (read-only)",
    )
    .command(
        "htop",
        readonly(
            r"^htop(\s[^|;&>]*)?$",
            "Interactive process viewer",
            "Read-only process monitoring with CPU/memory stats",
        )
        .with_examples(&["htop", "htop -u www-data", "htop -p 1234"])
        .with_flags(&["-u USER: Filter by user", "-p PID: Show specific process", "-t: Tree view"]),
    )
    .command(
        "top",
        readonly(
            r"^top(\s[^|;&>]*)?$",
            "Process monitor",
            "Standard read-only process viewer",
        )
        .with_examples(&["top", "top -b -n 1", "top -u nginx"])
        .with_flags(&["-b: Batch mode", "-n NUM: Number of iterations"]),
    )
    .command(
        "iotop",
        readonly(
            r"^iotop(\s[^|;&>]*)?$",
            "I/O monitoring by process",
            "Read-only disk I/O monitoring",
        )
        .with_examples(&["iotop -b -n 1", "iotop -o"]),
    )
    .command(
        "iftop",
        readonly(
            r"^iftop(\s[^|;&>]*)?$",
            "Network bandwidth monitor",
            "Read-only network interface traffic monitoring",
        )
        .with_flags(&["-i IFACE: Monitor specific interface", "-n: No DNS resolution"]),
    )
    .command(
        "nethogs",
        readonly(
            r"^nethogs(\s[^|;&>]*)?$",
            "Network traffic monitor per process",
            "Read-only per-process network bandwidth monitoring",
        ),
    )
    .command(
        "atop",
        readonly(
            r"^atop(\s[^|;&>]*)?$",
            "Advanced system monitor",
            "Read-only comprehensive system and process monitoring",
        ),
    )
    .command(
        "vmstat",
        readonly(
            r"^vmstat(\s[^|;&>]*)?$",
            "Virtual memory statistics",
            "Read-only memory, swap, and CPU stats",
        )
        .with_examples(&["vmstat 1 10", "vmstat -s"]),
    )
    .command(
        "iostat",
        readonly(
            r"^iostat(\s[^|;&>]*)?$",
            "I/O statistics",
            "Read-only CPU and I/O device statistics",
        )
        .with_examples(&["iostat -x 1", "iostat -p sda"]),
    )
    .command(
        "mpstat",
        readonly(
            r"^mpstat(\s[^|;&>]*)?$",
            "Per-CPU statistics",
            "Read-only per-processor statistics",
        ),
    )
    .command(
        "glances",
        readonly(
            r"^glances(\s[^|;&>]*)?$",
            "All-in-one system monitor",
            "Read-only comprehensive monitoring dashboard",
        ),
    )
}
