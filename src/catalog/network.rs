//! Network plugin — connectivity, routing, and DNS diagnostics.

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
        "network",
        "network",
        "Network connectivity, routing, and diagnostic tools",
    )
    .command(
        "ping",
        readonly(
            r"^ping(\s[^|;&>]*)?$",
            "Network connectivity test",
            "ICMP echo test for network reachability",
        )
        .with_examples(&["ping -c 4 8.8.8.8", "ping -I eth0 192.168.1.1"])
        .with_flags(&["-c COUNT: Number of packets", "-I INTERFACE: Source interface"]),
    )
    .command(
        "traceroute",
        readonly(
            r"^traceroute(\s[^|;&>]*)?$",
            "Network path tracing",
            "Trace network hops to destination",
        ),
    )
    .command(
        "netstat",
        readonly(
            r"^netstat(\s[^|;&>]*)?$",
            "Network connections status",
            "Display active network connections and routing",
        )
        .with_examples(&["netstat -tuln", "netstat -r"]),
    )
    .command(
        "ss",
        readonly(
            r"^ss(\s[^|;&>]*)?$",
            "Socket statistics",
            "Modern alternative to netstat for socket info",
        )
        .with_examples(&["ss -tuln", "ss -anp"]),
    )
    .command(
        "ip addr",
        readonly(
            r"^ip\s+addr(\s[^|;&>]*)?$",
            "Show IP addresses",
            "Display interface IP configuration",
        ),
    )
    .command(
        "ip route",
        readonly(
            r"^ip\s+route(\s[^|;&>]*)?$",
            "Show routing table",
            "Display kernel routing entries",
        ),
    )
    .command(
        "ip link",
        readonly(
            r"^ip\s+link(\s[^|;&>]*)?$",
            "Show network links",
            "Display link-layer device state",
        ),
    )
    .command(
        "dig",
        readonly(
            r"^dig(\s[^|;&>]*)?$",
            "DNS lookup",
            "Query DNS servers for records",
        )
        .with_examples(&["dig example.com", "dig @9.9.9.9 example.com MX"]),
    )
    .command(
        "nslookup",
        readonly(
            r"^nslookup(\s[^|;&>]*)?$",
            "DNS lookup (legacy)",
            "Query DNS servers interactively",
        ),
    )
    .command(
        "host",
        readonly(
            r"^host(\s[^|;&>]*)?$",
            "DNS lookup (simple)",
            "Resolve hostnames and addresses",
        ),
    )
    .command(
        "curl",
        readonly(
            r"^curl(\s[^|;&>]*)?$",
            "HTTP client",
            "Fetch a URL; used here for endpoint health probes",
        )
        .with_flags(&["-I: Headers only", "-s: Silent", "-o FILE: Write output (caught by the write-pattern denylist)"]),
    )
    .command(
        "mtr",
        readonly(
            r"^mtr(\s[^|;&>]*)?$",
            "Combined traceroute and ping",
            "Continuous path quality measurement",
        ),
    )
    .command(
        "wget",
        CommandSpec::builtin(
            r"^wget(\s[^|;&>]*)?$",
            RiskLevel::Medium,
            AuthLevel::Manual,
            SshRole::Executor,
            "Download files",
            "Writes downloaded content to disk",
        ),
    )
    .command(
        "tcpdump",
        CommandSpec::builtin(
            r"^tcpdump(\s[^|;&>]*)?$",
            RiskLevel::High,
            AuthLevel::Manual,
            SshRole::Executor,
            "Packet capture",
            "Captures traffic, may expose payload contents",
        )
        .with_flags(&["-i IFACE: Capture interface", "-w FILE: Write capture file"]),
    )
}
