//! Read-only diagnostic wrappers.
//!
//! Thin composition layer over the reader channel: each helper builds a
//! fixed command line and returns the remote output as formatted text.
//! Nothing here can change remote state; log file reads are additionally
//! gated by the configured path allowlist.

use std::sync::Arc;

use regex::Regex;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::transport::{ExecOutput, SshBroker};

/// Filters for journal queries.
#[derive(Debug, Clone, Default)]
pub struct JournalFilter {
    pub lines: Option<u32>,
    pub priority: Option<String>,
    pub since: Option<String>,
    pub unit: Option<String>,
}

pub struct Diagnostics {
    settings: Arc<Settings>,
    broker: Arc<SshBroker>,
}

impl Diagnostics {
    #[must_use]
    pub fn new(settings: Arc<Settings>, broker: Arc<SshBroker>) -> Self {
        Self { settings, broker }
    }

    async fn read(&self, host: &str, argv: &[&str]) -> Result<ExecOutput> {
        let argv: Vec<String> = argv.iter().map(|s| (*s).to_string()).collect();
        self.broker.execute_read(host, &argv, None).await
    }

    async fn read_section(&self, host: &str, label: &str, argv: &[&str]) -> Result<String> {
        let output = self.read(host, argv).await?;
        if output.success() {
            Ok(format!("## {label}\n{}\n", output.stdout.trim_end()))
        } else {
            Ok(format!("## {label}\nError: {}\n", output.stderr.trim_end()))
        }
    }

    /// OS, kernel, uptime, load, and hostname.
    pub async fn system_info(&self, host: &str) -> Result<String> {
        let sections: [(&str, &[&str]); 5] = [
            ("OS", &["cat", "/etc/os-release"]),
            ("Kernel", &["uname", "-a"]),
            ("Uptime", &["uptime"]),
            ("Load", &["cat", "/proc/loadavg"]),
            ("Hostname", &["hostname", "-f"]),
        ];
        let mut parts = Vec::new();
        for (label, argv) in sections {
            parts.push(self.read_section(host, label, argv).await?);
        }
        Ok(parts.join("\n"))
    }

    /// CPU model, core count, and load.
    pub async fn cpu_info(&self, host: &str) -> Result<String> {
        let cpuinfo = self.read(host, &["cat", "/proc/cpuinfo"]).await?;
        if !cpuinfo.success() {
            return Ok(format!("Error reading CPU info: {}", cpuinfo.stderr));
        }

        let model = cpuinfo
            .stdout
            .lines()
            .find(|line| line.starts_with("model name"))
            .and_then(|line| line.split_once(':'))
            .map_or("Unknown", |(_, v)| v.trim());
        let cores = cpuinfo
            .stdout
            .lines()
            .filter(|line| line.starts_with("processor"))
            .count();

        let load = self.read(host, &["cat", "/proc/loadavg"]).await?;
        let load = if load.success() {
            load.stdout.trim().to_string()
        } else {
            "Unknown".to_string()
        };

        Ok(format!(
            "## CPU Information\n\nModel: {model}\nCores: {cores}\nLoad Average: {load}\n"
        ))
    }

    /// RAM and swap usage.
    pub async fn memory_info(&self, host: &str) -> Result<String> {
        self.read_section(host, "Memory Information", &["free", "-h"])
            .await
    }

    /// Disk usage for real filesystems.
    pub async fn disk_usage(&self, host: &str) -> Result<String> {
        self.read_section(
            host,
            "Disk Usage",
            &["df", "-h", "-x", "tmpfs", "-x", "devtmpfs"],
        )
        .await
    }

    /// Block devices with sizes and mount points.
    pub async fn block_devices(&self, host: &str) -> Result<String> {
        self.read_section(
            host,
            "Block Devices",
            &["lsblk", "-o", "NAME,SIZE,TYPE,MOUNTPOINT,FSTYPE"],
        )
        .await
    }

    /// All systemd services and their states.
    pub async fn list_services(&self, host: &str) -> Result<String> {
        self.read_section(
            host,
            "Systemd Services",
            &[
                "systemctl",
                "list-units",
                "--type=service",
                "--all",
                "--no-pager",
            ],
        )
        .await
    }

    /// Detailed status of one service. `systemctl status` exits non-zero
    /// for inactive units, so both streams are reported as-is.
    pub async fn service_status(&self, host: &str, service: &str) -> Result<String> {
        let unit = ensure_service_suffix(service);
        let output = self
            .read(host, &["systemctl", "status", unit.as_str(), "--no-pager", "-l"])
            .await?;
        let mut report = format!("## Service Status: {unit}\n\n{}\n", output.stdout.trim_end());
        if !output.stderr.is_empty() {
            report.push_str(&format!("\nStderr: {}\n", output.stderr.trim_end()));
        }
        Ok(report)
    }

    /// Recent journal lines for one service.
    pub async fn service_logs(&self, host: &str, service: &str, lines: Option<u32>) -> Result<String> {
        let unit = ensure_service_suffix(service);
        let lines = lines.unwrap_or(self.settings.default_log_lines).to_string();
        self.read_section(
            host,
            &format!("Recent Logs: {unit} (last {lines} lines)"),
            &["journalctl", "-u", unit.as_str(), "-n", lines.as_str(), "--no-pager"],
        )
        .await
    }

    /// Health report: unit state, PID, memory, and recent errors.
    pub async fn service_health(&self, host: &str, service: &str) -> Result<String> {
        let unit = ensure_service_suffix(service);
        let show = self
            .read(
                host,
                &[
                    "systemctl",
                    "show",
                    unit.as_str(),
                    "--property=ActiveState,SubState,ExecMainPID,MemoryCurrent,LoadState",
                ],
            )
            .await?;

        let prop = |name: &str| -> String {
            show.stdout
                .lines()
                .find_map(|line| line.strip_prefix(&format!("{name}=")))
                .unwrap_or("unknown")
                .to_string()
        };
        let active_state = prop("ActiveState");
        let healthy = if active_state == "active" {
            "HEALTHY"
        } else {
            "UNHEALTHY"
        };

        let errors = self
            .read(
                host,
                &["journalctl", "-u", unit.as_str(), "-p", "err", "-n", "20", "--no-pager"],
            )
            .await
            .map_or_else(
                |_| "Unable to fetch errors".to_string(),
                |out| out.stdout.trim_end().to_string(),
            );

        Ok(format!(
            "## Health Check: {unit}\n\n\
             Status: {healthy}\n\n\
             - Load State: {}\n\
             - Active State: {active_state}\n\
             - Sub State: {}\n\
             - PID: {}\n\
             - Memory: {}\n\n\
             Recent errors (last 20):\n{errors}\n",
            prop("LoadState"),
            prop("SubState"),
            prop("ExecMainPID"),
            prop("MemoryCurrent"),
        ))
    }

    /// Interface configuration.
    pub async fn network_interfaces(&self, host: &str) -> Result<String> {
        self.read_section(host, "Network Interfaces", &["ip", "addr", "show"])
            .await
    }

    /// Kernel routing table.
    pub async fn routing_table(&self, host: &str) -> Result<String> {
        self.read_section(host, "Routing Table", &["ip", "route", "show"])
            .await
    }

    /// Listening TCP/UDP sockets with owning processes.
    pub async fn listening_ports(&self, host: &str) -> Result<String> {
        self.read_section(host, "Listening Ports", &["ss", "-lntup"])
            .await
    }

    /// Established connections.
    pub async fn active_connections(&self, host: &str) -> Result<String> {
        self.read_section(host, "Active Connections", &["ss", "-ntup", "state", "established"])
            .await
    }

    /// Resolver configuration.
    pub async fn dns_config(&self, host: &str) -> Result<String> {
        self.read_section(host, "DNS Configuration", &["cat", "/etc/resolv.conf"])
            .await
    }

    /// ICMP reachability probe from `host` towards `target`.
    pub async fn ping(&self, host: &str, target: &str, count: u32) -> Result<String> {
        let count = count.to_string();
        self.read_section(
            host,
            &format!("Ping: {target}"),
            &["ping", "-c", count.as_str(), "-W", "2", target],
        )
        .await
    }

    /// Journal lines with optional priority/time/unit filters.
    pub async fn journal_logs(&self, host: &str, filter: &JournalFilter) -> Result<String> {
        let lines = filter
            .lines
            .unwrap_or(self.settings.default_log_lines)
            .to_string();
        let mut argv: Vec<&str> = vec!["journalctl", "-n", lines.as_str(), "--no-pager"];
        if let Some(priority) = &filter.priority {
            argv.extend(["-p", priority.as_str()]);
        }
        if let Some(since) = &filter.since {
            argv.extend(["--since", since.as_str()]);
        }
        if let Some(unit) = &filter.unit {
            argv.extend(["-u", unit.as_str()]);
        }
        self.read_section(host, "Journal Logs", &argv).await
    }

    /// Tail a log file. The path must match the configured allowlist glob.
    pub async fn read_log_file(&self, host: &str, path: &str, lines: Option<u32>) -> Result<String> {
        if !self.path_allowed(path) {
            return Err(Error::Policy(format!(
                "log path '{path}' is outside the allowed pattern '{}'",
                self.settings.allowed_log_paths
            )));
        }
        let lines = lines.unwrap_or(self.settings.default_log_lines).to_string();
        self.read_section(
            host,
            &format!("Log File: {path} (last {lines} lines)"),
            &["tail", "-n", lines.as_str(), path],
        )
        .await
    }

    /// Search a log file (or the journal when no path is given).
    pub async fn search_logs(
        &self,
        host: &str,
        pattern: &str,
        log_path: Option<&str>,
        lines: u32,
        context: u32,
    ) -> Result<String> {
        match log_path {
            Some(path) => {
                if !self.path_allowed(path) {
                    return Err(Error::Policy(format!(
                        "log path '{path}' is outside the allowed pattern '{}'",
                        self.settings.allowed_log_paths
                    )));
                }
                let context_flag = format!("-C{context}");
                let output = self
                    .read(host, &["grep", "-E", "-n", "-i", context_flag.as_str(), pattern, path])
                    .await?;
                // grep exits 1 for "no matches", which is not a failure.
                match output.exit_code {
                    0 => Ok(format!(
                        "## Search Results in {path}\n\nPattern: {pattern}\n\n{}",
                        output.stdout.trim_end()
                    )),
                    1 => Ok(format!("No matches for pattern '{pattern}' in {path}")),
                    _ => Ok(format!("Error searching {path}: {}", output.stderr.trim_end())),
                }
            }
            None => {
                let lines = lines.to_string();
                self.read_section(
                    host,
                    &format!("Journal Search: {pattern}"),
                    &["journalctl", "-g", pattern, "-n", lines.as_str(), "--no-pager"],
                )
                .await
            }
        }
    }

    /// Error-priority journal summary for a service or system-wide.
    pub async fn analyze_errors(
        &self,
        host: &str,
        service: Option<&str>,
        since: &str,
    ) -> Result<String> {
        let mut argv: Vec<&str> = vec!["journalctl", "-p", "err", "--since", since, "--no-pager"];
        let unit;
        if let Some(service) = service {
            unit = ensure_service_suffix(service);
            argv.extend(["-u", unit.as_str()]);
        }

        let output = self.read(host, &argv).await?;
        if !output.success() {
            return Ok(format!("Error analyzing errors: {}", output.stderr.trim_end()));
        }

        let error_count = output.stdout.lines().filter(|l| !l.trim().is_empty()).count();
        let scope = service.map_or_else(|| "system-wide".to_string(), |s| format!("service {s}"));
        let body = if error_count > 0 {
            output.stdout.trim_end().to_string()
        } else {
            "No errors found in this time window.".to_string()
        };

        Ok(format!(
            "## Error Analysis ({scope})\n\nTime window: {since}\nTotal error lines: {error_count}\n\n{body}\n"
        ))
    }

    /// Whether a remote path is covered by the allowlist glob.
    fn path_allowed(&self, path: &str) -> bool {
        glob_to_regex(&self.settings.allowed_log_paths)
            .map(|re| re.is_match(path))
            .unwrap_or(false)
    }
}

fn ensure_service_suffix(service: &str) -> String {
    if service.ends_with(".service") {
        service.to_string()
    } else {
        format!("{service}.service")
    }
}

/// Translate a simple `*` glob into an anchored regex. `*` crosses path
/// separators, matching the original allowlist semantics.
fn glob_to_regex(glob: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    for (i, part) in glob.split('*').enumerate() {
        if i > 0 {
            pattern.push_str(".*");
        }
        pattern.push_str(&regex::escape(part));
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}
