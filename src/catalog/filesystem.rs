//! Filesystem plugin — read-only inspection of files and directories.

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
        "filesystem",
        "filesystem",
        "File and directory inspection tools (read-only)",
    )
    .command(
        "ls",
        readonly(
            r"^ls(\s[^|;&>]*)?$",
            "List directory contents",
            "Read-only directory listing",
        )
        .with_examples(&["ls -la /etc", "ls -lh /var/log"]),
    )
    .command(
        "cat",
        readonly(
            r"^cat(\s[^|;&>]*)?$",
            "Print file contents",
            "Read-only file dump",
        ),
    )
    .command(
        "head",
        readonly(
            r"^head(\s[^|;&>]*)?$",
            "Show file beginning",
            "Read-only partial file view",
        ),
    )
    .command(
        "tail",
        readonly(
            r"^tail(\s[^|;&>]*)?$",
            "Show file end",
            "Read-only partial file view; -f follows growth",
        ),
    )
    .command(
        "less",
        readonly(r"^less(\s[^|;&>]*)?$", "File pager", "Read-only file viewer"),
    )
    .command(
        "more",
        readonly(r"^more(\s[^|;&>]*)?$", "File pager (simple)", "Read-only file viewer"),
    )
    .command(
        "grep",
        readonly(
            r"^grep(\s[^|;&>]*)?$",
            "Text search",
            "Read-only pattern search over files",
        )
        .with_examples(&["grep -r 'error' /var/log/nginx", "grep -c failed auth.log"]),
    )
    .command(
        "find",
        readonly(
            r"^find(\s[^|;&>]*)?$",
            "File search",
            "Read-only tree walk; -delete/-exec misuse is caught by the denylist layer",
        ),
    )
    .command(
        "du",
        readonly(r"^du(\s[^|;&>]*)?$", "Directory disk usage", "Read-only size accounting"),
    )
    .command(
        "df",
        readonly(r"^df(\s[^|;&>]*)?$", "Filesystem usage", "Read-only mount point stats"),
    )
    .command(
        "file",
        readonly(r"^file(\s[^|;&>]*)?$", "Identify file type", "Read-only content probe"),
    )
    .command(
        "stat",
        readonly(r"^stat(\s[^|;&>]*)?$", "File metadata", "Read-only inode information"),
    )
    .command(
        "tree",
        readonly(r"^tree(\s[^|;&>]*)?$", "Directory tree view", "Read-only recursive listing"),
    )
    .command(
        "wc",
        readonly(r"^wc(\s[^|;&>]*)?$", "Count lines/words/bytes", "Read-only counting"),
    )
    .command(
        "diff",
        readonly(r"^diff(\s[^|;&>]*)?$", "Compare files", "Read-only comparison"),
    )
    .command(
        "md5sum",
        readonly(r"^md5sum(\s[^|;&>]*)?$", "MD5 checksum", "Read-only integrity check"),
    )
    .command(
        "sha256sum",
        readonly(
            r"^sha256sum(\s[^|;&>]*)?$",
            "SHA-256 checksum",
            "Read-only integrity check",
        ),
    )
}
