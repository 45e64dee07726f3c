//! POSIX text plugin — stream and text processing tools.

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
    let readonly_entries: &[(&str, &str, &str, &str)] = &[
        ("sed", r"^sed(\s[^|;&>]*)?$", "Stream editor", "Read-only on streams; in-place editing with -i is caught by the denylist layer"),
        ("awk", r"^awk(\s[^|;&>]*)?$", "Pattern scanning and processing", "Read-only on streams"),
        ("cut", r"^cut(\s[^|;&>]*)?$", "Select fields from lines", "Pure stream transformation"),
        ("paste", r"^paste(\s[^|;&>]*)?$", "Merge lines of files", "Pure stream transformation"),
        ("sort", r"^sort(\s[^|;&>]*)?$", "Sort lines", "Pure stream transformation; -o writes are caught by the denylist layer"),
        ("uniq", r"^uniq(\s[^|;&>]*)?$", "Filter repeated lines", "Pure stream transformation"),
        ("tr", r"^tr(\s[^|;&>]*)?$", "Translate characters", "Pure stream transformation"),
        ("column", r"^column(\s[^|;&>]*)?$", "Columnate lists", "Pure stream formatting"),
        ("comm", r"^comm(\s[^|;&>]*)?$", "Compare sorted files", "Read-only comparison"),
        ("join", r"^join(\s[^|;&>]*)?$", "Relational join on files", "Read-only combination"),
        ("nl", r"^nl(\s[^|;&>]*)?$", "Number lines", "Pure stream formatting"),
        ("tac", r"^tac(\s[^|;&>]*)?$", "Reverse line order", "Pure stream transformation"),
        ("rev", r"^rev(\s[^|;&>]*)?$", "Reverse characters per line", "Pure stream transformation"),
    ];

    let mut plugin = CommandPlugin::new(
        "posix-text",
        "text",
        "Stream and text processing tools",
    );
    for (key, pattern, description, rationale) in readonly_entries {
        plugin = plugin.command(key, readonly(pattern, description, rationale));
    }

    plugin
        .command(
            "tee",
            CommandSpec::builtin(
                r"^tee(\s[^|;&>]*)?$",
                RiskLevel::Medium,
                AuthLevel::Manual,
                SshRole::Executor,
                "Duplicate stream to files",
                "Writes files as a side effect",
            ),
        )
        .command(
            "xargs",
            CommandSpec::builtin(
                r"^xargs(\s[^|;&>]*)?$",
                RiskLevel::Medium,
                AuthLevel::Manual,
                SshRole::Executor,
                "Build and run command lines",
                "Executes arbitrary commands built from input",
            ),
        )
}
