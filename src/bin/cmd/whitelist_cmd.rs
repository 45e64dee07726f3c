use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use console::style;
use fleetgate::authorize::{AuthLevel, CommandRule};
use fleetgate::env::Environment;
use fleetgate::{whitelist, Settings};

pub fn command() -> Command {
    Command::new("whitelist")
        .about("Show the active command whitelist grouped by authorization level")
        .arg(
            Arg::new("validate")
                .long("validate")
                .help("Only validate the whitelist document and exit")
                .action(ArgAction::SetTrue),
        )
}

pub fn run(
    matches: &ArgMatches,
    settings: &Arc<Settings>,
    env: &dyn Environment,
) -> Result<fleetgate::CmdExit> {
    let rules = match &settings.whitelist_path {
        Some(path) => whitelist::parse_whitelist(&env.read_file(path)?)?,
        None => whitelist::default_rules(),
    };

    if matches.get_flag("validate") {
        return Ok(fleetgate::CmdExit {
            code: exitcode::OK,
            message: Some(format!("Whitelist OK ({} rules).", rules.len())),
        });
    }

    let mut output = String::new();
    for (level, heading) in [
        (AuthLevel::Auto, "AUTO-APPROVED (execute immediately)"),
        (AuthLevel::Manual, "MANUAL APPROVAL REQUIRED"),
        (AuthLevel::Blocked, "BLOCKED (cannot execute)"),
    ] {
        let section: Vec<&CommandRule> = rules.iter().filter(|r| r.level == level).collect();
        let _ = writeln!(output, "\n{} ({})", style(heading).bold(), section.len());
        for rule in section {
            let _ = writeln!(
                output,
                "  {pattern:<45} {role:<10} {desc}",
                pattern = rule.pattern.as_str(),
                role = rule.role.to_string(),
                desc = rule.description
            );
        }
    }
    let _ = writeln!(output, "\nDefault policy: BLOCK (unlisted commands are denied)");
    println!("{output}");

    Ok(fleetgate::CmdExit {
        code: exitcode::OK,
        message: None,
    })
}
