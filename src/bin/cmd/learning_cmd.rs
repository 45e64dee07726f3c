use std::sync::Arc;

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use fleetgate::classify::RiskLevel;
use fleetgate::Settings;

pub fn command() -> Command {
    Command::new("learning")
        .about("Inspect the denied-command history and whitelist suggestions")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("suggestions")
                .about("Ranked whitelist-extension suggestions")
                .arg(
                    Arg::new("min-count")
                        .long("min-count")
                        .value_name("N")
                        .help("Minimum denial count (default 5)"),
                )
                .arg(
                    Arg::new("min-age-hours")
                        .long("min-age-hours")
                        .value_name("H")
                        .help("Minimum hours since first denial (default 24)"),
                ),
        )
        .subcommand(Command::new("stats").about("Aggregate statistics"))
        .subcommand(
            Command::new("clear")
                .about("Clear history for one command, or everything")
                .arg(
                    Arg::new("command")
                        .help("Command to clear (omit to clear all)")
                        .required(false),
                ),
        )
}

pub fn run(matches: &ArgMatches, settings: &Arc<Settings>) -> Result<fleetgate::CmdExit> {
    let store = super::learning_store(settings)?;

    match matches.subcommand() {
        Some(("suggestions", sub)) => {
            let min_count: u64 = sub
                .get_one::<String>("min-count")
                .map_or(Ok(5), |v| v.parse())?;
            let min_age_hours: i64 = sub
                .get_one::<String>("min-age-hours")
                .map_or(Ok(24), |v| v.parse())?;
            let suggestions = store.suggestions(min_count, min_age_hours, RiskLevel::Low);
            println!("{}", serde_json::to_string_pretty(&suggestions)?);
            Ok(fleetgate::CmdExit {
                code: exitcode::OK,
                message: None,
            })
        }
        Some(("stats", _)) => {
            println!("{}", serde_json::to_string_pretty(&store.summary())?);
            Ok(fleetgate::CmdExit {
                code: exitcode::OK,
                message: None,
            })
        }
        Some(("clear", sub)) => {
            let command = sub.get_one::<String>("command");
            store.clear(command.map(String::as_str));
            Ok(fleetgate::CmdExit {
                code: exitcode::OK,
                message: Some(match command {
                    Some(c) => format!("Cleared learning history for '{c}'."),
                    None => "Cleared all learning history.".to_string(),
                }),
            })
        }
        _ => Ok(fleetgate::CmdExit {
            code: exitcode::USAGE,
            message: Some("Unknown learning subcommand.".to_string()),
        }),
    }
}
