mod cmd;

use std::process::exit;
use std::sync::Arc;

use anyhow::anyhow;
use console::Style;
use fleetgate::env::RealEnvironment;
use fleetgate::Settings;
use tracing_subscriber::EnvFilter;

fn main() {
    let app = cmd::default::command()
        .subcommand(cmd::serve_cmd::command())
        .subcommand(cmd::analyze_cmd::command())
        .subcommand(cmd::whitelist_cmd::command())
        .subcommand(cmd::learning_cmd::command());

    let matches = app.get_matches();

    let env = RealEnvironment;
    let settings = match Settings::from_env(&env) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            exit(exitcode::CONFIG)
        }
    };

    let default_level = matches
        .get_one::<String>("log")
        .cloned()
        .unwrap_or_else(|| settings.log_level.to_lowercase());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fleetgate={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let res = match matches.subcommand() {
        None => Err(anyhow!("command not found")),
        Some(tup) => match tup {
            ("serve", subcommand_matches) => cmd::serve_cmd::run(subcommand_matches, &settings),
            ("analyze", subcommand_matches) => cmd::analyze_cmd::run(subcommand_matches, &settings),
            ("whitelist", subcommand_matches) => {
                cmd::whitelist_cmd::run(subcommand_matches, &settings, &env)
            }
            ("learning", subcommand_matches) => {
                cmd::learning_cmd::run(subcommand_matches, &settings)
            }
            _ => unreachable!(),
        },
    };

    let exit_with = match res {
        Ok(cmd) => {
            if let Some(message) = cmd.message {
                let style = if exitcode::is_success(cmd.code) {
                    Style::new().green()
                } else {
                    Style::new().red()
                };
                eprintln!("{}", style.apply_to(message));
            }
            cmd.code
        }
        Err(e) => {
            tracing::debug!("{e:?}");
            eprintln!("{e}");
            exitcode::SOFTWARE
        }
    };
    exit(exit_with)
}
