use std::sync::Arc;

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use fleetgate::catalog::Catalog;
use fleetgate::classify::Classifier;
use fleetgate::Settings;

pub fn command() -> Command {
    Command::new("analyze")
        .about("Classify a command offline: risk, category, suggested authorization")
        .arg(
            Arg::new("command")
                .help("The command string to analyze")
                .required(true),
        )
}

pub fn run(matches: &ArgMatches, _settings: &Arc<Settings>) -> Result<fleetgate::CmdExit> {
    let command = matches
        .get_one::<String>("command")
        .expect("required by clap");

    let catalog = Arc::new(Catalog::builtin()?);
    let classifier = Classifier::new(catalog);
    let analysis = classifier.classify(command);

    println!("{}", serde_json::to_string_pretty(&analysis)?);

    Ok(fleetgate::CmdExit {
        code: exitcode::OK,
        message: None,
    })
}
