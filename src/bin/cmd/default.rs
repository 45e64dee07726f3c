use clap::{crate_version, Arg, Command};

pub fn command() -> Command {
    Command::new("fleetgate")
        .version(crate_version!())
        .about("Policy-enforcing remote-execution broker for Linux fleets")
        .arg_required_else_help(true)
        .arg(
            Arg::new("log")
                .long("log")
                .help("Set logging level (trace/debug/info/warn/error)")
                .value_name("LEVEL")
                .global(true),
        )
}
