use clap::{Arg, ArgAction, ArgMatches, Command, builder::PossibleValuesParser};

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_LEVEL: &str = "log-level";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Verbosity (-v warn, -vv info, -vvv debug, -vvvv trace)"),
        )
        .arg(
            Arg::new(ARG_LOG_LEVEL)
                .long(ARG_LOG_LEVEL)
                .env("TESSERA_LOG_LEVEL")
                .value_parser(PossibleValuesParser::new([
                    "error", "warn", "info", "debug", "trace",
                ]))
                .help("Log level (alternative to -v flags)"),
        )
}

/// Verbosity implied by `--log-level`/`TESSERA_LOG_LEVEL`; 0 when unset.
#[must_use]
pub fn level_verbosity(matches: &ArgMatches) -> u8 {
    match matches.get_one::<String>(ARG_LOG_LEVEL).map(String::as_str) {
        Some("warn") => 1,
        Some("info") => 2,
        Some("debug") => 3,
        Some("trace") => 4,
        _ => 0,
    }
}
