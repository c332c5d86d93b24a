use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;

/// Map verbosity count to tracing level
const fn get_verbosity_level(verbosity: u8) -> Option<tracing::Level> {
    match verbosity {
        0 => None,
        1 => Some(tracing::Level::WARN),
        2 => Some(tracing::Level::INFO),
        3 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    }
}

/// Main entry point for the CLI - builds and returns the Action
///
/// # Errors
///
/// Returns an error if argument parsing, telemetry initialization, or
/// action dispatch fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    // Explicit -v flags win; otherwise TESSERA_LOG_LEVEL applies.
    let mut verbosity = matches.get_count(commands::logging::ARG_VERBOSITY);
    if verbosity == 0 {
        verbosity = commands::logging::level_verbosity(&matches);
    }

    telemetry::init(get_verbosity_level(verbosity))?;

    let action = dispatch::handler(&matches)?;

    Ok(action)
}
