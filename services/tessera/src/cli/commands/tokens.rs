use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_ISSUER: &str = "issuer";
pub const ARG_ACCESS_TTL: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL: &str = "refresh-ttl-seconds";
pub const ARG_STEP_UP_TTL: &str = "step-up-ttl-seconds";
pub const ARG_SESSION_TTL: &str = "session-ttl-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ISSUER)
                .long(ARG_ISSUER)
                .help("Issuer claim for signed tokens and TOTP provisioning")
                .default_value("tessera")
                .env("TESSERA_ISSUER"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Access token lifetime in seconds (minutes-scale)")
                .default_value("600")
                .env("TESSERA_ACCESS_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long(ARG_REFRESH_TTL)
                .help("Refresh token lifetime in seconds (days-scale)")
                .default_value("1209600")
                .env("TESSERA_REFRESH_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_STEP_UP_TTL)
                .long(ARG_STEP_UP_TTL)
                .help("Step-up token lifetime in seconds")
                .default_value("300")
                .env("TESSERA_STEP_UP_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Session absolute lifetime in seconds (never extended)")
                .default_value("2592000")
                .env("TESSERA_SESSION_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub issuer: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub step_up_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
}

impl Options {
    /// Extract the token options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a TTL is non-positive.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let options = Self {
            issuer: matches
                .get_one::<String>(ARG_ISSUER)
                .cloned()
                .context("missing issuer")?,
            access_ttl_seconds: ttl(matches, ARG_ACCESS_TTL)?,
            refresh_ttl_seconds: ttl(matches, ARG_REFRESH_TTL)?,
            step_up_ttl_seconds: ttl(matches, ARG_STEP_UP_TTL)?,
            session_ttl_seconds: ttl(matches, ARG_SESSION_TTL)?,
        };
        Ok(options)
    }
}

fn ttl(matches: &ArgMatches, name: &str) -> Result<i64> {
    let value = matches
        .get_one::<i64>(name)
        .copied()
        .with_context(|| format!("missing --{name}"))?;
    if value <= 0 {
        anyhow::bail!("--{name} must be positive, got {value}");
    }
    Ok(value)
}
