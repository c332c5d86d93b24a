//! Key-material arguments. Values land in `SecretString` so they never
//! reach debug output; real validation (length, placeholder rejection)
//! happens when the keyring and seed cipher are built at startup.

use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

use crate::password::HashCost;

pub const ARG_SIGNING_SECRET: &str = "signing-secret";
pub const ARG_RETIRED_SIGNING_SECRET: &str = "retired-signing-secret";
pub const ARG_SEED_KEY: &str = "seed-key";
pub const ARG_RECOVERY_PEPPER: &str = "recovery-pepper";
pub const ARG_ARGON2_MEMORY: &str = "argon2-memory-kib";
pub const ARG_ARGON2_ITERATIONS: &str = "argon2-iterations";
pub const ARG_ARGON2_PARALLELISM: &str = "argon2-parallelism";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNING_SECRET)
                .long(ARG_SIGNING_SECRET)
                .help("Active signing secret as kid:base64 (HMAC-SHA256, >= 32 bytes)")
                .env("TESSERA_SIGNING_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_RETIRED_SIGNING_SECRET)
                .long(ARG_RETIRED_SIGNING_SECRET)
                .help("Retired kid:base64 secrets kept verify-only through a rotation window")
                .long_help(
                    "Retired kid:base64 secrets kept verify-only through a rotation window. Tokens signed under a retired kid stay valid until natural expiry; drop the kid to invalidate them immediately.",
                )
                .env("TESSERA_RETIRED_SIGNING_SECRETS")
                .action(ArgAction::Append)
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_SEED_KEY)
                .long(ARG_SEED_KEY)
                .help("Base64 key (32 bytes) for TOTP seed encryption at rest")
                .env("TESSERA_SEED_KEY")
                .required(true),
        )
        .arg(
            Arg::new(ARG_RECOVERY_PEPPER)
                .long(ARG_RECOVERY_PEPPER)
                .help("Server-side pepper for recovery-code hashing (>= 16 bytes)")
                .env("TESSERA_RECOVERY_PEPPER")
                .required(true),
        )
        .arg(
            Arg::new(ARG_ARGON2_MEMORY)
                .long(ARG_ARGON2_MEMORY)
                .help("Argon2id memory cost in KiB")
                .default_value("19456")
                .env("TESSERA_ARGON2_MEMORY_KIB")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_ITERATIONS)
                .long(ARG_ARGON2_ITERATIONS)
                .help("Argon2id time cost")
                .default_value("2")
                .env("TESSERA_ARGON2_ITERATIONS")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_PARALLELISM)
                .long(ARG_ARGON2_PARALLELISM)
                .help("Argon2id parallelism")
                .default_value("1")
                .env("TESSERA_ARGON2_PARALLELISM")
                .value_parser(clap::value_parser!(u32)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub signing_kid: String,
    pub signing_secret: SecretString,
    pub retired: Vec<(String, SecretString)>,
    pub seed_key: SecretString,
    pub recovery_pepper: SecretString,
    pub hash_cost: HashCost,
}

impl Options {
    /// Extract the secret options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a kid:secret pair is malformed.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let raw = matches
            .get_one::<String>(ARG_SIGNING_SECRET)
            .context("missing --signing-secret")?;
        let (signing_kid, signing_secret) = parse_kid_secret(raw)?;

        let retired = match matches.get_many::<String>(ARG_RETIRED_SIGNING_SECRET) {
            Some(values) => values
                .map(|raw| parse_kid_secret(raw))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let seed_key = matches
            .get_one::<String>(ARG_SEED_KEY)
            .context("missing --seed-key")?;
        let recovery_pepper = matches
            .get_one::<String>(ARG_RECOVERY_PEPPER)
            .context("missing --recovery-pepper")?;

        let hash_cost = HashCost {
            m_cost_kib: matches
                .get_one::<u32>(ARG_ARGON2_MEMORY)
                .copied()
                .context("missing argon2 memory cost")?,
            t_cost: matches
                .get_one::<u32>(ARG_ARGON2_ITERATIONS)
                .copied()
                .context("missing argon2 time cost")?,
            p_cost: matches
                .get_one::<u32>(ARG_ARGON2_PARALLELISM)
                .copied()
                .context("missing argon2 parallelism")?,
        };

        Ok(Self {
            signing_kid,
            signing_secret,
            retired,
            seed_key: SecretString::from(seed_key.clone()),
            recovery_pepper: SecretString::from(recovery_pepper.clone()),
            hash_cost,
        })
    }
}

fn parse_kid_secret(raw: &str) -> Result<(String, SecretString)> {
    let mut parts = raw.splitn(2, ':');
    let kid = parts.next().map(str::trim).unwrap_or_default();
    let secret = parts.next().map(str::trim).unwrap_or_default();
    if kid.is_empty() || secret.is_empty() {
        return Err(anyhow!("signing secret must be given as kid:base64"));
    }
    Ok((kid.to_string(), SecretString::from(secret.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn parse_kid_secret_splits_once() -> Result<()> {
        let (kid, secret) = parse_kid_secret("k1:c2VjcmV0OndpdGg6Y29sb25z")?;
        assert_eq!(kid, "k1");
        assert_eq!(secret.expose_secret(), "c2VjcmV0OndpdGg6Y29sb25z");
        Ok(())
    }

    #[test]
    fn parse_kid_secret_rejects_missing_halves() {
        assert!(parse_kid_secret("no-colon").is_err());
        assert!(parse_kid_secret(":secret").is_err());
        assert!(parse_kid_secret("kid:").is_err());
    }
}
