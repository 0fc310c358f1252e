//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to an `Action`: the `hash-password` subcommand or,
//! by default, the API server with its full auth configuration.

use crate::cli::actions::{Action, hash_password, server::Args};
use crate::cli::commands::{self, auth};
use anyhow::{Context, Result};

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if let Some(sub) = matches.subcommand_matches(commands::CMD_HASH_PASSWORD) {
        let password = sub
            .get_one::<String>(commands::ARG_PASSWORD)
            .cloned()
            .context("missing required argument: <password>")?;
        let cost = sub
            .get_one::<u32>(auth::ARG_BCRYPT_ROUNDS)
            .copied()
            .unwrap_or(12);
        return Ok(Action::HashPassword(hash_password::Args {
            password: password.into(),
            cost,
        }));
    }

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        auth: auth_opts.into_config(),
    }))
}
