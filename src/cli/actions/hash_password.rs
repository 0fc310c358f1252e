use crate::auth::hash_password;
use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug)]
pub struct Args {
    pub password: SecretString,
    pub cost: u32,
}

/// Print a bcrypt hash of the password to stdout.
/// # Errors
/// Returns an error if hashing fails.
pub async fn execute(args: Args) -> Result<()> {
    let hash = hash_password(args.password.expose_secret(), args.cost).await?;
    println!("{hash}");
    Ok(())
}
