//! New-password input.
//!
//! Passwords never come from command-line arguments. They are read from the
//! first line of stdin or from a hidden terminal prompt, and kept in
//! `Zeroizing` buffers until hashed.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use zeroize::Zeroizing;

/// Reads the first line of `reader`, without its line terminator.
///
/// # Errors
/// Returns error if the input is empty or cannot be read
pub async fn read_first_line<R>(reader: &mut R) -> Result<Zeroizing<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Zeroizing::new(String::new());
    reader
        .read_line(&mut line)
        .await
        .context("Failed to read password from stdin")?;

    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(Zeroizing::new(trimmed.to_string()))
}

/// Reads the new password from the first line of stdin.
pub async fn from_stdin() -> Result<Zeroizing<String>> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    read_first_line(&mut stdin).await
}

/// Prompts twice without echo and returns the password when both entries match.
pub fn prompt() -> Result<Zeroizing<String>> {
    let password = Zeroizing::new(
        rpassword::prompt_password("New password: ").context("Failed to read password")?,
    );
    if password.is_empty() {
        bail!("Password cannot be empty");
    }

    // Confirm password to prevent typos
    let confirm = Zeroizing::new(
        rpassword::prompt_password("Confirm new password: ")
            .context("Failed to read password confirmation")?,
    );
    if *password != *confirm {
        bail!("Passwords do not match");
    }

    Ok(password)
}
