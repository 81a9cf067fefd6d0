//! CMS user manager.
//!
//! Reads a WordPress or Joomla configuration file, connects to its database
//! and lists or edits user accounts of every installation sharing it.
//!
//! # Security Guarantees
//! - Database and user passwords are never printed or logged
//! - New passwords are hashed the way the installed version expects
//! - Edits are transactional

use clap::Parser;
use cmsum::{Cli, commands};
use cmsum_core::logging::init_logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.global.verbose, cli.global.quiet)?;

    commands::run(cli).await
}
