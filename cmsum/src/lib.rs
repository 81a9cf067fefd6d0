//! Library module for the cmsum binary.
//!
//! Argument definitions, rendering and command handlers live here so they
//! can be tested without spawning the binary. `main.rs` only parses,
//! initializes logging and dispatches.

pub mod commands;
pub mod output;
pub mod password;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cmsum_core::CmsFamily;
use std::path::PathBuf;

pub use output::OutputFormat;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "cmsum")]
#[command(about = "WordPress and Joomla user manager")]
#[command(version)]
#[command(long_about = "
cmsum - CMS user manager

Reads the database settings of a WordPress or Joomla installation, finds
every installation sharing that database by its table prefix, and lists or
edits user accounts directly in the database.

SECURITY FEATURES:
- Database passwords are never printed or logged
- Passwords are read from stdin or a hidden prompt, never from arguments
- Every edit is a single transaction that commits fully or not at all

EXAMPLES:
  cmsum --path /var/www/html info
  cmsum --path /var/www/html users --format json
  cmsum --path /var/www/html edit admin --email admin@example.com
  echo 'n3w-passw0rd' | cmsum --path /var/www/html edit admin --password-stdin
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the detected installations, connection target and version
    Info,
    /// List users across installations
    Users(UsersArgs),
    /// Edit one user account
    Edit(EditArgs),
    /// List supported CMS and database families
    Families,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all log output except errors")]
    pub quiet: bool,

    /// Installation root
    #[arg(
        long,
        global = true,
        env = "CMSUM_PATH",
        default_value = ".",
        help = "Installation root containing wp-config.php or configuration.php"
    )]
    pub path: PathBuf,

    /// Output format
    #[arg(
        long,
        global = true,
        env = "CMSUM_FORMAT",
        value_enum,
        default_value_t = OutputFormat::Text
    )]
    pub format: OutputFormat,

    /// CMS family to read the configuration of, when the root holds both
    #[arg(long, global = true, value_enum)]
    pub family: Option<FamilyArg>,
}

/// CMS family selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FamilyArg {
    Wordpress,
    Joomla,
}

impl From<FamilyArg> for CmsFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Wordpress => Self::WordPress,
            FamilyArg::Joomla => Self::Joomla,
        }
    }
}

#[derive(Debug, Args)]
pub struct UsersArgs {
    /// Only list this installation
    #[arg(long, help = "Table prefix of the installation to list (without trailing _)")]
    pub prefix: Option<String>,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Username of the account to edit
    pub username: String,

    /// Installation holding the account
    #[arg(long, help = "Table prefix of the installation (without trailing _)")]
    pub prefix: Option<String>,

    /// New display name
    #[arg(long)]
    pub name: Option<String>,

    /// New email address
    #[arg(long)]
    pub email: Option<String>,

    /// New first name (WordPress)
    #[arg(long)]
    pub first_name: Option<String>,

    /// New last name (WordPress)
    #[arg(long)]
    pub last_name: Option<String>,

    /// New nickname (WordPress)
    #[arg(long)]
    pub nickname: Option<String>,

    /// Replace the user's roles (repeatable)
    #[arg(long = "role", value_name = "ROLE")]
    pub roles: Vec<String>,

    /// Read the new password from the first line of stdin
    #[arg(long, conflicts_with = "prompt_password")]
    pub password_stdin: bool,

    /// Prompt for the new password without echo
    #[arg(long)]
    pub prompt_password: bool,
}

impl EditArgs {
    /// Returns true when a new password was requested
    pub fn wants_password(&self) -> bool {
        self.password_stdin || self.prompt_password
    }
}
