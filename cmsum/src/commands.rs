//! Command handlers.
//!
//! Every database command opens a [`Session`]: the configuration file is
//! read, the database connected, installations resolved from the table
//! listing and the product version read from disk. The session is closed
//! before the handler returns.

use crate::output::{
    self, FamiliesReport, InfoReport, InstallationView, OutputFormat, UsersReport,
};
use crate::{Cli, Command, EditArgs, UsersArgs, password};
use anyhow::{Context, Result, bail};
use cmsum_core::{
    CmsConnection, CmsFamily, CredentialHasher, ExtractedConfig, PrefixResolution, UserRecord,
    UserRepository, VersionDescriptor, VersionSource, config, prefix, version,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Runs the parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let format = cli.global.format;
    if let Command::Families = cli.command {
        return emit(format, &FamiliesReport::supported(), output::render_families);
    }

    let requested = cli.global.family.map(CmsFamily::from);
    let session = Session::open(&cli.global.path, requested).await?;
    let result = match &cli.command {
        Command::Info => info_command(&session, format),
        Command::Users(args) => users_command(&session, args, format).await,
        Command::Edit(args) => edit_command(&session, args, format).await,
        Command::Families => Ok(()),
    };
    session.connection.close().await;
    result
}

/// Everything learned about one installation root
pub struct Session {
    pub root: PathBuf,
    pub detected: Vec<CmsFamily>,
    pub config: ExtractedConfig,
    pub connection: CmsConnection,
    pub resolution: PrefixResolution,
    pub version: Option<VersionDescriptor>,
}

impl Session {
    /// Reads the configuration of `root`, connects and resolves installations.
    pub async fn open(root: &Path, requested: Option<CmsFamily>) -> Result<Self> {
        let detected = CmsFamily::detect(root);
        let family = choose_family(&detected, requested, root)?;
        let config_path = root.join(family.config_file_name());

        let config = config::extract_file(family, &config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        info!(
            "Using {} configuration: {}",
            family,
            config.descriptor.redacted_target()
        );

        let connection = CmsConnection::connect(&config.descriptor).await?;
        let tables = connection.list_tables().await?;
        let hint = config.hint();
        let resolution = prefix::resolve(&tables, hint.as_ref());
        info!(
            "Resolved {} installation(s) from {} tables",
            resolution.installations.len(),
            tables.len()
        );

        let version = match version::resolve(root, VersionSource::for_family(family)) {
            Ok(descriptor) => {
                info!("{} version {}", family, descriptor);
                Some(descriptor)
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        };

        Ok(Self {
            root: root.to_path_buf(),
            detected,
            config,
            connection,
            resolution,
            version,
        })
    }

    /// Version on disk, when it describes installations of `family`.
    ///
    /// The version files belong to the installation whose configuration was
    /// read; other families sharing the database get no version.
    pub fn version_for(&self, family: CmsFamily) -> Option<&VersionDescriptor> {
        if family == self.config.family {
            self.version.as_ref()
        } else {
            None
        }
    }
}

/// Picks the family whose configuration file is read.
pub fn choose_family(
    detected: &[CmsFamily],
    requested: Option<CmsFamily>,
    root: &Path,
) -> Result<CmsFamily> {
    if let Some(family) = requested {
        if !detected.contains(&family) {
            bail!(
                "No {} found in {}",
                family.config_file_name(),
                root.display()
            );
        }
        return Ok(family);
    }

    match detected {
        [] => bail!(
            "No wp-config.php or configuration.php found in {}",
            root.display()
        ),
        [family] => Ok(*family),
        [family, ..] => {
            warn!(
                "Both WordPress and Joomla configurations found, using {}; pass --family to choose",
                family
            );
            Ok(*family)
        }
    }
}

fn info_command(session: &Session, format: OutputFormat) -> Result<()> {
    let default = session.resolution.default.as_ref();
    let report = InfoReport {
        root: session.root.clone(),
        detected: session.detected.clone(),
        family: session.config.family,
        database: session.config.descriptor.family,
        target: session.connection.target().to_string(),
        installations: session
            .resolution
            .installations
            .iter()
            .map(|installation| InstallationView::new(installation, default))
            .collect(),
        version: session.version.clone(),
    };
    emit(format, &report, output::render_info)
}

async fn users_command(session: &Session, args: &UsersArgs, format: OutputFormat) -> Result<()> {
    let installations = match args.prefix.as_deref() {
        Some(wanted) => std::slice::from_ref(session.resolution.select(Some(wanted))?),
        None => session.resolution.installations_or_err()?,
    };

    let repository = UserRepository::new(&session.connection);
    let users = repository.list_across_prefixes(installations).await?;
    emit(format, &UsersReport { users }, |report| {
        output::render_users(&report.users)
    })
}

async fn edit_command(session: &Session, args: &EditArgs, format: OutputFormat) -> Result<()> {
    let installation = session.resolution.select(args.prefix.as_deref())?;
    let repository = UserRepository::new(&session.connection);
    let current = repository
        .get_by_username(installation, &args.username)
        .await?;
    let desired = build_desired(&current, args);

    let hash = if args.wants_password() {
        let cleartext = if args.password_stdin {
            password::from_stdin().await?
        } else {
            password::prompt()?
        };
        let hasher = CredentialHasher::for_family(installation.family);
        let hash = hasher.hash(&cleartext, session.version_for(installation.family))?;
        if !hasher.verify(&cleartext, &hash)? {
            bail!("Generated password hash failed verification");
        }
        info!("Password hashed with {}", hash.algorithm);
        Some(hash)
    } else {
        None
    };

    let outcome = repository
        .update(installation, &desired, hash.as_ref())
        .await?;
    emit(format, &outcome, output::render_outcome)
}

/// Applies the requested edits to a copy of the stored record.
pub fn build_desired(current: &UserRecord, args: &EditArgs) -> UserRecord {
    let mut desired = current.clone();
    if let Some(name) = &args.name {
        desired.display_name = name.clone();
    }
    if let Some(email) = &args.email {
        desired.email = email.clone();
    }

    let profile = [
        ("first_name", &args.first_name),
        ("last_name", &args.last_name),
        ("nickname", &args.nickname),
    ];
    for (key, value) in profile {
        if let Some(value) = value {
            desired.profile.insert(key.to_string(), value.clone());
        }
    }

    if !args.roles.is_empty() {
        desired.roles = args.roles.iter().map(|r| r.trim().to_string()).collect();
    }
    desired
}

fn emit<T, F>(format: OutputFormat, report: &T, render: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Json => {
            let json = output::to_json(report).context("Failed to serialize output")?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", render(report)),
    }
    Ok(())
}
