//! Core engine for cmsum, the CMS user manager.
//!
//! This crate inspects an unlabeled database backing one or more WordPress or
//! Joomla installations and reconstructs enough knowledge to list and edit
//! user accounts safely.
//!
//! # Components
//! - [`config`]: connection settings and prefix hint from configuration files
//! - [`prefix`]: installation prefixes from a raw table listing
//! - [`version`]: product version from version-descriptor files
//! - [`security`]: version-conditioned password hashing
//! - [`users`]: cross-installation listing and transactional updates
//!
//! # Security Guarantees
//! - Database passwords are held in `Zeroizing` buffers and never logged
//! - Connection targets are redacted in every error message
//! - User updates commit completely or not at all

pub mod adapters;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod prefix;
pub mod security;
pub mod users;
pub mod version;

// Re-export commonly used types
pub use adapters::{CmsConnection, SqlDialect};
pub use config::{ConnectionDescriptor, ExtractedConfig};
pub use error::{CmsError, Result};
pub use models::{
    CmsFamily, CompanionKind, DatabaseFamily, PresenceFlags, ResolvedInstallation, UpdateOutcome,
    UserRecord,
};
pub use prefix::{PrefixHint, PrefixResolution};
pub use security::{CredentialHasher, HashAlgorithm, HashResult};
pub use users::{UserRepository, UserSchema, schema_for};
pub use version::{VersionDescriptor, VersionScheme, VersionSource};
