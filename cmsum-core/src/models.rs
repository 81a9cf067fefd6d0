//! Core data models shared by the resolvers and the user repository.
//!
//! Resolution outputs are immutable once produced; user records are read
//! fresh from the database for every operation and never cached.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Supported CMS families (table-shape dialects)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CmsFamily {
    /// Family A: `users` + `posts`, roles in a serialized capability blob
    WordPress,
    /// Family B: `users` + group mapping tables
    Joomla,
}

impl CmsFamily {
    /// Every supported family, in detection order
    pub const ALL: [Self; 2] = [Self::WordPress, Self::Joomla];

    /// Fixed configuration file name in the installation root
    pub fn config_file_name(self) -> &'static str {
        match self {
            Self::WordPress => "wp-config.php",
            Self::Joomla => "configuration.php",
        }
    }

    /// Returns every family whose configuration file exists under `root`.
    pub fn detect(root: &Path) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|family| root.join(family.config_file_name()).is_file())
            .collect()
    }
}

impl std::fmt::Display for CmsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WordPress => write!(f, "WordPress"),
            Self::Joomla => write!(f, "Joomla"),
        }
    }
}

/// Supported database families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseFamily {
    /// MySQL and wire-compatible servers (MariaDB)
    MySql,
    /// PostgreSQL
    Postgres,
}

impl DatabaseFamily {
    /// Conventional server port
    pub fn default_port(self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
        }
    }

    /// URL scheme understood by the sqlx Any driver
    pub fn url_scheme(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Normalizes a driver token from a CMS configuration file.
    ///
    /// Client-library aliases that speak the same wire protocol map to the
    /// canonical family (`mysqli`, `pdomysql` → MySQL; `pgsql` → PostgreSQL).
    ///
    /// # Errors
    /// Returns `UnsupportedFamily` for any other token
    pub fn from_driver_token(token: &str) -> crate::Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mysqli" | "pdomysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" | "pgsql" => Ok(Self::Postgres),
            _ => Err(crate::error::CmsError::unsupported_family(token)),
        }
    }
}

impl std::fmt::Display for DatabaseFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MySql => write!(f, "MySQL"),
            Self::Postgres => write!(f, "PostgreSQL"),
        }
    }
}

/// Kinds of companion tables recognized during prefix resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompanionKind {
    Users,
    Posts,
    UserGroupMap,
    UserGroups,
}

impl CompanionKind {
    /// Table-name suffix for this companion, including the separator
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Users => "_users",
            Self::Posts => "_posts",
            Self::UserGroupMap => "_user_usergroup_map",
            Self::UserGroups => "_usergroups",
        }
    }
}

/// Companion tables observed for one prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresenceFlags {
    pub users: bool,
    pub posts: bool,
    pub user_group_map: bool,
    pub user_groups: bool,
}

impl PresenceFlags {
    /// Marks a companion kind as observed
    pub fn insert(&mut self, kind: CompanionKind) {
        match kind {
            CompanionKind::Users => self.users = true,
            CompanionKind::Posts => self.posts = true,
            CompanionKind::UserGroupMap => self.user_group_map = true,
            CompanionKind::UserGroups => self.user_groups = true,
        }
    }

    /// Companion set a declared installation of `family` is assumed to have
    pub fn assumed_for(family: CmsFamily) -> Self {
        match family {
            CmsFamily::WordPress => Self {
                users: true,
                posts: true,
                ..Self::default()
            },
            CmsFamily::Joomla => Self {
                users: true,
                user_group_map: true,
                user_groups: true,
                ..Self::default()
            },
        }
    }

    /// Returns true when the candidate is WordPress-shaped
    pub fn is_wordpress_shaped(&self) -> bool {
        self.users && self.posts
    }

    /// Returns true when the candidate is Joomla-shaped
    pub fn is_joomla_shaped(&self) -> bool {
        self.users && (self.user_group_map || self.user_groups)
    }
}

/// A genuine CMS installation found in the database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedInstallation {
    /// Table-name prefix without the trailing separator (`wp`, `jos`)
    pub prefix: String,
    pub family: CmsFamily,
    /// Companion tables observed (or assumed, when `hinted`)
    pub companions: PresenceFlags,
    /// Retained because the configuration file declared it, not because the listing proved it
    pub hinted: bool,
}

impl ResolvedInstallation {
    /// Full table name for a table of this installation
    pub fn table(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

impl std::fmt::Display for ResolvedInstallation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.prefix, self.family)
    }
}

/// A CMS user account as currently stored in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Primary key owned by the database
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub roles: BTreeSet<String>,
    /// Family-specific extra fields (WordPress `first_name`, `last_name`, `nickname`)
    pub profile: BTreeMap<String, String>,
    pub prefix: String,
    pub family: CmsFamily,
}

/// Result of a committed user update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub id: i64,
    pub username: String,
    /// Fields written by the transaction, in write order
    pub written: Vec<String>,
}

impl UpdateOutcome {
    /// True when the desired record matched the stored one
    pub fn is_noop(&self) -> bool {
        self.written.is_empty()
    }
}
