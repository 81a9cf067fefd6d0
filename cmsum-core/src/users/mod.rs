//! User enumeration, lookup and transactional update.
//!
//! Family-specific SQL lives behind the object-safe [`UserSchema`] trait. The
//! repository owns the transaction: every update re-reads its baseline inside
//! the transaction, writes only what differs, and either commits everything
//! or rolls everything back.
//!
//! # Module Structure
//! - `wordpress`: `users` + pivoted `usermeta`, serialized capability roles
//! - `joomla`: `users` + group map + group titles

mod joomla;
mod wordpress;

pub use joomla::JoomlaSchema;
pub use wordpress::{WordPressSchema, role_from_capabilities, serialize_capabilities};

use crate::adapters::helpers::validate_prefix;
use crate::adapters::{CmsConnection, Placeholders, SqlDialect};
use crate::error::CmsError;
use crate::models::{CmsFamily, ResolvedInstallation, UpdateOutcome, UserRecord};
use crate::security::HashResult;
use crate::Result;
use async_trait::async_trait;
use sqlx::AnyConnection;
use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;

/// Selects which users a fetch returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKey<'a> {
    All,
    Id(i64),
    Username(&'a str),
}

impl<'a> UserKey<'a> {
    /// `WHERE` clause for this key against the given id and username columns
    fn filter(&self, id_column: &str, username_column: &str, params: &mut Placeholders) -> String {
        match self {
            Self::All => String::new(),
            Self::Id(_) => format!(" WHERE {} = {}", id_column, params.next_param()),
            Self::Username(_) => format!(" WHERE {} = {}", username_column, params.next_param()),
        }
    }

    fn bind<'q>(
        &self,
        query: Query<'q, Any, AnyArguments<'q>>,
    ) -> Query<'q, Any, AnyArguments<'q>>
    where
        'a: 'q,
    {
        match *self {
            Self::All => query,
            Self::Id(id) => query.bind(id),
            Self::Username(username) => query.bind(username),
        }
    }
}

/// The installation a schema operation runs against
#[derive(Debug, Clone, Copy)]
pub struct SchemaContext<'a> {
    pub dialect: SqlDialect,
    pub installation: &'a ResolvedInstallation,
}

impl SchemaContext<'_> {
    /// Quoted full name of one of the installation's tables
    pub fn table(&self, name: &str) -> String {
        self.dialect.quote_ident(&self.installation.table(name))
    }

    pub fn prefix(&self) -> &str {
        &self.installation.prefix
    }
}

/// One requested change, with the baseline read inside the transaction
#[derive(Debug, Clone, Copy)]
pub struct UserChange<'a> {
    pub baseline: &'a UserRecord,
    pub desired: &'a UserRecord,
    pub password: Option<&'a HashResult>,
}

/// Family-specific user storage.
///
/// # Object Safety
/// Implementations are picked at runtime through [`schema_for`].
#[async_trait]
pub trait UserSchema: Send + Sync {
    fn family(&self) -> CmsFamily;

    /// Reads users ordered by id.
    async fn fetch(
        &self,
        conn: &mut AnyConnection,
        ctx: &SchemaContext<'_>,
        key: UserKey<'_>,
    ) -> Result<Vec<UserRecord>>;

    /// Writes the fields that differ from the baseline and returns their names.
    ///
    /// Runs inside the caller's transaction; any error rolls back all writes.
    async fn write(
        &self,
        conn: &mut AnyConnection,
        ctx: &SchemaContext<'_>,
        change: &UserChange<'_>,
    ) -> Result<Vec<String>>;
}

/// Returns the schema implementation for a family.
pub fn schema_for(family: CmsFamily) -> Box<dyn UserSchema> {
    match family {
        CmsFamily::WordPress => Box::new(WordPressSchema),
        CmsFamily::Joomla => Box::new(JoomlaSchema),
    }
}

/// User operations over one database connection.
///
/// Records are read fresh for every call; nothing is cached.
pub struct UserRepository<'c> {
    connection: &'c CmsConnection,
}

impl<'c> UserRepository<'c> {
    pub fn new(connection: &'c CmsConnection) -> Self {
        Self { connection }
    }

    /// Lists users of every installation, in installation order then by id.
    ///
    /// # Errors
    /// Returns `Configuration` for an unsafe prefix and `Query` if a listing fails
    pub async fn list_across_prefixes(
        &self,
        installations: &[ResolvedInstallation],
    ) -> Result<Vec<UserRecord>> {
        let mut conn = self.acquire().await?;
        let mut users = Vec::new();

        for installation in installations {
            validate_prefix(&installation.prefix)?;
            let ctx = self.context(installation);
            let schema = schema_for(installation.family);
            let found = schema.fetch(&mut *conn, &ctx, UserKey::All).await?;
            tracing::debug!("{} users in {}", found.len(), installation);
            users.extend(found);
        }

        tracing::info!(
            "Listed {} users across {} installation(s)",
            users.len(),
            installations.len()
        );
        Ok(users)
    }

    /// Looks up one user by username.
    ///
    /// # Errors
    /// Returns `UserNotFound` on a miss
    pub async fn get_by_username(
        &self,
        installation: &ResolvedInstallation,
        username: &str,
    ) -> Result<UserRecord> {
        validate_prefix(&installation.prefix)?;
        let mut conn = self.acquire().await?;
        let ctx = self.context(installation);
        let schema = schema_for(installation.family);

        schema
            .fetch(&mut *conn, &ctx, UserKey::Username(username))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CmsError::user_not_found(&installation.prefix, username))
    }

    /// Brings the stored user identified by `desired.id` in line with `desired`.
    ///
    /// Runs as one transaction: either every differing field is written or
    /// none is.
    ///
    /// # Errors
    /// - `UserNotFound` if the user disappeared
    /// - `Configuration` for a username change or an unsupported field
    /// - `UnknownRole` for a role the installation does not define
    /// - `UpdateAffectedRowMismatch` if a single-row write did not hit exactly one row
    pub async fn update(
        &self,
        installation: &ResolvedInstallation,
        desired: &UserRecord,
        password: Option<&HashResult>,
    ) -> Result<UpdateOutcome> {
        validate_prefix(&installation.prefix)?;
        if desired.family != installation.family || desired.prefix != installation.prefix {
            return Err(CmsError::configuration(format!(
                "User record belongs to {} ({}), not {}",
                desired.prefix, desired.family, installation
            )));
        }

        let ctx = self.context(installation);
        let mut tx = self
            .connection
            .pool()
            .begin()
            .await
            .map_err(|e| CmsError::query_failed("Failed to begin update transaction", e))?;

        match Self::apply(&mut *tx, &ctx, desired, password).await {
            Ok(written) => {
                tx.commit()
                    .await
                    .map_err(|e| CmsError::query_failed("Failed to commit user update", e))?;
                tracing::info!(
                    "Updated '{}' in {}: {}",
                    desired.username,
                    installation,
                    if written.is_empty() {
                        "no changes".to_string()
                    } else {
                        written.join(", ")
                    }
                );
                Ok(UpdateOutcome {
                    id: desired.id,
                    username: desired.username.clone(),
                    written,
                })
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!("Rollback of '{}' failed: {}", desired.username, rollback);
                }
                tracing::warn!("Update of '{}' rolled back: {}", desired.username, e);
                Err(e)
            }
        }
    }

    async fn apply(
        conn: &mut AnyConnection,
        ctx: &SchemaContext<'_>,
        desired: &UserRecord,
        password: Option<&HashResult>,
    ) -> Result<Vec<String>> {
        let schema = schema_for(ctx.installation.family);
        let baseline = schema
            .fetch(conn, ctx, UserKey::Id(desired.id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CmsError::user_not_found(ctx.prefix(), &desired.username))?;

        if baseline.username != desired.username {
            return Err(CmsError::configuration(format!(
                "Changing the username of '{}' is not supported",
                baseline.username
            )));
        }

        let change = UserChange {
            baseline: &baseline,
            desired,
            password,
        };
        schema.write(conn, ctx, &change).await
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Any>> {
        self.connection
            .pool()
            .acquire()
            .await
            .map_err(|e| CmsError::connection_failed(self.connection.target(), e))
    }

    fn context<'i>(&self, installation: &'i ResolvedInstallation) -> SchemaContext<'i> {
        SchemaContext {
            dialect: self.connection.dialect(),
            installation,
        }
    }
}
