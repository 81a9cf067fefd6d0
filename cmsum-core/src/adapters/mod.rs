//! Database collaborator: connection lifecycle and table listing.
//!
//! All backends are reached through the sqlx `Any` driver, so the repository
//! writes each query once and renders dialect differences via [`SqlDialect`].
//!
//! # Module Structure
//! - `connection`: per-backend pool options and eager connect
//! - `dialect`: placeholders, identifier quoting, casts and table listing
//! - `helpers`: row extraction and write guards shared by the repository

mod connection;
mod dialect;
pub mod helpers;

pub use dialect::{Placeholders, SqlDialect};

use crate::config::ConnectionDescriptor;
use crate::error::{CmsError, redact_database_url};
use crate::Result;
use futures::TryStreamExt;
use sqlx::AnyPool;
use std::time::Duration;

/// An open connection pool to the CMS database.
///
/// # Security
/// Only the redacted connection target is kept after connecting.
#[derive(Debug, Clone)]
pub struct CmsConnection {
    pool: AnyPool,
    dialect: SqlDialect,
    target: String,
}

impl CmsConnection {
    /// Connects using a descriptor extracted from a configuration file.
    ///
    /// # Errors
    /// Returns `Configuration` if the descriptor is incomplete and
    /// `Connection` if the server cannot be reached
    pub async fn connect(descriptor: &ConnectionDescriptor) -> Result<Self> {
        descriptor.validate()?;
        let url = descriptor.to_url()?;
        let target = redact_database_url(&url);
        let dialect = SqlDialect::for_family(descriptor.family);
        let pool =
            connection::create_pool(&url, dialect, descriptor.connect_timeout, &target).await?;

        Ok(Self {
            pool,
            dialect,
            target,
        })
    }

    /// Connects to a database URL directly (`sqlite::memory:` fixtures included).
    ///
    /// # Errors
    /// Returns `UnsupportedFamily` for an unknown scheme and `Connection` if
    /// the database cannot be opened
    pub async fn connect_url(url: &str) -> Result<Self> {
        let dialect = SqlDialect::from_url(url)?;
        let target = match dialect {
            SqlDialect::Sqlite => url.to_string(),
            SqlDialect::MySql | SqlDialect::Postgres => redact_database_url(url),
        };
        let pool = connection::create_pool(url, dialect, Duration::from_secs(30), &target).await?;

        Ok(Self {
            pool,
            dialect,
            target,
        })
    }

    /// Lists every table name in the connected database.
    ///
    /// # Errors
    /// Returns `Query` if the catalog cannot be read
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar::<_, String>(self.dialect.list_tables_sql())
            .fetch(&self.pool)
            .try_collect()
            .await
            .map_err(|e| CmsError::query_failed("Failed to list tables", e))?;

        tracing::debug!("Listed {} tables from {}", tables.len(), self.target);
        Ok(tables)
    }

    /// Round-trips a trivial query.
    ///
    /// # Errors
    /// Returns `Connection` if the server does not answer
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| CmsError::connection_failed(self.target.as_str(), e))?;
        Ok(())
    }

    /// Closes the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Closed connection to {}", self.target);
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Redacted connection target
    pub fn target(&self) -> &str {
        &self.target
    }
}
