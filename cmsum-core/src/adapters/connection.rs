//! Connection pool creation per backend.
//!
//! # Pool Settings
//! - Eager connect so unreachable servers fail before any resolution work
//! - Acquire timeout from the connection descriptor
//! - Session settings applied to every pooled connection via `after_connect`

use super::SqlDialect;
use crate::error::CmsError;
use crate::Result;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use std::time::Duration;

/// Server connections kept by one invocation
const MAX_SERVER_CONNECTIONS: u32 = 4;

/// Creates and eagerly connects the pool for `dialect`.
///
/// `target` is the redacted connection target used in errors and logs.
pub(super) async fn create_pool(
    url: &str,
    dialect: SqlDialect,
    timeout: Duration,
    target: &str,
) -> Result<AnyPool> {
    ensure_driver_compiled(dialect)?;
    sqlx::any::install_default_drivers();

    let options = match dialect {
        SqlDialect::MySql => mysql_options(timeout),
        SqlDialect::Postgres => postgres_options(timeout),
        SqlDialect::Sqlite => sqlite_options(timeout),
    };

    tracing::debug!("Connecting to {} at {}", dialect, target);
    let pool = options
        .connect(url)
        .await
        .map_err(|e| CmsError::connection_failed(target, e))?;
    tracing::info!("Connected to {}", target);

    Ok(pool)
}

fn ensure_driver_compiled(dialect: SqlDialect) -> Result<()> {
    let (compiled, feature) = match dialect {
        SqlDialect::MySql => (cfg!(feature = "mysql"), "mysql"),
        SqlDialect::Postgres => (cfg!(feature = "postgresql"), "postgresql"),
        SqlDialect::Sqlite => (cfg!(feature = "sqlite"), "sqlite"),
    };
    if !compiled {
        return Err(CmsError::configuration(format!(
            "{} support not compiled in (enable the '{}' feature)",
            dialect, feature
        )));
    }
    Ok(())
}

fn mysql_options(timeout: Duration) -> AnyPoolOptions {
    use sqlx::Executor;

    AnyPoolOptions::new()
        .max_connections(MAX_SERVER_CONNECTIONS)
        .acquire_timeout(timeout)
        .test_before_acquire(true)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Stored dates are compared as UTC by both CMS families
                conn.execute("SET time_zone = '+00:00'").await?;
                Ok(())
            })
        })
}

fn postgres_options(timeout: Duration) -> AnyPoolOptions {
    use sqlx::Executor;

    AnyPoolOptions::new()
        .max_connections(MAX_SERVER_CONNECTIONS)
        .acquire_timeout(timeout)
        .test_before_acquire(true)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                let app_name = format!("cmsum-{}", env!("CARGO_PKG_VERSION"));
                conn.execute(format!("SET application_name = '{}'", app_name).as_str())
                    .await?;
                conn.execute("SET timezone = 'UTC'").await?;
                Ok(())
            })
        })
}

/// A single never-recycled connection, so `sqlite::memory:` keeps its tables.
fn sqlite_options(timeout: Duration) -> AnyPoolOptions {
    AnyPoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .acquire_timeout(timeout)
        .idle_timeout(None)
        .max_lifetime(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(all(feature = "mysql", feature = "postgresql", feature = "sqlite"))]
    fn test_default_drivers_compiled() {
        assert!(ensure_driver_compiled(SqlDialect::MySql).is_ok());
        assert!(ensure_driver_compiled(SqlDialect::Postgres).is_ok());
        assert!(ensure_driver_compiled(SqlDialect::Sqlite).is_ok());
    }
}
