//! Helper utilities shared by the repository queries.

use crate::error::CmsError;
use crate::prefix::is_safe_prefix;
use crate::Result;
use sqlx::any::AnyRow;
use sqlx::Row;

/// Extension trait for extracting typed values from `Any` rows
/// with consistent error handling.
///
/// # Example
/// ```rust,ignore
/// use cmsum_core::adapters::helpers::RowExt;
///
/// let email: String = row.get_field("email", Some("wp_users"))?;
/// let meta: Option<String> = row.get_field("meta_value", None)?;
/// ```
pub trait RowExt {
    /// Extracts a typed field from the row with table context for errors.
    fn get_field<'r, T>(&'r self, field_name: &str, table_context: Option<&str>) -> Result<T>
    where
        T: sqlx::Decode<'r, sqlx::Any> + sqlx::Type<sqlx::Any>;
}

impl RowExt for AnyRow {
    fn get_field<'r, T>(&'r self, field_name: &str, table_context: Option<&str>) -> Result<T>
    where
        T: sqlx::Decode<'r, sqlx::Any> + sqlx::Type<sqlx::Any>,
    {
        self.try_get(field_name)
            .map_err(|e| CmsError::parse_field(field_name, table_context, e))
    }
}

/// Rejects prefixes that cannot be interpolated into a table identifier.
///
/// # Errors
/// Returns `Configuration` for anything outside `[A-Za-z0-9_$]`
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if !is_safe_prefix(prefix) {
        return Err(CmsError::configuration(format!(
            "Table prefix '{}' contains characters that are not allowed in identifiers",
            prefix
        )));
    }
    Ok(())
}

/// Checks the affected row count of a single-row write.
pub fn expect_rows(
    prefix: &str,
    username: &str,
    step: &str,
    expected: u64,
    actual: u64,
) -> Result<()> {
    if expected != actual {
        tracing::warn!(
            "Step '{}' for '{}' in '{}' affected {} rows, expected {}",
            step,
            username,
            prefix,
            actual,
            expected
        );
        return Err(CmsError::UpdateAffectedRowMismatch {
            prefix: prefix.to_string(),
            username: username.to_string(),
            step: step.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}
