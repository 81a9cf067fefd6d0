//! Connection settings extraction from CMS configuration files.
//!
//! Each CMS family declares an ordered table of independent field
//! extractors. Supporting another configuration layout is a new table, not
//! new control flow.
//!
//! # Module Structure
//! - `descriptor`: `ConnectionDescriptor` with zeroized password handling
//! - `matcher`: generic key–value matchers over PHP source text

mod descriptor;
mod matcher;

pub use descriptor::ConnectionDescriptor;
pub use matcher::{KeyMatcher, PhpAssignment};

use crate::error::CmsError;
use crate::models::{CmsFamily, DatabaseFamily};
use crate::prefix::PrefixHint;
use crate::Result;
use std::path::Path;
use std::sync::OnceLock;

/// Configuration keys recognized by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Database,
    User,
    Password,
    /// Host, optionally with an embedded `:port`
    Host,
    /// Database driver token
    Driver,
    /// Table-name prefix
    Prefix,
}

/// One entry of a family's extraction table
pub struct FieldExtractor {
    pub field: ConfigField,
    pub matcher: Box<dyn KeyMatcher>,
}

impl FieldExtractor {
    fn new(field: ConfigField, matcher: impl KeyMatcher + 'static) -> Self {
        Self {
            field,
            matcher: Box::new(matcher),
        }
    }
}

/// Returns the ordered extraction table for a CMS family.
pub fn extractors_for(family: CmsFamily) -> &'static [FieldExtractor] {
    static WORDPRESS: OnceLock<Vec<FieldExtractor>> = OnceLock::new();
    static JOOMLA: OnceLock<Vec<FieldExtractor>> = OnceLock::new();

    match family {
        CmsFamily::WordPress => WORDPRESS.get_or_init(|| {
            vec![
                FieldExtractor::new(ConfigField::Database, PhpAssignment::define("DB_NAME")),
                FieldExtractor::new(ConfigField::User, PhpAssignment::define("DB_USER")),
                FieldExtractor::new(ConfigField::Password, PhpAssignment::define("DB_PASSWORD")),
                FieldExtractor::new(ConfigField::Host, PhpAssignment::define("DB_HOST")),
                FieldExtractor::new(ConfigField::Prefix, PhpAssignment::variable("table_prefix")),
            ]
        }),
        CmsFamily::Joomla => JOOMLA.get_or_init(|| {
            vec![
                FieldExtractor::new(ConfigField::Database, PhpAssignment::property("db")),
                FieldExtractor::new(ConfigField::User, PhpAssignment::property("user")),
                FieldExtractor::new(ConfigField::Password, PhpAssignment::property("password")),
                FieldExtractor::new(ConfigField::Host, PhpAssignment::property("host")),
                FieldExtractor::new(ConfigField::Driver, PhpAssignment::property("dbtype")),
                FieldExtractor::new(ConfigField::Prefix, PhpAssignment::property("dbprefix")),
            ]
        }),
    }
}

/// Connection settings recovered from one configuration file
#[derive(Debug, Clone)]
pub struct ExtractedConfig {
    pub family: CmsFamily,
    pub descriptor: ConnectionDescriptor,
    /// Declared table prefix without its trailing separator
    pub hinted_prefix: Option<String>,
}

impl ExtractedConfig {
    /// Prefix hint for the resolver, when the file declared one
    pub fn hint(&self) -> Option<PrefixHint> {
        self.hinted_prefix.as_ref().map(|prefix| PrefixHint {
            prefix: prefix.clone(),
            family: self.family,
        })
    }
}

/// Reads and extracts the configuration file of `family` from disk.
///
/// Bytes that are not valid UTF-8 (Latin-1 comments or passwords) are
/// replaced rather than rejected; only values containing them are affected.
///
/// # Errors
/// Returns `ConfigRead` if the file cannot be read
pub fn extract_file(family: CmsFamily, path: &Path) -> Result<ExtractedConfig> {
    let bytes = std::fs::read(path).map_err(|source| CmsError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    if matches!(text, std::borrow::Cow::Owned(_)) {
        tracing::warn!(
            "{} contains bytes that are not valid UTF-8; they were replaced",
            path.display()
        );
    }
    tracing::debug!("Read {} configuration from {}", family, path.display());
    Ok(extract(family, &text))
}

/// Extracts connection settings and the hinted prefix from configuration text.
///
/// Keys that are absent leave the descriptor at its family default; a text
/// with no recognized key at all yields a descriptor of defaults. An unknown
/// driver token is recorded on the descriptor and rejected when connecting.
pub fn extract(family: CmsFamily, text: &str) -> ExtractedConfig {
    let mut database = None;
    let mut user = None;
    let mut password = None;
    let mut host = None;
    let mut driver = None;
    let mut prefix = None;

    for extractor in extractors_for(family) {
        let Some(value) = extractor.matcher.find(text) else {
            tracing::debug!("{} configuration has no {:?} key", family, extractor.field);
            continue;
        };
        match extractor.field {
            ConfigField::Database => database = Some(value),
            ConfigField::User => user = Some(value),
            ConfigField::Password => password = Some(value),
            ConfigField::Host => host = Some(value),
            ConfigField::Driver => driver = Some(value),
            ConfigField::Prefix => prefix = Some(value),
        }
    }

    let mut unsupported = None;
    let db_family = match driver {
        Some(token) => match DatabaseFamily::from_driver_token(&token) {
            Ok(family) => family,
            Err(e) => {
                tracing::warn!("{}; connecting will fail", e);
                unsupported = Some(token);
                DatabaseFamily::MySql
            }
        },
        None => DatabaseFamily::MySql,
    };

    let mut descriptor = ConnectionDescriptor::new(db_family);
    if let Some(token) = unsupported {
        descriptor = descriptor.with_unsupported_driver(token);
    }
    if let Some(raw) = host {
        let (host, port) = split_host_port(&raw);
        if !host.is_empty() {
            descriptor = descriptor.with_host(host);
        }
        if let Some(raw_port) = port {
            match raw_port.parse::<u16>() {
                Ok(port) if port > 0 => descriptor = descriptor.with_port(port),
                _ => tracing::warn!(
                    "Ignoring malformed port in database host, using default {}",
                    db_family.default_port()
                ),
            }
        }
    }
    if let Some(database) = database {
        descriptor = descriptor.with_database(database);
    }
    if let Some(user) = user {
        descriptor = descriptor.with_user(user);
    }
    if let Some(password) = password {
        descriptor = descriptor.with_password(password);
    }

    let hinted_prefix = prefix.and_then(|raw| normalize_prefix(&raw));

    tracing::debug!(
        "Extracted {} settings for {} (prefix hint: {:?})",
        family,
        descriptor,
        hinted_prefix
    );

    ExtractedConfig {
        family,
        descriptor,
        hinted_prefix,
    }
}

/// Splits `host[:port]`, `[v6]:port` and bare IPv6 literals.
///
/// The port part is returned raw so the caller decides how to treat a
/// malformed value (such as a socket path).
fn split_host_port(raw: &str) -> (String, Option<&str>) {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix('[')
        && let Some((host, after)) = rest.split_once(']')
    {
        return (host.to_string(), after.strip_prefix(':'));
    }
    match raw.matches(':').count() {
        1 => {
            let (host, port) = raw.split_once(':').unwrap_or((raw, ""));
            (host.to_string(), Some(port))
        }
        _ => (raw.to_string(), None),
    }
}

/// Declared prefixes carry their separator (`wp_`); resolution works without it.
fn normalize_prefix(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let prefix = trimmed.strip_suffix('_').unwrap_or(trimmed);
    (!prefix.is_empty()).then(|| prefix.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("localhost"), ("localhost".to_string(), None));
        assert_eq!(
            split_host_port("db.example.com:3307"),
            ("db.example.com".to_string(), Some("3307"))
        );
        assert_eq!(
            split_host_port("localhost:/var/run/mysqld/mysqld.sock"),
            ("localhost".to_string(), Some("/var/run/mysqld/mysqld.sock"))
        );
        assert_eq!(
            split_host_port("[::1]:5433"),
            ("::1".to_string(), Some("5433"))
        );
        assert_eq!(split_host_port("[::1]"), ("::1".to_string(), None));
        assert_eq!(split_host_port("fe80::1"), ("fe80::1".to_string(), None));
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("wp_"), Some("wp".to_string()));
        assert_eq!(normalize_prefix("rq5bl_"), Some("rq5bl".to_string()));
        assert_eq!(normalize_prefix("jos"), Some("jos".to_string()));
        assert_eq!(normalize_prefix("_"), None);
        assert_eq!(normalize_prefix(""), None);
    }

    #[test]
    fn test_extractor_tables_cover_expected_fields() {
        let wordpress: Vec<_> = extractors_for(CmsFamily::WordPress)
            .iter()
            .map(|e| e.field)
            .collect();
        assert!(!wordpress.contains(&ConfigField::Driver));
        assert!(wordpress.contains(&ConfigField::Prefix));

        let joomla: Vec<_> = extractors_for(CmsFamily::Joomla)
            .iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(joomla.len(), 6);
    }
}
