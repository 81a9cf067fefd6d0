//! Configuration extraction tests over installation-root fixtures.
//!
//! This test suite covers:
//! - WordPress `define()` constants and `$table_prefix`
//! - Joomla 1.5 (`var`) and 2.5+ (`public`) configuration classes
//! - Host/port splitting, driver aliases and defaults
//! - Read failures, non-UTF-8 bytes and unknown drivers
//! - Commented-out assignments

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

use cmsum_core::config::{extract, extract_file};
use cmsum_core::{CmsConnection, CmsError, CmsFamily, DatabaseFamily, PrefixHint};
use std::fs;

const WP_CONFIG: &str = r#"<?php
/** The name of the database for WordPress */
define( 'DB_NAME', 'wordpress' );
define( 'DB_USER', 'wp_admin' );
define( "DB_PASSWORD", 'p@ss\'word' );
define( 'DB_HOST', 'db.internal:3307' );
define( 'DB_CHARSET', 'utf8mb4' );

$table_prefix = 'wp_';

require_once ABSPATH . 'wp-settings.php';
"#;

const JOOMLA_25_CONFIG: &str = r#"<?php
class JConfig {
	public $offline = '0';
	public $dbtype = 'pgsql';
	public $host = 'localhost';
	public $user = 'joomla';
	public $password = 'secret';
	public $db = 'joomla_site';
	public $dbprefix = 'rq5bl_';
	public $live_site = '';
}
"#;

const JOOMLA_15_CONFIG: &str = r#"<?php
class JConfig {
	var $dbtype = 'mysqli';
	var $host = 'localhost:/var/run/mysqld/mysqld.sock';
	var $user = 'j15';
	var $password = '';
	var $db = 'j15_site';
	var $dbprefix = 'jos_';
}
"#;

#[test]
fn test_wordpress_config_file() {
    let root = tempfile::tempdir().unwrap();
    let path = root.path().join(CmsFamily::WordPress.config_file_name());
    fs::write(&path, WP_CONFIG);

    let config = extract_file(CmsFamily::WordPress, &path).unwrap();
    let descriptor = &config.descriptor;
    assert_eq!(descriptor.family, DatabaseFamily::MySql);
    assert_eq!(descriptor.host, "db.internal");
    assert_eq!(descriptor.port, 3307);
    assert_eq!(descriptor.user, "wp_admin");
    assert_eq!(descriptor.password(), "p@ss'word");
    assert_eq!(descriptor.database, "wordpress");
    assert_eq!(
        config.hint(),
        Some(PrefixHint {
            prefix: "wp".to_string(),
            family: CmsFamily::WordPress,
        })
    );
}

#[test]
fn test_joomla_25_config() {
    let config = extract(CmsFamily::Joomla, JOOMLA_25_CONFIG);
    let descriptor = &config.descriptor;
    assert_eq!(descriptor.family, DatabaseFamily::Postgres);
    assert_eq!(descriptor.port, 5432);
    assert_eq!(descriptor.user, "joomla");
    assert_eq!(descriptor.database, "joomla_site");
    assert_eq!(config.hinted_prefix.as_deref(), Some("rq5bl"));
}

#[test]
fn test_joomla_15_config_with_socket_host() {
    let config = extract(CmsFamily::Joomla, JOOMLA_15_CONFIG);
    let descriptor = &config.descriptor;
    assert_eq!(descriptor.family, DatabaseFamily::MySql);
    assert_eq!(descriptor.host, "localhost");
    assert_eq!(descriptor.port, 3306, "malformed port falls back to the default");
    assert!(!descriptor.has_password());
    assert_eq!(config.hinted_prefix.as_deref(), Some("jos"));
}

#[test]
fn test_empty_text_yields_defaults() {
    let config = extract(CmsFamily::Joomla, "<?php // nothing here");
    assert_eq!(config.descriptor.family, DatabaseFamily::MySql);
    assert_eq!(config.descriptor.host, "localhost");
    assert_eq!(config.descriptor.port, 3306);
    assert!(config.descriptor.database.is_empty());
    assert!(config.hint().is_none());
}

#[tokio::test]
async fn test_unknown_driver_keeps_hint_and_fails_on_connect() {
    let text = "public $dbtype = 'sqlsrv';\npublic $db = 'site';\npublic $dbprefix = 'jos_';";
    let config = extract(CmsFamily::Joomla, text);
    assert_eq!(config.hinted_prefix.as_deref(), Some("jos"));
    assert_eq!(config.descriptor.database, "site");
    assert_eq!(config.descriptor.unsupported_driver(), Some("sqlsrv"));

    let err = CmsConnection::connect(&config.descriptor).await.unwrap_err();
    assert!(
        matches!(err, CmsError::UnsupportedFamily { ref token } if token == "sqlsrv"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn test_latin1_bytes_do_not_fail_extraction() {
    let root = tempfile::tempdir().unwrap();
    let path = root.path().join(CmsFamily::WordPress.config_file_name());
    let mut bytes = b"<?php\n// Gr\xfc\xdfe aus M\xfcnchen\n".to_vec();
    bytes.extend_from_slice(WP_CONFIG.trim_start_matches("<?php\n").as_bytes());
    fs::write(&path, bytes).unwrap();

    let config = extract_file(CmsFamily::WordPress, &path).unwrap();
    assert_eq!(config.descriptor.database, "wordpress");
    assert_eq!(config.descriptor.user, "wp_admin");
    assert_eq!(config.hinted_prefix.as_deref(), Some("wp"));
}

#[test]
fn test_latin1_password_is_read() {
    let root = tempfile::tempdir().unwrap();
    let path = root.path().join(CmsFamily::Joomla.config_file_name());
    fs::write(
        &path,
        b"<?php\nclass JConfig {\n\tpublic $password = 'p\xe4ss';\n\tpublic $db = 'site';\n}\n",
    )
    .unwrap();

    let config = extract_file(CmsFamily::Joomla, &path).unwrap();
    assert_eq!(config.descriptor.database, "site");
    assert!(config.descriptor.has_password());
}

#[test]
fn test_commented_out_assignments_are_skipped() {
    let text = r#"<?php
// define( 'DB_NAME', 'old_site' );
/*
 * define( 'DB_USER', 'old_user' );
 */
# $table_prefix = 'old_';
define( 'DB_NAME', 'wordpress' );
define( 'DB_USER', 'wp_admin' ); // define( 'DB_HOST', 'old-host' );
$table_prefix = 'wp_';
"#;
    let config = extract(CmsFamily::WordPress, text);
    assert_eq!(config.descriptor.database, "wordpress");
    assert_eq!(config.descriptor.user, "wp_admin");
    assert_eq!(config.descriptor.host, "localhost");
    assert_eq!(config.hinted_prefix.as_deref(), Some("wp"));
}

#[test]
fn test_missing_file_is_config_read_error() {
    let root = tempfile::tempdir().unwrap();
    let path = root.path().join("wp-config.php");
    let err = extract_file(CmsFamily::WordPress, &path).unwrap_err();
    assert!(matches!(err, CmsError::ConfigRead { .. }));
    assert!(err.to_string().contains("wp-config.php"));
}

#[test]
fn test_password_never_rendered() {
    let config = extract(CmsFamily::Joomla, JOOMLA_25_CONFIG);
    let rendered = format!("{:?} {}", config, config.descriptor);
    assert!(!rendered.contains("secret"), "{}", rendered);
}
