//! Rendering of command results as text tables or JSON documents.
//!
//! JSON documents carry a `generated_at` timestamp next to the command's
//! own fields; text output is meant for terminals and is not stable.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use cmsum_core::{
    CmsFamily, DatabaseFamily, ResolvedInstallation, UpdateOutcome, UserRecord, VersionDescriptor,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Result of the `info` command
#[derive(Debug, Serialize)]
pub struct InfoReport {
    pub root: PathBuf,
    /// Families whose configuration file exists in the root
    pub detected: Vec<CmsFamily>,
    /// Family whose configuration was read
    pub family: CmsFamily,
    pub database: DatabaseFamily,
    /// Redacted connection target
    pub target: String,
    pub installations: Vec<InstallationView>,
    pub version: Option<VersionDescriptor>,
}

/// One resolved installation as shown to the user
#[derive(Debug, Serialize)]
pub struct InstallationView {
    pub prefix: String,
    pub family: CmsFamily,
    pub hinted: bool,
    pub default: bool,
}

impl InstallationView {
    pub fn new(installation: &ResolvedInstallation, default: Option<&ResolvedInstallation>) -> Self {
        Self {
            prefix: installation.prefix.clone(),
            family: installation.family,
            hinted: installation.hinted,
            default: default == Some(installation),
        }
    }
}

/// Result of the `users` command
#[derive(Debug, Serialize)]
pub struct UsersReport {
    pub users: Vec<UserRecord>,
}

/// Result of the `families` command
#[derive(Debug, Serialize)]
pub struct FamiliesReport {
    pub cms: Vec<FamilyView>,
    pub databases: Vec<DatabaseFamily>,
}

#[derive(Debug, Serialize)]
pub struct FamilyView {
    pub family: CmsFamily,
    pub config_file: &'static str,
}

impl FamiliesReport {
    pub fn supported() -> Self {
        Self {
            cms: CmsFamily::ALL
                .into_iter()
                .map(|family| FamilyView {
                    family,
                    config_file: family.config_file_name(),
                })
                .collect(),
            databases: vec![DatabaseFamily::MySql, DatabaseFamily::Postgres],
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    body: &'a T,
}

/// Serializes a report with its generation timestamp.
///
/// # Errors
/// Returns error if the report cannot be serialized
pub fn to_json<T: Serialize>(body: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Envelope {
        generated_at: Utc::now(),
        body,
    })
}

pub fn render_info(report: &InfoReport) -> String {
    let mut out = String::new();
    let detected: Vec<String> = report.detected.iter().map(ToString::to_string).collect();
    let _ = writeln!(out, "Root:       {}", report.root.display());
    let _ = writeln!(out, "Detected:   {}", detected.join(", "));
    let _ = writeln!(out, "Config:     {} ({})", report.family, report.family.config_file_name());
    let _ = writeln!(out, "Database:   {} at {}", report.database, report.target);
    let _ = writeln!(
        out,
        "Version:    {}",
        report
            .version
            .as_ref()
            .map_or("unknown", VersionDescriptor::display)
    );
    let _ = writeln!(out, "Installations:");
    if report.installations.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for installation in &report.installations {
        let mut notes = Vec::new();
        if installation.default {
            notes.push("default");
        }
        if installation.hinted {
            notes.push("from configuration");
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" [{}]", notes.join(", "))
        };
        let _ = writeln!(
            out,
            "  {:<12} {}{}",
            installation.prefix, installation.family, notes
        );
    }
    out
}

/// Renders users as an aligned table.
pub fn render_users(users: &[UserRecord]) -> String {
    const HEADER: [&str; 6] = ["PREFIX", "ID", "USERNAME", "NAME", "EMAIL", "ROLES"];

    let rows: Vec<[String; 6]> = users
        .iter()
        .map(|user| {
            [
                user.prefix.clone(),
                user.id.to_string(),
                user.username.clone(),
                user.display_name.clone(),
                user.email.clone(),
                user.roles.iter().cloned().collect::<Vec<_>>().join(", "),
            ]
        })
        .collect();

    let mut widths = HEADER.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADER.map(str::to_string), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    let _ = writeln!(out, "{} user(s)", users.len());
    out
}

fn push_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    let _ = writeln!(out, "{}", line.join("  ").trim_end());
}

pub fn render_outcome(outcome: &UpdateOutcome) -> String {
    if outcome.is_noop() {
        format!("No changes for '{}'\n", outcome.username)
    } else {
        format!(
            "Updated '{}' (id {}): {}\n",
            outcome.username,
            outcome.id,
            outcome.written.join(", ")
        )
    }
}

pub fn render_families(report: &FamiliesReport) -> String {
    let mut out = String::from("Supported CMS families:\n");
    for view in &report.cms {
        let _ = writeln!(out, "  - {} ({})", view.family, view.config_file);
    }
    out.push_str("Supported databases:\n");
    for database in &report.databases {
        let _ = writeln!(out, "  - {}", database);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn user(prefix: &str, id: i64, username: &str, roles: &[&str]) -> UserRecord {
        UserRecord {
            id,
            username: username.to_string(),
            display_name: format!("{} name", username),
            email: format!("{}@example.com", username),
            roles: roles.iter().map(|r| r.to_string()).collect::<BTreeSet<_>>(),
            profile: BTreeMap::new(),
            prefix: prefix.to_string(),
            family: CmsFamily::Joomla,
        }
    }

    #[test]
    fn test_render_users_aligns_columns() {
        let users = vec![
            user("jos", 42, "alice", &["Registered"]),
            user("jos", 43, "bob", &["Author", "Super Users"]),
        ];
        let rendered = render_users(&users);
        let lines: Vec<&str> = rendered.lines().collect();

        assert!(lines[0].starts_with("PREFIX  ID  USERNAME"));
        assert!(lines[1].starts_with("jos     42  alice   "));
        assert!(lines[2].ends_with("Author, Super Users"));
        assert_eq!(lines[3], "2 user(s)");
    }

    #[test]
    fn test_json_envelope_has_timestamp() {
        let report = UsersReport {
            users: vec![user("jos", 42, "alice", &[])],
        };
        let json: serde_json::Value = serde_json::from_str(&to_json(&report).unwrap()).unwrap();
        assert!(json["generated_at"].is_string());
        assert_eq!(json["users"][0]["username"], "alice");
    }

    #[test]
    fn test_render_outcome() {
        let outcome = UpdateOutcome {
            id: 1,
            username: "admin".to_string(),
            written: vec!["email".to_string(), "roles".to_string()],
        };
        assert_eq!(render_outcome(&outcome), "Updated 'admin' (id 1): email, roles\n");

        let noop = UpdateOutcome {
            written: Vec::new(),
            ..outcome
        };
        assert_eq!(render_outcome(&noop), "No changes for 'admin'\n");
    }

    #[test]
    fn test_render_families() {
        let rendered = render_families(&FamiliesReport::supported());
        assert!(rendered.contains("WordPress (wp-config.php)"));
        assert!(rendered.contains("Joomla (configuration.php)"));
        assert!(rendered.contains("PostgreSQL"));
    }
}
