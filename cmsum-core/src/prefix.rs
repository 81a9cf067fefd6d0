//! Table-prefix resolution.
//!
//! A shared database can host several CMS installations side by side. This
//! module groups a raw table listing by prefix and decides which groups form
//! a genuine installation of a supported family.
//!
//! # Resolution Rules
//! - A table matches at most the first suffix rule that fits it
//! - `users` is required for every family
//! - WordPress needs `posts`; Joomla needs a group-map or group table
//! - A prefix matching both shapes is reported under both families
//! - A prefix declared by the configuration file is kept even when the
//!   listing does not confirm it

use crate::error::CmsError;
use crate::models::{CmsFamily, CompanionKind, PresenceFlags, ResolvedInstallation};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Suffix rules in matching order
pub const SUFFIX_RULES: [CompanionKind; 4] = [
    CompanionKind::Users,
    CompanionKind::Posts,
    CompanionKind::UserGroupMap,
    CompanionKind::UserGroups,
];

/// Prefix declared by a configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixHint {
    pub prefix: String,
    pub family: CmsFamily,
}

/// Outcome of one resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefixResolution {
    /// Installations sorted by (prefix, family)
    pub installations: Vec<ResolvedInstallation>,
    /// Single installation to act on when the caller does not choose one
    pub default: Option<ResolvedInstallation>,
}

impl PrefixResolution {
    /// True when no installation was found
    pub fn is_empty(&self) -> bool {
        self.installations.is_empty()
    }

    /// Returns the installations, or `PrefixResolutionEmpty` when there are none.
    pub fn installations_or_err(&self) -> Result<&[ResolvedInstallation]> {
        if self.installations.is_empty() {
            return Err(CmsError::PrefixResolutionEmpty);
        }
        Ok(&self.installations)
    }

    /// Picks the installation to act on.
    ///
    /// An explicit `prefix` wins; otherwise the default is used.
    ///
    /// # Errors
    /// Returns `PrefixResolutionEmpty` when nothing was resolved, and
    /// `Configuration` when the choice is ambiguous or the prefix is unknown
    pub fn select(&self, prefix: Option<&str>) -> Result<&ResolvedInstallation> {
        let installations = self.installations_or_err()?;
        match prefix {
            Some(wanted) => {
                let mut matches = installations.iter().filter(|i| i.prefix == wanted);
                let first = matches.next().ok_or_else(|| {
                    CmsError::configuration(format!("No installation with prefix '{}'", wanted))
                })?;
                if matches.next().is_some() {
                    return Err(CmsError::configuration(format!(
                        "Prefix '{}' matches both WordPress and Joomla table shapes",
                        wanted
                    )));
                }
                Ok(first)
            }
            None => self.default.as_ref().ok_or_else(|| {
                CmsError::configuration(format!(
                    "{} installations found, choose one with --prefix",
                    installations.len()
                ))
            }),
        }
    }
}

/// Returns true when `prefix` can be interpolated into a table identifier.
pub fn is_safe_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Resolves installation prefixes from a table listing.
///
/// The per-prefix flags map is built for this call only and dropped on return.
pub fn resolve<S: AsRef<str>>(tables: &[S], hint: Option<&PrefixHint>) -> PrefixResolution {
    let mut candidates: BTreeMap<String, PresenceFlags> = BTreeMap::new();

    for table in tables {
        let table = table.as_ref();
        let Some((prefix, kind)) = classify_table(table) else {
            continue;
        };
        if !is_safe_prefix(prefix) {
            tracing::warn!("Skipping table '{}': prefix is not a plain identifier", table);
            continue;
        }
        candidates.entry(prefix.to_string()).or_default().insert(kind);
    }

    tracing::debug!(
        "Scanned {} tables into {} prefix candidates",
        tables.len(),
        candidates.len()
    );

    let mut installations = Vec::new();
    for (prefix, flags) in &candidates {
        if !flags.users {
            tracing::trace!("Discarding prefix '{}': no users table", prefix);
            continue;
        }
        if flags.is_wordpress_shaped() {
            installations.push(ResolvedInstallation {
                prefix: prefix.clone(),
                family: CmsFamily::WordPress,
                companions: *flags,
                hinted: false,
            });
        }
        if flags.is_joomla_shaped() {
            installations.push(ResolvedInstallation {
                prefix: prefix.clone(),
                family: CmsFamily::Joomla,
                companions: *flags,
                hinted: false,
            });
        }
        if flags.is_wordpress_shaped() && flags.is_joomla_shaped() {
            tracing::warn!(
                "Prefix '{}' matches both WordPress and Joomla table shapes",
                prefix
            );
        }
    }

    let mut default = None;
    if let Some(hint) = hint {
        let existing = installations
            .iter()
            .find(|i| i.prefix == hint.prefix && i.family == hint.family)
            .cloned();
        match existing {
            Some(installation) => default = Some(installation),
            None => {
                tracing::warn!(
                    "Configured prefix '{}' is not confirmed by the table listing, keeping it",
                    hint.prefix
                );
                let installation = ResolvedInstallation {
                    prefix: hint.prefix.clone(),
                    family: hint.family,
                    companions: PresenceFlags::assumed_for(hint.family),
                    hinted: true,
                };
                installations.push(installation.clone());
                default = Some(installation);
            }
        }
    }

    installations.sort_by(|a, b| (&a.prefix, a.family).cmp(&(&b.prefix, b.family)));

    if default.is_none() && installations.len() == 1 {
        default = installations.first().cloned();
    }

    tracing::info!(
        "Resolved {} installation(s): {}",
        installations.len(),
        installations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    PrefixResolution {
        installations,
        default,
    }
}

/// Applies the suffix rules to one table name.
fn classify_table(table: &str) -> Option<(&str, CompanionKind)> {
    SUFFIX_RULES.iter().find_map(|kind| {
        table
            .strip_suffix(kind.suffix())
            .filter(|prefix| !prefix.is_empty())
            .map(|prefix| (prefix, *kind))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn families(resolution: &PrefixResolution) -> Vec<(&str, CmsFamily)> {
        resolution
            .installations
            .iter()
            .map(|i| (i.prefix.as_str(), i.family))
            .collect()
    }

    #[test]
    fn test_classify_table_first_rule_wins() {
        assert_eq!(
            classify_table("wp_users"),
            Some(("wp", CompanionKind::Users))
        );
        assert_eq!(
            classify_table("jos_user_usergroup_map"),
            Some(("jos", CompanionKind::UserGroupMap))
        );
        assert_eq!(
            classify_table("jos_usergroups"),
            Some(("jos", CompanionKind::UserGroups))
        );
        assert_eq!(classify_table("wp_usermeta"), None);
        assert_eq!(classify_table("_users"), None);
        assert_eq!(classify_table("users"), None);
    }

    #[test]
    fn test_wordpress_installation() {
        let tables = ["wp_users", "wp_usermeta", "wp_posts", "wp_options"];
        let resolution = resolve(&tables, None);
        assert_eq!(families(&resolution), vec![("wp", CmsFamily::WordPress)]);
        assert_eq!(
            resolution.default.as_ref().map(|i| i.prefix.as_str()),
            Some("wp")
        );
    }

    #[test]
    fn test_joomla_installation_with_full_companions() {
        let tables = ["jos_users", "jos_user_usergroup_map", "jos_usergroups"];
        let resolution = resolve(&tables, None);
        assert_eq!(families(&resolution), vec![("jos", CmsFamily::Joomla)]);
        let companions = resolution.installations[0].companions;
        assert!(companions.user_group_map && companions.user_groups);
    }

    #[test]
    fn test_joomla_requires_a_group_table() {
        let resolution = resolve(&["jos_users", "jos_content"], None);
        assert!(resolution.is_empty());

        let resolution = resolve(&["jos_users", "jos_usergroups"], None);
        assert_eq!(families(&resolution), vec![("jos", CmsFamily::Joomla)]);
    }

    #[test]
    fn test_users_anchor_is_required() {
        let resolution = resolve(&["p_user_usergroup_map", "p_usergroups", "p_posts"], None);
        assert!(resolution.is_empty());
        assert!(matches!(
            resolution.installations_or_err(),
            Err(CmsError::PrefixResolutionEmpty)
        ));
    }

    #[test]
    fn test_side_by_side_installations_sorted() {
        let tables = [
            "zz_users",
            "zz_posts",
            "jos_users",
            "jos_usergroups",
            "jos_user_usergroup_map",
            "wp_users",
            "wp_posts",
        ];
        let resolution = resolve(&tables, None);
        assert_eq!(
            families(&resolution),
            vec![
                ("jos", CmsFamily::Joomla),
                ("wp", CmsFamily::WordPress),
                ("zz", CmsFamily::WordPress),
            ]
        );
        assert!(resolution.default.is_none());
    }

    #[test]
    fn test_ambiguous_prefix_surfaces_both_families() {
        let tables = ["x_users", "x_posts", "x_usergroups"];
        let resolution = resolve(&tables, None);
        assert_eq!(
            families(&resolution),
            vec![("x", CmsFamily::WordPress), ("x", CmsFamily::Joomla)]
        );
        assert!(resolution.select(Some("x")).is_err());
    }

    #[test]
    fn test_prefixes_are_case_sensitive() {
        let tables = ["WP_users", "WP_posts", "wp_users", "wp_posts"];
        let resolution = resolve(&tables, None);
        assert_eq!(
            families(&resolution),
            vec![("WP", CmsFamily::WordPress), ("wp", CmsFamily::WordPress)]
        );
    }

    #[test]
    fn test_hint_absent_from_listing_is_retained() {
        let hint = PrefixHint {
            prefix: "rq5bl".to_string(),
            family: CmsFamily::Joomla,
        };
        let resolution = resolve(&["wp_users", "wp_posts"], Some(&hint));

        assert_eq!(
            families(&resolution),
            vec![("rq5bl", CmsFamily::Joomla), ("wp", CmsFamily::WordPress)]
        );
        let default = resolution.default.as_ref().unwrap();
        assert_eq!(default.prefix, "rq5bl");
        assert!(default.hinted);
        assert_eq!(
            default.companions,
            PresenceFlags::assumed_for(CmsFamily::Joomla)
        );
    }

    #[test]
    fn test_hint_confirmed_by_listing_becomes_default() {
        let hint = PrefixHint {
            prefix: "wp".to_string(),
            family: CmsFamily::WordPress,
        };
        let tables = ["wp_users", "wp_posts", "blog_users", "blog_posts"];
        let resolution = resolve(&tables, Some(&hint));

        assert_eq!(resolution.installations.len(), 2);
        let default = resolution.select(None).unwrap();
        assert_eq!(default.prefix, "wp");
        assert!(!default.hinted);
    }

    #[test]
    fn test_unsafe_prefixes_are_skipped() {
        let tables = ["x; DROP TABLE y_users", "x; DROP TABLE y_posts"];
        assert!(resolve(&tables, None).is_empty());
    }

    #[test]
    fn test_select_by_prefix() {
        let tables = ["a_users", "a_posts", "b_users", "b_usergroups"];
        let resolution = resolve(&tables, None);

        assert_eq!(resolution.select(Some("b")).unwrap().family, CmsFamily::Joomla);
        assert!(resolution.select(Some("c")).is_err());
        assert!(resolution.select(None).is_err());
    }
}
