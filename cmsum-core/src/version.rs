//! Product version resolution from version-descriptor files.
//!
//! Installations keep their version in PHP source files whose location and
//! layout changed across releases. The resolver walks an explicit prioritized
//! list of `(path, scheme)` pairs, commits to the first readable file, and
//! parses it with that file's scheme.

use crate::error::CmsError;
use crate::models::CmsFamily;
use crate::Result;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;

/// Layout of a version-descriptor file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScheme {
    /// Joomla `Version` class: property-style, then constant-style layouts
    JoomlaClass,
    /// WordPress `$wp_version` global
    WordPressGlobal,
}

/// One candidate version-descriptor location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionSource {
    /// Path relative to the installation root
    pub path: &'static str,
    pub scheme: VersionScheme,
}

const JOOMLA_SOURCES: [VersionSource; 3] = [
    // 1.5
    VersionSource {
        path: "libraries/joomla/version.php",
        scheme: VersionScheme::JoomlaClass,
    },
    // 2.5 and 3.x
    VersionSource {
        path: "libraries/cms/version/version.php",
        scheme: VersionScheme::JoomlaClass,
    },
    // 3.8 onwards
    VersionSource {
        path: "libraries/src/Version.php",
        scheme: VersionScheme::JoomlaClass,
    },
];

const WORDPRESS_SOURCES: [VersionSource; 1] = [VersionSource {
    path: "wp-includes/version.php",
    scheme: VersionScheme::WordPressGlobal,
}];

impl VersionSource {
    /// Candidate locations for a family, oldest dialect first.
    pub fn for_family(family: CmsFamily) -> &'static [VersionSource] {
        match family {
            CmsFamily::WordPress => &WORDPRESS_SOURCES,
            CmsFamily::Joomla => &JOOMLA_SOURCES,
        }
    }
}

/// A resolved product version.
///
/// The display string is assembled once by the scheme that parsed the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDescriptor {
    release: String,
    patch: Option<String>,
    status: Option<String>,
    release_date: Option<String>,
    extra: Option<String>,
    display: String,
}

impl VersionDescriptor {
    /// Release identifier (`3.10`, `4.4`, `6.4.2`)
    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn patch(&self) -> Option<&str> {
        self.patch.as_deref()
    }

    /// Development status or release type (`Stable`)
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn release_date(&self) -> Option<&str> {
        self.release_date.as_deref()
    }

    pub fn extra(&self) -> Option<&str> {
        self.extra.as_deref()
    }

    /// Normalized version string, e.g. `3.10.6 (Stable)`
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Leading numeric component of the display string.
    pub fn major(&self) -> Option<u32> {
        let digits: String = self
            .display
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }

    /// `release[.patch][ (status)]`
    fn three_field(
        release: String,
        patch: Option<String>,
        status: Option<String>,
        release_date: Option<String>,
    ) -> Self {
        let mut display = release.clone();
        if let Some(patch) = &patch {
            display.push('.');
            display.push_str(patch);
        }
        if let Some(status) = &status {
            display.push_str(&format!(" ({})", status));
        }
        Self {
            release,
            patch,
            status,
            release_date,
            extra: None,
            display,
        }
    }

    /// `major.minor[.patch][-extra]`, a zero patch is omitted
    fn four_field(
        major: u32,
        minor: u32,
        patch: Option<u32>,
        extra: Option<String>,
        status: Option<String>,
        release_date: Option<String>,
    ) -> Self {
        let release = format!("{}.{}", major, minor);
        let patch = patch.filter(|p| *p != 0).map(|p| p.to_string());
        let mut display = release.clone();
        if let Some(patch) = &patch {
            display.push('.');
            display.push_str(patch);
        }
        if let Some(extra) = &extra {
            display.push('-');
            display.push_str(extra);
        }
        Self {
            release,
            patch,
            status,
            release_date,
            extra,
            display,
        }
    }

    fn verbatim(release: String) -> Self {
        Self {
            display: release.clone(),
            release,
            patch: None,
            status: None,
            release_date: None,
            extra: None,
        }
    }
}

impl std::fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display)
    }
}

/// Resolves the installation version under `root`.
///
/// # Errors
/// Returns `VersionUnresolvable` if no candidate file is readable, or if the
/// first readable one yields no release identifier
pub fn resolve(root: &Path, sources: &[VersionSource]) -> Result<VersionDescriptor> {
    for source in sources {
        let path = root.join(source.path);
        match std::fs::read(&path) {
            Ok(bytes) => {
                // Legacy headers carry Latin-1 bytes; decoding must not skip the file
                let contents = String::from_utf8_lossy(&bytes);
                tracing::debug!("Reading version from {}", path.display());
                let version = parse(&contents, source.scheme).ok_or_else(|| {
                    CmsError::version_unresolvable(format!(
                        "no release identifier in {}",
                        source.path
                    ))
                })?;
                tracing::info!("Resolved version {}", version);
                return Ok(version);
            }
            Err(e) => {
                tracing::trace!("Version candidate {} not readable: {}", path.display(), e);
            }
        }
    }

    Err(CmsError::version_unresolvable(format!(
        "none of {} candidate files is readable",
        sources.len()
    )))
}

/// Parses the contents of one version-descriptor file.
pub fn parse(contents: &str, scheme: VersionScheme) -> Option<VersionDescriptor> {
    match scheme {
        VersionScheme::JoomlaClass => parse_property_style(contents)
            .or_else(|| parse_constant_style(contents)),
        VersionScheme::WordPressGlobal => {
            capture(&patterns().wp_version, contents).map(VersionDescriptor::verbatim)
        }
    }
}

/// `var $RELEASE = '1.5';` / `public $RELEASE = '2.5';`
fn parse_property_style(contents: &str) -> Option<VersionDescriptor> {
    let p = patterns();
    let release = capture(&p.property_release, contents)?;
    Some(VersionDescriptor::three_field(
        release,
        capture(&p.property_dev_level, contents),
        capture(&p.property_dev_status, contents),
        capture(&p.property_reldate, contents),
    ))
}

/// `const RELEASE = '3.10';`, falling back to the numeric `MAJOR_VERSION` layout.
fn parse_constant_style(contents: &str) -> Option<VersionDescriptor> {
    let p = patterns();
    let status = capture(&p.const_status, contents);
    let release_date = capture(&p.const_reldate, contents);

    if let Some(release) = capture(&p.const_release, contents) {
        return Some(VersionDescriptor::three_field(
            release,
            capture(&p.const_dev_level, contents),
            status,
            release_date,
        ));
    }

    let major = capture(&p.const_major, contents)?.parse().ok()?;
    let minor = capture(&p.const_minor, contents)
        .and_then(|m| m.parse().ok())
        .unwrap_or(0);
    let patch = capture(&p.const_patch, contents).and_then(|m| m.parse().ok());
    let extra = capture(&p.const_extra, contents);
    Some(VersionDescriptor::four_field(
        major,
        minor,
        patch,
        extra,
        status,
        release_date,
    ))
}

/// First capture group, with empty values treated as absent.
fn capture(regex: &Regex, contents: &str) -> Option<String> {
    regex
        .captures(contents)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Pre-compiled version patterns.
struct VersionPatterns {
    property_release: Regex,
    property_dev_level: Regex,
    property_dev_status: Regex,
    property_reldate: Regex,
    const_release: Regex,
    const_dev_level: Regex,
    const_status: Regex,
    const_reldate: Regex,
    const_major: Regex,
    const_minor: Regex,
    const_patch: Regex,
    const_extra: Regex,
    wp_version: Regex,
}

fn patterns() -> &'static VersionPatterns {
    static PATTERNS: OnceLock<VersionPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let property = |name: &str| {
            compile(&format!(
                r#"(?:public|var)\s+\${}\s*=\s*['"]([^'"]*)['"]\s*;"#,
                name
            ))
        };
        let string_const = |names: &str| {
            compile(&format!(
                r#"const\s+(?:{})\s*=\s*['"]([^'"]*)['"]\s*;"#,
                names
            ))
        };
        let numeric_const = |name: &str| compile(&format!(r"const\s+{}\s*=\s*(\d+)\s*;", name));

        VersionPatterns {
            property_release: property("RELEASE"),
            property_dev_level: property("DEV_LEVEL"),
            property_dev_status: property("DEV_STATUS"),
            property_reldate: property("RELDATE"),
            const_release: string_const("RELEASE"),
            const_dev_level: string_const("DEV_LEVEL"),
            const_status: string_const("DEV_STATUS|RELTYPE"),
            const_reldate: string_const("RELDATE"),
            const_major: numeric_const("MAJOR_VERSION"),
            const_minor: numeric_const("MINOR_VERSION"),
            const_patch: numeric_const("PATCH_VERSION"),
            const_extra: string_const("EXTRA_VERSION"),
            wp_version: compile(r#"\$wp_version\s*=\s*['"]([^'"]+)['"]\s*;"#),
        }
    })
}

fn compile(pattern: &str) -> Regex {
    #[allow(clippy::expect_used)]
    Regex::new(pattern).expect("Invalid version pattern")
}
