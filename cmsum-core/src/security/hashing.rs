//! Version-conditioned password hashing.
//!
//! Each CMS family switched hashing schemes at a known major release. The
//! hasher picks the scheme the detected installation can verify, falling back
//! to the oldest dialect when the version is unknown.

use crate::error::CmsError;
use crate::models::CmsFamily;
use crate::version::VersionDescriptor;
use crate::Result;
use md5::{Digest, Md5};
use rand::Rng;
use zeroize::Zeroizing;

/// bcrypt work factor written for adaptive hashes
pub const ADAPTIVE_COST: u32 = 10;

/// Length of the random salt appended to legacy digests
pub const LEGACY_SALT_LENGTH: usize = 32;

/// First Joomla major release that verifies bcrypt hashes only
const JOOMLA_ADAPTIVE_MAJOR: u32 = 4;

/// Password hashing schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// `md5(cleartext ‖ salt)` hex digest, stored as `digest:salt`
    LegacySaltedDigest,
    /// bcrypt with the `$2y$` prefix
    AdaptiveSaltedHash,
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LegacySaltedDigest => write!(f, "salted MD5"),
            Self::AdaptiveSaltedHash => write!(f, "bcrypt"),
        }
    }
}

/// An encoded password hash ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashResult {
    pub algorithm: HashAlgorithm,
    pub encoded: String,
}

/// Hashes passwords the way one CMS family expects.
///
/// # Example
/// ```rust
/// use cmsum_core::models::CmsFamily;
/// use cmsum_core::security::{CredentialHasher, HashAlgorithm};
///
/// let hasher = CredentialHasher::for_family(CmsFamily::Joomla);
/// let result = hasher.hash_for_major("correct horse", Some(3)).unwrap();
///
/// assert_eq!(result.algorithm, HashAlgorithm::LegacySaltedDigest);
/// assert!(hasher.verify("correct horse", &result).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialHasher {
    family: CmsFamily,
    adaptive_from_major: u32,
}

impl CredentialHasher {
    /// Hasher with the adaptive-hash threshold of `family`.
    ///
    /// Joomla switches from the legacy `digest:salt` encoding to bcrypt at
    /// major version 4, so majors 1 to 3 get the legacy digest. WordPress
    /// has no legacy branch: every release verifies `$2y$` hashes, so even
    /// major 2 (or an unknown version) gets bcrypt.
    pub fn for_family(family: CmsFamily) -> Self {
        let adaptive_from_major = match family {
            // phpass falls through to crypt() for `$2y$` since 2.5
            CmsFamily::WordPress => 0,
            CmsFamily::Joomla => JOOMLA_ADAPTIVE_MAJOR,
        };
        Self {
            family,
            adaptive_from_major,
        }
    }

    pub fn family(&self) -> CmsFamily {
        self.family
    }

    /// Scheme used for a given major version; unknown is the oldest dialect.
    pub fn algorithm_for(&self, major: Option<u32>) -> HashAlgorithm {
        if major.unwrap_or(0) >= self.adaptive_from_major {
            HashAlgorithm::AdaptiveSaltedHash
        } else {
            HashAlgorithm::LegacySaltedDigest
        }
    }

    /// Hashes `cleartext` for the installation described by `version`.
    ///
    /// # Errors
    /// Returns `Hashing` if the adaptive hash cannot be computed
    pub fn hash(&self, cleartext: &str, version: Option<&VersionDescriptor>) -> Result<HashResult> {
        let major = version.and_then(VersionDescriptor::major);
        if version.is_some() && major.is_none() {
            tracing::warn!("Version has no numeric major component, using the oldest hash scheme");
        }
        self.hash_for_major(cleartext, major)
    }

    /// Hashes `cleartext` for an explicit major version.
    ///
    /// # Errors
    /// Returns `Hashing` if the adaptive hash cannot be computed
    pub fn hash_for_major(&self, cleartext: &str, major: Option<u32>) -> Result<HashResult> {
        let cleartext = Zeroizing::new(cleartext.to_string());
        let algorithm = self.algorithm_for(major);
        tracing::debug!(
            "Hashing {} password with {} (major {:?})",
            self.family,
            algorithm,
            major
        );

        let encoded = match algorithm {
            HashAlgorithm::LegacySaltedDigest => {
                let salt: String = rand::rng()
                    .sample_iter(&rand::distr::Alphanumeric)
                    .take(LEGACY_SALT_LENGTH)
                    .map(char::from)
                    .collect();
                format!("{}:{}", legacy_digest(&cleartext, &salt), salt)
            }
            HashAlgorithm::AdaptiveSaltedHash => {
                bcrypt::hash_with_result(cleartext.as_bytes(), ADAPTIVE_COST)
                    .map_err(|e| CmsError::Hashing {
                        context: e.to_string(),
                    })?
                    .format_for_version(bcrypt::Version::TwoY)
            }
        };

        Ok(HashResult { algorithm, encoded })
    }

    /// Checks `cleartext` against a stored hash of either scheme.
    ///
    /// # Errors
    /// Returns `Hashing` if a bcrypt hash is malformed
    pub fn verify(&self, cleartext: &str, hash: &HashResult) -> Result<bool> {
        match hash.algorithm {
            HashAlgorithm::LegacySaltedDigest => {
                let (digest, salt) = hash
                    .encoded
                    .split_once(':')
                    .unwrap_or((hash.encoded.as_str(), ""));
                Ok(legacy_digest(cleartext, salt).eq_ignore_ascii_case(digest))
            }
            HashAlgorithm::AdaptiveSaltedHash => {
                bcrypt::verify(cleartext, &hash.encoded).map_err(|e| CmsError::Hashing {
                    context: e.to_string(),
                })
            }
        }
    }
}

fn legacy_digest(cleartext: &str, salt: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(cleartext.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{parse, VersionScheme};

    #[test]
    fn test_joomla_threshold() {
        let hasher = CredentialHasher::for_family(CmsFamily::Joomla);
        assert_eq!(hasher.algorithm_for(None), HashAlgorithm::LegacySaltedDigest);
        assert_eq!(hasher.algorithm_for(Some(3)), HashAlgorithm::LegacySaltedDigest);
        assert_eq!(hasher.algorithm_for(Some(4)), HashAlgorithm::AdaptiveSaltedHash);
        assert_eq!(hasher.algorithm_for(Some(5)), HashAlgorithm::AdaptiveSaltedHash);
    }

    #[test]
    fn test_wordpress_always_adaptive() {
        let hasher = CredentialHasher::for_family(CmsFamily::WordPress);
        assert_eq!(hasher.algorithm_for(None), HashAlgorithm::AdaptiveSaltedHash);
        assert_eq!(hasher.algorithm_for(Some(2)), HashAlgorithm::AdaptiveSaltedHash);

        // Major 2 is legacy only for Joomla
        let result = hasher.hash_for_major("secret", Some(2)).unwrap();
        assert_eq!(result.algorithm, HashAlgorithm::AdaptiveSaltedHash);
        assert!(result.encoded.starts_with("$2y$10$"));
        assert!(!result.encoded.contains(':'));
        assert!(hasher.verify("secret", &result).unwrap());
    }

    #[test]
    fn test_legacy_encoding() {
        let hasher = CredentialHasher::for_family(CmsFamily::Joomla);
        let result = hasher.hash_for_major("secret", Some(2)).unwrap();

        let (digest, salt) = result.encoded.split_once(':').unwrap();
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(salt.len(), LEGACY_SALT_LENGTH);
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(digest, legacy_digest("secret", salt));
        assert!(hasher.verify("secret", &result).unwrap());
        assert!(!hasher.verify("Secret", &result).unwrap());
    }

    #[test]
    fn test_legacy_salts_differ() {
        let hasher = CredentialHasher::for_family(CmsFamily::Joomla);
        let a = hasher.hash_for_major("secret", None).unwrap();
        let b = hasher.hash_for_major("secret", None).unwrap();
        assert_ne!(a.encoded, b.encoded);
    }

    #[test]
    fn test_known_md5_digest() {
        assert_eq!(legacy_digest("", ""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(legacy_digest("pass", "word"), legacy_digest("password", ""));
    }

    #[test]
    fn test_adaptive_hash_from_version() {
        let version = parse("const MAJOR_VERSION = 4;\nconst MINOR_VERSION = 4;", VersionScheme::JoomlaClass)
            .unwrap();
        let hasher = CredentialHasher::for_family(CmsFamily::Joomla);
        let result = hasher.hash("secret", Some(&version)).unwrap();

        assert_eq!(result.algorithm, HashAlgorithm::AdaptiveSaltedHash);
        assert!(result.encoded.starts_with("$2y$10$"));
        assert!(bcrypt::verify("secret", &result.encoded).unwrap());
        assert!(!hasher.verify("other", &result).unwrap());
    }
}
