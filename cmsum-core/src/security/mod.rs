//! Credential protection and password hashing.
//!
//! # Security Guarantees
//! - Cleartext passwords are held in `Zeroizing` buffers while hashed
//! - Database passwords never appear in logs or error messages
//!
//! # Module Structure
//! - `hashing`: version-conditioned password hashing and verification

pub mod hashing;

pub use hashing::{CredentialHasher, HashAlgorithm, HashResult};
