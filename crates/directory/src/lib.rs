//! LDAP projection of the repository.
//!
//! The directory is eventually consistent with the relational store; writes
//! here never abort an upload. Failures leave `stored_in_ldap = false` and
//! reconciliation retries later. ALREADY_EXISTS on add is success (the leaf
//! binary is replaced instead).

#![deny(unsafe_code)]

pub mod dit;
pub mod ldap;
pub mod mem;

use async_trait::async_trait;
use pkd_core::model::{Certificate, Crl, TypeCounts};
use thiserror::Error;

pub use dit::{DitLayout, Slot};
pub use ldap::LdapDirectory;
pub use mem::MemDirectory;

/// Directory-side failures. All of them are recoverable at the item level.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Protocol or connection failure.
    #[error("ldap: {0}")]
    Ldap(#[from] ldap3::LdapError),
    /// No connection slot became available within the acquire timeout.
    #[error("timeout acquiring directory connection")]
    AcquireTimeout,
    /// The target's parent container is absent and auto-creation failed.
    #[error("missing parent container: {0}")]
    MissingParent(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, DirectoryError>;

/// The directory writer seam.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Leaf DN a certificate would occupy, without touching the directory.
    fn certificate_dn(&self, cert: &Certificate) -> String;

    /// Leaf DN a CRL would occupy, without touching the directory.
    fn crl_dn(&self, crl: &Crl) -> String;

    /// Idempotently create the container chain for `slot` under `country`
    /// (data container, country entry, organizational unit).
    async fn ensure_container(&self, slot: Slot, country: &str) -> Result<()>;

    /// Write a certificate leaf. Returns the leaf DN. ALREADY_EXISTS replaces
    /// the binary and still succeeds.
    async fn write_certificate(&self, cert: &Certificate) -> Result<String>;

    /// Write a CRL leaf. Returns the leaf DN.
    async fn write_crl(&self, crl: &Crl) -> Result<String>;

    /// Whether an entry exists at `dn` (read endpoint).
    async fn entry_exists(&self, dn: &str) -> Result<bool>;

    /// Remove a leaf. Used only by reconciliation for operator-initiated
    /// removals.
    async fn delete_leaf(&self, dn: &str) -> Result<()>;

    /// Leaf counts per type across the DIT (read endpoint).
    async fn count_by_type(&self) -> Result<TypeCounts>;
}
