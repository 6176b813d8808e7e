//! In-memory directory for tests and local development.

use crate::dit::{DitLayout, Slot};
use crate::{Directory, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use pkd_core::model::{Certificate, Crl, TypeCounts};

/// Entry kinds tracked by the in-memory directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemEntry {
    /// Container (dc / c / o).
    Container,
    /// Certificate leaf with its DER.
    Certificate(Vec<u8>),
    /// CRL leaf with its DER.
    Crl(Vec<u8>),
}

/// Directory double backed by a DN-keyed map.
pub struct MemDirectory {
    layout: DitLayout,
    entries: DashMap<String, MemEntry>,
}

impl MemDirectory {
    /// Empty directory with the given layout.
    pub fn new(layout: DitLayout) -> Self {
        Self { layout, entries: DashMap::new() }
    }

    /// Layout in use.
    pub fn layout(&self) -> &DitLayout {
        &self.layout
    }

    /// Test hook: remove an entry behind the repository's back.
    pub fn remove_entry(&self, dn: &str) -> bool {
        self.entries.remove(dn).is_some()
    }

    /// Test hook: entry presence without the async trait.
    pub fn contains(&self, dn: &str) -> bool {
        self.entries.contains_key(dn)
    }

    /// Test hook: total number of entries, containers included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Test hook: emptiness.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Directory for MemDirectory {
    fn certificate_dn(&self, cert: &Certificate) -> String {
        let slot = Slot::for_certificate(cert);
        self.layout.leaf_dn(slot, &cert.country_code, &cert.fingerprint, &cert.subject_dn)
    }

    fn crl_dn(&self, crl: &Crl) -> String {
        self.layout.leaf_dn(Slot::Crl, &crl.country_code, &crl.fingerprint, &crl.issuer_dn)
    }

    async fn ensure_container(&self, slot: Slot, country: &str) -> Result<()> {
        for dn in [
            self.layout.download_dn(),
            self.layout.data_dn(slot),
            self.layout.country_dn(slot, country),
            self.layout.ou_dn(slot, country),
        ] {
            self.entries.entry(dn).or_insert(MemEntry::Container);
        }
        Ok(())
    }

    async fn write_certificate(&self, cert: &Certificate) -> Result<String> {
        let slot = Slot::for_certificate(cert);
        let dn = self.layout.leaf_dn(slot, &cert.country_code, &cert.fingerprint, &cert.subject_dn);
        // Existing leaf: binary replace, still success.
        self.entries.insert(dn.clone(), MemEntry::Certificate(cert.der.clone()));
        Ok(dn)
    }

    async fn write_crl(&self, crl: &Crl) -> Result<String> {
        let dn = self.layout.leaf_dn(Slot::Crl, &crl.country_code, &crl.fingerprint, &crl.issuer_dn);
        self.entries.insert(dn.clone(), MemEntry::Crl(crl.der.clone()));
        Ok(dn)
    }

    async fn entry_exists(&self, dn: &str) -> Result<bool> {
        Ok(self.entries.contains_key(dn))
    }

    async fn delete_leaf(&self, dn: &str) -> Result<()> {
        self.entries.remove(dn);
        Ok(())
    }

    async fn count_by_type(&self) -> Result<TypeCounts> {
        let mut counts = TypeCounts::default();
        for item in self.entries.iter() {
            if matches!(item.value(), MemEntry::Container) {
                continue;
            }
            let dn = item.key().to_ascii_lowercase();
            if dn.contains(",o=csca,") || dn.contains(",o=lc,") {
                counts.csca += 1;
            } else if dn.contains(",o=dsc,") && dn.contains(",dc=nc-data,") {
                counts.dsc_nc += 1;
            } else if dn.contains(",o=dsc,") {
                counts.dsc += 1;
            } else if dn.contains(",o=mlsc,") {
                counts.mlsc += 1;
            } else if dn.contains(",o=crl,") {
                counts.crl += 1;
            }
        }
        Ok(counts)
    }
}
