//! ldap3-backed directory writer.
//!
//! Two endpoints: writes always go to the primary, reads may be balanced.
//! Each endpoint keeps a small set of bound connections whose handles are
//! multiplexed; a semaphore bounds in-flight operations and acquisition is
//! subject to the configured timeout, with the permit released on every exit
//! path.

use crate::dit::{DitLayout, Slot};
use crate::{Directory, DirectoryError, Result};
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapError, Mod, Scope, SearchEntry};
use pkd_core::config::LdapConfig;
use pkd_core::model::{Certificate, Crl, TypeCounts};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

struct Endpoint {
    handles: Vec<Ldap>,
    next: AtomicUsize,
    slots: Semaphore,
    acquire_timeout: Duration,
}

impl Endpoint {
    async fn connect(
        url: &str,
        bind_dn: &str,
        bind_password: &str,
        connections: u32,
        max_in_flight: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let mut handles = Vec::with_capacity(connections as usize);
        for _ in 0..connections.max(1) {
            let (conn, mut ldap) = LdapConnAsync::new(url).await?;
            ldap3::drive!(conn);
            ldap.simple_bind(bind_dn, bind_password).await?.success()?;
            handles.push(ldap);
        }
        Ok(Self {
            handles,
            next: AtomicUsize::new(0),
            slots: Semaphore::new(max_in_flight as usize),
            acquire_timeout,
        })
    }

    /// Round-robin handle plus an in-flight permit. The permit guard releases
    /// on drop, covering every exit path.
    async fn checkout(&self) -> Result<(tokio::sync::SemaphorePermit<'_>, Ldap)> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.slots.acquire())
            .await
            .map_err(|_| DirectoryError::AcquireTimeout)?
            .expect("semaphore closed");
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.handles.len();
        Ok((permit, self.handles[i].clone()))
    }
}

/// Directory writer over LDAP.
pub struct LdapDirectory {
    layout: DitLayout,
    write: Endpoint,
    read: Endpoint,
}

fn rc_of(e: &LdapError) -> Option<u32> {
    match e {
        LdapError::LdapResult { result } => Some(result.rc),
        _ => None,
    }
}

fn battr(name: &str, values: Vec<Vec<u8>>) -> (Vec<u8>, HashSet<Vec<u8>>) {
    (name.as_bytes().to_vec(), values.into_iter().collect())
}

fn sattr(name: &str, values: &[&str]) -> (Vec<u8>, HashSet<Vec<u8>>) {
    battr(name, values.iter().map(|v| v.as_bytes().to_vec()).collect())
}

impl LdapDirectory {
    /// Connect both endpoints per configuration.
    pub async fn connect(cfg: &LdapConfig) -> Result<Self> {
        let timeout = Duration::from_millis(cfg.acquire_timeout_ms);
        let write = Endpoint::connect(
            &cfg.write_url(),
            &cfg.bind_dn,
            &cfg.bind_password,
            cfg.pool_min,
            cfg.pool_max,
            timeout,
        )
        .await?;
        let read = Endpoint::connect(
            &cfg.read_url(),
            &cfg.bind_dn,
            &cfg.bind_password,
            cfg.pool_min,
            cfg.pool_max,
            timeout,
        )
        .await?;
        Ok(Self { layout: DitLayout::new(cfg.base_dn.clone(), cfg.use_legacy_dn), write, read })
    }

    /// The DN layout in use.
    pub fn layout(&self) -> &DitLayout {
        &self.layout
    }

    /// Add an entry, treating ENTRY_ALREADY_EXISTS as success. Returns true
    /// when the entry already existed.
    async fn add_idempotent(
        &self,
        dn: &str,
        attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)>,
    ) -> Result<bool> {
        let (_permit, mut ldap) = self.write.checkout().await?;
        match ldap.add(dn, attrs).await?.success() {
            Ok(_) => Ok(false),
            Err(e) if rc_of(&e) == Some(RC_ENTRY_ALREADY_EXISTS) => {
                debug!(dn, "entry already present");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_binary(&self, dn: &str, attr: &str, value: Vec<u8>) -> Result<()> {
        let (_permit, mut ldap) = self.write.checkout().await?;
        let values: HashSet<Vec<u8>> = [value].into_iter().collect();
        ldap.modify(dn, vec![Mod::Replace(attr.as_bytes().to_vec(), values)])
            .await?
            .success()?;
        Ok(())
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    fn certificate_dn(&self, cert: &Certificate) -> String {
        let slot = Slot::for_certificate(cert);
        self.layout.leaf_dn(slot, &cert.country_code, &cert.fingerprint, &cert.subject_dn)
    }

    fn crl_dn(&self, crl: &Crl) -> String {
        self.layout.leaf_dn(Slot::Crl, &crl.country_code, &crl.fingerprint, &crl.issuer_dn)
    }

    async fn ensure_container(&self, slot: Slot, country: &str) -> Result<()> {
        // Parents first; every add tolerates ENTRY_ALREADY_EXISTS.
        self.add_idempotent(
            &self.layout.download_dn(),
            vec![sattr("objectClass", &["top", "domain"]), sattr("dc", &["download"])],
        )
        .await?;
        self.add_idempotent(
            &self.layout.data_dn(slot),
            vec![
                sattr("objectClass", &["top", "domain"]),
                sattr("dc", &[slot.data_container()]),
            ],
        )
        .await?;
        self.add_idempotent(
            &self.layout.country_dn(slot, country),
            vec![sattr("objectClass", &["top", "country"]), sattr("c", &[country])],
        )
        .await?;
        self.add_idempotent(
            &self.layout.ou_dn(slot, country),
            vec![sattr("objectClass", &["top", "organization"]), sattr("o", &[slot.ou()])],
        )
        .await?;
        Ok(())
    }

    async fn write_certificate(&self, cert: &Certificate) -> Result<String> {
        let slot = Slot::for_certificate(cert);
        let dn = self.layout.leaf_dn(slot, &cert.country_code, &cert.fingerprint, &cert.subject_dn);

        let mut cn_values = vec![cert.fingerprint.as_bytes().to_vec()];
        if self.layout.legacy_dn() {
            cn_values.push(cert.subject_dn.as_bytes().to_vec());
        }
        let attrs = vec![
            sattr(
                "objectClass",
                &["top", "person", "organizationalPerson", "inetOrgPerson", "pkdDownload"],
            ),
            battr("cn", cn_values),
            // sn is mandatory for the person object class chain.
            sattr("sn", &[cert.serial_number.as_str()]),
            battr("userCertificate;binary", vec![cert.der.clone()]),
        ];
        if self.add_idempotent(&dn, attrs).await? {
            self.replace_binary(&dn, "userCertificate;binary", cert.der.clone()).await?;
        }
        Ok(dn)
    }

    async fn write_crl(&self, crl: &Crl) -> Result<String> {
        let dn = self.layout.leaf_dn(Slot::Crl, &crl.country_code, &crl.fingerprint, &crl.issuer_dn);
        let attrs = vec![
            sattr("objectClass", &["top", "cRLDistributionPoint", "pkdDownload"]),
            battr("cn", vec![crl.fingerprint.as_bytes().to_vec()]),
            battr("certificateRevocationList;binary", vec![crl.der.clone()]),
        ];
        if self.add_idempotent(&dn, attrs).await? {
            self.replace_binary(&dn, "certificateRevocationList;binary", crl.der.clone()).await?;
        }
        Ok(dn)
    }

    async fn entry_exists(&self, dn: &str) -> Result<bool> {
        let (_permit, mut ldap) = self.read.checkout().await?;
        match ldap.search(dn, Scope::Base, "(objectClass=*)", vec!["1.1"]).await?.success() {
            Ok((entries, _)) => Ok(!entries.is_empty()),
            Err(e) if rc_of(&e) == Some(RC_NO_SUCH_OBJECT) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_leaf(&self, dn: &str) -> Result<()> {
        let (_permit, mut ldap) = self.write.checkout().await?;
        match ldap.delete(dn).await?.success() {
            Ok(_) => Ok(()),
            Err(e) if rc_of(&e) == Some(RC_NO_SUCH_OBJECT) => {
                warn!(dn, "delete of absent leaf");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn count_by_type(&self) -> Result<TypeCounts> {
        let (_permit, mut ldap) = self.read.checkout().await?;
        let base = self.layout.download_dn();
        let (entries, _) = match ldap
            .search(&base, Scope::Subtree, "(objectClass=pkdDownload)", vec!["1.1"])
            .await?
            .success()
        {
            Ok(ok) => ok,
            Err(e) if rc_of(&e) == Some(RC_NO_SUCH_OBJECT) => return Ok(TypeCounts::default()),
            Err(e) => return Err(e.into()),
        };
        let mut counts = TypeCounts::default();
        for entry in entries {
            let dn = SearchEntry::construct(entry).dn.to_ascii_lowercase();
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
