//! DIT layout and DN construction.
//!
//! `dc=download,{base}` holds `dc=data` and `dc=nc-data`; under each,
//! `c={country}`; under each country, organizational units; under each unit,
//! leaves named by fingerprint. DSC_NC is the only occupant of `dc=nc-data`.

use pkd_core::model::{CertType, Certificate};

/// Placement slot of a directory leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Self-signed country signing CAs.
    Csca,
    /// Link certificates (CSCA type, subject ≠ issuer).
    LinkCert,
    /// Conformant document signers.
    Dsc,
    /// Non-conformant document signers (legacy, `dc=nc-data`).
    DscNc,
    /// Master List signers.
    Mlsc,
    /// Revocation lists.
    Crl,
    /// Master List containers.
    MasterList,
}

impl Slot {
    /// Organizational unit name.
    pub fn ou(self) -> &'static str {
        match self {
            Slot::Csca => "csca",
            Slot::LinkCert => "lc",
            Slot::Dsc | Slot::DscNc => "dsc",
            Slot::Mlsc => "mlsc",
            Slot::Crl => "crl",
            Slot::MasterList => "ml",
        }
    }

    /// Data container under `dc=download`.
    pub fn data_container(self) -> &'static str {
        match self {
            Slot::DscNc => "nc-data",
            _ => "data",
        }
    }

    /// Placement for a stored certificate.
    pub fn for_certificate(cert: &Certificate) -> Self {
        match cert.cert_type {
            CertType::Csca if cert.is_link_certificate() => Slot::LinkCert,
            CertType::Csca => Slot::Csca,
            CertType::Dsc => Slot::Dsc,
            CertType::DscNc => Slot::DscNc,
            CertType::Mlsc => Slot::Mlsc,
        }
    }
}

/// DN builder rooted at a configured base.
#[derive(Debug, Clone)]
pub struct DitLayout {
    base_dn: String,
    legacy_dn: bool,
}

impl DitLayout {
    /// Layout under `base_dn`; `legacy_dn` carries the subject DN as a second
    /// cn component on leaves.
    pub fn new(base_dn: impl Into<String>, legacy_dn: bool) -> Self {
        Self { base_dn: base_dn.into(), legacy_dn }
    }

    /// Whether leaves carry the legacy second cn.
    pub fn legacy_dn(&self) -> bool {
        self.legacy_dn
    }

    /// `dc=download,{base}`.
    pub fn download_dn(&self) -> String {
        format!("dc=download,{}", self.base_dn)
    }

    /// `dc={data|nc-data},dc=download,{base}`.
    pub fn data_dn(&self, slot: Slot) -> String {
        format!("dc={},{}", slot.data_container(), self.download_dn())
    }

    /// `c={country},...`.
    pub fn country_dn(&self, slot: Slot, country: &str) -> String {
        format!("c={},{}", escape_rdn_value(country), self.data_dn(slot))
    }

    /// `o={ou},c={country},...`.
    pub fn ou_dn(&self, slot: Slot, country: &str) -> String {
        format!("o={},{}", slot.ou(), self.country_dn(slot, country))
    }

    /// Leaf DN for a fingerprint (legacy mode adds `cn={subject}`).
    pub fn leaf_dn(&self, slot: Slot, country: &str, fingerprint: &str, subject: &str) -> String {
        if self.legacy_dn {
            format!(
                "cn={},cn={},{}",
                fingerprint,
                escape_rdn_value(subject),
                self.ou_dn(slot, country)
            )
        } else {
            format!("cn={},{}", fingerprint, self.ou_dn(slot, country))
        }
    }
}

/// Escape an RDN attribute value per RFC 4514.
pub fn escape_rdn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => {
                out.push('\\');
                out.push(c);
            }
            ' ' if i == 0 || i == value.len() - 1 => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> DitLayout {
        DitLayout::new("dc=pkd,dc=example", false)
    }

    #[test]
    fn container_chain() {
        let l = layout();
        assert_eq!(l.download_dn(), "dc=download,dc=pkd,dc=example");
        assert_eq!(l.data_dn(Slot::Dsc), "dc=data,dc=download,dc=pkd,dc=example");
        assert_eq!(l.data_dn(Slot::DscNc), "dc=nc-data,dc=download,dc=pkd,dc=example");
        assert_eq!(l.country_dn(Slot::Csca, "KR"), "c=KR,dc=data,dc=download,dc=pkd,dc=example");
        assert_eq!(
            l.ou_dn(Slot::Crl, "KR"),
            "o=crl,c=KR,dc=data,dc=download,dc=pkd,dc=example"
        );
    }

    #[test]
    fn leaf_dn_v2_is_fingerprint_only() {
        let l = layout();
        let dn = l.leaf_dn(Slot::Dsc, "KR", "ab12", "CN=Document Signer 1,C=KR");
        assert_eq!(dn, "cn=ab12,o=dsc,c=KR,dc=data,dc=download,dc=pkd,dc=example");
    }

    #[test]
    fn leaf_dn_legacy_carries_subject() {
        let l = DitLayout::new("dc=pkd,dc=example", true);
        let dn = l.leaf_dn(Slot::Dsc, "KR", "ab12", "CN=DS 1,C=KR");
        assert_eq!(
            dn,
            "cn=ab12,cn=CN\\=DS 1\\,C\\=KR,o=dsc,c=KR,dc=data,dc=download,dc=pkd,dc=example"
        );
    }

    #[test]
    fn nc_slot_only_for_dsc_nc() {
        for slot in [Slot::Csca, Slot::LinkCert, Slot::Dsc, Slot::Mlsc, Slot::Crl, Slot::MasterList]
        {
            assert_eq!(slot.data_container(), "data");
        }
        assert_eq!(Slot::DscNc.data_container(), "nc-data");
        assert_eq!(Slot::DscNc.ou(), "dsc");
    }

    #[test]
    fn rdn_escaping() {
        assert_eq!(escape_rdn_value("Acme, Inc."), "Acme\\, Inc.");
        assert_eq!(escape_rdn_value("#leading"), "\\#leading");
        assert_eq!(escape_rdn_value(" padded "), "\\ padded\\ ");
    }
}
