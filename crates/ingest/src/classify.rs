//! Certificate classification.
//!
//! Rules apply in a fixed order of precedence; the first match wins:
//! 1. CMS signer of a Master List → MLSC
//! 2. entry DN under `dc=nc-data` → DSC_NC
//! 3. self-signed or CA → CSCA
//! 4. otherwise → DSC

use codec::x509::CertificateInfo;
use pkd_core::model::CertType;

/// Where the certificate was found.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyContext {
    /// The certificate signed a Master List container.
    pub from_master_list_signer: bool,
    /// The LDIF entry carrying it lives under `dc=nc-data`.
    pub nc_data_entry: bool,
}

impl ClassifyContext {
    /// Context for a CMS signer.
    pub fn master_list_signer() -> Self {
        Self { from_master_list_signer: true, nc_data_entry: false }
    }

    /// Context for an LDIF entry, keyed off its DN.
    pub fn for_entry_dn(dn: &str) -> Self {
        Self {
            from_master_list_signer: false,
            nc_data_entry: dn.to_ascii_lowercase().contains("dc=nc-data"),
        }
    }
}

/// Classify a parsed certificate.
pub fn classify(info: &CertificateInfo, ctx: ClassifyContext) -> CertType {
    if ctx.from_master_list_signer {
        CertType::Mlsc
    } else if ctx.nc_data_entry {
        CertType::DscNc
    } else if info.is_self_signed || info.is_ca {
        CertType::Csca
    } else {
        CertType::Dsc
    }
}
