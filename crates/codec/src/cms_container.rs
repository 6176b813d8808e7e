//! CMS SignedData containers: Master Lists and Deviation Lists (RFC 5652).
//!
//! A Master List's eContent is the ICAO `CscaMasterList` structure (SEQUENCE
//! of version and a SET OF Certificate). Signer certificates (matched through
//! SignerInfo identifiers) are returned separately from embedded
//! certificates; the former become MLSC candidates, the latter CSCA or link
//! certificate candidates.

use crate::CodecError;
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier};
use der::asn1::{ObjectIdentifier, OctetString, SetOfVec};
use der::{Decode, Encode, Sequence};
use std::collections::BTreeSet;

/// pkcs7 signedData content type.
pub const OID_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
/// ICAO cscaMasterList eContent type.
pub const OID_ICAO_CSCA_MASTER_LIST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.23.136.1.1.2");
/// ICAO deviationList eContent type.
pub const OID_ICAO_DEVIATION_LIST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.23.136.1.1.7");

const OID_EXT_SKI: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");

/// CscaMasterList ::= SEQUENCE { version INTEGER, certList SET OF Certificate }
#[derive(Sequence)]
struct CscaMasterList {
    version: u8,
    cert_list: SetOfVec<x509_cert::Certificate>,
}

/// Decoded SignedData container, certificates re-encoded to DER.
#[derive(Debug, Clone)]
pub struct CmsContent {
    /// Certificates matched to a SignerInfo.
    pub signer_certs: Vec<Vec<u8>>,
    /// Certificates carried in the container but not matched to a signer.
    pub embedded_certs: Vec<Vec<u8>>,
    /// eContentType as dotted OID.
    pub econtent_type: String,
    /// Raw eContent octets, when present.
    pub econtent: Option<Vec<u8>>,
}

/// Parse a CMS/PKCS7 SignedData container.
pub fn parse_signed_data(bytes: &[u8]) -> Result<CmsContent, CodecError> {
    let ci = ContentInfo::from_der(bytes).map_err(cms_err)?;
    if ci.content_type != OID_SIGNED_DATA {
        return Err(CodecError::Cms(format!(
            "content type {} is not signedData",
            ci.content_type
        )));
    }
    let sd: SignedData = ci.content.decode_as().map_err(cms_err)?;

    let mut certs: Vec<x509_cert::Certificate> = Vec::new();
    if let Some(set) = &sd.certificates {
        for choice in set.0.iter() {
            if let CertificateChoices::Certificate(c) = choice {
                certs.push(c.clone());
            }
        }
    }

    let mut signer_idx: BTreeSet<usize> = BTreeSet::new();
    for si in sd.signer_infos.0.iter() {
        match &si.sid {
            SignerIdentifier::IssuerAndSerialNumber(isn) => {
                for (i, c) in certs.iter().enumerate() {
                    if c.tbs_certificate.serial_number == isn.serial_number
                        && c.tbs_certificate.issuer == isn.issuer
                    {
                        signer_idx.insert(i);
                    }
                }
            }
            SignerIdentifier::SubjectKeyIdentifier(ski) => {
                for (i, c) in certs.iter().enumerate() {
                    if cert_ski(c).as_deref() == Some(ski.0.as_bytes()) {
                        signer_idx.insert(i);
                    }
                }
            }
        }
    }

    let mut signer_certs = Vec::new();
    let mut embedded_certs = Vec::new();
    for (i, c) in certs.iter().enumerate() {
        let der = c.to_der().map_err(cms_err)?;
        if signer_idx.contains(&i) {
            signer_certs.push(der);
        } else {
            embedded_certs.push(der);
        }
    }

    let econtent = match &sd.encap_content_info.econtent {
        Some(any) => Some(
            any.decode_as::<OctetString>().map_err(cms_err)?.as_bytes().to_vec(),
        ),
        None => None,
    };

    Ok(CmsContent {
        signer_certs,
        embedded_certs,
        econtent_type: sd.encap_content_info.econtent_type.to_string(),
        econtent,
    })
}

/// Decoded Master List: MLSC candidates plus the CSCA/link set.
#[derive(Debug, Clone)]
pub struct MasterListContent {
    /// CMS signer certificates (MLSC candidates), DER.
    pub signer_certs: Vec<Vec<u8>>,
    /// Certificates from the CscaMasterList plus unmatched container
    /// certificates (CSCA / link candidates), DER.
    pub csca_certs: Vec<Vec<u8>>,
    /// CscaMasterList version field.
    pub version: u8,
}

/// Parse a Master List container down to its certificate sets.
pub fn parse_master_list(bytes: &[u8]) -> Result<MasterListContent, CodecError> {
    let cms = parse_signed_data(bytes)?;
    let econtent = cms
        .econtent
        .as_deref()
        .ok_or_else(|| CodecError::Cms("master list carries no eContent".into()))?;
    let list = CscaMasterList::from_der(econtent).map_err(cms_err)?;

    let mut csca_certs = Vec::with_capacity(list.cert_list.len());
    for c in list.cert_list.iter() {
        csca_certs.push(c.to_der().map_err(cms_err)?);
    }
    // Container certificates that did not sign the list ride along as CSCA
    // candidates (commonly the CSCA that issued the MLSC).
    csca_certs.extend(cms.embedded_certs);

    Ok(MasterListContent { signer_certs: cms.signer_certs, csca_certs, version: list.version })
}

/// Decoded Deviation List: stored verbatim, only signer identity extracted.
#[derive(Debug, Clone)]
pub struct DeviationListContent {
    /// CMS signer certificates, DER.
    pub signer_certs: Vec<Vec<u8>>,
    /// eContentType as dotted OID.
    pub econtent_type: String,
}

/// Parse a Deviation List container far enough to identify its signers.
pub fn parse_deviation_list(bytes: &[u8]) -> Result<DeviationListContent, CodecError> {
    let cms = parse_signed_data(bytes)?;
    Ok(DeviationListContent { signer_certs: cms.signer_certs, econtent_type: cms.econtent_type })
}

fn cert_ski(cert: &x509_cert::Certificate) -> Option<Vec<u8>> {
    let exts = cert.tbs_certificate.extensions.as_ref()?;
    for ext in exts {
        if ext.extn_id == OID_EXT_SKI {
            // Extension value is itself DER: an OCTET STRING wrapping the SKI.
            if let Ok(inner) = OctetString::from_der(ext.extn_value.as_bytes()) {
                return Some(inner.as_bytes().to_vec());
            }
        }
    }
    None
}

fn cms_err(e: der::Error) -> CodecError {
    CodecError::Cms(e.to_string())
}
