//! CRL (RFC 5280 §5) metadata extraction.

use crate::{digest, dn, CodecError};
use chrono::{DateTime, Utc};
use pkd_core::model::{Crl, RevokedEntry};
use uuid::Uuid;
use x509_parser::prelude::*;

/// Map a revocation reason code to its name. Codes outside the recognized set
/// collapse to `unspecified`.
pub fn reason_name(code: u8) -> &'static str {
    match code {
        1 => "keyCompromise",
        2 => "cACompromise",
        3 => "affiliationChanged",
        4 => "superseded",
        5 => "cessationOfOperation",
        6 => "certificateHold",
        _ => "unspecified",
    }
}

/// Parse a DER CRL into a storable [`Crl`].
pub fn parse_crl(der: &[u8], upload_id: Option<Uuid>) -> Result<Crl, CodecError> {
    let (_, crl) = CertificateRevocationList::from_der(der)
        .map_err(|e| CodecError::Malformed(e.to_string()))?;

    let issuer_dn = crl.issuer().to_string();
    let this_update = to_utc(crl.last_update())?;
    let next_update = crl.next_update().map(to_utc).transpose()?;

    let mut revoked = Vec::new();
    for rc in crl.iter_revoked_certificates() {
        let reason = rc
            .reason_code()
            .map_or("unspecified", |(_, code)| reason_name(code.0));
        revoked.push(RevokedEntry {
            serial_number: hex::encode(rc.raw_serial()),
            revocation_date: to_utc(rc.revocation_date)?,
            reason_code: reason.to_string(),
        });
    }

    Ok(Crl {
        id: Uuid::new_v4(),
        fingerprint: digest::sha256_hex(der),
        country_code: dn::extract_country(&issuer_dn).unwrap_or_else(|| "XX".to_string()),
        issuer_dn,
        this_update,
        next_update,
        crl_number: crl.crl_number().map(|n| n.to_string()),
        revoked,
        der: der.to_vec(),
        stored_in_ldap: false,
        ldap_dn: None,
        upload_id,
        created_at: Utc::now(),
    })
}

fn to_utc(t: ASN1Time) -> Result<DateTime<Utc>, CodecError> {
    DateTime::<Utc>::from_timestamp(t.timestamp(), 0)
        .ok_or_else(|| CodecError::Malformed("crl instant out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_map_per_rfc() {
        assert_eq!(reason_name(1), "keyCompromise");
        assert_eq!(reason_name(6), "certificateHold");
        assert_eq!(reason_name(0), "unspecified");
        assert_eq!(reason_name(9), "unspecified");
        assert_eq!(reason_name(200), "unspecified");
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_crl(&[0x04, 0x02, 0xde, 0xad], None),
            Err(CodecError::Malformed(_))
        ));
    }
}
