//! Domain model: certificates, CRLs, uploads, validation results and
//! reconciliation records.
//!
//! Certificates and CRLs are immutable once inserted; only the directory
//! projection flag, the recorded LDAP DN and validation results mutate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Certificate classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertType {
    /// Country Signing CA (includes link certificates).
    #[serde(rename = "CSCA")]
    Csca,
    /// Document signer (conformant).
    #[serde(rename = "DSC")]
    Dsc,
    /// Non-conformant document signer (legacy category).
    #[serde(rename = "DSC_NC")]
    DscNc,
    /// Master List signer.
    #[serde(rename = "MLSC")]
    Mlsc,
}

impl CertType {
    /// Stable wire/database name.
    pub fn as_str(self) -> &'static str {
        match self {
            CertType::Csca => "CSCA",
            CertType::Dsc => "DSC",
            CertType::DscNc => "DSC_NC",
            CertType::Mlsc => "MLSC",
        }
    }

    /// All certificate types, in reporting order.
    pub const ALL: [CertType; 4] = [CertType::Csca, CertType::Dsc, CertType::DscNc, CertType::Mlsc];
}

impl fmt::Display for CertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CSCA" => Ok(CertType::Csca),
            "DSC" => Ok(CertType::Dsc),
            "DSC_NC" => Ok(CertType::DscNc),
            "MLSC" => Ok(CertType::Mlsc),
            other => Err(format!("unknown certificate type: {other}")),
        }
    }
}

/// Format hint supplied with an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadFormat {
    /// Multi-entry LDIF file from the ICAO PKD.
    Ldif,
    /// CMS-wrapped Master List.
    Ml,
    /// Single X.509 certificate (DER or PEM).
    Cert,
    /// Certificate revocation list (DER).
    Crl,
    /// CMS-wrapped Deviation List.
    Dl,
}

impl fmt::Display for UploadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadFormat::Ldif => "LDIF",
            UploadFormat::Ml => "ML",
            UploadFormat::Cert => "CERT",
            UploadFormat::Crl => "CRL",
            UploadFormat::Dl => "DL",
        };
        f.write_str(s)
    }
}

impl FromStr for UploadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LDIF" => Ok(UploadFormat::Ldif),
            "ML" => Ok(UploadFormat::Ml),
            "CERT" => Ok(UploadFormat::Cert),
            "CRL" => Ok(UploadFormat::Crl),
            "DL" => Ok(UploadFormat::Dl),
            other => Err(format!("unknown upload format: {other}")),
        }
    }
}

/// Upload lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    /// Background processing in flight.
    Processing,
    /// Finished with aggregate counts recorded.
    Completed,
    /// Failed at the upload level (partial inserts remain authoritative).
    Failed,
}

impl UploadStatus {
    /// Stable wire/database name.
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Processing => "PROCESSING",
            UploadStatus::Completed => "COMPLETED",
            UploadStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(UploadStatus::Processing),
            "COMPLETED" => Ok(UploadStatus::Completed),
            "FAILED" => Ok(UploadStatus::Failed),
            other => Err(format!("unknown upload status: {other}")),
        }
    }
}

/// Outcome of validating one document signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// Chain verified, certificate within its validity window.
    Valid,
    /// Chain broken, signature invalid or certificate revoked.
    Invalid,
    /// Certificate not yet valid.
    Pending,
    /// Chain verified but the certificate itself has expired.
    ExpiredValid,
    /// Validation could not run to completion.
    Error,
}

impl ValidationStatus {
    /// Stable wire/database name.
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Valid => "VALID",
            ValidationStatus::Invalid => "INVALID",
            ValidationStatus::Pending => "PENDING",
            ValidationStatus::ExpiredValid => "EXPIRED_VALID",
            ValidationStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALID" => Ok(ValidationStatus::Valid),
            "INVALID" => Ok(ValidationStatus::Invalid),
            "PENDING" => Ok(ValidationStatus::Pending),
            "EXPIRED_VALID" => Ok(ValidationStatus::ExpiredValid),
            "ERROR" => Ok(ValidationStatus::Error),
            other => Err(format!("unknown validation status: {other}")),
        }
    }
}

/// Expiration state of a certificate at validation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpirationStatus {
    /// Within [notBefore, notAfter].
    Valid,
    /// Past notAfter.
    Expired,
    /// Before notBefore.
    NotYetValid,
}

impl ExpirationStatus {
    /// Stable wire/database name.
    pub fn as_str(self) -> &'static str {
        match self {
            ExpirationStatus::Valid => "VALID",
            ExpirationStatus::Expired => "EXPIRED",
            ExpirationStatus::NotYetValid => "NOT_YET_VALID",
        }
    }
}

impl FromStr for ExpirationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALID" => Ok(ExpirationStatus::Valid),
            "EXPIRED" => Ok(ExpirationStatus::Expired),
            "NOT_YET_VALID" => Ok(ExpirationStatus::NotYetValid),
            other => Err(format!("unknown expiration status: {other}")),
        }
    }
}

/// An X.509 certificate with extracted metadata and its original DER bytes.
///
/// `fingerprint` is the lowercase-hex SHA-256 of `der` exactly as received;
/// the pair `(cert_type, fingerprint)` is the natural key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    /// Surrogate id.
    pub id: Uuid,
    /// Classification.
    pub cert_type: CertType,
    /// Lowercase-hex SHA-256 over the DER bytes (64 chars).
    pub fingerprint: String,
    /// ISO 3166 country code, uppercase; `XX` when unresolvable.
    pub country_code: String,
    /// Subject DN as printed in the certificate.
    pub subject_dn: String,
    /// Issuer DN as printed in the certificate.
    pub issuer_dn: String,
    /// Serial number, lowercase hex without separators.
    pub serial_number: String,
    /// Validity window start.
    pub not_before: DateTime<Utc>,
    /// Validity window end.
    pub not_after: DateTime<Utc>,
    /// Signature algorithm name (e.g. `sha256WithRSAEncryption`).
    pub signature_algorithm: String,
    /// Subject public key algorithm (`RSA`, `EC`, ...).
    pub public_key_algorithm: String,
    /// Modulus/field size in bits.
    pub public_key_size: u32,
    /// Named curve when the key is EC.
    pub public_key_curve: Option<String>,
    /// keyUsage bit names present.
    pub key_usage: Vec<String>,
    /// extendedKeyUsage OIDs/names present.
    pub extended_key_usage: Vec<String>,
    /// basicConstraints CA flag.
    pub is_ca: bool,
    /// basicConstraints path length, when bounded.
    pub path_len_constraint: Option<u32>,
    /// SKI extension value, lowercase hex.
    pub subject_key_identifier: Option<String>,
    /// AKI keyIdentifier value, lowercase hex.
    pub authority_key_identifier: Option<String>,
    /// CRL distribution point URIs.
    pub crl_distribution_points: Vec<String>,
    /// OCSP responder URI from authorityInfoAccess.
    pub ocsp_responder_url: Option<String>,
    /// Subject equals issuer under normalization AND the self-signature verifies.
    pub is_self_signed: bool,
    /// Original DER bytes (the fingerprint preimage).
    pub der: Vec<u8>,
    /// Directory projection flag; true implies an entry exists at `ldap_dn`.
    pub stored_in_ldap: bool,
    /// DN of the directory leaf, recorded after a successful write.
    pub ldap_dn: Option<String>,
    /// Upload that first contributed this certificate.
    pub upload_id: Option<Uuid>,
    /// Insertion instant.
    pub created_at: DateTime<Utc>,
}

impl Certificate {
    /// A link certificate is a CSCA whose subject differs from its issuer.
    pub fn is_link_certificate(&self) -> bool {
        self.cert_type == CertType::Csca && !self.is_self_signed
    }
}

/// One revoked serial inside a CRL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedEntry {
    /// Revoked certificate serial, lowercase hex.
    pub serial_number: String,
    /// Revocation instant.
    pub revocation_date: DateTime<Utc>,
    /// Reason name; `unspecified` when absent or unrecognized.
    pub reason_code: String,
}

/// A certificate revocation list with extracted metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crl {
    /// Surrogate id.
    pub id: Uuid,
    /// Lowercase-hex SHA-256 over the DER bytes.
    pub fingerprint: String,
    /// Issuing country, `XX` when unresolvable.
    pub country_code: String,
    /// Issuer DN as printed.
    pub issuer_dn: String,
    /// thisUpdate field.
    pub this_update: DateTime<Utc>,
    /// nextUpdate field, when present.
    pub next_update: Option<DateTime<Utc>>,
    /// CRL number extension, decimal string, when present.
    pub crl_number: Option<String>,
    /// Revoked entries.
    pub revoked: Vec<RevokedEntry>,
    /// Original DER bytes.
    pub der: Vec<u8>,
    /// Directory projection flag.
    pub stored_in_ldap: bool,
    /// DN of the directory leaf.
    pub ldap_dn: Option<String>,
    /// Upload that contributed this CRL.
    pub upload_id: Option<Uuid>,
    /// Insertion instant.
    pub created_at: DateTime<Utc>,
}

/// Per-type counters used in upload aggregates and sync snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    /// CSCA count (link certificates included).
    pub csca: u64,
    /// DSC count.
    pub dsc: u64,
    /// DSC_NC count.
    pub dsc_nc: u64,
    /// MLSC count.
    pub mlsc: u64,
    /// CRL count.
    pub crl: u64,
}

impl TypeCounts {
    /// Increment the bucket for `t`.
    pub fn add(&mut self, t: CertType) {
        match t {
            CertType::Csca => self.csca += 1,
            CertType::Dsc => self.dsc += 1,
            CertType::DscNc => self.dsc_nc += 1,
            CertType::Mlsc => self.mlsc += 1,
        }
    }

    /// Bucket value for `t`.
    pub fn get(&self, t: CertType) -> u64 {
        match t {
            CertType::Csca => self.csca,
            CertType::Dsc => self.dsc,
            CertType::DscNc => self.dsc_nc,
            CertType::Mlsc => self.mlsc,
        }
    }

    /// Sum across all buckets including CRLs.
    pub fn total(&self) -> u64 {
        self.csca + self.dsc + self.dsc_nc + self.mlsc + self.crl
    }
}

/// An ingestion event and its aggregate outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    /// Upload id returned to the caller.
    pub id: Uuid,
    /// Original file name.
    pub file_name: String,
    /// Lowercase-hex SHA-256 of the file; duplicate uploads are matched on this.
    pub file_hash: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Declared format.
    pub format: UploadFormat,
    /// Lifecycle state.
    pub status: UploadStatus,
    /// Request instant.
    pub created_at: DateTime<Utc>,
    /// Completion/failure instant.
    pub completed_at: Option<DateTime<Utc>>,
    /// Entries seen (certificates + CRLs + skipped).
    pub total_entries: u64,
    /// Entries inserted.
    pub successful_count: u64,
    /// Entries recognized as duplicates.
    pub duplicate_count: u64,
    /// Entries that failed locally.
    pub error_count: u64,
    /// Insertions by type.
    pub inserted: TypeCounts,
    /// Duplicates by type.
    pub duplicates: TypeCounts,
    /// Upload-level failure reason.
    pub error_message: Option<String>,
}

/// Validation outcome for one document signer certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Surrogate id.
    pub id: Uuid,
    /// Fingerprint of the validated certificate.
    pub certificate_fingerprint: String,
    /// Type of the validated certificate.
    pub cert_type: CertType,
    /// Subject CNs from leaf to root.
    pub trust_chain_path: Vec<String>,
    /// Whether a complete chain to a self-signed CSCA was built.
    pub trust_chain_valid: bool,
    /// Overall status.
    pub validation_status: ValidationStatus,
    /// Whether the leaf signature verified under its issuer key.
    pub signature_valid: bool,
    /// Expiration state of the leaf at validation time.
    pub expiration_status: ExpirationStatus,
    /// Whether a CRL was consulted.
    pub crl_checked: bool,
    /// Whether the leaf serial appeared in a current CRL.
    pub revoked: bool,
    /// Failure detail when the chain could not be built.
    pub trust_chain_message: Option<String>,
    /// Fingerprint of the root CSCA terminating the chain.
    pub csca_fingerprint: Option<String>,
    /// Validation instant.
    pub validated_at: DateTime<Utc>,
}

impl ValidationResult {
    /// Chain path rendered `leaf → ... → root`.
    pub fn chain_path_string(&self) -> String {
        self.trust_chain_path.join(" \u{2192} ")
    }
}

/// Reconciliation operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReconcileOp {
    /// Missing leaf written to the directory.
    Add,
    /// Operator-initiated leaf removal.
    Delete,
}

/// Per-operation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpStatus {
    /// Applied.
    Success,
    /// Recorded and skipped over.
    Failed,
}

/// Overall outcome of one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// All operations succeeded (or none were needed).
    Completed,
    /// Every operation failed.
    Failed,
    /// Some operations failed.
    Partial,
}

impl ReconcileOp {
    /// Stable wire/database name.
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcileOp::Add => "ADD",
            ReconcileOp::Delete => "DELETE",
        }
    }
}

impl FromStr for ReconcileOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(ReconcileOp::Add),
            "DELETE" => Ok(ReconcileOp::Delete),
            other => Err(format!("unknown reconcile op: {other}")),
        }
    }
}

impl OpStatus {
    /// Stable wire/database name.
    pub fn as_str(self) -> &'static str {
        match self {
            OpStatus::Success => "SUCCESS",
            OpStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for OpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(OpStatus::Success),
            "FAILED" => Ok(OpStatus::Failed),
            other => Err(format!("unknown op status: {other}")),
        }
    }
}

impl RunStatus {
    /// Stable wire/database name.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Partial => "PARTIAL",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(RunStatus::Completed),
            "FAILED" => Ok(RunStatus::Failed),
            "PARTIAL" => Ok(RunStatus::Partial),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Audit of one reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Surrogate id.
    pub id: Uuid,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
    /// Whether writes were skipped.
    pub dry_run: bool,
    /// Items examined.
    pub total_processed: u64,
    /// Items applied (or recordable in dry-run).
    pub success_count: u64,
    /// Items failed.
    pub failed_count: u64,
    /// CSCAs added.
    pub csca_added: u64,
    /// DSCs added.
    pub dsc_added: u64,
    /// DSC_NC added (always 0 by policy).
    pub dsc_nc_added: u64,
    /// CRLs added.
    pub crl_added: u64,
    /// CSCAs deleted.
    pub csca_deleted: u64,
    /// DSCs deleted.
    pub dsc_deleted: u64,
    /// CRLs deleted.
    pub crl_deleted: u64,
    /// Wall time of the run.
    pub duration_ms: u64,
    /// Run outcome.
    pub status: RunStatus,
}

/// One reconciliation operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationLog {
    /// Surrogate id.
    pub id: Uuid,
    /// Owning run.
    pub summary_id: Uuid,
    /// Operation kind.
    pub operation: ReconcileOp,
    /// Certificate type, or `CRL` for revocation lists.
    pub cert_type: String,
    /// Country of the item.
    pub country_code: String,
    /// Subject (or issuer, for CRLs).
    pub subject: String,
    /// Item fingerprint.
    pub fingerprint: String,
    /// Outcome.
    pub status: OpStatus,
    /// Operation wall time.
    pub duration_ms: u64,
    /// Error detail on failure.
    pub error: Option<String>,
}

/// Snapshot of per-type counts in both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Surrogate id.
    pub id: Uuid,
    /// Snapshot instant.
    pub taken_at: DateTime<Utc>,
    /// Counts in the relational store.
    pub db_counts: TypeCounts,
    /// Counts in the directory.
    pub ldap_counts: TypeCounts,
}

impl SyncStatus {
    /// Signed per-type discrepancy (relational minus directory).
    pub fn discrepancy(&self) -> [(CertType, i64); 4] {
        CertType::ALL.map(|t| {
            (t, self.db_counts.get(t) as i64 - self.ldap_counts.get(t) as i64)
        })
    }
}

/// Audit row for an ingested Master List container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterListRecord {
    /// Surrogate id.
    pub id: Uuid,
    /// Country of the publishing authority.
    pub country_code: String,
    /// Subject DN of the first CMS signer.
    pub signer_subject_dn: String,
    /// Certificates embedded in the list.
    pub cert_count: u64,
    /// Lowercase-hex SHA-256 of the container bytes.
    pub fingerprint: String,
    /// Contributing upload.
    pub upload_id: Option<Uuid>,
    /// Insertion instant.
    pub created_at: DateTime<Utc>,
}

/// A Deviation List stored verbatim with extracted signer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviationListRecord {
    /// Surrogate id.
    pub id: Uuid,
    /// Country of the publishing authority.
    pub country_code: String,
    /// Subject DN of the first CMS signer.
    pub signer_subject_dn: String,
    /// Lowercase-hex SHA-256 of the container bytes.
    pub fingerprint: String,
    /// Verbatim container bytes.
    pub der: Vec<u8>,
    /// Contributing upload.
    pub upload_id: Option<Uuid>,
    /// Insertion instant.
    pub created_at: DateTime<Utc>,
}

/// Per-country aggregate row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryCount {
    /// ISO 3166 code, or `XX`.
    pub country_code: String,
    /// Counts by type.
    pub counts: TypeCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cert_type_roundtrip() {
        for t in CertType::ALL {
            assert_eq!(t.as_str().parse::<CertType>().unwrap(), t);
        }
        assert!("DS".parse::<CertType>().is_err());
    }

    #[test]
    fn type_counts_buckets() {
        let mut c = TypeCounts::default();
        c.add(CertType::Csca);
        c.add(CertType::Csca);
        c.add(CertType::DscNc);
        assert_eq!(c.get(CertType::Csca), 2);
        assert_eq!(c.get(CertType::DscNc), 1);
        assert_eq!(c.total(), 3);
    }

    #[test]
    fn chain_path_uses_arrows() {
        let r = ValidationResult {
            id: Uuid::new_v4(),
            certificate_fingerprint: "ab".into(),
            cert_type: CertType::Dsc,
            trust_chain_path: vec!["Document Signer 1".into(), "CSCA-KOREA".into()],
            trust_chain_valid: true,
            validation_status: ValidationStatus::Valid,
            signature_valid: true,
            expiration_status: ExpirationStatus::Valid,
            crl_checked: false,
            revoked: false,
            trust_chain_message: None,
            csca_fingerprint: None,
            validated_at: Utc::now(),
        };
        assert_eq!(r.chain_path_string(), "Document Signer 1 → CSCA-KOREA");
    }
}
