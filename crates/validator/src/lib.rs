//! Trust chain validation for document signer certificates.
//!
//! Validation never raises: every outcome, including repository failures, is
//! recorded as a [`ValidationResult`]. Bulk validation against a warm cache
//! is linear in the number of leaves.

#![deny(unsafe_code)]

pub mod cache;
pub mod chain;

use cert_store::Store;
use chrono::{DateTime, Utc};
use codec::dn;
use pkd_core::clock::Clock;
use pkd_core::model::{Certificate, ExpirationStatus, ValidationResult, ValidationStatus};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub use cache::CscaCache;
pub use chain::{build_chain, candidate_map, ChainFailure, ChainResult, MAX_CHAIN_DEPTH};

/// Validator over a repository and a CSCA cache.
pub struct TrustValidator {
    store: Arc<dyn Store>,
    cache: CscaCache,
    clock: Arc<dyn Clock>,
}

impl TrustValidator {
    /// New validator. `cache_enabled` mirrors `CSCA_CACHE_ENABLED`.
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, cache_enabled: bool) -> Self {
        Self { store, cache: CscaCache::new(cache_enabled), clock }
    }

    /// Invalidate the CSCA cache (called after CSCA inserts or removals).
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    /// Validate one certificate and persist the result.
    #[instrument(skip_all, fields(fingerprint = %cert.fingerprint))]
    pub async fn validate(&self, cert: &Certificate) -> ValidationResult {
        let result = match self.validate_inner(cert).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "validation errored");
                error_result(cert, self.clock.now(), e.to_string())
            }
        };
        if let Err(e) = self.store.save_validation_result(&result).await {
            warn!(error = %e, "failed to persist validation result");
        }
        result
    }

    /// Validate a batch, sharing one cache snapshot.
    pub async fn validate_batch(&self, certs: &[Certificate]) -> Vec<ValidationResult> {
        let mut out = Vec::with_capacity(certs.len());
        for cert in certs {
            out.push(self.validate(cert).await);
        }
        out
    }

    async fn validate_inner(
        &self,
        cert: &Certificate,
    ) -> Result<ValidationResult, cert_store::StoreError> {
        let now = self.clock.now();
        let candidates = self.cache.snapshot(self.store.as_ref()).await?;
        let leaf = Arc::new(cert.clone());
        let chain = chain::build_chain(leaf, &candidates, now);

        let expiration_status = expiration_of(cert, now);

        if let Some(failure) = chain.failure() {
            debug!(code = failure.as_str(), "chain build failed");
            return Ok(ValidationResult {
                id: Uuid::new_v4(),
                certificate_fingerprint: cert.fingerprint.clone(),
                cert_type: cert.cert_type,
                trust_chain_path: Vec::new(),
                trust_chain_valid: false,
                validation_status: ValidationStatus::Invalid,
                signature_valid: false,
                expiration_status,
                crl_checked: false,
                revoked: false,
                trust_chain_message: Some(failure.as_str().to_string()),
                csca_fingerprint: None,
                validated_at: now,
            });
        }

        let members = chain.members();
        let trust_chain_path: Vec<String> = members
            .iter()
            .map(|m| dn::first_cn(&m.subject_dn).unwrap_or_else(|| m.subject_dn.clone()))
            .collect();
        let csca_fingerprint = chain.root().map(|r| r.fingerprint.clone());

        // Revocation: only when the leaf advertises a distribution point and a
        // current CRL for its issuer is known. Serial comparison is
        // case-sensitive over canonical lowercase hex.
        let (crl_checked, revoked) = if cert.crl_distribution_points.is_empty() {
            (false, false)
        } else {
            match self.store.current_crl_for_issuer(&cert.issuer_dn).await? {
                Some(crl) => (
                    true,
                    crl.revoked.iter().any(|r| r.serial_number == cert.serial_number),
                ),
                None => (false, false),
            }
        };

        let validation_status = if revoked {
            ValidationStatus::Invalid
        } else {
            match expiration_status {
                ExpirationStatus::Valid => ValidationStatus::Valid,
                ExpirationStatus::Expired => ValidationStatus::ExpiredValid,
                ExpirationStatus::NotYetValid => ValidationStatus::Pending,
            }
        };

        Ok(ValidationResult {
            id: Uuid::new_v4(),
            certificate_fingerprint: cert.fingerprint.clone(),
            cert_type: cert.cert_type,
            trust_chain_path,
            trust_chain_valid: true,
            validation_status,
            signature_valid: true,
            expiration_status,
            crl_checked,
            revoked,
            trust_chain_message: None,
            csca_fingerprint,
            validated_at: now,
        })
    }
}

fn expiration_of(cert: &Certificate, now: DateTime<Utc>) -> ExpirationStatus {
    if now < cert.not_before {
        ExpirationStatus::NotYetValid
    } else if now > cert.not_after {
        ExpirationStatus::Expired
    } else {
        ExpirationStatus::Valid
    }
}

fn error_result(cert: &Certificate, now: DateTime<Utc>, message: String) -> ValidationResult {
    ValidationResult {
        id: Uuid::new_v4(),
        certificate_fingerprint: cert.fingerprint.clone(),
        cert_type: cert.cert_type,
        trust_chain_path: Vec::new(),
        trust_chain_valid: false,
        validation_status: ValidationStatus::Error,
        signature_valid: false,
        expiration_status: expiration_of(cert, now),
        crl_checked: false,
        revoked: false,
        trust_chain_message: Some(message),
        csca_fingerprint: None,
        validated_at: now,
    }
}
