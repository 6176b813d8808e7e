//! sqlx-backed repository implementation.
//!
//! Query text is assembled through the [`Dialect`] seam; binds use sqlx's
//! positional parameters. Duplicate natural keys are detected via the unique
//! constraint, never by a pre-read, so concurrent workers cannot race past
//! each other.

use crate::dialect::Dialect;
use crate::{Insertion, Result, Store, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use codec::dn;
use pkd_core::config::DbConfig;
use pkd_core::model::{
    CertType, Certificate, CountryCount, Crl, DeviationListRecord, ExpirationStatus,
    MasterListRecord, ReconciliationLog, ReconciliationSummary, RevokedEntry, SyncStatus,
    TypeCounts, Upload, UploadFormat, UploadStatus, ValidationResult, ValidationStatus,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Repository over a Postgres pool.
pub struct PgStore {
    pool: PgPool,
    dialect: Dialect,
}

impl PgStore {
    /// Connect with the configured pool bounds (min/max, 5 s acquire).
    pub async fn connect(cfg: &DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(cfg.pool_min)
            .max_connections(cfg.pool_max)
            .acquire_timeout(Duration::from_millis(cfg.acquire_timeout_ms))
            .connect(&cfg.url())
            .await?;
        Ok(Self { pool, dialect: Dialect::new(cfg.db_type) })
    }

    /// Apply the schema (idempotent).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/0001_init.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Underlying pool, for lifecycle management.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_revoked(&self, crl_id: Uuid) -> Result<Vec<RevokedEntry>> {
        let rows = sqlx::query(
            "SELECT serial_number, revocation_date, reason_code \
             FROM revoked_certificate WHERE crl_id = $1 ORDER BY id",
        )
        .bind(crl_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| RevokedEntry {
                serial_number: row.get("serial_number"),
                revocation_date: row.get("revocation_date"),
                reason_code: row.get("reason_code"),
            })
            .collect())
    }

    async fn crl_from_row(&self, row: &PgRow) -> Result<Crl> {
        let id: Uuid = row.get("id");
        Ok(Crl {
            id,
            fingerprint: row.get("fingerprint_sha256"),
            country_code: row.get("country_code"),
            issuer_dn: row.get("issuer_dn"),
            this_update: row.get("this_update"),
            next_update: row.get("next_update"),
            crl_number: row.get("crl_number"),
            revoked: self.load_revoked(id).await?,
            der: row.get("der"),
            stored_in_ldap: row.get("stored_in_ldap"),
            ldap_dn: row.get("ldap_dn"),
            upload_id: row.get("upload_id"),
            created_at: row.get("created_at"),
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn like_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn parse_str<T: std::str::FromStr>(value: String, what: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| StoreError::Decode(format!("{what}: {e}")))
}

fn json_vec(value: &str) -> Result<Vec<String>> {
    serde_json::from_str(value).map_err(|e| StoreError::Decode(format!("json list: {e}")))
}

fn cert_from_row(row: &PgRow) -> Result<Certificate> {
    Ok(Certificate {
        id: row.get("id"),
        cert_type: parse_str(row.get::<String, _>("certificate_type"), "certificate_type")?,
        fingerprint: row.get("fingerprint_sha256"),
        country_code: row.get("country_code"),
        subject_dn: row.get("subject_dn"),
        issuer_dn: row.get("issuer_dn"),
        serial_number: row.get("serial_number"),
        not_before: row.get("not_before"),
        not_after: row.get("not_after"),
        signature_algorithm: row.get("signature_algorithm"),
        public_key_algorithm: row.get("public_key_algorithm"),
        public_key_size: row.get::<i32, _>("public_key_size") as u32,
        public_key_curve: row.get("public_key_curve"),
        key_usage: json_vec(&row.get::<String, _>("key_usage"))?,
        extended_key_usage: json_vec(&row.get::<String, _>("extended_key_usage"))?,
        is_ca: row.get("is_ca"),
        path_len_constraint: row.get::<Option<i32>, _>("path_len_constraint").map(|v| v as u32),
        subject_key_identifier: row.get("subject_key_identifier"),
        authority_key_identifier: row.get("authority_key_identifier"),
        crl_distribution_points: json_vec(&row.get::<String, _>("crl_distribution_points"))?,
        ocsp_responder_url: row.get("ocsp_responder_url"),
        is_self_signed: row.get("is_self_signed"),
        der: row.get("der"),
        stored_in_ldap: row.get("stored_in_ldap"),
        ldap_dn: row.get("ldap_dn"),
        upload_id: row.get("upload_id"),
        created_at: row.get("created_at"),
    })
}

fn upload_from_row(row: &PgRow) -> Result<Upload> {
    Ok(Upload {
        id: row.get("id"),
        file_name: row.get("file_name"),
        file_hash: row.get("file_hash"),
        file_size: row.get::<i64, _>("file_size") as u64,
        format: parse_str::<UploadFormat>(row.get::<String, _>("format"), "format")?,
        status: parse_str::<UploadStatus>(row.get::<String, _>("status"), "status")?,
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
        total_entries: row.get::<i64, _>("total_entries") as u64,
        successful_count: row.get::<i64, _>("successful_count") as u64,
        duplicate_count: row.get::<i64, _>("duplicate_count") as u64,
        error_count: row.get::<i64, _>("error_count") as u64,
        inserted: serde_json::from_str(&row.get::<String, _>("inserted_json"))
            .unwrap_or_default(),
        duplicates: serde_json::from_str(&row.get::<String, _>("duplicates_json"))
            .unwrap_or_default(),
        error_message: row.get("error_message"),
    })
}

fn validation_from_row(row: &PgRow) -> Result<ValidationResult> {
    let path: String = row.get("trust_chain_path");
    Ok(ValidationResult {
        id: row.get("id"),
        certificate_fingerprint: row.get("certificate_fingerprint"),
        cert_type: parse_str(row.get::<String, _>("certificate_type"), "certificate_type")?,
        trust_chain_path: if path.is_empty() {
            Vec::new()
        } else {
            path.split(" \u{2192} ").map(str::to_string).collect()
        },
        trust_chain_valid: row.get("trust_chain_valid"),
        validation_status: parse_str::<ValidationStatus>(
            row.get::<String, _>("validation_status"),
            "validation_status",
        )?,
        signature_valid: row.get("signature_valid"),
        expiration_status: parse_str::<ExpirationStatus>(
            row.get::<String, _>("expiration_status"),
            "expiration_status",
        )?,
        crl_checked: row.get("crl_checked"),
        revoked: row.get("revoked"),
        trust_chain_message: row.get("trust_chain_message"),
        csca_fingerprint: row.get("csca_fingerprint"),
        validated_at: row.get("validated_at"),
    })
}

const CERT_COLUMNS: &str = "id, certificate_type, fingerprint_sha256, country_code, subject_dn, \
     issuer_dn, serial_number, not_before, not_after, signature_algorithm, public_key_algorithm, \
     public_key_size, public_key_curve, key_usage, extended_key_usage, is_ca, path_len_constraint, \
     subject_key_identifier, authority_key_identifier, crl_distribution_points, ocsp_responder_url, \
     is_self_signed, der, stored_in_ldap, ldap_dn, upload_id, created_at";

const CRL_COLUMNS: &str = "id, fingerprint_sha256, country_code, issuer_dn, this_update, \
     next_update, crl_number, der, stored_in_ldap, ldap_dn, upload_id, created_at";

#[async_trait]
impl Store for PgStore {
    async fn upsert_certificate(&self, cert: &Certificate) -> Result<Insertion> {
        let insert = sqlx::query(&format!(
            "INSERT INTO certificate ({CERT_COLUMNS}) VALUES \
             ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25,$26,$27)"
        ))
        .bind(cert.id)
        .bind(cert.cert_type.as_str())
        .bind(&cert.fingerprint)
        .bind(&cert.country_code)
        .bind(&cert.subject_dn)
        .bind(&cert.issuer_dn)
        .bind(&cert.serial_number)
        .bind(cert.not_before)
        .bind(cert.not_after)
        .bind(&cert.signature_algorithm)
        .bind(&cert.public_key_algorithm)
        .bind(cert.public_key_size as i32)
        .bind(self.dialect.optional_text(cert.public_key_curve.as_deref()))
        .bind(serde_json::to_string(&cert.key_usage).unwrap_or_else(|_| "[]".into()))
        .bind(serde_json::to_string(&cert.extended_key_usage).unwrap_or_else(|_| "[]".into()))
        .bind(cert.is_ca)
        .bind(cert.path_len_constraint.map(|v| v as i32))
        .bind(self.dialect.optional_text(cert.subject_key_identifier.as_deref()))
        .bind(self.dialect.optional_text(cert.authority_key_identifier.as_deref()))
        .bind(
            serde_json::to_string(&cert.crl_distribution_points).unwrap_or_else(|_| "[]".into()),
        )
        .bind(self.dialect.optional_text(cert.ocsp_responder_url.as_deref()))
        .bind(cert.is_self_signed)
        .bind(&cert.der)
        .bind(cert.stored_in_ldap)
        .bind(self.dialect.optional_text(cert.ldap_dn.as_deref()))
        .bind(cert.upload_id)
        .bind(cert.created_at)
        .execute(&self.pool)
        .await;

        match insert {
            Ok(_) => Ok(Insertion::Inserted(cert.id)),
            Err(e) if is_unique_violation(&e) => {
                let row = sqlx::query(
                    "SELECT id FROM certificate \
                     WHERE certificate_type = $1 AND fingerprint_sha256 = $2",
                )
                .bind(cert.cert_type.as_str())
                .bind(&cert.fingerprint)
                .fetch_one(&self.pool)
                .await?;
                Ok(Insertion::Duplicate(row.get("id")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_certificate(
        &self,
        t: CertType,
        fingerprint: &str,
    ) -> Result<Option<Certificate>> {
        let row = sqlx::query(&format!(
            "SELECT {CERT_COLUMNS} FROM certificate \
             WHERE certificate_type = $1 AND fingerprint_sha256 = $2"
        ))
        .bind(t.as_str())
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(cert_from_row).transpose()
    }

    async fn all_cscas(&self) -> Result<Vec<Certificate>> {
        let rows = sqlx::query(&format!(
            "SELECT {CERT_COLUMNS} FROM certificate WHERE certificate_type = $1 ORDER BY seq"
        ))
        .bind(CertType::Csca.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(cert_from_row).collect()
    }

    async fn find_all_cscas_by_subject_dn(&self, target: &str) -> Result<Vec<Certificate>> {
        // Wide pre-filter on the space-stripped raw DN, authoritative
        // post-filter on the normalized form.
        let wanted = dn::normalize(target);
        let rows = match dn::prefilter_key(target) {
            Some(key) => {
                let sql = format!(
                    "SELECT {CERT_COLUMNS} FROM certificate \
                     WHERE certificate_type = $1 AND {} LIKE $2 ORDER BY seq",
                    self.dialect.folded_dn_expr("subject_dn")
                );
                sqlx::query(&sql)
                    .bind(CertType::Csca.as_str())
                    .bind(format!("%{}%", like_escape(&key)))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {CERT_COLUMNS} FROM certificate \
                     WHERE certificate_type = $1 ORDER BY seq"
                ))
                .bind(CertType::Csca.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };
        let mut out = Vec::new();
        for row in &rows {
            let cert = cert_from_row(row)?;
            if dn::normalize(&cert.subject_dn) == wanted {
                out.push(cert);
            }
        }
        Ok(out)
    }

    async fn certificates_missing_in_directory(&self, t: CertType) -> Result<Vec<Certificate>> {
        let rows = sqlx::query(&format!(
            "SELECT {CERT_COLUMNS} FROM certificate \
             WHERE certificate_type = $1 AND stored_in_ldap = $2 ORDER BY seq"
        ))
        .bind(t.as_str())
        .bind(false)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(cert_from_row).collect()
    }

    async fn certificates_flagged_in_directory(&self, t: CertType) -> Result<Vec<Certificate>> {
        let rows = sqlx::query(&format!(
            "SELECT {CERT_COLUMNS} FROM certificate \
             WHERE certificate_type = $1 AND stored_in_ldap = $2 ORDER BY seq"
        ))
        .bind(t.as_str())
        .bind(true)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(cert_from_row).collect()
    }

    async fn mark_certificate_stored(&self, id: Uuid, ldap_dn: &str) -> Result<()> {
        sqlx::query("UPDATE certificate SET stored_in_ldap = $1, ldap_dn = $2 WHERE id = $3")
            .bind(true)
            .bind(ldap_dn)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_certificates_for_upload(&self, upload_id: Uuid) -> Result<Vec<Certificate>> {
        let rows = sqlx::query(&format!(
            "SELECT {CERT_COLUMNS} FROM certificate WHERE upload_id = $1 ORDER BY seq"
        ))
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;
        let certs: Vec<Certificate> =
            rows.iter().map(cert_from_row).collect::<Result<_>>()?;
        sqlx::query("DELETE FROM certificate WHERE upload_id = $1")
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
        Ok(certs)
    }

    async fn upsert_crl(&self, crl: &Crl) -> Result<Insertion> {
        let mut tx = self.pool.begin().await?;
        let insert = sqlx::query(&format!(
            "INSERT INTO crl ({CRL_COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)"
        ))
        .bind(crl.id)
        .bind(&crl.fingerprint)
        .bind(&crl.country_code)
        .bind(&crl.issuer_dn)
        .bind(crl.this_update)
        .bind(crl.next_update)
        .bind(self.dialect.optional_text(crl.crl_number.as_deref()))
        .bind(&crl.der)
        .bind(crl.stored_in_ldap)
        .bind(self.dialect.optional_text(crl.ldap_dn.as_deref()))
        .bind(crl.upload_id)
        .bind(crl.created_at)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {
                for entry in &crl.revoked {
                    sqlx::query(
                        "INSERT INTO revoked_certificate \
                         (crl_id, serial_number, revocation_date, reason_code) \
                         VALUES ($1,$2,$3,$4)",
                    )
                    .bind(crl.id)
                    .bind(&entry.serial_number)
                    .bind(entry.revocation_date)
                    .bind(&entry.reason_code)
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
                Ok(Insertion::Inserted(crl.id))
            }
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                let row = sqlx::query("SELECT id FROM crl WHERE fingerprint_sha256 = $1")
                    .bind(&crl.fingerprint)
                    .fetch_one(&self.pool)
                    .await?;
                Ok(Insertion::Duplicate(row.get("id")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn crls_missing_in_directory(&self) -> Result<Vec<Crl>> {
        let rows = sqlx::query(&format!(
            "SELECT {CRL_COLUMNS} FROM crl WHERE stored_in_ldap = $1 ORDER BY seq"
        ))
        .bind(false)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(self.crl_from_row(row).await?);
        }
        Ok(out)
    }

    async fn crls_flagged_in_directory(&self) -> Result<Vec<Crl>> {
        let rows = sqlx::query(&format!(
            "SELECT {CRL_COLUMNS} FROM crl WHERE stored_in_ldap = $1 ORDER BY seq"
        ))
        .bind(true)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(self.crl_from_row(row).await?);
        }
        Ok(out)
    }

    async fn mark_crl_stored(&self, id: Uuid, ldap_dn: &str) -> Result<()> {
        sqlx::query("UPDATE crl SET stored_in_ldap = $1, ldap_dn = $2 WHERE id = $3")
            .bind(true)
            .bind(ldap_dn)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn current_crl_for_issuer(&self, target: &str) -> Result<Option<Crl>> {
        let wanted = dn::normalize(target);
        let sql = match dn::prefilter_key(target) {
            Some(_) => format!(
                "SELECT {CRL_COLUMNS} FROM crl WHERE {} LIKE $1 ORDER BY this_update DESC",
                self.dialect.folded_dn_expr("issuer_dn")
            ),
            None => format!("SELECT {CRL_COLUMNS} FROM crl ORDER BY this_update DESC"),
        };
        let rows = match dn::prefilter_key(target) {
            Some(key) => {
                sqlx::query(&sql)
                    .bind(format!("%{}%", like_escape(&key)))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query(&sql).fetch_all(&self.pool).await?,
        };
        for row in &rows {
            let candidate = self.crl_from_row(row).await?;
            if dn::normalize(&candidate.issuer_dn) == wanted {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn create_upload(&self, upload: &Upload) -> Result<()> {
        sqlx::query(
            "INSERT INTO uploaded_file (id, file_name, file_hash, file_size, format, status, \
             created_at, completed_at, total_entries, successful_count, duplicate_count, \
             error_count, inserted_json, duplicates_json, error_message) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)",
        )
        .bind(upload.id)
        .bind(&upload.file_name)
        .bind(&upload.file_hash)
        .bind(upload.file_size as i64)
        .bind(upload.format.to_string())
        .bind(upload.status.as_str())
        .bind(upload.created_at)
        .bind(upload.completed_at)
        .bind(upload.total_entries as i64)
        .bind(upload.successful_count as i64)
        .bind(upload.duplicate_count as i64)
        .bind(upload.error_count as i64)
        .bind(serde_json::to_string(&upload.inserted).unwrap_or_else(|_| "{}".into()))
        .bind(serde_json::to_string(&upload.duplicates).unwrap_or_else(|_| "{}".into()))
        .bind(self.dialect.optional_text(upload.error_message.as_deref()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_upload(&self, id: Uuid) -> Result<Option<Upload>> {
        let row = sqlx::query("SELECT * FROM uploaded_file WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(upload_from_row).transpose()
    }

    async fn find_upload_by_hash(&self, file_hash: &str) -> Result<Option<Upload>> {
        let row = sqlx::query("SELECT * FROM uploaded_file WHERE file_hash = $1")
            .bind(file_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(upload_from_row).transpose()
    }

    async fn update_upload(&self, upload: &Upload) -> Result<()> {
        sqlx::query(
            "UPDATE uploaded_file SET status = $1, completed_at = $2, total_entries = $3, \
             successful_count = $4, duplicate_count = $5, error_count = $6, inserted_json = $7, \
             duplicates_json = $8, error_message = $9 WHERE id = $10",
        )
        .bind(upload.status.as_str())
        .bind(upload.completed_at)
        .bind(upload.total_entries as i64)
        .bind(upload.successful_count as i64)
        .bind(upload.duplicate_count as i64)
        .bind(upload.error_count as i64)
        .bind(serde_json::to_string(&upload.inserted).unwrap_or_else(|_| "{}".into()))
        .bind(serde_json::to_string(&upload.duplicates).unwrap_or_else(|_| "{}".into()))
        .bind(self.dialect.optional_text(upload.error_message.as_deref()))
        .bind(upload.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_stale_uploads(&self, deadline: DateTime<Utc>, reason: &str) -> Result<u64> {
        let done = sqlx::query(
            "UPDATE uploaded_file SET status = $1, error_message = $2, completed_at = $3 \
             WHERE status = $4 AND created_at < $5",
        )
        .bind(UploadStatus::Failed.as_str())
        .bind(reason)
        .bind(Utc::now())
        .bind(UploadStatus::Processing.as_str())
        .bind(deadline)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }

    async fn delete_upload(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM uploaded_file WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_validation_result(&self, result: &ValidationResult) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM validation_result WHERE certificate_fingerprint = $1")
            .bind(&result.certificate_fingerprint)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO validation_result (id, certificate_fingerprint, certificate_type, \
             trust_chain_path, trust_chain_valid, validation_status, signature_valid, \
             expiration_status, crl_checked, revoked, trust_chain_message, csca_fingerprint, \
             validated_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(result.id)
        .bind(&result.certificate_fingerprint)
        .bind(result.cert_type.as_str())
        .bind(result.chain_path_string())
        .bind(result.trust_chain_valid)
        .bind(result.validation_status.as_str())
        .bind(result.signature_valid)
        .bind(result.expiration_status.as_str())
        .bind(result.crl_checked)
        .bind(result.revoked)
        .bind(self.dialect.optional_text(result.trust_chain_message.as_deref()))
        .bind(self.dialect.optional_text(result.csca_fingerprint.as_deref()))
        .bind(result.validated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_validation_result(&self, fingerprint: &str) -> Result<Option<ValidationResult>> {
        let row = sqlx::query("SELECT * FROM validation_result WHERE certificate_fingerprint = $1")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(validation_from_row).transpose()
    }

    async fn count_by_type(&self) -> Result<TypeCounts> {
        let rows = sqlx::query(
            "SELECT certificate_type, COUNT(*) AS n FROM certificate GROUP BY certificate_type",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut counts = TypeCounts::default();
        for row in rows {
            let t: CertType = parse_str(row.get::<String, _>("certificate_type"), "type")?;
            let n = row.get::<i64, _>("n") as u64;
            match t {
                CertType::Csca => counts.csca = n,
                CertType::Dsc => counts.dsc = n,
                CertType::DscNc => counts.dsc_nc = n,
                CertType::Mlsc => counts.mlsc = n,
            }
        }
        let crl_row = sqlx::query("SELECT COUNT(*) AS n FROM crl").fetch_one(&self.pool).await?;
        counts.crl = crl_row.get::<i64, _>("n") as u64;
        Ok(counts)
    }

    async fn count_by_country(&self) -> Result<Vec<CountryCount>> {
        let rows = sqlx::query(
            "SELECT country_code, certificate_type, COUNT(*) AS n FROM certificate \
             GROUP BY country_code, certificate_type ORDER BY country_code",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_country: BTreeMap<String, TypeCounts> = BTreeMap::new();
        for row in rows {
            let country: String = row.get("country_code");
            let t: CertType = parse_str(row.get::<String, _>("certificate_type"), "type")?;
            let n = row.get::<i64, _>("n") as u64;
            let counts = by_country.entry(country).or_default();
            match t {
                CertType::Csca => counts.csca = n,
                CertType::Dsc => counts.dsc = n,
                CertType::DscNc => counts.dsc_nc = n,
                CertType::Mlsc => counts.mlsc = n,
            }
        }
        let crl_rows = sqlx::query(
            "SELECT country_code, COUNT(*) AS n FROM crl GROUP BY country_code",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in crl_rows {
            let country: String = row.get("country_code");
            by_country.entry(country).or_default().crl = row.get::<i64, _>("n") as u64;
        }
        Ok(by_country
            .into_iter()
            .map(|(country_code, counts)| CountryCount { country_code, counts })
            .collect())
    }

    async fn insert_master_list(&self, record: &MasterListRecord) -> Result<Insertion> {
        let insert = sqlx::query(
            "INSERT INTO master_list (id, country_code, signer_subject_dn, cert_count, \
             fingerprint_sha256, upload_id, created_at) VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(record.id)
        .bind(&record.country_code)
        .bind(&record.signer_subject_dn)
        .bind(record.cert_count as i64)
        .bind(&record.fingerprint)
        .bind(record.upload_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;
        match insert {
            Ok(_) => Ok(Insertion::Inserted(record.id)),
            Err(e) if is_unique_violation(&e) => {
                let row = sqlx::query("SELECT id FROM master_list WHERE fingerprint_sha256 = $1")
                    .bind(&record.fingerprint)
                    .fetch_one(&self.pool)
                    .await?;
                Ok(Insertion::Duplicate(row.get("id")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_deviation_list(&self, record: &DeviationListRecord) -> Result<Insertion> {
        let insert = sqlx::query(
            "INSERT INTO deviation_list (id, country_code, signer_subject_dn, \
             fingerprint_sha256, der, upload_id, created_at) VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(record.id)
        .bind(&record.country_code)
        .bind(&record.signer_subject_dn)
        .bind(&record.fingerprint)
        .bind(&record.der)
        .bind(record.upload_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;
        match insert {
            Ok(_) => Ok(Insertion::Inserted(record.id)),
            Err(e) if is_unique_violation(&e) => {
                let row =
                    sqlx::query("SELECT id FROM deviation_list WHERE fingerprint_sha256 = $1")
                        .bind(&record.fingerprint)
                        .fetch_one(&self.pool)
                        .await?;
                Ok(Insertion::Duplicate(row.get("id")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_reconciliation_summary(&self, s: &ReconciliationSummary) -> Result<()> {
        sqlx::query(
            "INSERT INTO reconciliation_summary (id, started_at, finished_at, dry_run, \
             total_processed, success_count, failed_count, csca_added, dsc_added, dsc_nc_added, \
             crl_added, csca_deleted, dsc_deleted, crl_deleted, duration_ms, status) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
        )
        .bind(s.id)
        .bind(s.started_at)
        .bind(s.finished_at)
        .bind(s.dry_run)
        .bind(s.total_processed as i64)
        .bind(s.success_count as i64)
        .bind(s.failed_count as i64)
        .bind(s.csca_added as i64)
        .bind(s.dsc_added as i64)
        .bind(s.dsc_nc_added as i64)
        .bind(s.crl_added as i64)
        .bind(s.csca_deleted as i64)
        .bind(s.dsc_deleted as i64)
        .bind(s.crl_deleted as i64)
        .bind(s.duration_ms as i64)
        .bind(s.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_reconciliation_logs(&self, logs: &[ReconciliationLog]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for log in logs {
            sqlx::query(
                "INSERT INTO reconciliation_log (id, summary_id, operation, cert_type, \
                 country_code, subject, fingerprint, status, duration_ms, error) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
            )
            .bind(log.id)
            .bind(log.summary_id)
            .bind(log.operation.as_str())
            .bind(&log.cert_type)
            .bind(&log.country_code)
            .bind(&log.subject)
            .bind(&log.fingerprint)
            .bind(log.status.as_str())
            .bind(log.duration_ms as i64)
            .bind(self.dialect.optional_text(log.error.as_deref()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_sync_status(&self, status: &SyncStatus) -> Result<()> {
        sqlx::query("INSERT INTO sync_status (id, taken_at, db_counts, ldap_counts) VALUES ($1,$2,$3,$4)")
            .bind(status.id)
            .bind(status.taken_at)
            .bind(serde_json::to_string(&status.db_counts).unwrap_or_else(|_| "{}".into()))
            .bind(serde_json::to_string(&status.ldap_counts).unwrap_or_else(|_| "{}".into()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest_sync_status(&self) -> Result<Option<SyncStatus>> {
        let sql = self
            .dialect
            .paginate("SELECT * FROM sync_status ORDER BY taken_at DESC", 1, 0);
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.map(|row| {
            Ok(SyncStatus {
                id: row.get("id"),
                taken_at: row.get("taken_at"),
                db_counts: serde_json::from_str(&row.get::<String, _>("db_counts"))
                    .map_err(|e| StoreError::Decode(format!("db_counts: {e}")))?,
                ldap_counts: serde_json::from_str(&row.get::<String, _>("ldap_counts"))
                    .map_err(|e| StoreError::Decode(format!("ldap_counts: {e}")))?,
            })
        })
        .transpose()
    }
}
