//! LDIF ingestion: stream entries, route binaries, hand off embedded Master
//! Lists.

use crate::classify::ClassifyContext;
use crate::counters::UploadCounters;
use crate::pipeline::Ingest;
use crate::IngestError;
use codec::ldif::LdifReader;
use pkd_core::event::{EventName, EventStatus};
use pkd_core::model::Certificate;
use std::io::BufRead;
use tracing::instrument;
use uuid::Uuid;

/// Attributes whose values are X.509 certificates.
const CERT_ATTRS: [&str; 2] = ["usercertificate", "cacertificate"];
/// Attribute carrying an embedded CMS Master List.
const MASTER_LIST_ATTR: &str = "pkdmasterlistcontent";

impl Ingest {
    /// Process a multi-entry LDIF stream. Events emit in file order; the
    /// returned certificates are queued for batched validation.
    #[instrument(skip_all, fields(upload = %upload_id))]
    pub async fn process_ldif<R: BufRead>(
        &self,
        upload_id: Uuid,
        reader: R,
        counters: &UploadCounters,
    ) -> Result<Vec<Certificate>, IngestError> {
        let mut pending = Vec::new();
        for entry in LdifReader::new(reader) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // Structural damage is confined to one record.
                    counters.begin_entry();
                    counters.error();
                    self.emit(
                        upload_id,
                        EventName::ParsingFailed,
                        EventStatus::Fail,
                        e.to_string(),
                        counters,
                    );
                    continue;
                }
            };

            let ctx = ClassifyContext::for_entry_dn(&entry.dn);
            let mut recognized = false;

            if let Some(ml) = entry.first(MASTER_LIST_ATTR) {
                recognized = true;
                let ml = ml.to_vec();
                pending.extend(self.process_master_list(upload_id, &ml, counters).await?);
            }

            for attr in CERT_ATTRS {
                for value in entry.all(attr) {
                    recognized = true;
                    let der = value.to_vec();
                    if let Some(cert) =
                        self.ingest_certificate_bytes(upload_id, &der, ctx, counters).await
                    {
                        pending.push(cert);
                    }
                }
            }

            for value in entry.all("certificaterevocationlist") {
                recognized = true;
                let der = value.to_vec();
                self.ingest_crl_bytes(upload_id, &der, counters).await;
            }

            if !recognized {
                counters.skipped();
                self.emit(
                    upload_id,
                    EventName::ParsingCompleted,
                    EventStatus::Info,
                    format!("no certificate or crl attribute: {}", entry.dn),
                    counters,
                );
            }
        }
        Ok(pending)
    }
}
