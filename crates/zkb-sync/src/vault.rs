//! Local encrypted vault
//!
//! Save path: assign id, encrypt under the session key, write the record,
//! then send the proof. The local write is the source of truth; proof sync
//! is best effort and its failure never undoes a save.
//!
//! Stored record, for every collection: `{ "id", "encrypted": true, "iv",
//! "payload" }`. The id stays in the clear so cleanup can run without the
//! key. Records without `encrypted: true` predate encryption and are read
//! back as stored.
//!
//! Clients, layout profiles and the company profile are sealed the same way
//! but have no proofs. Together with quotes and invoices they make up the
//! export archive.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use zkb_core::types::VerifyResult;
use zkb_core::Digest;
use zkb_crypto::{
    create_archive, decrypt_file, decrypt_json, encrypt_file, encrypt_json, open_archive,
    Archive, ArchiveBundle, DocumentKind, EncryptedFile, Envelope, KdfParams, SessionKeyring,
};

use crate::client::{FileMeta, ProofClient};
use crate::error::{SyncError, SyncResult};
use crate::records::RecordStore;

pub const FILES: &str = "files";
pub const CLIENTS: &str = "clients";
pub const LAYOUT_PROFILES: &str = "layoutProfiles";
/// Single-record collection holding the issuing company profile
pub const COMPANY: &str = "societe";
const COMPANY_ID: &str = "societe";

/// Fields of a company profile that was never saved
const COMPANY_FIELDS: [&str; 8] = [
    "logo",
    "nom",
    "formeJuridique",
    "siret",
    "rcs",
    "capital",
    "siegeSocial",
    "tvaIntra",
];

fn collection(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Quote => "devis",
        DocumentKind::Invoice => "factures",
    }
}

fn number_prefix(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Quote => "DEV",
        DocumentKind::Invoice => "FAC",
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DocumentRecord {
    id: String,
    encrypted: bool,
    #[serde(flatten)]
    envelope: Envelope,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRecord {
    id: String,
    filename: String,
    #[serde(default)]
    invoice_id: Option<String>,
    #[serde(flatten)]
    file: EncryptedFile,
}

/// What happened to the proof of a save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofStatus {
    Sent(Digest),
    /// No proof server configured
    Offline,
    /// Sending failed; the local record was still written
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// The document as stored (with id and `createdAt`)
    pub document: Value,
    pub proof: ProofStatus,
}

/// A decrypted vault file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFile {
    pub meta: FileMeta,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub proofs_removed: usize,
    pub file_proofs_removed: usize,
}

/// Counts from restoring an archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub clients: usize,
    pub quotes: usize,
    pub invoices: usize,
    pub layout_profiles: usize,
    pub company: bool,
    pub proofs_sent: usize,
    pub proofs_failed: usize,
}

pub struct Vault<S: RecordStore> {
    keyring: Arc<SessionKeyring>,
    records: S,
    client: Option<ProofClient>,
}

impl<S: RecordStore> Vault<S> {
    pub fn new(keyring: Arc<SessionKeyring>, records: S) -> Self {
        Self {
            keyring,
            records,
            client: None,
        }
    }

    pub fn with_client(mut self, client: ProofClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn keyring(&self) -> &SessionKeyring {
        &self.keyring
    }

    pub fn records(&self) -> &S {
        &self.records
    }

    pub fn client(&self) -> Option<&ProofClient> {
        self.client.as_ref()
    }

    // ── Documents ────────────────────────────────────────────────────────────

    /// Create or update a quote / invoice.
    ///
    /// A missing id gets a fresh UUID. On update, incoming fields are merged
    /// over the stored document and `createdAt` is kept from the first save.
    pub async fn save_document(&self, kind: DocumentKind, document: Value) -> SyncResult<SaveOutcome> {
        let Value::Object(incoming) = document else {
            return Err(SyncError::Validation("document must be a JSON object".into()));
        };

        let (id, record) = self.merge_record(collection(kind), incoming)?;
        self.seal_record(collection(kind), &id, &record)?;
        debug!(kind = %kind, subject = %id, "document saved");

        let proof = match &self.client {
            None => ProofStatus::Offline,
            Some(client) => match client.send_proof(&record, kind).await {
                Ok(Some(digest)) => ProofStatus::Sent(digest),
                Ok(None) => ProofStatus::Offline,
                Err(e) => {
                    warn!(kind = %kind, subject = %id, error = %e, "proof sync failed, document kept locally");
                    ProofStatus::Failed(e.to_string())
                }
            },
        };

        Ok(SaveOutcome {
            document: record,
            proof,
        })
    }

    pub fn get_document(&self, kind: DocumentKind, id: &str) -> SyncResult<Option<Value>> {
        self.get_record(collection(kind), id)
    }

    /// Every document of `kind`, ordered by id.
    pub fn list_documents(&self, kind: DocumentKind) -> SyncResult<Vec<Value>> {
        self.list_records(collection(kind))
    }

    /// Delete locally, then remove the remote proof best effort.
    pub async fn delete_document(&self, kind: DocumentKind, id: &str) -> SyncResult<bool> {
        let removed = self.records.delete(collection(kind), id)?;
        if let Some(client) = &self.client {
            if let Err(e) = client.delete_proof(id).await {
                warn!(kind = %kind, subject = id, error = %e, "remote proof delete failed");
            }
        }
        Ok(removed)
    }

    /// Re-hash every local document of `kind` and compare with the server.
    pub async fn verify_all(&self, kind: DocumentKind) -> SyncResult<Vec<VerifyResult>> {
        let client = self.client.as_ref().ok_or(SyncError::Offline)?;
        let documents = self.list_documents(kind)?;
        client.verify_documents(kind, &documents).await
    }

    /// Next free number for `year`: `DEV-2026-004` after `DEV-2026-003`.
    pub fn next_number(&self, kind: DocumentKind, year: i32) -> SyncResult<String> {
        let prefix = format!("{}-{year}-", number_prefix(kind));
        let max = self
            .list_documents(kind)?
            .iter()
            .filter_map(|doc| doc.pointer("/entete/numero").and_then(Value::as_str))
            .filter_map(|numero| numero.strip_prefix(&prefix))
            .filter_map(leading_number)
            .max()
            .unwrap_or(0);
        let next = max
            .checked_add(1)
            .ok_or_else(|| SyncError::NumberingExhausted { prefix: prefix.clone() })?;
        Ok(format!("{prefix}{next:03}"))
    }

    pub fn next_quote_number(&self, year: i32) -> SyncResult<String> {
        self.next_number(DocumentKind::Quote, year)
    }

    pub fn next_invoice_number(&self, year: i32) -> SyncResult<String> {
        self.next_number(DocumentKind::Invoice, year)
    }

    // ── Clients, layout profiles, company ────────────────────────────────────

    /// Create or update a client. Same id and `createdAt` rules as documents.
    pub fn save_client(&self, client: Value) -> SyncResult<Value> {
        let Value::Object(incoming) = client else {
            return Err(SyncError::Validation("client must be a JSON object".into()));
        };
        let (id, record) = self.merge_record(CLIENTS, incoming)?;
        self.seal_record(CLIENTS, &id, &record)?;
        debug!(subject = %id, "client saved");
        Ok(record)
    }

    pub fn get_client(&self, id: &str) -> SyncResult<Option<Value>> {
        self.get_record(CLIENTS, id)
    }

    pub fn list_clients(&self) -> SyncResult<Vec<Value>> {
        self.list_records(CLIENTS)
    }

    pub fn delete_client(&self, id: &str) -> SyncResult<bool> {
        self.records.delete(CLIENTS, id)
    }

    /// Create or update a layout profile. A new profile gets `name`
    /// (trimmed, `"Sans nom"` when blank) and an empty `blockPositions`.
    pub fn save_layout_profile(&self, profile: Value) -> SyncResult<Value> {
        let Value::Object(mut incoming) = profile else {
            return Err(SyncError::Validation("layout profile must be a JSON object".into()));
        };
        let is_new = match incoming.get("id").and_then(Value::as_str).map(str::trim) {
            Some(id) if !id.is_empty() => self.records.get(LAYOUT_PROFILES, id)?.is_none(),
            _ => true,
        };
        if is_new {
            let name = incoming
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or("Sans nom")
                .to_string();
            incoming.insert("name".into(), Value::String(name));
            incoming
                .entry("blockPositions")
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let (id, record) = self.merge_record(LAYOUT_PROFILES, incoming)?;
        self.seal_record(LAYOUT_PROFILES, &id, &record)?;
        debug!(subject = %id, "layout profile saved");
        Ok(record)
    }

    pub fn get_layout_profile(&self, id: &str) -> SyncResult<Option<Value>> {
        self.get_record(LAYOUT_PROFILES, id)
    }

    pub fn list_layout_profiles(&self) -> SyncResult<Vec<Value>> {
        self.list_records(LAYOUT_PROFILES)
    }

    pub fn delete_layout_profile(&self, id: &str) -> SyncResult<bool> {
        self.records.delete(LAYOUT_PROFILES, id)
    }

    /// The company profile, or one with every field blank if never saved.
    pub fn get_company(&self) -> SyncResult<Value> {
        match self.get_record(COMPANY, COMPANY_ID)? {
            Some(company) => Ok(company),
            None => Ok(Value::Object(
                COMPANY_FIELDS
                    .iter()
                    .map(|f| (f.to_string(), Value::String(String::new())))
                    .collect(),
            )),
        }
    }

    /// Replace the company profile.
    pub fn save_company(&self, company: Value) -> SyncResult<Value> {
        let Value::Object(mut record) = company else {
            return Err(SyncError::Validation("company profile must be a JSON object".into()));
        };
        record.insert("id".into(), Value::String(COMPANY_ID.into()));
        let record = Value::Object(record);
        self.seal_record(COMPANY, COMPANY_ID, &record)?;
        Ok(record)
    }

    // ── Export archive ───────────────────────────────────────────────────────

    /// Every collection, decrypted, ready for [`create_archive`].
    pub fn export_bundle(&self) -> SyncResult<ArchiveBundle> {
        Ok(ArchiveBundle {
            clients: self.list_clients()?,
            quotes: self.list_documents(DocumentKind::Quote)?,
            invoices: self.list_documents(DocumentKind::Invoice)?,
            layout_profiles: self.list_layout_profiles()?,
            company: self.get_record(COMPANY, COMPANY_ID)?,
        })
    }

    /// Seal the whole vault into an archive protected by `password`.
    pub fn export_archive(&self, password: &SecretString, params: &KdfParams) -> SyncResult<Archive> {
        let bundle = self.export_bundle()?;
        let archive = create_archive(&bundle, password, params)?;
        info!(
            clients = bundle.clients.len(),
            quotes = bundle.quotes.len(),
            invoices = bundle.invoices.len(),
            "vault exported"
        );
        Ok(archive)
    }

    /// Open `archive` and restore its records under the session key.
    pub async fn import_archive(&self, archive: &Archive, password: &SecretString) -> SyncResult<ImportReport> {
        let bundle = open_archive(archive, password)?;
        self.import_bundle(bundle).await
    }

    /// Write every record of `bundle`, replacing local records with the same
    /// id and keeping the rest. Imported records are stored exactly as
    /// archived. Quote and invoice proofs are then sent best effort.
    ///
    /// Nothing is written unless every entry is a JSON object.
    pub async fn import_bundle(&self, bundle: ArchiveBundle) -> SyncResult<ImportReport> {
        let quote_collection = collection(DocumentKind::Quote);
        let invoice_collection = collection(DocumentKind::Invoice);
        let clients = archived_records(CLIENTS, bundle.clients)?;
        let quotes = archived_records(quote_collection, bundle.quotes)?;
        let invoices = archived_records(invoice_collection, bundle.invoices)?;
        let profiles = archived_records(LAYOUT_PROFILES, bundle.layout_profiles)?;
        let company = match bundle.company {
            None | Some(Value::Null) => None,
            Some(company @ Value::Object(_)) => Some(company),
            Some(_) => return Err(SyncError::Validation("societe must be a JSON object".into())),
        };

        for (name, records) in [
            (CLIENTS, &clients),
            (quote_collection, &quotes),
            (invoice_collection, &invoices),
            (LAYOUT_PROFILES, &profiles),
        ] {
            for (id, record) in records {
                self.seal_record(name, id, record)?;
            }
        }
        let mut report = ImportReport {
            clients: clients.len(),
            quotes: quotes.len(),
            invoices: invoices.len(),
            layout_profiles: profiles.len(),
            company: company.is_some(),
            ..ImportReport::default()
        };
        if let Some(company) = company {
            self.save_company(company)?;
        }

        if let Some(client) = &self.client {
            for (kind, records) in [(DocumentKind::Quote, &quotes), (DocumentKind::Invoice, &invoices)] {
                for (id, record) in records {
                    match client.send_proof(record, kind).await {
                        Ok(Some(_)) => report.proofs_sent += 1,
                        Ok(None) => {}
                        Err(e) => {
                            warn!(kind = %kind, subject = %id, error = %e, "proof sync failed for imported document");
                            report.proofs_failed += 1;
                        }
                    }
                }
            }
        }

        info!(
            clients = report.clients,
            quotes = report.quotes,
            invoices = report.invoices,
            proofs_failed = report.proofs_failed,
            "archive imported"
        );
        Ok(report)
    }

    // ── Sealed records ───────────────────────────────────────────────────────

    /// Resolve the id of `incoming` (fresh UUID when missing or blank) and
    /// merge it over the stored record, keeping the first `createdAt`.
    fn merge_record(&self, collection: &str, incoming: Map<String, Value>) -> SyncResult<(String, Value)> {
        let id = incoming
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut record = match self.get_record(collection, &id)? {
            Some(Value::Object(mut stored)) => {
                let created_at = stored.get("createdAt").cloned();
                stored.extend(incoming);
                if let Some(created_at) = created_at {
                    stored.insert("createdAt".into(), created_at);
                }
                stored
            }
            _ => {
                let mut fresh = incoming;
                fresh.insert(
                    "createdAt".into(),
                    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
                fresh
            }
        };
        record.insert("id".into(), Value::String(id.clone()));
        Ok((id, Value::Object(record)))
    }

    fn seal_record(&self, collection: &str, id: &str, record: &Value) -> SyncResult<()> {
        let envelope = self.keyring.with_key(|key| encrypt_json(record, key))?;
        let stored = DocumentRecord {
            id: id.to_string(),
            encrypted: true,
            envelope,
        };
        self.records.put(collection, id, serde_json::to_value(&stored)?)
    }

    fn get_record(&self, collection: &str, id: &str) -> SyncResult<Option<Value>> {
        match self.records.get(collection, id)? {
            Some(raw) => Ok(Some(self.open_record(raw)?)),
            None => Ok(None),
        }
    }

    fn list_records(&self, collection: &str) -> SyncResult<Vec<Value>> {
        self.records
            .list(collection)?
            .into_iter()
            .map(|(_, raw)| self.open_record(raw))
            .collect()
    }

    fn open_record(&self, raw: Value) -> SyncResult<Value> {
        if raw.get("encrypted").and_then(Value::as_bool) != Some(true) {
            if !raw.is_object() {
                return Err(SyncError::Store("stored record is not a JSON object".into()));
            }
            return Ok(raw);
        }
        let record: DocumentRecord = serde_json::from_value(raw)?;
        let document = self
            .keyring
            .with_key(|key| decrypt_json::<Map<String, Value>>(&record.envelope, key))?;
        Ok(Value::Object(document))
    }

    // ── Vault files ──────────────────────────────────────────────────────────

    /// Encrypt and store a file, then send its proof. An empty mime type
    /// becomes `application/octet-stream`.
    pub async fn save_file(&self, meta: FileMeta, bytes: &[u8]) -> SyncResult<ProofStatus> {
        let id = meta.document_id.trim().to_string();
        if id.is_empty() {
            return Err(SyncError::Validation("documentId is required".into()));
        }

        let file = self
            .keyring
            .with_key(|key| encrypt_file(bytes, Some(meta.mime_type.as_str()), key))?;
        let meta = FileMeta {
            document_id: id.clone(),
            mime_type: file.mime_type.clone(),
            ..meta
        };
        let record = FileRecord {
            id: id.clone(),
            filename: meta.filename.clone(),
            invoice_id: meta.invoice_id.clone(),
            file,
        };
        self.records.put(FILES, &id, serde_json::to_value(&record)?)?;
        debug!(subject = %id, size = bytes.len(), "vault file saved");

        Ok(match &self.client {
            None => ProofStatus::Offline,
            Some(client) => match client.send_file_proof(&meta, bytes).await {
                Ok(digest) => ProofStatus::Sent(digest),
                Err(e) => {
                    warn!(subject = %id, error = %e, "file proof sync failed, file kept locally");
                    ProofStatus::Failed(e.to_string())
                }
            },
        })
    }

    pub fn get_file(&self, id: &str) -> SyncResult<Option<VaultFile>> {
        let Some(raw) = self.records.get(FILES, id)? else {
            return Ok(None);
        };
        let record: FileRecord = serde_json::from_value(raw)?;
        let decrypted = self.keyring.with_key(|key| decrypt_file(&record.file, key))?;
        Ok(Some(VaultFile {
            meta: FileMeta {
                document_id: record.id,
                filename: record.filename,
                mime_type: decrypted.mime_type,
                invoice_id: record.invoice_id,
            },
            bytes: decrypted.bytes,
        }))
    }

    pub async fn delete_file(&self, id: &str) -> SyncResult<bool> {
        let removed = self.records.delete(FILES, id)?;
        if let Some(client) = &self.client {
            if let Err(e) = client.delete_file_proof(id).await {
                warn!(subject = id, error = %e, "remote file proof delete failed");
            }
        }
        Ok(removed)
    }

    // ── Remote housekeeping ──────────────────────────────────────────────────

    /// Remove remote proofs that no longer have a local record. Quotes and
    /// invoices share one proof namespace, so both id sets are kept.
    pub async fn cleanup_remote(&self) -> SyncResult<CleanupReport> {
        let client = self.client.as_ref().ok_or(SyncError::Offline)?;

        let mut keep = self.records.ids(collection(DocumentKind::Quote))?;
        keep.extend(self.records.ids(collection(DocumentKind::Invoice))?);
        let proofs_removed = client.cleanup_proofs(&keep).await?;

        let keep_files = self.records.ids(FILES)?;
        let file_proofs_removed = client.cleanup_file_proofs(&keep_files).await?;

        Ok(CleanupReport {
            proofs_removed,
            file_proofs_removed,
        })
    }
}

/// `(id, record)` pairs of one archived collection. Entries without an id
/// get a fresh UUID; anything that is not an object rejects the collection.
fn archived_records(name: &str, entries: Vec<Value>) -> SyncResult<Vec<(String, Value)>> {
    entries
        .into_iter()
        .map(|entry| {
            let Value::Object(mut map) = entry else {
                return Err(SyncError::Validation(format!("{name} entries must be JSON objects")));
            };
            let id = match map.get("id").and_then(Value::as_str).map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    let id = uuid::Uuid::new_v4().to_string();
                    map.insert("id".into(), Value::String(id.clone()));
                    id
                }
            };
            Ok((id, Value::Object(map)))
        })
        .collect()
}

/// Leading decimal digits of `s`, if any.
fn leading_number(s: &str) -> Option<u64> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}
