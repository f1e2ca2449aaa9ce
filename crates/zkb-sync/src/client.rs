//! HTTP client for the proof server.
//!
//! Only digests and file metadata ever leave the device. Every call is a
//! single request; failures are returned to the caller, never retried here.

use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use zkb_core::config::ClientConfig;
use zkb_core::limits::{DOCUMENT_ID_MAX, INVOICE_ID_MAX, VERIFY_BATCH_MAX};
use zkb_core::types::{
    Ack, CleanupDocumentProofsRequest, CleanupDone, CleanupProofsRequest, DocumentProofList,
    DocumentProofSummary, DocumentProofUpsert, DocumentProofUpserted, ErrorBody, ProofDeleted,
    ProofList, ProofSummary, ProofUpsert, ProofUpserted, VerifyCheck, VerifyRequest,
    VerifyResponse, VerifyResult,
};
use zkb_core::Digest;
use zkb_crypto::{hash_document, hash_file, DocumentKind};

use crate::error::{SyncError, SyncResult};

/// Metadata sent alongside a vault file digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub document_id: String,
    pub filename: String,
    pub mime_type: String,
    /// Invoice this file is attached to, if any
    pub invoice_id: Option<String>,
}

pub struct ProofClient {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl ProofClient {
    pub fn new(config: &ClientConfig) -> SyncResult<Self> {
        let base = Url::parse(config.api_base_url.trim())
            .map_err(|e| SyncError::Validation(format!("invalid api_base_url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(SyncError::Validation(format!(
                "invalid api_base_url: {base}"
            )));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base,
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    // ── Document proofs ──────────────────────────────────────────────────────

    /// Hash `document` and upsert its proof. The signature is the digest
    /// itself.
    ///
    /// A document without an `id` has nothing to attach a proof to and is
    /// skipped (`Ok(None)`).
    pub async fn send_proof(&self, document: &Value, kind: DocumentKind) -> SyncResult<Option<Digest>> {
        let Some(id) = document_id(document) else {
            debug!(kind = %kind, "document has no id, proof skipped");
            return Ok(None);
        };
        check_id(id, "invoiceId", INVOICE_ID_MAX)?;

        let digest = hash_document(Some(document), kind);
        self.upsert_proof(id, &digest).await?;
        Ok(Some(digest))
    }

    pub async fn upsert_proof(&self, invoice_id: &str, digest: &Digest) -> SyncResult<()> {
        let body = ProofUpsert {
            invoice_id: invoice_id.to_string(),
            invoice_hash: digest.clone(),
            signature: digest.to_string(),
        };
        let _: ProofUpserted = self
            .send(self.request(Method::POST, &["proofs"])?.json(&body))
            .await?;
        debug!(subject = invoice_id, digest = %digest, "proof sent");
        Ok(())
    }

    /// Compare digests with the server. An empty batch returns without a
    /// request; more than [`VERIFY_BATCH_MAX`] checks is rejected locally.
    pub async fn verify_proofs(&self, checks: &[VerifyCheck]) -> SyncResult<Vec<VerifyResult>> {
        if checks.is_empty() {
            return Ok(Vec::new());
        }
        if checks.len() > VERIFY_BATCH_MAX {
            return Err(SyncError::Validation(format!(
                "{} checks exceed the batch limit of {VERIFY_BATCH_MAX}",
                checks.len()
            )));
        }

        let body = VerifyRequest {
            checks: checks.to_vec(),
        };
        let resp: VerifyResponse = self
            .send(self.request(Method::POST, &["proofs", "verify"])?.json(&body))
            .await?;
        Ok(resp.results)
    }

    /// Re-hash every document and verify in batches. Documents without an id
    /// are left out of the results.
    pub async fn verify_documents(&self, kind: DocumentKind, documents: &[Value]) -> SyncResult<Vec<VerifyResult>> {
        let checks: Vec<VerifyCheck> = documents
            .iter()
            .filter_map(|doc| {
                document_id(doc).map(|id| VerifyCheck {
                    invoice_id: id.to_string(),
                    invoice_hash: hash_document(Some(doc), kind),
                })
            })
            .collect();

        let mut results = Vec::with_capacity(checks.len());
        for batch in checks.chunks(VERIFY_BATCH_MAX) {
            results.extend(self.verify_proofs(batch).await?);
        }
        Ok(results)
    }

    /// Most recent first.
    pub async fn list_proofs(&self) -> SyncResult<Vec<ProofSummary>> {
        let resp: ProofList = self.send(self.request(Method::GET, &["proofs"])?).await?;
        Ok(resp.proofs)
    }

    /// Returns whether the server held a proof for `invoice_id`.
    pub async fn delete_proof(&self, invoice_id: &str) -> SyncResult<bool> {
        check_id(invoice_id, "invoiceId", INVOICE_ID_MAX)?;
        let resp: ProofDeleted = self
            .send(self.request(Method::DELETE, &["proofs", invoice_id])?)
            .await?;
        Ok(resp.deleted)
    }

    /// Drop every remote proof whose id is not in `keep`. Returns the number
    /// the server removed.
    pub async fn cleanup_proofs(&self, keep: &[String]) -> SyncResult<usize> {
        let body = CleanupProofsRequest {
            keep_invoice_ids: keep.to_vec(),
        };
        let resp: CleanupDone = self
            .send(self.request(Method::POST, &["proofs", "cleanup"])?.json(&body))
            .await?;
        Ok(resp.deleted)
    }

    // ── Vault file proofs ────────────────────────────────────────────────────

    pub async fn send_file_proof(&self, meta: &FileMeta, bytes: &[u8]) -> SyncResult<Digest> {
        check_id(&meta.document_id, "documentId", DOCUMENT_ID_MAX)?;

        let digest = hash_file(bytes);
        let body = DocumentProofUpsert {
            document_id: meta.document_id.clone(),
            file_hash: digest.clone(),
            filename: meta.filename.clone(),
            mime_type: meta.mime_type.clone(),
            size: bytes.len() as u64,
            invoice_id: meta.invoice_id.clone().filter(|id| !id.trim().is_empty()),
        };
        let _: DocumentProofUpserted = self
            .send(self.request(Method::POST, &["documents", "proof"])?.json(&body))
            .await?;
        debug!(subject = %meta.document_id, size = bytes.len(), "file proof sent");
        Ok(digest)
    }

    pub async fn list_file_proofs(&self) -> SyncResult<Vec<DocumentProofSummary>> {
        let resp: DocumentProofList = self
            .send(self.request(Method::GET, &["documents", "proofs"])?)
            .await?;
        Ok(resp.document_proofs)
    }

    pub async fn delete_file_proof(&self, document_id: &str) -> SyncResult<()> {
        check_id(document_id, "documentId", DOCUMENT_ID_MAX)?;
        let _: Ack = self
            .send(self.request(Method::DELETE, &["documents", "proof", document_id])?)
            .await?;
        Ok(())
    }

    pub async fn cleanup_file_proofs(&self, keep: &[String]) -> SyncResult<usize> {
        let body = CleanupDocumentProofsRequest {
            keep_document_ids: keep.to_vec(),
        };
        let resp: CleanupDone = self
            .send(self.request(Method::POST, &["documents", "proofs", "cleanup"])?.json(&body))
            .await?;
        Ok(resp.deleted)
    }

    // ── Plumbing ─────────────────────────────────────────────────────────────

    /// `{base}/api/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Validation(format!("invalid api_base_url: {}", self.base)))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> SyncResult<RequestBuilder> {
        let req = self.client.request(method, self.url(segments)?);
        Ok(match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> SyncResult<T> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
        };
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthenticated);
        }
        Err(SyncError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

impl std::fmt::Debug for ProofClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofClient")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Non-empty string `id` of a document
pub(crate) fn document_id(document: &Value) -> Option<&str> {
    document
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

fn check_id(id: &str, field: &str, max: usize) -> SyncResult<()> {
    let id = id.trim();
    if id.is_empty() {
        return Err(SyncError::Validation(format!("{field} is required")));
    }
    if id.chars().count() > max {
        return Err(SyncError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}
