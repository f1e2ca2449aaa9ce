//! JSON bodies of the `/api` proof surface.
//!
//! Field names follow the wire (camelCase). Requests are the shapes a
//! well-behaved client sends; the server parses its own lenient variants
//! before validating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;

// ── Document (quote / invoice) proofs ────────────────────────────────────────

/// `POST /api/proofs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofUpsert {
    pub invoice_id: String,
    pub invoice_hash: Digest,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofUpserted {
    pub ok: bool,
    pub invoice_id: String,
}

/// One entry of `GET /api/proofs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSummary {
    pub invoice_id: String,
    pub invoice_hash: Digest,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofList {
    pub proofs: Vec<ProofSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCheck {
    pub invoice_id: String,
    pub invoice_hash: Digest,
}

/// `POST /api/proofs/verify`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub checks: Vec<VerifyCheck>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub invoice_id: String,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub results: Vec<VerifyResult>,
}

/// `DELETE /api/proofs/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofDeleted {
    pub ok: bool,
    pub deleted: bool,
}

/// `POST /api/proofs/cleanup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupProofsRequest {
    pub keep_invoice_ids: Vec<String>,
}

// ── Vault file proofs ────────────────────────────────────────────────────────

/// `POST /api/documents/proof`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProofUpsert {
    pub document_id: String,
    pub file_hash: Digest,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProofUpserted {
    pub ok: bool,
    pub document_id: String,
}

/// One entry of `GET /api/documents/proofs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProofSummary {
    pub document_id: String,
    pub file_hash: Digest,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(default)]
    pub invoice_id: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProofList {
    pub document_proofs: Vec<DocumentProofSummary>,
}

/// `POST /api/documents/proofs/cleanup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupDocumentProofsRequest {
    pub keep_document_ids: Vec<String>,
}

// ── Shared ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

/// Response of both cleanup endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupDone {
    pub ok: bool,
    #[serde(default)]
    pub deleted: usize,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub ok: bool,
    pub store: String,
}
