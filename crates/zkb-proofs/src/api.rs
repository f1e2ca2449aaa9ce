//! HTTP surface under `/api`
//!
//! Every route except `/api/health` requires `Authorization: Bearer <token>`.
//! Authentication runs before the body is read, so an unauthenticated
//! request is a 401 even when its body is malformed.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRequestParts, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::Value;
use tracing::debug;
use zkb_core::limits::{DOCUMENT_ID_MAX, INVOICE_ID_MAX};
use zkb_core::types::{
    Ack, CleanupDone, DocumentProofList, DocumentProofUpserted, Health, ProofDeleted, ProofList,
    ProofUpserted, VerifyResponse,
};

use crate::auth::{Authenticator, OwnerId};
use crate::error::ApiError;
use crate::metrics::ProofMetrics;
use crate::store::ProofStore;
use crate::validate;

const INVOICE: &str = "invoice";
const FILE: &str = "file";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ProofStore>,
    pub auth: Arc<dyn Authenticator>,
    pub metrics: ProofMetrics,
}

impl AppState {
    pub fn new(store: Arc<ProofStore>, auth: Arc<dyn Authenticator>, metrics: ProofMetrics) -> Self {
        Self {
            store,
            auth,
            metrics,
        }
    }
}

/// The authenticated owner of the current request
pub struct Owner(pub OwnerId);

impl FromRequestParts<AppState> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthenticated)?;

        state
            .auth
            .authenticate(token)
            .map(Owner)
            .ok_or(ApiError::Unauthenticated)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::Validation(format!("invalid JSON body: {}", rejection.body_text()))
        }
    }
}

type JsonBody = Result<Json<Value>, JsonRejection>;

/// Build the router. `body_limit` caps every request body in bytes.
pub fn router(state: AppState, body_limit: usize) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/proofs", post(upsert_proof).get(list_proofs))
        .route("/proofs/verify", post(verify_proofs))
        .route("/proofs/cleanup", post(cleanup_proofs))
        .route("/proofs/{id}", delete(delete_proof))
        .route("/documents/proof", post(upsert_document_proof))
        .route("/documents/proof/{id}", delete(delete_document_proof))
        .route("/documents/proofs", get(list_document_proofs))
        .route("/documents/proofs/cleanup", post(cleanup_document_proofs));

    Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        ok: true,
        store: state.store.backend().to_string(),
    })
}

// ── Document proofs ──────────────────────────────────────────────────────────

async fn upsert_proof(
    State(state): State<AppState>,
    Owner(owner): Owner,
    body: JsonBody,
) -> Result<(StatusCode, Json<ProofUpserted>), ApiError> {
    let Json(body) = body?;
    let proof = validate::proof_upsert(&body)?;

    let summary = state.store.upsert_proof(&owner, proof).await?;
    state.metrics.upsert(INVOICE);

    Ok((
        StatusCode::CREATED,
        Json(ProofUpserted {
            ok: true,
            invoice_id: summary.invoice_id,
        }),
    ))
}

async fn list_proofs(State(state): State<AppState>, Owner(owner): Owner) -> Json<ProofList> {
    Json(ProofList {
        proofs: state.store.list_proofs(&owner).await,
    })
}

async fn verify_proofs(
    State(state): State<AppState>,
    Owner(owner): Owner,
    body: JsonBody,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(body) = body?;
    let checks = validate::verify_checks(&body)?;

    let results = state.store.verify(&owner, &checks).await;
    let verified = results.iter().filter(|r| r.verified).count();
    state.metrics.verified(results.len(), verified);
    debug!(owner = %owner, checks = results.len(), verified, "batch verify");

    Ok(Json(VerifyResponse { results }))
}

async fn delete_proof(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<ProofDeleted>, ApiError> {
    let id = validate::subject_id(&id, "invoiceId", INVOICE_ID_MAX)?;
    let deleted = state.store.delete_proof(&owner, &id).await?;
    if deleted {
        state.metrics.deleted(INVOICE);
    }
    Ok(Json(ProofDeleted { ok: true, deleted }))
}

async fn cleanup_proofs(
    State(state): State<AppState>,
    Owner(owner): Owner,
    body: JsonBody,
) -> Result<Json<CleanupDone>, ApiError> {
    let Json(body) = body?;
    let keep = validate::keep_ids(&body, "keepInvoiceIds", INVOICE_ID_MAX)?;

    let deleted = state.store.cleanup_proofs(&owner, &keep).await?;
    state.metrics.cleanup(INVOICE, deleted);

    Ok(Json(CleanupDone { ok: true, deleted }))
}

// ── Vault file proofs ────────────────────────────────────────────────────────

async fn upsert_document_proof(
    State(state): State<AppState>,
    Owner(owner): Owner,
    body: JsonBody,
) -> Result<(StatusCode, Json<DocumentProofUpserted>), ApiError> {
    let Json(body) = body?;
    let proof = validate::document_proof_upsert(&body)?;

    let summary = state.store.upsert_document_proof(&owner, proof).await?;
    state.metrics.upsert(FILE);

    Ok((
        StatusCode::CREATED,
        Json(DocumentProofUpserted {
            ok: true,
            document_id: summary.document_id,
        }),
    ))
}

async fn list_document_proofs(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Json<DocumentProofList> {
    Json(DocumentProofList {
        document_proofs: state.store.list_document_proofs(&owner).await,
    })
}

/// Idempotent: deleting an absent file proof still answers `{ok: true}`.
async fn delete_document_proof(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    let id = validate::subject_id(&id, "documentId", DOCUMENT_ID_MAX)?;
    if state.store.delete_document_proof(&owner, &id).await? {
        state.metrics.deleted(FILE);
    }
    Ok(Json(Ack { ok: true }))
}

async fn cleanup_document_proofs(
    State(state): State<AppState>,
    Owner(owner): Owner,
    body: JsonBody,
) -> Result<Json<CleanupDone>, ApiError> {
    let Json(body) = body?;
    let keep = validate::keep_ids(&body, "keepDocumentIds", DOCUMENT_ID_MAX)?;

    let deleted = state.store.cleanup_document_proofs(&owner, &keep).await?;
    state.metrics.cleanup(FILE, deleted);

    Ok(Json(CleanupDone { ok: true, deleted }))
}
