//! Owner-scoped proof records
//!
//! Two maps, one per proof kind, keyed by `(owner, subject id)`. Lookups
//! never cross owners: a record of another owner is indistinguishable from
//! no record at all.
//!
//! With a backing path, the whole store is rewritten after every mutation
//! using an atomic write (temp file then rename), so a crash leaves either
//! the previous or the new snapshot on disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use zkb_core::types::{
    DocumentProofSummary, DocumentProofUpsert, ProofSummary, ProofUpsert, VerifyCheck,
    VerifyResult,
};
use zkb_core::Digest;

use crate::auth::OwnerId;
use crate::error::{StoreError, StoreResult};

type Key = (OwnerId, String);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProofRecord {
    owner: OwnerId,
    invoice_id: String,
    invoice_hash: Digest,
    signature: String,
    signed_at: DateTime<Utc>,
}

impl ProofRecord {
    fn summary(&self) -> ProofSummary {
        ProofSummary {
            invoice_id: self.invoice_id.clone(),
            invoice_hash: self.invoice_hash.clone(),
            signed_at: self.signed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentProofRecord {
    owner: OwnerId,
    document_id: String,
    file_hash: Digest,
    filename: String,
    mime_type: String,
    size: u64,
    #[serde(default)]
    invoice_id: Option<String>,
    uploaded_at: DateTime<Utc>,
}

impl DocumentProofRecord {
    fn summary(&self) -> DocumentProofSummary {
        DocumentProofSummary {
            document_id: self.document_id.clone(),
            file_hash: self.file_hash.clone(),
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            invoice_id: self.invoice_id.clone(),
            uploaded_at: self.uploaded_at,
        }
    }
}

/// On-disk form of the store
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    proofs: Vec<ProofRecord>,
    #[serde(default)]
    document_proofs: Vec<DocumentProofRecord>,
}

#[derive(Clone, Default)]
struct Tables {
    proofs: HashMap<Key, ProofRecord>,
    documents: HashMap<Key, DocumentProofRecord>,
}

impl Tables {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let proofs = snapshot
            .proofs
            .into_iter()
            .map(|r| ((r.owner.clone(), r.invoice_id.clone()), r))
            .collect();
        let documents = snapshot
            .document_proofs
            .into_iter()
            .map(|r| ((r.owner.clone(), r.document_id.clone()), r))
            .collect();
        Self { proofs, documents }
    }

    /// Sorted so the file is stable between writes
    fn snapshot(&self) -> Snapshot {
        let mut proofs: Vec<_> = self.proofs.values().cloned().collect();
        proofs.sort_by(|a, b| (&a.owner, &a.invoice_id).cmp(&(&b.owner, &b.invoice_id)));
        let mut document_proofs: Vec<_> = self.documents.values().cloned().collect();
        document_proofs.sort_by(|a, b| (&a.owner, &a.document_id).cmp(&(&b.owner, &b.document_id)));
        Snapshot {
            proofs,
            document_proofs,
        }
    }
}

pub struct ProofStore {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
}

impl ProofStore {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            path: None,
        }
    }

    /// Load or create a store mirrored to `path`.
    /// A missing file starts an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.clone(),
                    source,
                })
            }
        };

        let tables = Tables::from_snapshot(snapshot);
        info!(
            path = %path.display(),
            proofs = tables.proofs.len(),
            document_proofs = tables.documents.len(),
            "proof store opened"
        );

        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path),
        })
    }

    /// Backend from config: file when a path is set, memory otherwise.
    pub async fn from_config(config: &zkb_core::config::StoreConfig) -> StoreResult<Self> {
        match &config.path {
            Some(path) => Self::open(path.clone()).await,
            None => Ok(Self::in_memory()),
        }
    }

    /// `"json"` or `"memory"`, reported by the health endpoint
    pub fn backend(&self) -> &'static str {
        if self.path.is_some() {
            "json"
        } else {
            "memory"
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A file-backed store is ready when the directory holding its snapshot
    /// exists. Memory stores are always ready.
    pub async fn check_health(&self) -> StoreResult<()> {
        let Some(dir) = self
            .path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
        else {
            return Ok(());
        };
        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::Read {
                path: dir.to_path_buf(),
                source: std::io::Error::other("not a directory"),
            }),
            Err(source) => Err(StoreError::Read {
                path: dir.to_path_buf(),
                source,
            }),
        }
    }

    // ── Document proofs ──────────────────────────────────────────────────────

    /// Create or replace the proof of `proof.invoice_id`. Digest, signature
    /// and timestamp are replaced together.
    pub async fn upsert_proof(&self, owner: &OwnerId, proof: ProofUpsert) -> StoreResult<ProofSummary> {
        let record = ProofRecord {
            owner: owner.clone(),
            invoice_id: proof.invoice_id,
            invoice_hash: proof.invoice_hash,
            signature: proof.signature,
            signed_at: Utc::now(),
        };
        let summary = record.summary();
        self.commit(|tables| {
            tables
                .proofs
                .insert((owner.clone(), record.invoice_id.clone()), record);
            ((), true)
        })
        .await?;

        debug!(owner = %owner, subject = %summary.invoice_id, "proof upserted");
        Ok(summary)
    }

    pub async fn get_proof(&self, owner: &OwnerId, invoice_id: &str) -> Option<ProofSummary> {
        let tables = self.tables.read().await;
        tables
            .proofs
            .get(&(owner.clone(), invoice_id.to_string()))
            .map(ProofRecord::summary)
    }

    /// Every proof of `owner`, most recent first.
    pub async fn list_proofs(&self, owner: &OwnerId) -> Vec<ProofSummary> {
        let tables = self.tables.read().await;
        let mut proofs: Vec<_> = tables
            .proofs
            .values()
            .filter(|r| &r.owner == owner)
            .map(ProofRecord::summary)
            .collect();
        proofs.sort_by(|a, b| {
            b.signed_at
                .cmp(&a.signed_at)
                .then_with(|| a.invoice_id.cmp(&b.invoice_id))
        });
        proofs
    }

    /// One result per check, in input order. Absent subjects are not
    /// verified; nothing here is an error.
    pub async fn verify(&self, owner: &OwnerId, checks: &[VerifyCheck]) -> Vec<VerifyResult> {
        let tables = self.tables.read().await;
        checks
            .iter()
            .map(|check| {
                let verified = tables
                    .proofs
                    .get(&(owner.clone(), check.invoice_id.clone()))
                    .is_some_and(|r| r.invoice_hash == check.invoice_hash);
                VerifyResult {
                    invoice_id: check.invoice_id.clone(),
                    verified,
                }
            })
            .collect()
    }

    /// Returns whether a record was removed.
    pub async fn delete_proof(&self, owner: &OwnerId, invoice_id: &str) -> StoreResult<bool> {
        let key = (owner.clone(), invoice_id.to_string());
        let removed = self
            .commit(|tables| {
                let removed = tables.proofs.remove(&key).is_some();
                (removed, removed)
            })
            .await?;
        if removed {
            debug!(owner = %owner, subject = invoice_id, "proof deleted");
        }
        Ok(removed)
    }

    /// Remove every proof of `owner` whose id is not in `keep`.
    /// Returns the number removed.
    pub async fn cleanup_proofs(&self, owner: &OwnerId, keep: &[String]) -> StoreResult<usize> {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let removed = self
            .commit(|tables| {
                let before = tables.proofs.len();
                tables
                    .proofs
                    .retain(|(o, id), _| o != owner || keep.contains(id.as_str()));
                let removed = before - tables.proofs.len();
                (removed, removed > 0)
            })
            .await?;
        info!(owner = %owner, removed, kept = keep.len(), "proof cleanup");
        Ok(removed)
    }

    // ── Vault file proofs ────────────────────────────────────────────────────

    pub async fn upsert_document_proof(
        &self,
        owner: &OwnerId,
        proof: DocumentProofUpsert,
    ) -> StoreResult<DocumentProofSummary> {
        let record = DocumentProofRecord {
            owner: owner.clone(),
            document_id: proof.document_id,
            file_hash: proof.file_hash,
            filename: proof.filename,
            mime_type: proof.mime_type,
            size: proof.size,
            invoice_id: proof.invoice_id,
            uploaded_at: Utc::now(),
        };
        let summary = record.summary();
        self.commit(|tables| {
            tables
                .documents
                .insert((owner.clone(), record.document_id.clone()), record);
            ((), true)
        })
        .await?;

        debug!(owner = %owner, subject = %summary.document_id, size = summary.size, "document proof upserted");
        Ok(summary)
    }

    /// Every file proof of `owner`, most recent first.
    pub async fn list_document_proofs(&self, owner: &OwnerId) -> Vec<DocumentProofSummary> {
        let tables = self.tables.read().await;
        let mut proofs: Vec<_> = tables
            .documents
            .values()
            .filter(|r| &r.owner == owner)
            .map(DocumentProofRecord::summary)
            .collect();
        proofs.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        proofs
    }

    pub async fn delete_document_proof(&self, owner: &OwnerId, document_id: &str) -> StoreResult<bool> {
        let key = (owner.clone(), document_id.to_string());
        let removed = self
            .commit(|tables| {
                let removed = tables.documents.remove(&key).is_some();
                (removed, removed)
            })
            .await?;
        if removed {
            debug!(owner = %owner, subject = document_id, "document proof deleted");
        }
        Ok(removed)
    }

    pub async fn cleanup_document_proofs(&self, owner: &OwnerId, keep: &[String]) -> StoreResult<usize> {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let removed = self
            .commit(|tables| {
                let before = tables.documents.len();
                tables
                    .documents
                    .retain(|(o, id), _| o != owner || keep.contains(id.as_str()));
                let removed = before - tables.documents.len();
                (removed, removed > 0)
            })
            .await?;
        info!(owner = %owner, removed, kept = keep.len(), "document proof cleanup");
        Ok(removed)
    }

    /// Run `op` on a copy of the tables and install the copy only once its
    /// snapshot is on disk. `op` returns its result and whether it changed
    /// anything; unchanged copies are dropped without a write.
    async fn commit<T>(&self, op: impl FnOnce(&mut Tables) -> (T, bool)) -> StoreResult<T> {
        let mut tables = self.tables.write().await;
        if self.path.is_none() {
            return Ok(op(&mut tables).0);
        }

        let mut next = tables.clone();
        let (out, changed) = op(&mut next);
        if changed {
            self.persist(&next).await?;
            *tables = next;
        }
        Ok(out)
    }

    /// Called with the write lock held, so file order matches mutation
    /// order.
    async fn persist(&self, tables: &Tables) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let json = serde_json::to_vec_pretty(&tables.snapshot())?;
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|source| StoreError::Write {
                path: tmp_path.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(())
    }
}

impl std::fmt::Debug for ProofStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofStore")
            .field("backend", &self.backend())
            .field("path", &self.path)
            .finish()
    }
}
