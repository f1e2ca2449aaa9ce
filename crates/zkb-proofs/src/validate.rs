//! Request body validation
//!
//! Bodies arrive as raw JSON values so every problem can be reported at
//! once. Strings are trimmed before length checks; digests are also
//! lowercased. All violations are joined with `". "`.

use serde_json::{Map, Value};
use thiserror::Error;
use zkb_core::limits::{
    DOCUMENT_ID_MAX, FILENAME_MAX, INVOICE_ID_MAX, MIMETYPE_MAX, SIGNATURE_MAX, VERIFY_BATCH_MAX,
};
use zkb_core::types::{DocumentProofUpsert, ProofUpsert, VerifyCheck};
use zkb_core::Digest;

/// Largest integer an f64 holds exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Every violation found in one body, joined into a single message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn message(&self) -> &str {
        &self.0
    }
}

#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, msg: impl Into<String>) {
        self.0.push(msg.into());
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationError> {
        if self.0.is_empty() {
            Ok(value())
        } else {
            Err(self.into_error())
        }
    }

    fn into_error(self) -> ValidationError {
        if self.0.is_empty() {
            // a field came back empty without recording why
            ValidationError("invalid request body".into())
        } else {
            ValidationError(self.0.join(". "))
        }
    }
}

fn object<'a>(body: &'a Value) -> Result<&'a Map<String, Value>, ValidationError> {
    body.as_object()
        .ok_or_else(|| ValidationError("request body must be a JSON object".into()))
}

/// Required string, trimmed, non-empty, at most `max` characters.
fn required_str(
    obj: &Map<String, Value>,
    field: &str,
    max: usize,
    errs: &mut Violations,
) -> Option<String> {
    match obj.get(field) {
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                errs.push(format!("{field} is required"));
                None
            } else if s.chars().count() > max {
                errs.push(format!("{field} must be at most {max} characters"));
                None
            } else {
                Some(s.to_string())
            }
        }
        None | Some(Value::Null) => {
            errs.push(format!("{field} is required"));
            None
        }
        Some(_) => {
            errs.push(format!("{field} must be a string"));
            None
        }
    }
}

fn required_digest(obj: &Map<String, Value>, field: &str, errs: &mut Violations) -> Option<Digest> {
    match obj.get(field) {
        Some(Value::String(s)) if s.trim().is_empty() => {
            errs.push(format!("{field} is required"));
            None
        }
        Some(Value::String(s)) => match Digest::parse(s) {
            Ok(d) => Some(d),
            Err(_) => {
                errs.push(format!("{field} must be a 64 character hex SHA-256 digest"));
                None
            }
        },
        None | Some(Value::Null) => {
            errs.push(format!("{field} is required"));
            None
        }
        Some(_) => {
            errs.push(format!("{field} must be a 64 character hex SHA-256 digest"));
            None
        }
    }
}

/// Accepts integral JSON numbers, including `10.0`.
fn non_negative_integer(value: Option<&Value>) -> Option<u64> {
    let n = value?.as_number()?;
    if let Some(u) = n.as_u64() {
        return Some(u);
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= MAX_SAFE_INTEGER)
        .map(|f| f as u64)
}

/// `POST /api/proofs`
pub fn proof_upsert(body: &Value) -> Result<ProofUpsert, ValidationError> {
    let obj = object(body)?;
    let mut errs = Violations::default();

    let invoice_id = required_str(obj, "invoiceId", INVOICE_ID_MAX, &mut errs);
    let invoice_hash = required_digest(obj, "invoiceHash", &mut errs);
    let signature = required_str(obj, "signature", SIGNATURE_MAX, &mut errs);

    match (invoice_id, invoice_hash, signature) {
        (Some(invoice_id), Some(invoice_hash), Some(signature)) => errs.finish(|| ProofUpsert {
            invoice_id,
            invoice_hash,
            signature,
        }),
        _ => Err(errs.into_error()),
    }
}

/// `POST /api/proofs/verify`: a non-empty array of at most
/// [`VERIFY_BATCH_MAX`] well-formed checks.
pub fn verify_checks(body: &Value) -> Result<Vec<VerifyCheck>, ValidationError> {
    let obj = object(body)?;
    let items = match obj.get("checks") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(ValidationError("checks must be a non-empty array".into())),
    };
    if items.len() > VERIFY_BATCH_MAX {
        return Err(ValidationError(format!(
            "at most {VERIFY_BATCH_MAX} checks per request"
        )));
    }

    let mut errs = Violations::default();
    let mut checks = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(item) = item.as_object() else {
            errs.push(format!("checks[{i}] must be an object"));
            continue;
        };
        let mut item_errs = Violations::default();
        let invoice_id = required_str(item, "invoiceId", INVOICE_ID_MAX, &mut item_errs);
        let invoice_hash = required_digest(item, "invoiceHash", &mut item_errs);
        for msg in item_errs.0 {
            errs.push(format!("checks[{i}].{msg}"));
        }
        if let (Some(invoice_id), Some(invoice_hash)) = (invoice_id, invoice_hash) {
            checks.push(VerifyCheck {
                invoice_id,
                invoice_hash,
            });
        }
    }
    errs.finish(|| checks)
}

/// `POST /api/documents/proof`
pub fn document_proof_upsert(body: &Value) -> Result<DocumentProofUpsert, ValidationError> {
    let obj = object(body)?;
    let mut errs = Violations::default();

    let document_id = required_str(obj, "documentId", DOCUMENT_ID_MAX, &mut errs);
    let file_hash = required_digest(obj, "fileHash", &mut errs);
    let filename = required_str(obj, "filename", FILENAME_MAX, &mut errs);
    let mime_type = required_str(obj, "mimeType", MIMETYPE_MAX, &mut errs);

    let size = non_negative_integer(obj.get("size"));
    if size.is_none() {
        errs.push("size must be a non-negative integer");
    }

    // Optional link to an invoice; empty means none
    let invoice_id = match obj.get("invoiceId") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) if s.trim().chars().count() <= INVOICE_ID_MAX => {
            Some(s.trim().to_string())
        }
        Some(_) => {
            errs.push(format!(
                "invoiceId is optional but must be a string of at most {INVOICE_ID_MAX} characters"
            ));
            None
        }
    };

    match (document_id, file_hash, filename, mime_type, size) {
        (Some(document_id), Some(file_hash), Some(filename), Some(mime_type), Some(size)) => errs
            .finish(|| DocumentProofUpsert {
                document_id,
                file_hash,
                filename,
                mime_type,
                size,
                invoice_id,
            }),
        _ => Err(errs.into_error()),
    }
}

/// Path parameter of the delete routes.
pub fn subject_id(raw: &str, field: &str, max: usize) -> Result<String, ValidationError> {
    let id = raw.trim();
    if id.is_empty() || id.chars().count() > max {
        return Err(ValidationError(format!("invalid {field}")));
    }
    Ok(id.to_string())
}

/// Keep list of a cleanup request: `{ "<field>": ["id", ...] }`.
pub fn keep_ids(body: &Value, field: &str, max: usize) -> Result<Vec<String>, ValidationError> {
    let items = body
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationError(format!("{field} must be an array")))?;

    let mut errs = Violations::default();
    let mut ids = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item.as_str().map(str::trim) {
            Some(id) if !id.is_empty() && id.chars().count() <= max => ids.push(id.to_string()),
            _ => errs.push(format!("{field}[{i}] must be a non-empty string of at most {max} characters")),
        }
    }
    errs.finish(|| ids)
}
