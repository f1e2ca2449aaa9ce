//! Canonical hashing of quotes and invoices, and raw file hashing
//!
//! Only fields that carry financial meaning enter the canonical form:
//! `type`, `id`, `entete`, `lignes`, `reduction`, `sousTotal`, `total`, and
//! the tax fields `tvaMontant` / `totalTTC` (always for invoices, when
//! present for quotes). Layout state such as `blockPositions` and timestamps
//! such as `createdAt` are left out, so moving a block never changes a hash.
//!
//! Object keys are sorted at every depth; arrays keep their order because
//! line order is part of the document.

use std::cmp::Ordering;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sha2::{Digest as _, Sha256};
use zkb_core::Digest;

/// Largest integer an f64 holds exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Business document discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    #[serde(rename = "devis")]
    Quote,
    #[serde(rename = "facture")]
    Invoice,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Quote => "devis",
            DocumentKind::Invoice => "facture",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devis" | "quote" => Ok(DocumentKind::Quote),
            "facture" | "invoice" => Ok(DocumentKind::Invoice),
            other => Err(format!("unknown document kind '{other}' (expected devis or facture)")),
        }
    }
}

/// Canonical serialization of a document. `None` and `null` give `""`.
pub fn canonicalize(document: Option<&Value>, kind: DocumentKind) -> String {
    let doc = match document {
        None | Some(Value::Null) => return String::new(),
        Some(doc) => doc,
    };
    let empty = Map::new();
    let fields = doc.as_object().unwrap_or(&empty);

    let mut out = String::with_capacity(256);
    out.push('{');

    push_key(&mut out, "type", true);
    push_str(&mut out, kind.as_str());

    push_key(&mut out, "id", false);
    match present(fields, "id") {
        Some(id) => push_value(&mut out, id),
        None => out.push_str("\"\""),
    }

    // Only a missing header or discount defaults to `{}`; an explicit null
    // is kept, so `entete: null` and `entete: {}` hash differently.
    push_key(&mut out, "entete", false);
    push_or(&mut out, fields.get("entete"), "{}");
    push_key(&mut out, "lignes", false);
    push_or(&mut out, present(fields, "lignes"), "[]");
    push_key(&mut out, "reduction", false);
    push_or(&mut out, fields.get("reduction"), "{}");

    push_key(&mut out, "sousTotal", false);
    push_or(&mut out, present(fields, "sousTotal"), "0");
    push_key(&mut out, "total", false);
    push_or(&mut out, present(fields, "total"), "0");

    for tax_field in ["tvaMontant", "totalTTC"] {
        match (kind, present(fields, tax_field)) {
            (DocumentKind::Invoice, value) => {
                push_key(&mut out, tax_field, false);
                push_or(&mut out, value, "0");
            }
            (DocumentKind::Quote, Some(value)) => {
                push_key(&mut out, tax_field, false);
                push_value(&mut out, value);
            }
            (DocumentKind::Quote, None) => {}
        }
    }

    out.push('}');
    out
}

/// SHA-256 of `data` as a lowercase hex digest.
pub fn digest(data: &[u8]) -> Digest {
    let bytes: [u8; 32] = Sha256::digest(data).into();
    Digest::from_bytes(&bytes)
}

/// Digest of a document's canonical form.
pub fn hash_document(document: Option<&Value>, kind: DocumentKind) -> Digest {
    digest(canonicalize(document, kind).as_bytes())
}

/// Digest of raw file content (taken before encryption).
pub fn hash_file(bytes: &[u8]) -> Digest {
    digest(bytes)
}

/// Streaming variant of [`hash_file`] for content too large to buffer.
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<Digest> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let bytes: [u8; 32] = hasher.finalize().into();
    Ok(Digest::from_bytes(&bytes))
}

/// A field counts as absent when missing or `null`.
fn present<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|v| !v.is_null())
}

fn push_or(out: &mut String, value: Option<&Value>, default: &str) {
    match value {
        Some(v) => push_value(out, v),
        None => out.push_str(default),
    }
}

fn push_key(out: &mut String, key: &str, first: bool) {
    if !first {
        out.push(',');
    }
    push_str(out, key);
    out.push(':');
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => push_number(out, n),
        Value::String(s) => push_str(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| utf16_cmp(a.0, b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                push_key(out, k, i == 0);
                push_value(out, v);
            }
            out.push('}');
        }
    }
}

/// Key order by UTF-16 code units, matching how browsers sort keys.
fn utf16_cmp(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

/// Integral numbers print without a fraction so `100` and `100.0` agree.
fn push_number(out: &mut String, n: &Number) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
            out.push_str(&(f as i64).to_string());
        } else {
            out.push_str(&n.to_string());
        }
    }
}

fn push_str(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn sample_invoice() -> Value {
        json!({
            "id": "f1",
            "entete": { "numero": "FAC-2026-001", "client": { "nom": "ACME", "ville": "Lyon" }, "tvaTaux": 20 },
            "lignes": [
                { "designation": "Audit", "qty": 2, "pu": 450 },
                { "designation": "Support", "qty": 1, "pu": 100 }
            ],
            "reduction": { "type": "pourcent", "valeur": 5 },
            "sousTotal": 1000,
            "total": 950,
            "tvaMontant": 190,
            "totalTTC": 1140,
            "createdAt": "2026-01-03T10:00:00.000Z",
            "blockPositions": { "entete": { "x": 10, "y": 20 } }
        })
    }

    #[test]
    fn test_quote_scenario_ignores_block_positions() {
        let base = json!({
            "type": "devis", "id": "d1",
            "entete": { "numero": "DEV-1" },
            "lignes": [{ "qty": 1 }],
            "sousTotal": 100, "total": 100
        });
        let mut with_layout = base.clone();
        with_layout["blockPositions"] = json!({ "x": 1 });

        assert_eq!(
            hash_document(Some(&base), DocumentKind::Quote),
            hash_document(Some(&with_layout), DocumentKind::Quote)
        );
    }

    #[test]
    fn test_quote_canonical_form() {
        let doc = json!({
            "id": "d1",
            "entete": { "numero": "DEV-1", "date": "2026-02-01" },
            "lignes": [{ "qty": 1, "designation": "Pose" }],
            "sousTotal": 100, "total": 100
        });
        assert_eq!(
            canonicalize(Some(&doc), DocumentKind::Quote),
            r#"{"type":"devis","id":"d1","entete":{"date":"2026-02-01","numero":"DEV-1"},"lignes":[{"designation":"Pose","qty":1}],"reduction":{},"sousTotal":100,"total":100}"#
        );
    }

    #[test]
    fn test_invoice_always_carries_tax_fields() {
        let doc = json!({ "id": "f2", "total": 10 });
        let canonical = canonicalize(Some(&doc), DocumentKind::Invoice);
        assert!(canonical.ends_with(r#""sousTotal":0,"total":10,"tvaMontant":0,"totalTTC":0}"#));
    }

    #[test]
    fn test_quote_tax_fields_only_when_present() {
        let without = canonicalize(Some(&json!({ "id": "d" })), DocumentKind::Quote);
        assert!(!without.contains("tvaMontant"));

        let with = canonicalize(
            Some(&json!({ "id": "d", "tvaMontant": 4, "totalTTC": null })),
            DocumentKind::Quote,
        );
        assert!(with.contains(r#""tvaMontant":4"#));
        assert!(!with.contains("totalTTC"));
    }

    #[test]
    fn test_absent_null_and_zero_agree() {
        let absent = json!({ "id": "x" });
        let null = json!({ "id": "x", "sousTotal": null, "total": null, "tvaMontant": null });
        let zero = json!({ "id": "x", "sousTotal": 0, "total": 0.0, "tvaMontant": 0 });

        let h = hash_document(Some(&absent), DocumentKind::Invoice);
        assert_eq!(h, hash_document(Some(&null), DocumentKind::Invoice));
        assert_eq!(h, hash_document(Some(&zero), DocumentKind::Invoice));
    }

    #[test]
    fn test_null_header_and_discount_stay_null() {
        let null = canonicalize(
            Some(&json!({ "id": "x", "entete": null, "reduction": null, "lignes": null })),
            DocumentKind::Quote,
        );
        assert_eq!(
            null,
            r#"{"type":"devis","id":"x","entete":null,"lignes":[],"reduction":null,"sousTotal":0,"total":0}"#
        );

        let missing = canonicalize(Some(&json!({ "id": "x" })), DocumentKind::Quote);
        assert!(missing.contains(r#""entete":{},"lignes":[],"reduction":{}"#));
        assert_ne!(null, missing);
    }

    #[test]
    fn test_integral_floats_match_integers() {
        let a = json!({ "id": "x", "total": 100 });
        let b = json!({ "id": "x", "total": 100.0 });
        assert_eq!(
            hash_document(Some(&a), DocumentKind::Quote),
            hash_document(Some(&b), DocumentKind::Quote)
        );
        let c = json!({ "id": "x", "total": 100.5 });
        assert_ne!(
            hash_document(Some(&a), DocumentKind::Quote),
            hash_document(Some(&c), DocumentKind::Quote)
        );
    }

    #[test]
    fn test_empty_document_has_stable_digest() {
        assert_eq!(canonicalize(None, DocumentKind::Quote), "");
        assert_eq!(canonicalize(Some(&Value::Null), DocumentKind::Invoice), "");
        assert_eq!(hash_document(None, DocumentKind::Quote).as_str(), EMPTY_SHA256);
        assert_eq!(hash_file(b"").as_str(), EMPTY_SHA256);
    }

    #[test]
    fn test_kind_is_part_of_the_hash() {
        let doc = json!({ "id": "same", "total": 1 });
        assert_ne!(
            hash_document(Some(&doc), DocumentKind::Quote),
            hash_document(Some(&doc), DocumentKind::Invoice)
        );
    }

    #[test]
    fn test_every_financial_field_changes_the_hash() {
        let base = sample_invoice();
        let h = hash_document(Some(&base), DocumentKind::Invoice);

        let mutations: Vec<(&str, Value)> = vec![
            ("/id", json!("f9")),
            ("/entete/numero", json!("FAC-2026-002")),
            ("/entete/client/ville", json!("Paris")),
            ("/entete/tvaTaux", json!(10)),
            ("/lignes/0/qty", json!(3)),
            ("/reduction/valeur", json!(6)),
            ("/sousTotal", json!(1001)),
            ("/total", json!(951)),
            ("/tvaMontant", json!(191)),
            ("/totalTTC", json!(1141)),
        ];
        for (pointer, value) in mutations {
            let mut changed = base.clone();
            *changed.pointer_mut(pointer).unwrap() = value;
            assert_ne!(
                hash_document(Some(&changed), DocumentKind::Invoice),
                h,
                "changing {pointer} must change the hash"
            );
        }
    }

    #[test]
    fn test_presentation_fields_do_not_change_the_hash() {
        let base = sample_invoice();
        let h = hash_document(Some(&base), DocumentKind::Invoice);

        let mut moved = base.clone();
        moved["blockPositions"] = json!({ "entete": { "x": 300, "y": 5 }, "lignes": { "x": 0 } });
        moved["createdAt"] = json!("2030-12-31T00:00:00.000Z");
        moved["layoutProfileId"] = json!("compact");

        assert_eq!(hash_document(Some(&moved), DocumentKind::Invoice), h);
    }

    #[test]
    fn test_line_order_matters() {
        let base = sample_invoice();
        let mut swapped = base.clone();
        swapped["lignes"].as_array_mut().unwrap().reverse();

        assert_ne!(
            canonicalize(Some(&base), DocumentKind::Invoice),
            canonicalize(Some(&swapped), DocumentKind::Invoice)
        );
    }

    #[test]
    fn test_nested_objects_in_lines_are_sorted() {
        let a: Value =
            serde_json::from_str(r#"{"id":"x","lignes":[{"b":1,"opts":{"z":1,"a":[{"k2":2,"k1":1}]}}]}"#)
                .unwrap();
        let b: Value =
            serde_json::from_str(r#"{"lignes":[{"opts":{"a":[{"k1":1,"k2":2}],"z":1},"b":1}],"id":"x"}"#)
                .unwrap();
        assert_eq!(
            canonicalize(Some(&a), DocumentKind::Quote),
            canonicalize(Some(&b), DocumentKind::Quote)
        );
    }

    #[test]
    fn test_string_escaping_is_json() {
        let doc = json!({ "id": "a\"b\\c\nd\u{1}" });
        let canonical = canonicalize(Some(&doc), DocumentKind::Quote);
        assert!(canonical.contains(r#""id":"a\"b\\c\nd\u0001""#));
        let reparsed: Value = serde_json::from_str(&canonical).unwrap();
        assert_eq!(reparsed["id"], doc["id"]);
    }

    #[test]
    fn test_hash_reader_matches_hash_file() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 256) as u8).collect();
        assert_eq!(hash_reader(data.as_slice()).unwrap(), hash_file(&data));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("devis".parse::<DocumentKind>().unwrap(), DocumentKind::Quote);
        assert_eq!("Invoice".parse::<DocumentKind>().unwrap(), DocumentKind::Invoice);
        assert!("bon".parse::<DocumentKind>().is_err());
    }

    proptest! {
        #[test]
        fn key_order_never_changes_canonical_form(
            entries in proptest::collection::btree_map("[a-zA-Z]{1,8}", -1000i64..1000, 0..12)
        ) {
            let forward: Vec<String> = entries.iter().map(|(k, v)| format!("\"{k}\":{v}")).collect();
            let mut reversed = forward.clone();
            reversed.reverse();

            let a: Value = serde_json::from_str(&format!(
                r#"{{"id":"p","entete":{{{}}},"lignes":[{{{}}}]}}"#,
                forward.join(","), forward.join(",")
            )).unwrap();
            let b: Value = serde_json::from_str(&format!(
                r#"{{"lignes":[{{{}}}],"entete":{{{}}},"id":"p"}}"#,
                reversed.join(","), reversed.join(",")
            )).unwrap();

            prop_assert_eq!(
                canonicalize(Some(&a), DocumentKind::Invoice),
                canonicalize(Some(&b), DocumentKind::Invoice)
            );
        }

        #[test]
        fn canonical_form_is_valid_json(total in -1.0e9f64..1.0e9, qty in 0u32..1000) {
            let doc = json!({ "id": "p", "lignes": [{ "qty": qty }], "total": total });
            let canonical = canonicalize(Some(&doc), DocumentKind::Quote);
            prop_assert!(serde_json::from_str::<Value>(&canonical).is_ok());
        }
    }
}
