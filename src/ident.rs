//! Write identity for documents.
//!
//! In create mode a document's identifier is a canonical content hash over
//! its fields minus the configured exclusion set, so re-ingesting identical
//! input yields the same id and the index's uniqueness constraint turns the
//! duplicate into a no-op conflict. In upsert mode the identifier is a
//! reversible base64 encoding of a designated field's value.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create-only: the store rejects an existing id with a 409.
    Create,
    /// Partial update with `doc_as_upsert`: merge into an existing document,
    /// create it when absent.
    Upsert,
}

/// One bulk operation: an action descriptor plus its document payload.
#[derive(Debug, Clone)]
pub struct WriteOp {
    pub mode: WriteMode,
    pub id: String,
    pub doc: Document,
}

impl WriteOp {
    /// Appends this operation's two NDJSON lines to a bulk request body.
    pub fn append_to(&self, body: &mut String) -> Result<()> {
        match self.mode {
            WriteMode::Create => {
                let action = serde_json::json!({ "create": { "_id": self.id } });
                body.push_str(&serde_json::to_string(&action)?);
                body.push('\n');
                body.push_str(&serde_json::to_string(&self.doc)?);
            }
            WriteMode::Upsert => {
                let action = serde_json::json!({ "update": { "_id": self.id } });
                body.push_str(&serde_json::to_string(&action)?);
                body.push('\n');
                let payload = serde_json::json!({ "doc": self.doc, "doc_as_upsert": true });
                body.push_str(&serde_json::to_string(&payload)?);
            }
        }
        body.push('\n');
        Ok(())
    }
}

/// Computes the write operation for one document.
///
/// Fails with [`Error::MissingIdField`] in upsert mode when the designated
/// field is absent or null; a null identifier must never reach the wire.
pub fn assign(doc: Document, config: &IngestConfig) -> Result<WriteOp> {
    if config.upsert {
        let value = doc
            .get(&config.id_field)
            .filter(|v| !v.is_null())
            .ok_or_else(|| Error::MissingIdField {
                field: config.id_field.clone(),
            })?;
        let id = BASE64.encode(value_as_string(value));
        Ok(WriteOp {
            mode: WriteMode::Upsert,
            id,
            doc,
        })
    } else {
        let id = content_hash(&doc, &config.exclude_keys);
        Ok(WriteOp {
            mode: WriteMode::Create,
            id,
            doc,
        })
    }
}

/// Deterministic content hash of a document, ignoring excluded top-level keys.
///
/// Keys are sorted at every depth before hashing, so the digest is
/// independent of field insertion order. Exclusion matches top-level key
/// names only.
pub fn content_hash(doc: &Document, exclude_keys: &[String]) -> String {
    let mut canonical = String::new();
    canonical.push('{');
    let mut keys: Vec<&String> = doc
        .keys()
        .filter(|k| !exclude_keys.iter().any(|e| e == *k))
        .collect();
    keys.sort();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            canonical.push(',');
        }
        write_string(key, &mut canonical);
        canonical.push(':');
        if let Some(value) = doc.get(*key) {
            write_canonical(value, &mut canonical);
        }
    }
    canonical.push('}');

    format!("{:x}", md5::compute(canonical.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                if let Some(inner) = map.get(*key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn write_string(text: &str, out: &mut String) {
    // Route through Value for proper JSON escaping.
    out.push_str(&Value::String(text.to_owned()).to_string());
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
