//! Deterministic identifiers for transformation requests.

use sha2::{Digest, Sha256};

use crate::models::TransformationSpec;

/// Canonical textual form of a spec: a JSON array of `[name, value]` pairs in
/// the fixed field order of [`TransformationSpec::present_fields`].
pub fn canonical_form(spec: &TransformationSpec) -> String {
    let fields = spec.present_fields();
    // Serializing a Vec of (&str, Value) cannot fail.
    serde_json::to_string(&fields).unwrap_or_default()
}

/// Identifier of the derived image `spec` produces from `original_id`.
///
/// `{original_id}_{sha256(canonical_form)}`; pure and stable across processes.
pub fn fingerprint(original_id: &str, spec: &TransformationSpec) -> String {
    let digest = Sha256::digest(canonical_form(spec).as_bytes());
    format!("{}_{}", original_id, hex::encode(digest))
}
