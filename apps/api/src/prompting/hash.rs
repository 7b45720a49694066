use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::prompting::template::Variables;

/// Hex SHA-256 of `template:variables_json`.
///
/// `Variables` is a `BTreeMap`, so the JSON has sorted keys and the hash does not
/// depend on the order the caller inserted them.
pub fn prompt_hash(template: &str, variables: &Variables) -> String {
    let canonical = serde_json::to_string(variables).unwrap_or_else(|_| "{}".to_string());
    hash_parts(template, &canonical)
}

/// Same hash for a prompt row whose variables were loaded from JSONB.
/// `serde_json` object maps are key-ordered, so this matches [`prompt_hash`].
pub fn stored_prompt_hash(template: &str, variables: &Value) -> String {
    hash_parts(template, &variables.to_string())
}

fn hash_parts(template: &str, canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(template.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
