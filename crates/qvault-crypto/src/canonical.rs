use serde::Serialize;
use serde_json::Value;

use crate::error::SigError;

/// Builds the canonical signing payload for `value`: its JSON serialisation
/// with `omit_fields` removed, sorted keys, no extra whitespace (§6).
///
/// Sorted-key ordering falls out of `serde_json::Value`'s map representation
/// (a `BTreeMap` unless the `preserve_order` feature is enabled, which this
/// workspace never turns on) rather than a hand-rolled canonicalizer.
pub fn canonical_payload<T: Serialize>(value: &T, omit_fields: &[&str]) -> Result<Vec<u8>, SigError> {
    let mut v = serde_json::to_value(value).map_err(|e| SigError::Serialization(e.to_string()))?;
    if let Value::Object(map) = &mut v {
        for field in omit_fields {
            map.remove(*field);
        }
    }
    serde_json::to_vec(&v).map_err(|e| SigError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Example {
        zeta: u32,
        alpha: u32,
        signature: String,
    }

    #[test]
    fn keys_are_sorted_and_signature_omitted() {
        let e = Example {
            zeta: 1,
            alpha: 2,
            signature: "deadbeef".into(),
        };
        let bytes = canonical_payload(&e, &["signature"]).unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert_eq!(s, r#"{"alpha":2,"zeta":1}"#);
    }
}
