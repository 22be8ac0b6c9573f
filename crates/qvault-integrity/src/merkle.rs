//! Merkle root over sorted content-addressed blob names (§4.6, §8.6):
//! invariant under permutation of the input set, sensitive to any single
//! addition, removal, or replacement.

use qvault_crypto::hash::sha256_hex;

/// Computes the merkle root of `names` (already content hashes) by sorting
/// them, then pairwise SHA-256 hashing levels bottom-up. An odd node at any
/// level promotes unchanged rather than duplicating itself.
pub fn merkle_root(names: &[String]) -> String {
    if names.is_empty() {
        return sha256_hex(b"");
    }
    let mut level: Vec<String> = names.to_vec();
    level.sort();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut i = 0;
        while i < level.len() {
            if i + 1 < level.len() {
                let combined = format!("{}{}", level[i], level[i + 1]);
                next.push(sha256_hex(combined.as_bytes()));
            } else {
                next.push(level[i].clone());
            }
            i += 2;
        }
        level = next;
    }
    level.into_iter().next().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_under_permutation() {
        let a = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        let b = vec!["b".to_string(), "c".to_string(), "a".to_string()];
        assert_eq!(merkle_root(&a), merkle_root(&b));
    }

    #[test]
    fn changes_on_addition() {
        let a = vec!["a".to_string(), "b".to_string()];
        let b = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_ne!(merkle_root(&a), merkle_root(&b));
    }

    #[test]
    fn changes_on_removal() {
        let a = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let b = vec!["a".to_string(), "b".to_string()];
        assert_ne!(merkle_root(&a), merkle_root(&b));
    }

    #[test]
    fn changes_on_replacement() {
        let a = vec!["a".to_string(), "b".to_string()];
        let b = vec!["a".to_string(), "z".to_string()];
        assert_ne!(merkle_root(&a), merkle_root(&b));
    }

    #[test]
    fn singleton_promotes_unchanged() {
        let a = vec!["only-one".to_string()];
        assert_eq!(merkle_root(&a), merkle_root(&a));
    }
}
