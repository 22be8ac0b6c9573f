//! k-of-n Shamir secret sharing over GF(2^8), byte-wise (C1). Splits the
//! repository password into `n` shares such that any `k` reconstruct it
//! exactly and any fewer reveal nothing.

use rand::RngCore;
use zeroize::Zeroize;

use qvault_core::constants::SHARING_MAX_N;

use crate::error::ShareError;
use crate::gf256;

/// One holder's share of a secret. `data` carries one evaluated byte per
/// secret byte plus a trailing byte equal to `index`, so the share is
/// self-describing once persisted to disk — the same convention several
/// production Shamir implementations use to avoid a side channel for the
/// x-coordinate. In solo mode (`k = n = 1`) `data` is the secret verbatim,
/// with no trailing index byte — `solo` flags this format so `combine` can
/// tell it apart from an ordinary single share of a `k = 1, n > 1` split,
/// which still carries the trailing byte and whose `index` may just as well
/// be `1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Share {
    pub index: u8,
    pub data: Vec<u8>,
    pub solo: bool,
}

impl Drop for Share {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl Share {
    /// Encodes this share as an opaque byte blob suitable for persistence
    /// (the `index` byte is already embedded as `data`'s last byte, except
    /// in solo mode where no index byte is appended).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }
}

/// Splits `secret` into `n` shares such that any `k` of them reconstruct it.
pub fn split(secret: &[u8], k: u8, n: u8) -> Result<Vec<Share>, ShareError> {
    if secret.is_empty() {
        return Err(ShareError::EmptySecret);
    }
    if k == 0 || n == 0 || k > n || n > SHARING_MAX_N {
        return Err(ShareError::BadThreshold { k, n });
    }

    if k == 1 && n == 1 {
        return Ok(vec![Share {
            index: 1,
            data: secret.to_vec(),
            solo: true,
        }]);
    }

    // One random polynomial of degree k-1 per secret byte, constant term
    // equal to that byte. `coeffs[byte][0]` is the secret byte itself;
    // `coeffs[byte][1..k-1]` are independently random.
    let mut rng = rand::rngs::OsRng;
    let mut coeffs: Vec<Vec<u8>> = Vec::with_capacity(secret.len());
    for &b in secret {
        let mut poly = vec![0u8; k as usize];
        poly[0] = b;
        if k > 1 {
            let mut random_tail = vec![0u8; k as usize - 1];
            rng.fill_bytes(&mut random_tail);
            poly[1..].copy_from_slice(&random_tail);
        }
        coeffs.push(poly);
    }

    let mut shares = Vec::with_capacity(n as usize);
    for x in 1..=n {
        let mut data = Vec::with_capacity(secret.len() + 1);
        for poly in &coeffs {
            data.push(eval_poly(poly, x));
        }
        data.push(x);
        shares.push(Share {
            index: x,
            data,
            solo: false,
        });
    }
    Ok(shares)
}

/// Evaluates a polynomial (constant term first) at `x` using Horner's
/// method in GF(256).
fn eval_poly(coeffs: &[u8], x: u8) -> u8 {
    let mut acc = 0u8;
    for &c in coeffs.iter().rev() {
        acc = gf256::add(gf256::mul(acc, x), c);
    }
    acc
}

/// Reconstructs the secret from `k_hint` or more distinct shares via
/// Lagrange interpolation at `x = 0`. `k_hint` is the threshold the caller
/// expects (carried in `VaultConfig`) so that an under-provisioned call is
/// rejected rather than silently returning interpolated garbage.
pub fn combine(shares: &[Share], k_hint: u8) -> Result<Vec<u8>, ShareError> {
    if shares.len() < k_hint as usize {
        return Err(ShareError::ShareTooFew {
            need: k_hint,
            got: shares.len(),
        });
    }
    if shares.is_empty() {
        return Err(ShareError::ShareTooFew { need: 1, got: 0 });
    }

    if shares.len() == 1 && shares[0].solo {
        // Solo mode: the lone share is the secret verbatim (no trailing
        // index byte was appended at split time). A single share of an
        // ordinary k=1,n>1 split still carries that trailing byte and
        // must fall through to Lagrange interpolation below.
        return Ok(shares[0].data.clone());
    }

    let mut seen = std::collections::HashSet::new();
    for s in shares {
        if !seen.insert(s.index) {
            return Err(ShareError::DuplicateIndex(s.index));
        }
    }

    let secret_len = shares[0].data.len().saturating_sub(1);
    if shares.iter().any(|s| s.data.len() != secret_len + 1) {
        return Err(ShareError::ShareLengthMismatch);
    }

    let mut secret = vec![0u8; secret_len];
    for byte_idx in 0..secret_len {
        let mut acc = 0u8;
        for (i, share_i) in shares.iter().enumerate() {
            let x_i = share_i.index;
            let y_i = share_i.data[byte_idx];

            let mut num = 1u8;
            let mut den = 1u8;
            for (j, share_j) in shares.iter().enumerate() {
                if i == j {
                    continue;
                }
                let x_j = share_j.index;
                num = gf256::mul(num, x_j);
                den = gf256::mul(den, gf256::add(x_i, x_j));
            }
            let term = gf256::mul(y_i, gf256::mul(num, gf256::inv(den)));
            acc = gf256::add(acc, term);
        }
        secret[byte_idx] = acc;
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solo_mode_share_is_the_secret() {
        let secret = b"a1b2c3d4".to_vec();
        let shares = split(&secret, 1, 1).unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].data, secret);
        let combined = combine(&shares, 1).unwrap();
        assert_eq!(combined, secret);
    }

    #[test]
    fn two_of_two_round_trips() {
        let secret = b"a1b2c3d4e5f60718192021222324252627282930313233343536373839".to_vec();
        let shares = split(&secret, 2, 2).unwrap();
        let combined = combine(&shares, 2).unwrap();
        assert_eq!(combined, secret);
    }

    #[test]
    fn any_k_of_n_reconstructs() {
        let secret = b"super-secret-password-12345678901234567890".to_vec();
        let shares = split(&secret, 2, 3).unwrap();
        for i in 0..3 {
            for j in (i + 1)..3 {
                let subset = vec![shares[i].clone(), shares[j].clone()];
                assert_eq!(combine(&subset, 2).unwrap(), secret);
            }
        }
    }

    #[test]
    fn fewer_than_k_rejected() {
        let secret = b"super-secret-password-12345678901234567890".to_vec();
        let shares = split(&secret, 2, 3).unwrap();
        let subset = vec![shares[0].clone()];
        assert!(matches!(
            combine(&subset, 2),
            Err(ShareError::ShareTooFew { .. })
        ));
    }

    #[test]
    fn partial_shares_do_not_reveal_secret() {
        let secret = b"super-secret-password-12345678901234567890".to_vec();
        let shares = split(&secret, 2, 3).unwrap();
        // A single share's raw bytes must not equal the secret bytes.
        assert_ne!(shares[0].data[..secret.len()], secret[..]);
    }

    #[test]
    fn duplicate_index_rejected() {
        let secret = b"abcdefgh".to_vec();
        let shares = split(&secret, 2, 3).unwrap();
        let subset = vec![shares[0].clone(), shares[0].clone()];
        assert!(matches!(
            combine(&subset, 2),
            Err(ShareError::DuplicateIndex(_))
        ));
    }

    #[test]
    fn length_mismatch_rejected() {
        let s1 = Share {
            index: 1,
            data: vec![1, 2, 3, 1],
            solo: false,
        };
        let s2 = Share {
            index: 2,
            data: vec![1, 2, 2],
            solo: false,
        };
        assert!(matches!(
            combine(&[s1, s2], 2),
            Err(ShareError::ShareLengthMismatch)
        ));
    }

    #[test]
    fn bad_threshold_rejected() {
        assert!(matches!(
            split(b"secret", 0, 3),
            Err(ShareError::BadThreshold { .. })
        ));
        assert!(matches!(
            split(b"secret", 5, 3),
            Err(ShareError::BadThreshold { .. })
        ));
        assert!(matches!(
            split(b"secret", 2, 17),
            Err(ShareError::BadThreshold { .. })
        ));
    }

    #[test]
    fn all_thresholds_round_trip() {
        let secret = b"0123456789abcdef".to_vec();
        for n in 1u8..=8 {
            for k in 1..=n {
                let shares = split(&secret, k, n).unwrap();
                let combined = combine(&shares[..k as usize], k).unwrap();
                assert_eq!(combined, secret, "k={k} n={n}");
            }
        }
    }
}
