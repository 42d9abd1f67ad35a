//! Random suffixes for provisioned resource names.

use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Uppercase alphanumeric suffix, e.g. `X7K2P`. Uniqueness is
/// probabilistic; the provider rejects an outright name collision.
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_has_requested_length_and_charset() {
        for _ in 0..50 {
            let s = random_suffix(5);
            assert_eq!(s.len(), 5);
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn zero_length_suffix_is_empty() {
        assert_eq!(random_suffix(0), "");
    }
}
