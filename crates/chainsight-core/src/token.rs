//! Deterministic chain tokens.

use sha2::{Digest, Sha256};

/// Derives a stable identifier from a descriptor string.
///
/// The same descriptor always yields the same token. Used for tree CIDs (over
/// the entry viewpoint) and for chain shape ids (over the node descriptors).
pub fn generate_token(desc: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(desc.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_deterministic() {
        assert_eq!(generate_token("/checkout"), generate_token("/checkout"));
        assert_eq!(generate_token("/checkout").len(), 64);
    }

    #[test]
    fn test_token_distinguishes_viewpoints() {
        assert_ne!(generate_token("/checkout"), generate_token("/checkout/"));
        assert_ne!(generate_token(""), generate_token(" "));
    }

    #[test]
    fn test_token_known_value() {
        assert_eq!(
            generate_token(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
