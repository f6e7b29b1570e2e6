use crate::util::sha256_hex;

/// Decides whether two screenshots show the same screen.
pub trait ScreenComparator: Send + Sync {
    fn is_same_screen(&self, before: &[u8], after: &[u8]) -> bool;
}

/// Byte-exact comparison through SHA-256 digests. Any animated pixel counts as a change.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestComparator;

impl ScreenComparator for DigestComparator {
    fn is_same_screen(&self, before: &[u8], after: &[u8]) -> bool {
        sha256_hex(before) == sha256_hex(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_comparator_matches_identical_bytes_only() {
        let comparator = DigestComparator;
        assert!(comparator.is_same_screen(b"box 1", b"box 1"));
        assert!(!comparator.is_same_screen(b"box 1", b"box 2"));
    }
}
