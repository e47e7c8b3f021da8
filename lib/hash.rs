//! String hashing for the per-directory child index.
//!
//! The sdbm recurrence `h = c + (h << 6) + (h << 16) - h`, computed over code units with
//! wrapping arithmetic. The child index hashes case-folded names so that case-insensitive
//! lookups land in the same bucket. The exact variants hash the input as given.

use crate::name::CodeUnit;

#[inline]
fn step(h: u32, c: u32) -> u32 {
    c.wrapping_add(h << 6)
        .wrapping_add(h << 16)
        .wrapping_sub(h)
}

pub(crate) fn hash_units<C: CodeUnit>(units: &[C]) -> u32 {
    units.iter().fold(0, |h, c| step(h, c.to_u32()))
}

pub(crate) fn hash_units_folded<C: CodeUnit>(units: &[C]) -> u32 {
    units.iter().fold(0, |h, c| step(h, c.fold().to_u32()))
}

/// Exact hash of a byte string.
#[must_use]
pub fn hash_bytes(s: &[u8]) -> u32 {
    hash_units(s)
}

/// Hash of a byte string with ASCII letters folded to lowercase.
#[must_use]
pub fn hash_bytes_folded(s: &[u8]) -> u32 {
    hash_units_folded(s)
}

/// Exact hash of a UTF-16 string.
#[must_use]
pub fn hash_wide(s: &[u16]) -> u32 {
    hash_units(s)
}

/// Hash of a UTF-16 string with simple lowercase folding applied per code unit.
#[must_use]
pub fn hash_wide_folded(s: &[u16]) -> u32 {
    hash_units_folded(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_hashes_to_zero() {
        assert_eq!(hash_bytes(b""), 0);
        assert_eq!(hash_wide(&[]), 0);
    }

    #[test]
    fn single_unit_is_its_value() {
        assert_eq!(hash_bytes(b"a"), u32::from(b'a'));
    }

    #[test]
    fn two_units_follow_sdbm() {
        let h = u32::from(b'a');
        let expected = u32::from(b'b')
            .wrapping_add(h << 6)
            .wrapping_add(h << 16)
            .wrapping_sub(h);
        assert_eq!(hash_bytes(b"ab"), expected);
    }

    #[test]
    fn narrow_and_wide_agree_on_ascii() {
        let wide: Vec<u16> = "src/kBuild/footer.kmk".encode_utf16().collect();
        assert_eq!(hash_bytes(b"src/kBuild/footer.kmk"), hash_wide(&wide));
        assert_eq!(
            hash_bytes_folded(b"SRC/kBuild/Footer.KMK"),
            hash_wide_folded(&wide)
        );
    }

    #[test]
    fn folded_hash_ignores_case_exact_does_not() {
        assert_eq!(hash_bytes_folded(b"Config.H"), hash_bytes_folded(b"config.h"));
        assert_ne!(hash_bytes(b"Config.H"), hash_bytes(b"config.h"));
    }

    #[test]
    fn long_input_wraps_without_panicking() {
        let long = vec![0xffu8; 4096];
        let _ = hash_bytes(&long);
        let _ = hash_bytes_folded(&long);
    }
}
