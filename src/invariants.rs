//! Debug-only internal invariant checks (spec §7 "Encoding error" — the
//! handful of conditions that should be impossible given a correctly
//! constructed encoder). Compiled out entirely in release builds.

/// Every id a BPE or WordPiece encoder hands back must be inside its own
/// vocabulary; violating this would mean a bug in rule application or
/// vocabulary construction, not bad caller input.
#[inline]
pub fn assert_ids_in_vocab(ids: &[u32], vocab_size: usize) {
    #[cfg(debug_assertions)]
    for (i, &id) in ids.iter().enumerate() {
        debug_assert!(
            (id as usize) < vocab_size,
            "encoder produced out-of-range id at position {i}: {id} >= {vocab_size}"
        );
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = (ids, vocab_size);
    }
}

/// `ids` and `pieces` from the same encode call must always be the same
/// length: every id has exactly one surface-form piece.
#[inline]
pub fn assert_ids_pieces_aligned(ids_len: usize, pieces_len: usize) {
    debug_assert_eq!(
        ids_len, pieces_len,
        "ids/pieces length mismatch: {ids_len} vs {pieces_len}"
    );
}

/// A [`crate::bpe::state::MergeRule`]'s output id must exceed both its
/// input ids (spec §3 "ids grow strictly monotonically").
#[inline]
pub fn assert_rule_monotonic(x: u32, y: u32, z: u32) {
    debug_assert!(
        z > x && z > y,
        "merge rule violates monotonic id invariant: ({x}, {y}) -> {z}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_ids_pass() {
        assert_ids_in_vocab(&[0, 1, 2], 10);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "out-of-range"))]
    fn out_of_range_id_panics_in_debug() {
        assert_ids_in_vocab(&[0, 10], 10);
    }

    #[test]
    fn aligned_lengths_pass() {
        assert_ids_pieces_aligned(3, 3);
    }

    #[test]
    fn monotonic_rule_passes() {
        assert_rule_monotonic(1, 2, 5);
    }
}
