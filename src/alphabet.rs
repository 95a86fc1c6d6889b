//! Alphabet construction (spec §4.2): pick the base-character vocabulary
//! from raw training data, honoring a coverage fraction.

use std::collections::HashMap;

use crate::utf8::{is_space, SPACE_TOKEN};
use crate::Error;

/// Result of [`build_alphabet`]: the dense `code_point -> internal_id` map
/// plus the set of code points that fell outside the coverage fraction.
pub struct Alphabet {
    pub char2id: HashMap<u32, u32>,
    pub removed_chars: std::collections::HashSet<u32>,
}

/// Build the base alphabet from decoded training data.
///
/// `n_special_tokens` is the first free internal id; ids are assigned in
/// ascending code-point order over the kept set, with [`SPACE_TOKEN`]
/// treated like any other kept code point (step 5 of §4.2) but always kept
/// regardless of coverage (step 4).
///
/// # Errors
/// Returns [`Error::Configuration`] if `character_coverage` is outside
/// `(0, 1]`.
pub fn build_alphabet(
    data: &[u32],
    character_coverage: f64,
    n_special_tokens: u32,
) -> Result<Alphabet, Error> {
    if !(character_coverage > 0.0 && character_coverage <= 1.0) {
        return Err(Error::Configuration(format!(
            "character_coverage must be in (0, 1], got {character_coverage}"
        )));
    }

    let mut char_cnt: HashMap<u32, u64> = HashMap::new();
    for &ch in data {
        if !is_space(ch) {
            *char_cnt.entry(ch).or_insert(0) += 1;
        }
    }

    let total: u64 = char_cnt.values().sum();
    let mut by_freq: Vec<(u32, u64)> = char_cnt.into_iter().collect();
    // Descending count, ascending code point — deterministic tie-break.
    by_freq.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let total_f = total as f64;
    let mut kept: std::collections::HashSet<u32> = std::collections::HashSet::new();
    let mut removed: std::collections::HashSet<u32> = std::collections::HashSet::new();
    let mut cumulative = 0u64;
    for (ch, cnt) in by_freq {
        // Add this character's count first, then test the running fraction
        // against the coverage target — matching the reference's
        // accumulate-then-compare order, so a character is only removed
        // once including it would push cumulative coverage past the target.
        cumulative += cnt;
        if cumulative as f64 / total_f > character_coverage {
            removed.insert(ch);
        } else {
            kept.insert(ch);
        }
    }
    kept.insert(SPACE_TOKEN);
    removed.remove(&SPACE_TOKEN);

    let mut ordered: Vec<u32> = kept.into_iter().collect();
    ordered.sort_unstable();

    let mut char2id = HashMap::with_capacity(ordered.len());
    for (i, ch) in ordered.into_iter().enumerate() {
        char2id.insert(ch, n_special_tokens + i as u32);
    }

    Ok(Alphabet {
        char2id,
        removed_chars: removed,
    })
}

/// Delete every removed code point from `data` in place (§4.2 side effect).
pub fn remove_rare_chars(data: &mut Vec<u32>, removed_chars: &std::collections::HashSet<u32>) {
    if removed_chars.is_empty() {
        return;
    }
    data.retain(|ch| !removed_chars.contains(ch));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_coverage_keeps_every_character() {
        let data = crate::utf8::decode_utf8("baba baaab".as_bytes());
        let alphabet = build_alphabet(&data, 1.0, 4).unwrap();
        let mut chars: Vec<u32> = alphabet.char2id.keys().copied().collect();
        chars.sort_unstable();
        assert_eq!(chars, vec![SPACE_TOKEN, u32::from(b'a'), u32::from(b'b')]);
        assert!(alphabet.removed_chars.is_empty());
    }

    #[test]
    fn assignment_is_ascending_by_code_point() {
        let data = crate::utf8::decode_utf8("baba baaab".as_bytes());
        let alphabet = build_alphabet(&data, 1.0, 4).unwrap();
        // SPACE_TOKEN (0x2581) sorts after 'a' (0x61) and 'b' (0x62).
        assert_eq!(alphabet.char2id[&u32::from(b'a')], 4);
        assert_eq!(alphabet.char2id[&u32::from(b'b')], 5);
        assert_eq!(alphabet.char2id[&SPACE_TOKEN], 6);
    }

    #[test]
    fn low_coverage_removes_rare_chars() {
        // 'a' appears 5 times, 'z' appears once: at coverage 0.9 'z' is cut.
        let text = "aaaaaz";
        let data = crate::utf8::decode_utf8(text.as_bytes());
        let alphabet = build_alphabet(&data, 0.9, 0).unwrap();
        assert!(!alphabet.char2id.contains_key(&u32::from(b'z')));
        assert!(alphabet.removed_chars.contains(&u32::from(b'z')));
    }

    #[test]
    fn rejects_bad_coverage() {
        let data = vec![u32::from(b'a')];
        assert!(build_alphabet(&data, 0.0, 0).is_err());
        assert!(build_alphabet(&data, 1.1, 0).is_err());
    }

    #[test]
    fn space_is_always_kept_even_if_never_selected() {
        let data = vec![u32::from(b'a'); 100];
        let alphabet = build_alphabet(&data, 1.0, 0).unwrap();
        assert!(alphabet.char2id.contains_key(&SPACE_TOKEN));
    }
}
