//! WordPiece encoder (spec §4.5): longest-match vocabulary lookup over a
//! prefix/suffix (`##`) partition, with punctuation splitting and
//! word-aligned parallel chunking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::concurrency::{map_ordered, ThreadPool};
use crate::utf8::{decode_one, is_punctuation, is_space, is_spacing_char, INVALID_UNICODE};
use crate::Error;

const UNK_TOKEN: &str = "[UNK]";
const PAD_TOKEN: &str = "[PAD]";
const BOS_TOKEN: &str = "[BOS]";
const EOS_TOKEN: &str = "[EOS]";

/// Above this many decoded code points, `segment` splits the input into
/// roughly equal, word-aligned ranges and dispatches one task per range.
const PARALLEL_THRESHOLD: usize = 2_000_000;
const WORK_BATCH: usize = 1_000_000;

/// One parsed vocabulary line (spec §3 "WordPiece token").
struct WordPieceToken {
    word: Vec<u32>,
    is_prefix: bool,
    is_special: bool,
    is_malformed: bool,
}

impl WordPieceToken {
    fn parse(raw_line: &str) -> Result<Self, Error> {
        let is_prefix = !raw_line.starts_with("##");
        let stripped = if is_prefix { raw_line } else { &raw_line[2..] };

        let mut word = Vec::with_capacity(stripped.len());
        let mut saw_invalid = false;
        let bytes = stripped.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let (cp, len) = decode_one(&bytes[i..]);
            if cp == INVALID_UNICODE {
                saw_invalid = true;
            }
            word.push(cp);
            i += len;
        }

        if word.is_empty() {
            return Err(Error::MalformedModel("vocab word is empty".to_string()));
        }

        let is_special = raw_line.starts_with('[') && raw_line.ends_with(']') && raw_line.len() > 2;

        let all_punct_or_space = word.iter().all(|&cp| is_punctuation(cp) || is_space(cp));
        let is_malformed = saw_invalid || (all_punct_or_space && word.len() > 1);
        if is_malformed {
            eprintln!("WARNING vocab word is malformed: {raw_line}");
        }

        Ok(Self {
            word,
            is_prefix,
            is_special,
            is_malformed,
        })
    }
}

type WordMap = HashMap<Vec<u32>, u32, ahash::RandomState>;

struct Inner {
    surface: Vec<String>,
    prefix_to_id: WordMap,
    suffix_to_id: WordMap,
    max_token_len: usize,
    unk_id: Option<u32>,
    #[allow(dead_code)]
    pad_id: Option<u32>,
    #[allow(dead_code)]
    bos_id: Option<u32>,
    #[allow(dead_code)]
    eos_id: Option<u32>,
}

/// A constructed WordPiece encoder: the prefix/suffix maps, the id-indexed
/// surface-form list (for `decode`), and an owned worker pool.
pub struct WordPieceEncoder {
    inner: Arc<Inner>,
    pool: ThreadPool,
}

impl WordPieceEncoder {
    /// Build an encoder from an ordered vocabulary (line index = token id,
    /// matching the on-disk format of spec §6).
    ///
    /// # Errors
    /// Returns [`Error::MalformedModel`] if any vocabulary line decodes to
    /// an empty token.
    pub fn new(vocab: &[String], n_threads: usize) -> Result<Self, Error> {
        let mut prefix_to_id = WordMap::default();
        let mut suffix_to_id = WordMap::default();
        let mut max_token_len = 0usize;
        let (mut unk_id, mut pad_id, mut bos_id, mut eos_id) = (None, None, None, None);

        for (index, line) in vocab.iter().enumerate() {
            let token = WordPieceToken::parse(line)?;
            let id = index as u32;

            if token.is_special {
                match line.as_str() {
                    UNK_TOKEN => {
                        unk_id.get_or_insert(id);
                    }
                    PAD_TOKEN => {
                        pad_id.get_or_insert(id);
                    }
                    BOS_TOKEN => {
                        bos_id.get_or_insert(id);
                    }
                    EOS_TOKEN => {
                        eos_id.get_or_insert(id);
                    }
                    _ => {}
                }
                continue;
            }
            if token.is_malformed {
                continue;
            }

            max_token_len = max_token_len.max(token.word.len());
            let map = if token.is_prefix {
                &mut prefix_to_id
            } else {
                &mut suffix_to_id
            };
            map.entry(token.word).or_insert(id);
        }

        let inner = Arc::new(Inner {
            surface: vocab.to_vec(),
            prefix_to_id,
            suffix_to_id,
            max_token_len,
            unk_id,
            pad_id,
            bos_id,
            eos_id,
        });

        Ok(Self {
            inner,
            pool: ThreadPool::new(n_threads),
        })
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.surface.len()
    }

    #[must_use]
    pub fn unk_id(&self) -> Option<u32> {
        self.inner.unk_id
    }

    /// Segment `text` and return its token ids.
    #[must_use]
    pub fn encode_as_ids(&self, text: &str) -> Vec<u32> {
        let cps = crate::utf8::decode_utf8(text.as_bytes());
        self.encode_cps(&cps)
    }

    /// Segment `text` and return the surface form of each token.
    #[must_use]
    pub fn encode_as_subwords(&self, text: &str) -> Vec<String> {
        self.encode_as_ids(text)
            .into_iter()
            .map(|id| self.token_surface(id))
            .collect()
    }

    fn encode_cps(&self, cps: &[u32]) -> Vec<u32> {
        if cps.is_empty() {
            return Vec::new();
        }
        if cps.len() < 2 * WORK_BATCH || self.pool.thread_count() <= 1 {
            return self.inner.segment(cps, 0, cps.len());
        }

        let thread_count = self.pool.thread_count().min(cps.len() / WORK_BATCH).max(1);
        let work_batch = cps.len() / thread_count + 1;
        let mut ranges = Vec::new();
        let mut begin = 0;
        while begin < cps.len() && ranges.len() < thread_count {
            let mut end = (begin + work_batch).min(cps.len());
            while end < cps.len() && !is_space(cps[end]) {
                end += 1;
            }
            ranges.push((begin, end));
            begin = end;
        }
        if begin < cps.len() {
            if let Some(last) = ranges.last_mut() {
                last.1 = cps.len();
            }
        }

        let cps_owned = Arc::new(cps.to_vec());
        let inner = Arc::clone(&self.inner);
        let per_range = map_ordered(&self.pool, ranges, move |(begin, end)| {
            inner.segment(&cps_owned, begin, end)
        });
        per_range.into_iter().flatten().collect()
    }

    /// Surface form for `id`: the raw vocabulary line, with any `##`
    /// prefix kept as part of the displayed piece (matching the on-disk
    /// text, for faithful `decode` round trips).
    #[must_use]
    pub fn token_surface(&self, id: u32) -> String {
        self.inner
            .surface
            .get(id as usize)
            .cloned()
            .unwrap_or_default()
    }

    /// Concatenate the surface forms of `ids`, skipping any id in
    /// `ignore_ids`. `##` prefixes are stripped so adjacent subwords join
    /// into whole words.
    #[must_use]
    pub fn decode(&self, ids: &[u32], ignore_ids: Option<&std::collections::HashSet<u32>>) -> String {
        let mut out = String::new();
        for &id in ids {
            if ignore_ids.is_some_and(|s| s.contains(&id)) {
                continue;
            }
            let piece = self.token_surface(id);
            out.push_str(piece.strip_prefix("##").unwrap_or(&piece));
        }
        out
    }
}

impl Inner {
    fn is_word_prefix(&self, text: &[u32], index: usize) -> bool {
        index == 0 || is_spacing_char(text[index]) || is_spacing_char(text[index - 1])
    }

    /// Segment `text[begin..end]` into token ids (spec §4.5 steps 1-6).
    fn segment(&self, text: &[u32], mut begin: usize, end: usize) -> Vec<u32> {
        let max_len = self.max_token_len.min(text.len());
        let mut token_ids = Vec::new();

        while begin != end && is_space(text[begin]) {
            begin += 1;
        }

        let mut tokens_since_prefix = 0usize;
        while begin != end {
            let mut word_len = 1;
            if !is_punctuation(text[begin]) {
                while word_len < max_len.min(end - begin) && !is_spacing_char(text[begin + word_len]) {
                    word_len += 1;
                }
            }

            let word_to_id = if self.is_word_prefix(text, begin) {
                &self.prefix_to_id
            } else {
                &self.suffix_to_id
            };

            let mut seg_len = word_len;
            let mut matched: Option<u32> = None;
            while seg_len > 0 {
                if let Some(&id) = word_to_id.get(&text[begin..begin + seg_len]) {
                    matched = Some(id);
                    break;
                }
                seg_len -= 1;
            }

            if let Some(id) = matched {
                tokens_since_prefix += 1;
                token_ids.push(id);
                begin += seg_len;
            } else {
                for _ in 0..tokens_since_prefix {
                    token_ids.pop();
                }
                tokens_since_prefix = 0;
                token_ids.push(self.unk_id.unwrap_or(0));
                begin += word_len;
                while begin != end && !self.is_word_prefix(text, begin) {
                    begin += 1;
                }
            }

            if begin != end && self.is_word_prefix(text, begin) {
                tokens_since_prefix = 0;
            }
            while begin != end && is_space(text[begin]) {
                begin += 1;
            }
        }

        token_ids
    }
}

/// Decode `bytes` to code points, splitting into word-aligned (on the
/// nearest following UTF-8 leading byte) ranges above [`PARALLEL_THRESHOLD`]
/// and dispatching one task per range to `pool` (spec §4.5 "the same
/// chunking is used earlier to parallelize UTF-8 decode").
#[must_use]
pub fn parallel_decode_utf8(bytes: &[u8], pool: &ThreadPool) -> Vec<u32> {
    if bytes.len() < PARALLEL_THRESHOLD || pool.thread_count() <= 1 {
        return crate::utf8::decode_utf8(bytes);
    }

    let thread_count = pool.thread_count().min(bytes.len() / WORK_BATCH).max(1);
    let work_batch = bytes.len() / thread_count + 1;
    let mut ranges = Vec::new();
    let mut begin = 0;
    while begin < bytes.len() {
        let mut end = (begin + work_batch).min(bytes.len());
        while end < bytes.len() && is_continuation(bytes[end]) {
            end += 1;
        }
        ranges.push((begin, end));
        begin = end;
    }

    let bytes_owned = Arc::new(bytes.to_vec());
    let chunks: Vec<Vec<u32>> = {
        let bytes_owned = Arc::clone(&bytes_owned);
        map_ordered(pool, ranges, move |(b, e)| {
            crate::utf8::decode_utf8(&bytes_owned[b..e])
        })
    };
    chunks.into_iter().flatten().collect()
}

fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(vocab: &[&str]) -> WordPieceEncoder {
        let vocab: Vec<String> = vocab.iter().map(|s| s.to_string()).collect();
        WordPieceEncoder::new(&vocab, 1).unwrap()
    }

    #[test]
    fn simple_prefix_suffix_match() {
        let enc = encoder(&["[UNK]", "un", "##able", "cap", "##s"]);
        let ids = enc.encode_as_ids("unable caps");
        assert_eq!(ids, vec![1, 2, 3, 4]);
        let pieces = enc.encode_as_subwords("unable caps");
        assert_eq!(pieces, vec!["un", "##able", "cap", "##s"]);
    }

    #[test]
    fn rollback_on_total_word_failure() {
        let enc = encoder(&["[UNK]", "un", "##able"]);
        let ids = enc.encode_as_ids("unknown");
        assert_eq!(ids, vec![0]);
    }

    #[test]
    fn punctuation_is_isolated() {
        let enc = encoder(&["[UNK]", "hi", ","]);
        let ids = enc.encode_as_ids("hi,");
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn malformed_entries_excluded_from_lookup_but_kept_for_decode() {
        let vocab: Vec<String> = vec!["[UNK]".into(), "..".into(), "ok".into()];
        let enc = WordPieceEncoder::new(&vocab, 1).unwrap();
        // ".." is all-punctuation with length > 1: malformed, excluded from
        // matching, but still addressable by id for decode round trips.
        assert_eq!(enc.token_surface(1), "..");
        // The malformed ".." entry never enters the lookup maps, so each
        // punctuation character is its own unmatched word.
        let ids = enc.encode_as_ids("..");
        assert_eq!(ids, vec![0, 0]);
    }

    #[test]
    fn chunking_invariance_on_space_boundary() {
        let enc = encoder(&["[UNK]", "un", "##able", "cap", "##s"]);
        let whole = enc.encode_as_ids("unable caps unable caps");
        let left = enc.encode_as_ids("unable caps");
        let right = enc.encode_as_ids("unable caps");
        let mut concatenated = left;
        concatenated.extend(right);
        assert_eq!(whole, concatenated);
    }

    #[test]
    fn first_occurrence_wins_for_duplicate_vocab_entries() {
        let vocab: Vec<String> = vec!["[UNK]".into(), "dup".into(), "dup".into()];
        let enc = WordPieceEncoder::new(&vocab, 1).unwrap();
        assert_eq!(enc.encode_as_ids("dup"), vec![1]);
    }
}
