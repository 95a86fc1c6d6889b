//! The BPE learner (spec §4.3): turn raw sentences into a [`BpeState`] by
//! repeatedly merging the highest-priority adjacent pair.

use std::collections::HashMap;

use crate::alphabet::{build_alphabet, remove_rare_chars};
use crate::bpe::state::{BpeConfig, BpeState, MergeRule};
use crate::concurrency::{map_ordered, ThreadPool};
use crate::utf8::{decode_utf8, is_space, SPACE_TOKEN};
use crate::Error;

type PairCounts = HashMap<(u32, u32), u64, ahash::RandomState>;

/// Learn a BPE model from raw UTF-8 training sentences.
///
/// `vocab_size` is the target total id space, counting special tokens,
/// base alphabet, and learned merges. Training stops early, without error,
/// once no adjacent pair occurs more than once (`vocab_size` unreachable);
/// it fails with [`Error::Configuration`] if `vocab_size` is too small to
/// even hold the special tokens and alphabet.
pub fn learn_bpe(
    sentences: &[String],
    vocab_size: u32,
    config: &BpeConfig,
) -> Result<BpeState, Error> {
    let n_special = config.special_tokens.n_special_tokens();

    let mut data: Vec<u32> = Vec::new();
    for (i, sentence) in sentences.iter().enumerate() {
        if i > 0 {
            data.push(SPACE_TOKEN);
        }
        data.extend(decode_utf8(sentence.as_bytes()));
    }
    for ch in &mut data {
        if is_space(*ch) {
            *ch = SPACE_TOKEN;
        }
    }
    while matches!(data.last(), Some(&ch) if ch == SPACE_TOKEN) {
        data.pop();
    }

    let alphabet = if data.is_empty() {
        // Empty training text still yields the minimal alphabet of one
        // entry, SPACE_TOKEN (spec §4.3 "Failure modes").
        let mut char2id = HashMap::with_capacity(1);
        char2id.insert(SPACE_TOKEN, n_special);
        crate::alphabet::Alphabet {
            char2id,
            removed_chars: std::collections::HashSet::new(),
        }
    } else {
        build_alphabet(&data, config.character_coverage, n_special)?
    };
    remove_rare_chars(&mut data, &alphabet.removed_chars);

    if vocab_size < n_special + alphabet.char2id.len() as u32 {
        return Err(Error::Configuration(format!(
            "vocab_size {} is too small for {} special tokens and a {}-character alphabet",
            vocab_size,
            n_special,
            alphabet.char2id.len()
        )));
    }

    let mut words: Vec<Vec<u32>> = split_into_words(&data, &alphabet.char2id);
    let mut word_freq: HashMap<Vec<u32>, u64> = HashMap::new();
    for word in words.drain(..) {
        *word_freq.entry(word).or_insert(0) += 1;
    }
    let mut words: Vec<(Vec<u32>, u64)> = word_freq.into_iter().collect();

    let pool = ThreadPool::new(config.n_threads);
    let mut next_id = n_special + alphabet.char2id.len() as u32;
    let mut rules = Vec::new();

    while next_id < vocab_size {
        let counts = count_pairs_parallel(&pool, &words);
        let Some((x, y, _)) = best_pair(&counts) else {
            break;
        };

        let z = next_id;
        next_id += 1;
        rules.push(MergeRule::new(x, y, z));
        apply_rule(&mut words, x, y, z);
    }

    Ok(BpeState {
        char2id: alphabet.char2id,
        rules,
        special_tokens: config.special_tokens,
    })
}

/// Split decoded, coverage-filtered text into words: maximal runs of
/// non-space code points, each prefixed with a single [`SPACE_TOKEN`].
/// Code points outside the alphabet were already dropped.
fn split_into_words(data: &[u32], char2id: &HashMap<u32, u32>) -> Vec<Vec<u32>> {
    let mut words = Vec::new();
    let mut i = 0;
    while i < data.len() {
        while i < data.len() && is_space(data[i]) {
            i += 1;
        }
        if i == data.len() {
            break;
        }
        let mut word = Vec::with_capacity(4);
        word.push(char2id[&SPACE_TOKEN]);
        while i < data.len() && !is_space(data[i]) {
            word.push(char2id[&data[i]]);
            i += 1;
        }
        words.push(word);
    }
    words
}

/// Count adjacent-pair occurrences across every word, weighted by word
/// frequency. A maximal run of `k` identical adjacent ids contributes
/// `k / 2` to that pair, matching the number of non-overlapping merges a
/// left-to-right application actually performs (spec §4.3 step 1).
fn count_pairs_parallel(pool: &ThreadPool, words: &[(Vec<u32>, u64)]) -> PairCounts {
    let n_chunks = pool.thread_count().max(1);
    let chunk_size = words.len().div_ceil(n_chunks).max(1);
    let chunks: Vec<Vec<(Vec<u32>, u64)>> = words
        .chunks(chunk_size)
        .map(<[(Vec<u32>, u64)]>::to_vec)
        .collect();

    let partials = map_ordered(pool, chunks, |chunk| {
        let mut local: PairCounts = PairCounts::default();
        for (word, freq) in &chunk {
            for (pair, cnt) in count_pairs_in_word(word) {
                *local.entry(pair).or_insert(0) += cnt * freq;
            }
        }
        local
    });

    let mut total: PairCounts = PairCounts::default();
    for partial in partials {
        for (pair, cnt) in partial {
            *total.entry(pair).or_insert(0) += cnt;
        }
    }
    total
}

/// Count each adjacent pair in `word`, one step at a time. `i` advances by
/// 2 only when `word[i] == word[i+1] == word[i+2]` (the overlapping-triple
/// rule of spec §4.3 step 1, counting non-overlapping occurrences of a
/// self-pair within a run); otherwise it advances by 1, so every boundary
/// pair — including the one right after a run of identical tokens — is
/// still counted. The caller aggregates repeated pair keys, so returning
/// one entry per counted position (rather than pre-summing within a run)
/// is equivalent once summed.
fn count_pairs_in_word(word: &[u32]) -> Vec<((u32, u32), u64)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 1 < word.len() {
        out.push(((word[i], word[i + 1]), 1));
        if i + 2 < word.len() && word[i] == word[i + 1] && word[i + 1] == word[i + 2] {
            i += 2;
        } else {
            i += 1;
        }
    }
    out
}

/// Pick the best candidate under the spec's deterministic total order:
/// highest count; ties broken by smallest `max(x, y)`, then smallest
/// `min(x, y)`, then largest `x`.
fn best_pair(counts: &PairCounts) -> Option<(u32, u32, u64)> {
    let mut best: Option<(u32, u32, u64)> = None;
    for (&(x, y), &cnt) in counts {
        if cnt == 0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((bx, by, bcnt)) => is_better(x, y, cnt, bx, by, bcnt),
        };
        if better {
            best = Some((x, y, cnt));
        }
    }
    best
}

#[allow(clippy::too_many_arguments)]
fn is_better(x: u32, y: u32, cnt: u64, bx: u32, by: u32, bcnt: u64) -> bool {
    if cnt != bcnt {
        return cnt > bcnt;
    }
    let (mn, mx) = (x.min(y), x.max(y));
    let (bmn, bmx) = (bx.min(by), bx.max(by));
    if mx != bmx {
        return mx < bmx;
    }
    if mn != bmn {
        return mn < bmn;
    }
    x > bx
}

/// Apply a single merge rule to every word, left to right, non-overlapping.
fn apply_rule(words: &mut [(Vec<u32>, u64)], x: u32, y: u32, z: u32) {
    for (word, _) in words.iter_mut() {
        let mut i = 0;
        while i + 1 < word.len() {
            if word[i] == x && word[i + 1] == y {
                word[i] = z;
                word.remove(i + 1);
            }
            i += 1;
        }
    }
}
