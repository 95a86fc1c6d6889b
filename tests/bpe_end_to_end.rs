use std::collections::HashSet;

use subwtok::bpe::{learn_bpe, BpeApplier, BpeConfig, BpeState, EncodingConfig, SpecialTokens};

fn baba_config() -> BpeConfig {
    BpeConfig {
        character_coverage: 1.0,
        n_threads: 1,
        special_tokens: SpecialTokens::new(0, 1, 2, 3),
    }
}

#[test]
fn small_corpus_trains_to_requested_vocab_size() {
    let sentences = vec!["baba baaab".to_string()];
    let state = learn_bpe(&sentences, 9, &baba_config()).unwrap();
    let applier = BpeApplier::new(state, 1);
    assert_eq!(applier.vocab_size(), 9);
}

#[test]
fn unknown_character_falls_back_to_unk_token() {
    let sentences = vec!["baba baaab".to_string()];
    let state = learn_bpe(&sentences, 9, &baba_config()).unwrap();
    let applier = BpeApplier::new(state, 1);
    let ids = applier.encode_as_ids(&["d d".to_string()], &EncodingConfig::default());
    assert_eq!(ids[0], vec![1, 1]);
}

#[test]
fn encoded_sentences_never_contain_a_bare_space_token() {
    let sentences = vec!["baba baaab abba".to_string()];
    let state = learn_bpe(&sentences, 12, &baba_config()).unwrap();
    let applier = BpeApplier::new(state, 1);
    let pieces = applier.encode_as_subwords(&sentences, &EncodingConfig::default());
    for sentence_pieces in pieces {
        for piece in sentence_pieces {
            assert_ne!(piece, " ");
        }
    }
}

#[test]
fn zero_dropout_is_fully_deterministic_across_repeated_calls() {
    let sentences = vec!["baba baaab".to_string(), "abba baba".to_string()];
    let state = learn_bpe(&sentences, 10, &baba_config()).unwrap();
    let applier = BpeApplier::new(state, 2);
    let config = EncodingConfig::default();
    let first = applier.encode_as_ids(&sentences, &config);
    let second = applier.encode_as_ids(&sentences, &config);
    assert_eq!(first, second);
}

#[test]
fn training_is_independent_of_thread_count() {
    let sentences: Vec<String> = (0..30).map(|i| format!("baba baaab abba {i}")).collect();
    let single = learn_bpe(
        &sentences,
        40,
        &BpeConfig {
            n_threads: 1,
            ..baba_config()
        },
    )
    .unwrap();
    let multi = learn_bpe(
        &sentences,
        40,
        &BpeConfig {
            n_threads: 4,
            ..baba_config()
        },
    )
    .unwrap();
    assert_eq!(single.rules, multi.rules);
}

#[test]
fn model_round_trips_through_disk() {
    let sentences = vec!["baba baaab".to_string()];
    let state = learn_bpe(&sentences, 9, &baba_config()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    state.dump(&path).unwrap();
    let loaded = BpeState::load(&path).unwrap();

    let original = BpeApplier::new(state, 1);
    let reloaded = BpeApplier::new(loaded, 1);
    let config = EncodingConfig::default();
    assert_eq!(
        original.encode_as_ids(&sentences, &config),
        reloaded.encode_as_ids(&sentences, &config)
    );
}

#[test]
fn dropout_one_forces_every_token_down_to_the_base_alphabet() {
    let sentences = vec!["baba baaab".to_string()];
    let state = learn_bpe(&sentences, 9, &baba_config()).unwrap();
    let alphabet_ids: HashSet<u32> = state.char2id.values().copied().collect();
    let applier = BpeApplier::new(state, 1);
    let config = EncodingConfig {
        dropout_prob: 1.0,
        ..Default::default()
    };
    let ids = applier.encode_as_ids(&["baba baaab".to_string()], &config);
    for sentence_ids in &ids {
        for id in sentence_ids {
            assert!(
                alphabet_ids.contains(id),
                "id {id} should be a base character under full dropout"
            );
        }
    }
}

#[test]
fn bos_and_eos_wrap_every_sentence_when_requested() {
    let sentences = vec!["baba".to_string()];
    let state = learn_bpe(&sentences, 9, &baba_config()).unwrap();
    let applier = BpeApplier::new(state, 1);
    let config = EncodingConfig {
        bos: true,
        eos: true,
        ..Default::default()
    };
    let ids = &applier.encode_as_ids(&sentences, &config)[0];
    assert_eq!(ids.first(), Some(&2));
    assert_eq!(ids.last(), Some(&3));
}
