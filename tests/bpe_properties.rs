use proptest::prelude::*;
use subwtok::bpe::{learn_bpe, BpeApplier, BpeConfig, EncodingConfig, SpecialTokens};

fn config() -> BpeConfig {
    BpeConfig {
        character_coverage: 1.0,
        n_threads: 1,
        special_tokens: SpecialTokens::new(0, 1, 2, 3),
    }
}

proptest! {
    #[test]
    fn encoding_is_invariant_to_worker_thread_count(
        words in prop::collection::vec("[a-c]{1,6}", 1..20),
    ) {
        let sentences = vec![words.join(" ")];
        let state = learn_bpe(&sentences, 30, &config()).unwrap();
        let encode_config = EncodingConfig::default();

        let serial = BpeApplier::new(state.clone(), 1).encode_as_ids(&sentences, &encode_config);
        let parallel = BpeApplier::new(state, 4).encode_as_ids(&sentences, &encode_config);
        prop_assert_eq!(serial, parallel);
    }

    #[test]
    fn decoding_a_freshly_encoded_sentence_recovers_its_normalized_form(
        words in prop::collection::vec("[a-c]{1,6}", 1..10),
    ) {
        let sentence = words.join(" ");
        let sentences = vec![sentence.clone()];
        let state = learn_bpe(&sentences, 40, &config()).unwrap();
        let applier = BpeApplier::new(state, 1);
        let ids = &applier.encode_as_ids(&sentences, &EncodingConfig::default())[0];
        let decoded = applier.decode(ids, None).replace('\u{2581}', " ");
        prop_assert_eq!(decoded.trim(), sentence.trim());
    }
}
