//! Byte-Pair Encoding: the learner (training) and applier (encoding) halves
//! of spec §4.3/§4.4, plus the on-disk model state of §3/§6.

pub mod applier;
pub mod state;
pub mod trainer;

pub use applier::{BpeApplier, DecodeResult, EncodingConfig};
pub use state::{BpeConfig, BpeState, MergeRule, SpecialTokens};
pub use trainer::learn_bpe;
