//! # subwtok
//!
//! A pure-Rust subword tokenization core: a Byte-Pair Encoding (BPE)
//! trainer and encoder, and a WordPiece encoder. Both take arbitrary UTF-8
//! text and produce an integer token sequence (plus its surface-form
//! pieces) suitable for neural-network input.
//!
//! ## Example
//!
//! ```
//! use subwtok::bpe::{learn_bpe, BpeApplier, BpeConfig, EncodingConfig};
//!
//! let sentences = vec!["a new sentence to learn from".to_string()];
//! let state = learn_bpe(&sentences, 40, &BpeConfig::default()).unwrap();
//! let applier = BpeApplier::new(state, 1);
//! let ids = applier.encode_as_ids(&sentences, &EncodingConfig::default());
//! assert_eq!(ids.len(), 1);
//! ```
//!
//! ## Scope
//!
//! This crate is the tokenization core only: model file I/O is limited to
//! the binary layout in [`bpe::state::BpeState::dump`]/[`bpe::state::BpeState::load`]
//! and the plain-text WordPiece vocabulary format read by
//! [`wpm::WordPieceEncoder::new`]. Argument parsing, stdin/stdout
//! streaming, and language bindings live at the CLI boundary
//! (`src/bin/subwtok.rs`), not in the library.

pub mod alphabet;
pub mod bpe;
pub mod concurrency;
mod error;
pub mod invariants;
pub mod utf8;
pub mod wpm;

pub use error::{Error, Result};
