//! Thin CLI shell over the `subwtok` library (spec §6). No tokenization
//! logic lives here — only argument parsing, stdin/stdout plumbing, and
//! mapping library `Result`s to process exit codes.

use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use subwtok::bpe::{learn_bpe, BpeApplier, BpeConfig, BpeState, EncodingConfig, SpecialTokens};
use subwtok::wpm::WordPieceEncoder;
use subwtok::Error;

#[derive(Parser)]
#[command(name = "subwtok", about = "BPE and WordPiece subword tokenization")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Byte-Pair Encoding: train a model, or encode/decode/inspect with one.
    Bpe {
        #[command(subcommand)]
        action: BpeAction,
    },
    /// WordPiece: encode text against a vocabulary.
    Wordpiece {
        #[command(subcommand)]
        action: WordpieceAction,
    },
}

#[derive(Subcommand)]
enum BpeAction {
    Train {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        model: PathBuf,
        #[arg(long = "vocab-size")]
        vocab_size: u32,
        #[arg(long, default_value_t = 1.0)]
        coverage: f64,
        #[arg(long = "n-threads", default_value_t = 0)]
        n_threads: usize,
        #[arg(long = "unk-id")]
        unk_id: Option<i64>,
        #[arg(long = "pad-id")]
        pad_id: Option<i64>,
        #[arg(long = "bos-id")]
        bos_id: Option<i64>,
        #[arg(long = "eos-id")]
        eos_id: Option<i64>,
    },
    Encode {
        #[arg(long)]
        model: PathBuf,
        #[arg(long = "output-type", value_enum, default_value_t = OutputType::Ids)]
        output_type: OutputType,
        #[arg(long)]
        bos: bool,
        #[arg(long)]
        eos: bool,
        #[arg(long)]
        reverse: bool,
        #[arg(long = "dropout-prob", default_value_t = 0.0)]
        dropout_prob: f64,
        #[arg(long = "n-threads", default_value_t = 0)]
        n_threads: usize,
    },
    Decode {
        #[arg(long)]
        model: PathBuf,
        #[arg(long = "ignore-ids")]
        ignore_ids: Option<String>,
    },
    Vocab {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Subcommand)]
enum WordpieceAction {
    Encode {
        #[arg(long)]
        vocab: PathBuf,
        #[arg(long)]
        text: PathBuf,
        #[arg(long = "output-type", value_enum, default_value_t = OutputType::Ids)]
        output_type: OutputType,
        #[arg(long = "n-threads", default_value_t = 0)]
        n_threads: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputType {
    Ids,
    Subwords,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Error> {
    match Cli::parse().command {
        Command::Bpe { action } => run_bpe(action),
        Command::Wordpiece { action } => run_wordpiece(action),
    }
}

fn run_bpe(action: BpeAction) -> Result<(), Error> {
    match action {
        BpeAction::Train {
            data,
            model,
            vocab_size,
            coverage,
            n_threads,
            unk_id,
            pad_id,
            bos_id,
            eos_id,
        } => {
            let text = std::fs::read_to_string(&data)?;
            let sentences: Vec<String> = text.lines().map(str::to_string).collect();
            let mut special_tokens = SpecialTokens::default();
            if let Some(id) = pad_id {
                special_tokens.pad_id = id;
            }
            if let Some(id) = unk_id {
                special_tokens.unk_id = id;
            }
            if let Some(id) = bos_id {
                special_tokens.bos_id = id;
            }
            if let Some(id) = eos_id {
                special_tokens.eos_id = id;
            }
            let config = BpeConfig {
                character_coverage: coverage,
                n_threads,
                special_tokens,
            };
            let state = learn_bpe(&sentences, vocab_size, &config)?;
            state.dump(&model)?;
            Ok(())
        }
        BpeAction::Encode {
            model,
            output_type,
            bos,
            eos,
            reverse,
            dropout_prob,
            n_threads,
        } => {
            let state = BpeState::load(&model)?;
            let applier = BpeApplier::new(state, n_threads);
            let config = EncodingConfig {
                bos,
                eos,
                reverse,
                dropout_prob,
            };
            let sentences = read_lines_from_stdin()?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            match output_type {
                OutputType::Ids => {
                    for ids in applier.encode_as_ids(&sentences, &config) {
                        write_line(&mut out, ids.iter().map(ToString::to_string))?;
                    }
                }
                OutputType::Subwords => {
                    for pieces in applier.encode_as_subwords(&sentences, &config) {
                        write_line(&mut out, pieces.into_iter())?;
                    }
                }
            }
            Ok(())
        }
        BpeAction::Decode { model, ignore_ids } => {
            let state = BpeState::load(&model)?;
            let applier = BpeApplier::new(state, 1);
            let ignore: Option<HashSet<u32>> = ignore_ids.map(|s| parse_ignore_ids(&s));
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for line in io::stdin().lock().lines() {
                let line = line?;
                let ids: Vec<u32> = line
                    .split_whitespace()
                    .filter_map(|tok| tok.parse::<u32>().ok())
                    .collect();
                let text = applier.decode(&ids, ignore.as_ref());
                writeln!(out, "{text}")?;
            }
            Ok(())
        }
        BpeAction::Vocab { model, verbose } => {
            let state = BpeState::load(&model)?;
            let applier = BpeApplier::new(state, 1);
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for (id, piece) in applier.vocabulary().into_iter().enumerate() {
                if verbose {
                    writeln!(out, "{id}\t{piece}")?;
                } else {
                    writeln!(out, "{piece}")?;
                }
            }
            Ok(())
        }
    }
}

fn run_wordpiece(action: WordpieceAction) -> Result<(), Error> {
    let WordpieceAction::Encode {
        vocab,
        text,
        output_type,
        n_threads,
    } = action;

    let vocab_lines: Vec<String> = std::fs::read_to_string(&vocab)?
        .lines()
        .map(str::to_string)
        .collect();
    let encoder = WordPieceEncoder::new(&vocab_lines, n_threads)?;
    let input = std::fs::read_to_string(&text)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match output_type {
        OutputType::Ids => {
            write_line(&mut out, encoder.encode_as_ids(&input).iter().map(ToString::to_string))?;
        }
        OutputType::Subwords => {
            write_line(&mut out, encoder.encode_as_subwords(&input).into_iter())?;
        }
    }
    Ok(())
}

fn read_lines_from_stdin() -> Result<Vec<String>, Error> {
    io::stdin().lock().lines().collect::<io::Result<_>>().map_err(Error::from)
}

fn parse_ignore_ids(raw: &str) -> HashSet<u32> {
    raw.split(',')
        .filter_map(|tok| tok.trim().parse::<u32>().ok())
        .collect()
}

fn write_line(
    out: &mut impl Write,
    items: impl Iterator<Item = String>,
) -> Result<(), Error> {
    let mut first = true;
    for item in items {
        if !first {
            write!(out, " ")?;
        }
        write!(out, "{item}")?;
        first = false;
    }
    writeln!(out)?;
    Ok(())
}
