//! BPE model state: the alphabet map, the learned merge rules, special
//! token ids, and the binary on-disk layout from spec §6.

use std::collections::HashMap;
use std::io::{Read, Write};

use crate::Error;

/// `pad`/`unk`/`bos`/`eos` ids; `-1` (stored on disk as `0xFFFF_FFFF`)
/// means the token is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecialTokens {
    pub pad_id: i64,
    pub unk_id: i64,
    pub bos_id: i64,
    pub eos_id: i64,
}

impl SpecialTokens {
    #[must_use]
    pub fn new(pad_id: i64, unk_id: i64, bos_id: i64, eos_id: i64) -> Self {
        Self {
            pad_id,
            unk_id,
            bos_id,
            eos_id,
        }
    }

    /// How many of the four are enabled (id != -1).
    #[must_use]
    pub fn n_special_tokens(&self) -> u32 {
        [self.pad_id, self.unk_id, self.bos_id, self.eos_id]
            .iter()
            .filter(|&&id| id != -1)
            .count() as u32
    }

    #[must_use]
    pub fn is_taken(&self, id: i64) -> bool {
        id == self.pad_id || id == self.unk_id || id == self.bos_id || id == self.eos_id
    }
}

/// A single learned merge: ids `x` and `y`, adjacent, become `z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRule {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl MergeRule {
    #[must_use]
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Pack `(x, y)` into the 64-bit key used by the applier's rule lookup
    /// hash map (spec §9 design note).
    #[must_use]
    pub fn pack_key(x: u32, y: u32) -> u64 {
        (u64::from(x) << 32) | u64::from(y)
    }
}

/// Training knobs: the coverage fraction, worker count, and which special
/// tokens to reserve ids for.
#[derive(Debug, Clone)]
pub struct BpeConfig {
    pub character_coverage: f64,
    pub n_threads: usize,
    pub special_tokens: SpecialTokens,
}

impl Default for BpeConfig {
    fn default() -> Self {
        Self {
            character_coverage: 1.0,
            n_threads: 0,
            special_tokens: SpecialTokens::new(0, 1, 2, 3),
        }
    }
}

/// Everything a trained model needs to persist: the alphabet, the rules in
/// creation order, and the special token ids.
#[derive(Debug, Clone)]
pub struct BpeState {
    pub char2id: HashMap<u32, u32>,
    pub rules: Vec<MergeRule>,
    pub special_tokens: SpecialTokens,
}

impl BpeState {
    /// Write the binary model layout from spec §6: little-endian u32s,
    /// alphabet entries, then `(x[], y[], z[])` rule columns, then the four
    /// special-token ids (absent ones as `0xFFFF_FFFF`).
    ///
    /// # Errors
    /// Propagates any I/O failure opening or writing the file.
    pub fn dump(&self, path: impl AsRef<std::path::Path>) -> Result<(), Error> {
        let mut w = std::io::BufWriter::new(std::fs::File::create(path)?);

        write_u32(&mut w, self.char2id.len() as u32)?;
        write_u32(&mut w, self.rules.len() as u32)?;

        let mut entries: Vec<(u32, u32)> = self.char2id.iter().map(|(&c, &i)| (i, c)).collect();
        entries.sort_unstable_by_key(|&(id, _)| id);
        for (id, cp) in entries {
            write_u32(&mut w, id)?;
            write_u32(&mut w, cp)?;
        }

        for rule in &self.rules {
            write_u32(&mut w, rule.x)?;
        }
        for rule in &self.rules {
            write_u32(&mut w, rule.y)?;
        }
        for rule in &self.rules {
            write_u32(&mut w, rule.z)?;
        }

        write_i64_as_u32(&mut w, self.special_tokens.unk_id)?;
        write_i64_as_u32(&mut w, self.special_tokens.pad_id)?;
        write_i64_as_u32(&mut w, self.special_tokens.bos_id)?;
        write_i64_as_u32(&mut w, self.special_tokens.eos_id)?;

        w.flush()?;
        Ok(())
    }

    /// Read a model previously written by [`BpeState::dump`].
    ///
    /// # Errors
    /// Returns [`Error::MalformedModel`] on truncated input, an alphabet
    /// size of zero, or a rule referencing an id that hasn't been
    /// introduced yet (neither a base id nor an earlier rule's `z`).
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let mut r = std::io::BufReader::new(std::fs::File::open(path)?);

        let n_alphabet = read_u32(&mut r)?;
        let n_rules = read_u32(&mut r)?;

        if n_alphabet == 0 {
            return Err(Error::MalformedModel(
                "alphabet size is zero".to_string(),
            ));
        }

        let mut char2id = HashMap::with_capacity(n_alphabet as usize);
        for _ in 0..n_alphabet {
            let id = read_u32(&mut r)?;
            let cp = read_u32(&mut r)?;
            char2id.insert(cp, id);
        }

        let mut xs = Vec::with_capacity(n_rules as usize);
        for _ in 0..n_rules {
            xs.push(read_u32(&mut r)?);
        }
        let mut ys = Vec::with_capacity(n_rules as usize);
        for _ in 0..n_rules {
            ys.push(read_u32(&mut r)?);
        }
        let mut zs = Vec::with_capacity(n_rules as usize);
        for _ in 0..n_rules {
            zs.push(read_u32(&mut r)?);
        }

        let mut known_ids: std::collections::HashSet<u32> =
            char2id.values().copied().collect();
        let mut rules = Vec::with_capacity(n_rules as usize);
        for i in 0..n_rules as usize {
            let (x, y, z) = (xs[i], ys[i], zs[i]);
            if !known_ids.contains(&x) || !known_ids.contains(&y) {
                return Err(Error::MalformedModel(format!(
                    "rule {i} references unknown id (x={x}, y={y})"
                )));
            }
            known_ids.insert(z);
            rules.push(MergeRule::new(x, y, z));
        }

        let unk_id = read_u32(&mut r)? as i64;
        let pad_id = read_u32(&mut r)? as i64;
        let bos_id = read_u32(&mut r)? as i64;
        let eos_id = read_u32(&mut r)? as i64;

        let decode_special = |raw: i64| -> i64 {
            if raw == i64::from(u32::MAX) {
                -1
            } else {
                raw
            }
        };

        Ok(Self {
            char2id,
            rules,
            special_tokens: SpecialTokens::new(
                decode_special(pad_id),
                decode_special(unk_id),
                decode_special(bos_id),
                decode_special(eos_id),
            ),
        })
    }
}

fn write_u32(w: &mut impl Write, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_i64_as_u32(w: &mut impl Write, v: i64) -> std::io::Result<()> {
    let raw: u32 = if v == -1 { u32::MAX } else { v as u32 };
    write_u32(w, raw)
}

fn read_u32(r: &mut impl Read) -> Result<u32, Error> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::MalformedModel("unexpected end of file".to_string())
        } else {
            Error::Io(e)
        }
    })?;
    Ok(u32::from_le_bytes(buf))
}
