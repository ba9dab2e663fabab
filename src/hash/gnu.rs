//! GNU hash section (`.gnu.hash`) parsing.
//!
//! Grounded in the teacher's `src/hash/gnu.rs` (header layout, bloom-filter
//! math, djb2-variant hash, bucket/chain walk), adapted from raw pointers
//! over mmap'd memory to bounds-checked reads over a borrowed byte slice,
//! since the simulator never maps the file it analyzes.

use crate::error::{malformed_elf, Result};

/// Word width of the bloom filter, selected by the containing object's ELF
/// class (§4.8: "W = 32 or 64 depending on class").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomWidth {
    W32,
    W64,
}

/// A parsed `.gnu.hash` section.
#[derive(Debug, Clone)]
pub struct GnuHash {
    pub nbuckets: u32,
    pub symbias: u32,
    pub nbloom: u32,
    pub shift: u32,
    pub width: BloomWidth,
    bloom: Vec<u64>,
    buckets: Vec<u32>,
    /// Biased chain array: `chain_zero[i]` corresponds to dynsym index
    /// `i + symbias`.
    chain_zero: Vec<u32>,
}

impl GnuHash {
    /// Parses a GNU hash table out of `data`, the bytes of the `.gnu.hash`
    /// section (or the memory it would occupy, read from file).
    pub fn parse(data: &[u8], width: BloomWidth, little_endian: bool) -> Result<GnuHash> {
        let rd_u32 = |off: usize| -> Result<u32> {
            let b = data
                .get(off..off + 4)
                .ok_or_else(|| malformed_elf("truncated .gnu.hash header"))?;
            Ok(if little_endian {
                u32::from_le_bytes(b.try_into().unwrap())
            } else {
                u32::from_be_bytes(b.try_into().unwrap())
            })
        };

        let nbuckets = rd_u32(0)?;
        let symbias = rd_u32(4)?;
        let nbloom = rd_u32(8)?;
        let shift = rd_u32(12)?;

        let word_size = match width {
            BloomWidth::W32 => 4,
            BloomWidth::W64 => 8,
        };
        let mut off = 16;
        let mut bloom = Vec::with_capacity(nbloom as usize);
        for _ in 0..nbloom {
            let word = match width {
                BloomWidth::W32 => rd_u32(off)? as u64,
                BloomWidth::W64 => {
                    let b = data
                        .get(off..off + 8)
                        .ok_or_else(|| malformed_elf("truncated .gnu.hash bloom filter"))?;
                    if little_endian {
                        u64::from_le_bytes(b.try_into().unwrap())
                    } else {
                        u64::from_be_bytes(b.try_into().unwrap())
                    }
                }
            };
            bloom.push(word);
            off += word_size;
        }

        let mut buckets = Vec::with_capacity(nbuckets as usize);
        for _ in 0..nbuckets {
            buckets.push(rd_u32(off)?);
            off += 4;
        }

        // The chain array's length isn't encoded explicitly; it runs to the
        // end of the symbol table. We read lazily from a caller-supplied
        // symbol count instead of guessing here (see `chain_slice_len`).
        let chain_zero = data[off..]
            .chunks_exact(4)
            .map(|c| {
                if little_endian {
                    u32::from_le_bytes(c.try_into().unwrap())
                } else {
                    u32::from_be_bytes(c.try_into().unwrap())
                }
            })
            .collect();

        Ok(GnuHash {
            nbuckets,
            symbias,
            nbloom,
            shift,
            width,
            bloom,
            buckets,
            chain_zero,
        })
    }

    /// `dl_new_hash`: the GNU djb2-variant hash, truncated to 32 bits.
    pub fn hash(name: &[u8]) -> u32 {
        let mut h: u32 = 5381;
        for &b in name {
            h = h.wrapping_mul(33).wrapping_add(u32::from(b));
        }
        h
    }

    /// Number of symbols covered by this hash table, derived by walking
    /// chains from the highest bucket-referenced index to the end marker
    /// (teacher's `count_syms`).
    pub fn count_syms(&self) -> usize {
        let mut nsym = 0u32;
        for &b in &self.buckets {
            nsym = nsym.max(b);
        }
        if nsym == 0 {
            return 0;
        }
        let mut idx = (nsym - self.symbias) as usize;
        while idx < self.chain_zero.len() && self.chain_zero[idx] & 1 == 0 {
            nsym += 1;
            idx += 1;
        }
        (nsym + 1) as usize
    }

    /// Bloom-filter miss test (§4.8 step 1). Returns `true` when the symbol
    /// is provably absent and the bucket/chain walk can be skipped.
    pub fn bloom_miss(&self, hash: u32) -> bool {
        let bits = match self.width {
            BloomWidth::W32 => 32u32,
            BloomWidth::W64 => 64u32,
        };
        let idxbits = self.nbloom.saturating_sub(1);
        let word = self.bloom[(hash / bits) as usize & idxbits as usize];
        let bit1 = (word >> (hash % bits)) & 1;
        let bit2 = (word >> ((hash >> self.shift) % bits)) & 1;
        bit1 & bit2 == 0
    }

    /// Walks the bucket/chain for `hash`, invoking `matcher` on every
    /// dynsym index whose chain hash (ignoring the end-of-chain LSB)
    /// matches. Stops and returns the matcher's result on the first `Some`.
    pub fn lookup<T>(&self, hash: u32, mut matcher: impl FnMut(usize) -> Option<T>) -> Option<T> {
        let bucket = self.buckets[hash as usize % self.nbuckets as usize];
        if bucket == 0 {
            return None;
        }
        let mut dynsym_idx = bucket as usize;
        let mut chain_idx = dynsym_idx - self.symbias as usize;
        loop {
            let chain_hash = match self.chain_zero.get(chain_idx) {
                Some(&h) => h,
                None => return None,
            };
            if hash | 1 == chain_hash | 1 {
                if let Some(found) = matcher(dynsym_idx) {
                    return Some(found);
                }
            }
            if chain_hash & 1 != 0 {
                return None;
            }
            chain_idx += 1;
            dynsym_idx += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_known_vector() {
        // "printf" -> 0x156b2bb8 is the commonly cited GNU-hash test vector.
        assert_eq!(GnuHash::hash(b"printf"), 0x156b_2bb8);
    }

    #[test]
    fn empty_name_hashes_to_seed() {
        assert_eq!(GnuHash::hash(b""), 5381);
    }
}
