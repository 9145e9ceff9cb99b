/*
 *
 * SPDX-FileCopyrightText: 2023 Tommaso Fontana
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Hash functions used for shingling and MinHash.
//!
//! - [`karp_rabin`] fingerprints a word by base-256 rolling hashing modulo
//!   [`PRIME`];
//! - [`combine`] folds a sequence of word fingerprints into a shingle;
//! - [`MurmurPermutation`] is a seeded 64-bit mixer derived from the
//!   finalization of MurmurHash64A, and [`Permutations`] is the family of such
//!   mixers with seeds `0..width` used to compute MinHash signatures.

/// The prime modulus of word and shingle fingerprints.
pub const PRIME: u64 = 994_534_132_561;

const M: u64 = 0xc6a4a7935bd1e995;
const R: u32 = 47;

/// Returns the Karp–Rabin fingerprint of a word, that is, its bytes read as a
/// base-256 number modulo [`PRIME`].
#[inline]
pub fn karp_rabin(word: &[u8]) -> u64 {
    let mut sig = 0_u64;
    for &b in word {
        // sig < PRIME < 2⁴⁰, so no overflow is possible
        sig = (sig << 8) + b as u64;
        if sig >= PRIME {
            sig %= PRIME;
        }
    }
    sig
}

/// Folds a sequence of fingerprints into a single fingerprint computing
/// `(acc << 24) + fp` modulo [`PRIME`] at each step.
#[inline]
pub fn combine(fingerprints: impl IntoIterator<Item = u64>) -> u64 {
    let mut acc = 0_u64;
    for fp in fingerprints {
        debug_assert!(fp < PRIME);
        // acc < PRIME < 2⁴⁰ and PRIME · 2²⁴ + PRIME < 2⁶⁴
        acc = (acc << 24) + fp;
        if acc >= PRIME {
            acc %= PRIME;
        }
    }
    acc
}

/// A seeded permutation of 64-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MurmurPermutation {
    seed: u64,
}

impl MurmurPermutation {
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[inline(always)]
    pub fn hash(&self, key: u64) -> u64 {
        let mut h = self.seed ^ M;

        let mut k = key.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);

        h ^= h >> R;
        h = h.wrapping_mul(M);
        h ^= h >> R;

        h
    }
}

/// A family of [`MurmurPermutation`]s with seeds `0..width`.
///
/// The family is built once and shared by all documents; position `k` of a
/// MinHash signature is the minimum of the `k`-th permutation over the
/// shingles of a document.
#[derive(Debug, Clone)]
pub struct Permutations {
    perms: Box<[MurmurPermutation]>,
}

impl Permutations {
    pub fn new(width: usize) -> Self {
        Self {
            perms: (0..width as u64).map(MurmurPermutation::new).collect(),
        }
    }

    /// Returns the number of permutations, that is, the signature width.
    #[inline(always)]
    pub fn width(&self) -> usize {
        self.perms.len()
    }

    #[inline(always)]
    pub fn iter(&self) -> core::slice::Iter<'_, MurmurPermutation> {
        self.perms.iter()
    }

    /// Computes the MinHash signature of a set of shingles.
    ///
    /// Returns `None` if `shingles` is empty.
    pub fn min_hash(&self, shingles: &[u64]) -> Option<Box<[u64]>> {
        if shingles.is_empty() {
            return None;
        }
        Some(
            self.perms
                .iter()
                .map(|perm| {
                    shingles
                        .iter()
                        .map(|&s| perm.hash(s))
                        .min()
                        .unwrap_or(u64::MAX)
                })
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Permutations {
    type Item = &'a MurmurPermutation;
    type IntoIter = core::slice::Iter<'a, MurmurPermutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
