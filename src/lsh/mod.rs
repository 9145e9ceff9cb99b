/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Locality-sensitive hashing of MinHash signatures by banding.
//!
//! An [`LshIndex`] has a number of *bands*, each a fixed random sample of
//! positions of the signatures. Every document is put, for each band, in the
//! bucket keyed by the sum of its signature at the positions of the band;
//! documents sharing at least one bucket are *candidates*. The
//! [cluster](LshIndex::cluster) of a document is the transitive closure of
//! the candidate relation, that is, its connected component.
//!
//! Two documents whose signatures agree on a fraction *s* of the positions
//! collide with probability [`collision_probability`]; the similarity at which
//! the probability raises most steeply is approximately [`threshold`].
//!
//! Band keys are plain wrapping sums: two signatures can collide on a band
//! even if they differ on its positions. The combiner is kept for
//! compatibility with existing groupings.

use crate::record::Catalog;
use log::debug;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet, VecDeque};

/// Errors of an [`LshIndex`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LshError {
    #[error("Invalid parameters: {0}")]
    /// The number of bands, of rows per band, or the signature width are
    /// inconsistent.
    InvalidParameters(String),
    #[error("Signature of document {id} has width {width}, expected {expected}")]
    /// A signature of the wrong width was added.
    SignatureWidth {
        id: usize,
        width: usize,
        expected: usize,
    },
    #[error("No signature for document {0}")]
    /// A document reached during clustering has no signature.
    MissingSignature(usize),
    #[error("No bucket for document {id} in band {band}")]
    /// A document reached during clustering was never added to the index.
    MissingBucket { id: usize, band: usize },
}

/// Access to the signatures of documents by id.
pub trait Signatures {
    /// Returns the signature of the document with the given id, if any.
    fn signature(&self, id: usize) -> Option<&[u64]>;
}

impl<S: AsRef<[u64]>> Signatures for [S] {
    fn signature(&self, id: usize) -> Option<&[u64]> {
        self.get(id).map(AsRef::as_ref)
    }
}

impl<S: AsRef<[u64]>> Signatures for Vec<S> {
    fn signature(&self, id: usize) -> Option<&[u64]> {
        self.as_slice().signature(id)
    }
}

impl Signatures for Catalog {
    fn signature(&self, id: usize) -> Option<&[u64]> {
        self.get(id)?.signature.as_deref()
    }
}

/// Returns the probability that two documents with signatures agreeing on a
/// fraction `s` of positions share a bucket, that is, 1 − (1 − *s*^`rows`)^`bands`.
pub fn collision_probability(s: f64, rows: usize, bands: usize) -> f64 {
    1.0 - (1.0 - s.powi(rows as i32)).powi(bands as i32)
}

/// Returns the approximate similarity threshold of an index, that is,
/// (1 / `bands`)^(1 / `rows`).
pub fn threshold(rows: usize, bands: usize) -> f64 {
    (1.0 / bands as f64).powf(1.0 / rows as f64)
}

/// A banding index over MinHash signatures.
#[derive(Debug, Clone)]
pub struct LshIndex {
    signature_width: usize,
    rows_per_band: usize,
    /// The sampled positions of each band, sorted.
    positions: Box<[Box<[usize]>]>,
    /// For each band, the ids of the documents in each bucket, in insertion
    /// order.
    buckets: Box<[HashMap<u64, Vec<usize>>]>,
    num_documents: usize,
}

impl LshIndex {
    /// Creates an empty index with `bands` bands of `rows_per_band` positions
    /// each, sampled without replacement from `0..signature_width` using the
    /// given seed.
    pub fn new(
        signature_width: usize,
        bands: usize,
        rows_per_band: usize,
        seed: u64,
    ) -> Result<Self, LshError> {
        if bands == 0 || rows_per_band == 0 {
            return Err(LshError::InvalidParameters(format!(
                "bands ({bands}) and rows per band ({rows_per_band}) must be positive"
            )));
        }
        if rows_per_band > signature_width {
            return Err(LshError::InvalidParameters(format!(
                "rows per band ({rows_per_band}) exceed the signature width ({signature_width})"
            )));
        }

        let mut rng = SmallRng::seed_from_u64(seed);
        let positions = (0..bands)
            .map(|_| {
                let mut sample =
                    rand::seq::index::sample(&mut rng, signature_width, rows_per_band).into_vec();
                sample.sort_unstable();
                sample.into_boxed_slice()
            })
            .collect::<Box<[_]>>();
        debug!("Band positions: {:?}", positions);

        Ok(Self {
            signature_width,
            rows_per_band,
            positions,
            buckets: (0..bands).map(|_| HashMap::new()).collect(),
            num_documents: 0,
        })
    }

    #[inline(always)]
    pub fn bands(&self) -> usize {
        self.positions.len()
    }

    #[inline(always)]
    pub fn rows_per_band(&self) -> usize {
        self.rows_per_band
    }

    #[inline(always)]
    pub fn signature_width(&self) -> usize {
        self.signature_width
    }

    /// Returns the (sorted) signature positions of a band.
    #[inline(always)]
    pub fn band_positions(&self, band: usize) -> &[usize] {
        &self.positions[band]
    }

    /// Returns the number of documents added to the index.
    #[inline(always)]
    pub fn num_documents(&self) -> usize {
        self.num_documents
    }

    /// Returns the key of a signature in a band.
    #[inline]
    pub fn band_key(&self, band: usize, signature: &[u64]) -> u64 {
        self.positions[band]
            .iter()
            .fold(0_u64, |key, &p| key.wrapping_add(signature[p]))
    }

    /// Adds a document to the bucket of its signature in every band.
    pub fn add_document(&mut self, id: usize, signature: &[u64]) -> Result<(), LshError> {
        if signature.len() != self.signature_width {
            return Err(LshError::SignatureWidth {
                id,
                width: signature.len(),
                expected: self.signature_width,
            });
        }
        for band in 0..self.bands() {
            let key = self.band_key(band, signature);
            self.buckets[band].entry(key).or_default().push(id);
        }
        self.num_documents += 1;
        Ok(())
    }

    /// Returns the sorted ids of the documents connected to `seed` by a chain
    /// of shared buckets, `seed` included.
    ///
    /// The signatures of all reached documents are retrieved from
    /// `signatures`; every such document must have been added to the index.
    pub fn cluster<S: Signatures + ?Sized>(
        &self,
        seed: usize,
        signatures: &S,
    ) -> Result<Vec<usize>, LshError> {
        let mut members = HashSet::from([seed]);
        // (document, band) pairs whose bucket has already been expanded
        let mut processed = HashSet::<(usize, usize)>::new();
        let mut frontier = VecDeque::from([seed]);

        while let Some(id) = frontier.pop_front() {
            let signature = signatures
                .signature(id)
                .ok_or(LshError::MissingSignature(id))?;
            for band in 0..self.bands() {
                if processed.contains(&(id, band)) {
                    continue;
                }
                let key = self.band_key(band, signature);
                let bucket = self.buckets[band]
                    .get(&key)
                    .ok_or(LshError::MissingBucket { id, band })?;
                for &other in bucket {
                    processed.insert((other, band));
                    if members.insert(other) {
                        frontier.push_back(other);
                    }
                }
            }
        }

        let mut members = members.into_iter().collect::<Vec<_>>();
        members.sort_unstable();
        Ok(members)
    }
}
