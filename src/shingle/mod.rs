/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Word segmentation, shingling, and MinHash signatures of HTML bodies.
//!
//! The body of a document is segmented into [`Words`], skipping markup; words
//! are fingerprinted with [`karp_rabin`], and consecutive words are grouped
//! into [`Shingles`] of at least [`q_gram`](SignatureBuilder::new) characters,
//! sliding by one word at a time. The [MinHash signature](SignatureBuilder::signature)
//! of a body is then the vector of minima of the shingles under a family of
//! [`Permutations`].
//!
//! # Examples
//!
//! ```
//! use warc_cluster::shingle::*;
//!
//! let builder = SignatureBuilder::new(20, 25);
//! let a = builder.signature(b"<html><body>the quick brown fox jumps over the lazy dog</body>").unwrap();
//! let b = builder.signature(b"<html><p>the quick brown fox jumps over the lazy dog</p>").unwrap();
//! assert_eq!(estimate_similarity(&a, &b), 1.0);
//! assert!(builder.signature(b"<html><body></body></html>").is_none());
//! ```

use crate::hash::{combine, karp_rabin, Permutations};
use std::collections::VecDeque;
use std::iter::FusedIterator;

const OPEN_SCRIPT: &[u8] = b"<script";
const CLOSE_SCRIPT: &[u8] = b"</script>";

/// Bytes separating words: ASCII whitespace, plus the Latin-1 next line
/// (0x85) and no-break space (0xA0).
pub const WORD_SEPARATORS: &[u8] = b" \t\r\n\x0b\x0c\x85\xa0";

#[inline(always)]
fn is_space(b: u8) -> bool {
    WORD_SEPARATORS.contains(&b)
}

/// Returns true if `body[i]` opens a tag, that is, it is a `<` not followed
/// by `!`.
#[inline(always)]
fn opens_tag(body: &[u8], i: usize) -> bool {
    body[i] == b'<' && body.get(i + 1) != Some(&b'!')
}

fn starts_with_ignore_case(body: &[u8], i: usize, pattern: &[u8]) -> bool {
    body.len() - i >= pattern.len() && body[i..i + pattern.len()].eq_ignore_ascii_case(pattern)
}

fn find_ignore_case(body: &[u8], from: usize, pattern: &[u8]) -> Option<usize> {
    (from..body.len()).find(|&i| starts_with_ignore_case(body, i, pattern))
}

/// An iterator over the words of an HTML body.
///
/// Tags (`<` not followed by `!`, up to the next `>`) and script blocks
/// (`<script` up to `</script>`, in any case) are skipped; every other
/// maximal run of bytes not in [`WORD_SEPARATORS`] and not containing a tag
/// is a word. An unterminated tag or script block ends the iteration.
#[derive(Debug, Clone)]
pub struct Words<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> Words<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self { body, pos: 0 }
    }
}

impl<'a> Iterator for Words<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let body = self.body;
        while self.pos < body.len() {
            let i = self.pos;
            if starts_with_ignore_case(body, i, OPEN_SCRIPT) {
                match find_ignore_case(body, i + OPEN_SCRIPT.len(), CLOSE_SCRIPT) {
                    Some(end) => self.pos = end + CLOSE_SCRIPT.len(),
                    None => self.pos = body.len(),
                }
            } else if opens_tag(body, i) {
                match body[i + 1..].iter().position(|&b| b == b'>') {
                    Some(end) => self.pos = i + 1 + end + 1,
                    None => self.pos = body.len(),
                }
            } else if is_space(body[i]) {
                self.pos += 1;
            } else {
                let mut end = i + 1;
                while end < body.len() && !is_space(body[end]) && !opens_tag(body, end) {
                    end += 1;
                }
                self.pos = end;
                return Some(&body[i..end]);
            }
        }
        None
    }
}

impl FusedIterator for Words<'_> {}

/// An iterator over the shingles of a sequence of words.
///
/// Word fingerprints are buffered until the buffered words contain at least
/// `q_gram` bytes; then the [combination](combine) of the buffered
/// fingerprints is returned and the oldest word is dropped. If the words end
/// before the first shingle is complete, a single shingle is built from the
/// buffered words; no words, no shingles.
#[derive(Debug, Clone)]
pub struct Shingles<I> {
    words: I,
    q_gram: usize,
    /// Fingerprints and lengths of the buffered words.
    buffer: VecDeque<(u64, usize)>,
    buffered_len: usize,
    emitted: bool,
    done: bool,
}

impl<'a, I: Iterator<Item = &'a [u8]>> Shingles<I> {
    pub fn new(words: I, q_gram: usize) -> Self {
        Self {
            words,
            q_gram,
            buffer: VecDeque::new(),
            buffered_len: 0,
            emitted: false,
            done: false,
        }
    }

    fn shingle(&self) -> u64 {
        combine(self.buffer.iter().map(|&(fp, _)| fp))
    }
}

impl<'a, I: Iterator<Item = &'a [u8]>> Iterator for Shingles<I> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.done {
            return None;
        }
        while self.buffered_len < self.q_gram {
            match self.words.next() {
                Some(word) => {
                    self.buffer.push_back((karp_rabin(word), word.len()));
                    self.buffered_len += word.len();
                }
                None => {
                    self.done = true;
                    if self.emitted || self.buffer.is_empty() {
                        return None;
                    }
                    self.emitted = true;
                    return Some(self.shingle());
                }
            }
        }
        let shingle = self.shingle();
        self.emitted = true;
        if let Some((_, len)) = self.buffer.pop_front() {
            self.buffered_len -= len;
        }
        Some(shingle)
    }
}

impl<'a, I: Iterator<Item = &'a [u8]>> FusedIterator for Shingles<I> {}

/// Computes MinHash signatures of HTML bodies.
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    perms: Permutations,
    q_gram: usize,
}

impl SignatureBuilder {
    /// Creates a builder for signatures of the given width, using shingles of
    /// at least `q_gram` bytes.
    pub fn new(width: usize, q_gram: usize) -> Self {
        Self {
            perms: Permutations::new(width),
            q_gram,
        }
    }

    #[inline(always)]
    pub fn width(&self) -> usize {
        self.perms.width()
    }

    #[inline(always)]
    pub fn q_gram(&self) -> usize {
        self.q_gram
    }

    /// Returns an iterator over the shingles of a body.
    pub fn shingles<'a>(&self, body: &'a [u8]) -> Shingles<Words<'a>> {
        Shingles::new(Words::new(body), self.q_gram)
    }

    /// Returns the signature of a body, or `None` if the body contains no
    /// words.
    pub fn signature(&self, body: &[u8]) -> Option<Box<[u64]>> {
        let shingles = self.shingles(body).collect::<Vec<_>>();
        self.perms.min_hash(&shingles)
    }
}

/// Returns the fraction of positions on which two signatures agree, which
/// estimates the Jaccard similarity of the underlying sets of shingles.
///
/// # Panics
///
/// If the signatures have different lengths.
pub fn estimate_similarity(a: &[u64], b: &[u64]) -> f64 {
    assert_eq!(a.len(), b.len(), "Signatures of different widths");
    if a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).filter(|(x, y)| x == y).count() as f64 / a.len() as f64
}
