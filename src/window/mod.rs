/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Bounded-memory random access to a large file through memory-mapped windows.
//!
//! A [`WindowedSource`] presents a file as a flat sequence of bytes, but it
//! keeps in memory at most two windows of `2^log2_window` bytes: the *current*
//! window and, after reading past its end, the *previous* one. The previous
//! window is released only when the caller [frees](WindowedSource::free) the
//! data it contains, so a record straddling a window boundary can be read
//! entirely without mapping the whole file.
//!
//! Accesses are absolute offsets. Reading into the window that follows the
//! current one moves the ring forward transparently; reading further ahead, or
//! behind the retained range, is an [`OutOfRange`](WindowError::OutOfRange)
//! error.
//!
//! Single-byte accesses go through a small read-ahead buffer that caches a
//! span of one window; bulk copies can be performed with
//! [`read_span`](WindowedSource::read_span).
//!
//! # Examples
//!
//! ```
//! # fn main() -> anyhow::Result<()> {
//! use std::io::Write;
//! use warc_cluster::window::WindowedSource;
//!
//! let mut file = tempfile::NamedTempFile::new()?;
//! file.write_all(b"warc/0.9 12 response ")?;
//! file.flush()?;
//!
//! let mut source = WindowedSource::open(file.path(), 16, 4096)?;
//! assert_eq!(source.len(), 21);
//! assert_eq!(source.get(5)?, b'0');
//! let found = source.search(&[b"response"], 0, 1024)?;
//! assert_eq!(found.hit(), Some(12));
//! # Ok(())
//! # }
//! ```

use log::debug;
use mmap_rs::{Mmap, MmapOptions};
use std::fs::File;
use std::ops::Range;
use std::path::Path;

/// Errors of a [`WindowedSource`].
#[derive(thiserror::Error, Debug)]
pub enum WindowError {
    #[error("Index {index} is outside the readable range {start}..{end} (file length {len})")]
    /// The index lies beyond end of file, behind the retained windows, or too
    /// far ahead of the current window.
    OutOfRange {
        index: u64,
        start: u64,
        end: u64,
        len: u64,
    },
    #[error("Invalid operation: {0}")]
    /// A call that violates the windowing protocol.
    InvalidOperation(String),
    #[error("A window of 2^{log2_window} bytes is not a multiple of the allocation granularity ({granularity})")]
    /// The window size cannot be used for mapping.
    InvalidWindowSize { log2_window: u32, granularity: usize },
    #[error("Cannot map {size} bytes at offset {offset}")]
    /// The operating system refused to map a window.
    Map {
        offset: u64,
        size: usize,
        #[source]
        source: mmap_rs::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The outcome of a search.
///
/// If `found` is true, `position` is the position of the match; otherwise, it
/// is the last position scanned, which makes it possible to resume or to
/// diagnose a failed search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Found {
    pub found: bool,
    pub position: u64,
}

impl Found {
    /// Returns the position of the match, if any.
    #[inline(always)]
    pub fn hit(self) -> Option<u64> {
        if self.found {
            Some(self.position)
        } else {
            None
        }
    }
}

/// A mapped window, identified by its index in the file.
struct Window {
    index: u64,
    map: Mmap,
}

/// Sliding-window view over a memory-mapped file.
pub struct WindowedSource {
    file: File,
    len: u64,
    log2_window: u32,
    /// Two-slot ring: `slots[cur]` is the current window, `slots[cur ^ 1]`
    /// the retained previous one, if any.
    slots: [Option<Window>; 2],
    cur: usize,
    /// No byte before this offset will be read again.
    freed: u64,
    read_ahead: Box<[u8]>,
    ra_start: u64,
    ra_len: usize,
}

impl core::fmt::Debug for WindowedSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WindowedSource")
            .field("len", &self.len)
            .field("log2_window", &self.log2_window)
            .field("retained", &self.retained())
            .field("freed", &self.freed)
            .finish()
    }
}

impl WindowedSource {
    /// Opens a file for windowed access.
    ///
    /// `log2_window` is the base-2 logarithm of the window size, which must be
    /// a multiple of the mapping granularity of the platform, and
    /// `read_ahead` is the size of the buffer amortizing single-byte reads.
    pub fn open(
        path: impl AsRef<Path>,
        log2_window: u32,
        read_ahead: usize,
    ) -> Result<Self, WindowError> {
        let granularity = MmapOptions::allocation_granularity();
        if log2_window >= 63 || (1_u64 << log2_window) % granularity as u64 != 0 {
            return Err(WindowError::InvalidWindowSize {
                log2_window,
                granularity,
            });
        }
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut source = Self {
            file,
            len,
            log2_window,
            slots: [None, None],
            cur: 0,
            freed: 0,
            read_ahead: vec![0; read_ahead.max(1)].into_boxed_slice(),
            ra_start: 0,
            ra_len: 0,
        };
        if len > 0 {
            source.slots[0] = Some(source.map_window(0)?);
        }
        Ok(source)
    }

    /// Returns the length of the file.
    #[inline(always)]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn window_size(&self) -> u64 {
        1 << self.log2_window
    }

    /// Returns the range of absolute offsets that can be read without moving
    /// the ring.
    pub fn retained(&self) -> Range<u64> {
        match (&self.slots[self.cur], &self.slots[self.cur ^ 1]) {
            (Some(cur), Some(prev)) => prev.index << self.log2_window..self.window_end(cur.index),
            (Some(cur), None) => cur.index << self.log2_window..self.window_end(cur.index),
            _ => self.len..self.len,
        }
    }

    /// Returns the end of the range of absolute offsets that can be read
    /// without error; it includes the window following the current one if
    /// no previous window is retained.
    pub fn readable_end(&self) -> u64 {
        match (&self.slots[self.cur], &self.slots[self.cur ^ 1]) {
            (Some(cur), None) => self.window_end(cur.index + 1),
            _ => self.retained().end,
        }
    }

    /// Returns the byte at the given absolute offset.
    ///
    /// Reading into the window following the current one advances the ring,
    /// retaining the current window until it is freed.
    #[inline]
    pub fn get(&mut self, index: u64) -> Result<u8, WindowError> {
        let delta = index.wrapping_sub(self.ra_start);
        if delta < self.ra_len as u64 {
            return Ok(self.read_ahead[delta as usize]);
        }
        self.fill_read_ahead(index)?;
        Ok(self.read_ahead[0])
    }

    /// Maps a position relative to the start of the retained window pair to
    /// an absolute offset.
    pub fn absolute_location(&self, relative: u64) -> Result<u64, WindowError> {
        if relative >= 2 * self.window_size() {
            return Err(WindowError::InvalidOperation(format!(
                "Relative position {relative} lies outside a span of two windows of {} bytes",
                self.window_size()
            )));
        }
        let absolute = self.base() + relative;
        if absolute > self.len {
            return Err(self.out_of_range(absolute));
        }
        Ok(absolute)
    }

    /// Declares that no byte before `index` will be read again.
    ///
    /// The previous window is released as soon as `index` reaches the current
    /// window. Calls must be monotone, and `index` cannot lie more than one
    /// window past the retained data. Returns `index` relative to the start of
    /// the retained range after the call.
    pub fn free(&mut self, index: u64) -> Result<u64, WindowError> {
        if index < self.freed {
            return Err(WindowError::InvalidOperation(format!(
                "Cannot free up to {index} after freeing up to {}",
                self.freed
            )));
        }
        let Some(cur) = self.slots[self.cur].as_ref().map(|w| w.index) else {
            self.freed = index;
            return Ok(0);
        };
        let prev = self.cur ^ 1;
        if index > self.window_end(cur + 1) {
            return Err(WindowError::InvalidOperation(format!(
                "Cannot free up to {index}: more than one window of unfreed data (retained {:?})",
                self.retained()
            )));
        }
        if index >= cur << self.log2_window && self.slots[prev].take().is_some() {
            debug!("Released window {}", cur - 1);
            if self.ra_start < cur << self.log2_window {
                self.ra_len = 0;
            }
        }
        self.freed = index;
        Ok(index.saturating_sub(self.base()))
    }

    /// Searches for the first position in `[from, from + max_bytes)` where
    /// any of the given patterns starts.
    ///
    /// Patterns may extend past `from + max_bytes`, but not past end of file;
    /// reaching end of file just ends the search.
    pub fn search<P: AsRef<[u8]>>(
        &mut self,
        patterns: &[P],
        from: u64,
        max_bytes: u64,
    ) -> Result<Found, WindowError> {
        let limit = from.saturating_add(max_bytes).min(self.len);
        let mut last = from;
        for i in from..limit {
            last = i;
            let b = self.get(i)?;
            for pattern in patterns {
                let pattern = pattern.as_ref();
                if pattern.first() == Some(&b) && self.starts_with(i, pattern)? {
                    return Ok(Found {
                        found: true,
                        position: i,
                    });
                }
            }
        }
        Ok(Found {
            found: false,
            position: last,
        })
    }

    /// Like [`search`](WindowedSource::search), but for a single byte.
    pub fn search_byte(&mut self, byte: u8, from: u64, max_bytes: u64) -> Result<Found, WindowError> {
        self.search_any_of(&[byte], from, max_bytes)
    }

    /// Searches for the first byte in `[from, from + max_bytes)` belonging to
    /// the given set.
    pub fn search_any_of(
        &mut self,
        set: &[u8],
        from: u64,
        max_bytes: u64,
    ) -> Result<Found, WindowError> {
        let limit = from.saturating_add(max_bytes).min(self.len);
        let mut last = from;
        for i in from..limit {
            last = i;
            if set.contains(&self.get(i)?) {
                return Ok(Found {
                    found: true,
                    position: i,
                });
            }
        }
        Ok(Found {
            found: false,
            position: last,
        })
    }

    /// Returns the bytes in `[start, end]` as a (lossy) UTF-8 string.
    ///
    /// Meant for short metadata fields.
    pub fn copy_as_text(&mut self, start: u64, end_inclusive: u64) -> Result<String, WindowError> {
        if end_inclusive < start {
            return Ok(String::new());
        }
        let mut bytes = Vec::with_capacity((end_inclusive - start + 1) as usize);
        for i in start..=end_inclusive {
            bytes.push(self.get(i)?);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Copies the bytes in `[start, end)` into `buf`, replacing its content.
    ///
    /// The same rules of [`get`](WindowedSource::get) apply to every byte of
    /// the range.
    pub fn read_span(&mut self, start: u64, end: u64, buf: &mut Vec<u8>) -> Result<(), WindowError> {
        buf.clear();
        let mut pos = start;
        while pos < end {
            let slot = self.slot_for(pos)?;
            let Some(window) = &self.slots[slot] else {
                return Err(self.out_of_range(pos));
            };
            let offset = (pos - (window.index << self.log2_window)) as usize;
            let n = ((end - pos) as usize).min(window.map.len() - offset);
            buf.extend_from_slice(&window.map[offset..offset + n]);
            pos += n as u64;
        }
        Ok(())
    }

    /// Returns true if `pattern` occurs at the given absolute offset.
    ///
    /// A pattern running past end of file does not occur.
    pub fn starts_with(&mut self, i: u64, pattern: &[u8]) -> Result<bool, WindowError> {
        if i + pattern.len() as u64 > self.len {
            return Ok(false);
        }
        for (j, &b) in pattern.iter().enumerate() {
            if self.get(i + j as u64)? != b {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn fill_read_ahead(&mut self, index: u64) -> Result<(), WindowError> {
        let slot = self.slot_for(index)?;
        let Some(window) = &self.slots[slot] else {
            return Err(self.out_of_range(index));
        };
        let offset = (index - (window.index << self.log2_window)) as usize;
        let n = self.read_ahead.len().min(window.map.len() - offset);
        self.read_ahead[..n].copy_from_slice(&window.map[offset..offset + n]);
        self.ra_start = index;
        self.ra_len = n;
        Ok(())
    }

    /// Returns the slot of the window containing `index`, advancing the ring
    /// if `index` lies in the window following the current one.
    fn slot_for(&mut self, index: u64) -> Result<usize, WindowError> {
        if index >= self.len {
            return Err(self.out_of_range(index));
        }
        let Some(cur) = self.slots[self.cur].as_ref().map(|w| w.index) else {
            return Err(self.out_of_range(index));
        };
        let w = index >> self.log2_window;
        let prev = self.cur ^ 1;
        if w == cur {
            Ok(self.cur)
        } else if w + 1 == cur && self.slots[prev].is_some() {
            Ok(prev)
        } else if w == cur + 1 && self.slots[prev].is_none() {
            self.advance(cur)?;
            Ok(self.cur)
        } else {
            Err(self.out_of_range(index))
        }
    }

    /// Maps the window after `cur`; the current window becomes the previous
    /// one, unless it has already been freed entirely.
    fn advance(&mut self, cur: u64) -> Result<(), WindowError> {
        let next = self.map_window(cur + 1)?;
        let prev = self.cur ^ 1;
        self.slots[prev] = Some(next);
        self.cur = prev;
        if self.freed >= (cur + 1) << self.log2_window {
            self.slots[self.cur ^ 1] = None;
            self.ra_len = 0;
        }
        debug!("Advanced to window {}", cur + 1);
        Ok(())
    }

    fn map_window(&self, index: u64) -> Result<Window, WindowError> {
        let offset = index << self.log2_window;
        let size = (self.window_end(index) - offset) as usize;
        let map = unsafe {
            MmapOptions::new(size)
                .and_then(|options| options.with_file(&self.file, offset).map())
                .map_err(|source| WindowError::Map {
                    offset,
                    size,
                    source,
                })?
        };
        #[cfg(target_os = "linux")]
        unsafe {
            libc::madvise(map.as_ptr() as *mut _, map.len(), libc::MADV_SEQUENTIAL)
        };
        Ok(Window { index, map })
    }

    #[inline(always)]
    fn window_end(&self, index: u64) -> u64 {
        ((index + 1) << self.log2_window).min(self.len)
    }

    #[inline(always)]
    fn base(&self) -> u64 {
        self.retained().start
    }

    fn out_of_range(&self, index: u64) -> WindowError {
        WindowError::OutOfRange {
            index,
            start: self.retained().start,
            end: self.readable_end(),
            len: self.len,
        }
    }
}
