/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Records of a web archive and their catalog.
//!
//! A [`RecordCursor`] enumerates the records of an archive through a
//! [`WindowedSource`](crate::window::WindowedSource), returning a
//! [`DocumentRecord`] for each record; records are then collected in a
//! [`Catalog`], a flat arena indexed by record id that the later phases
//! annotate with signatures and output offsets.

mod cursor;
pub use cursor::*;

use crate::window::WindowError;
use mem_dbg::{MemDbg, MemSize};
use std::ops::Index;

/// Bytes ending URLs and similar whitespace-delimited fields.
pub const WHITESPACE: &[u8] = b" \t\r\n\x0b\x0c";

/// Errors raised while parsing records.
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("Malformed length field {text:?} in the record starting at {offset}")]
    /// The length field of a record is missing, not a decimal number, or zero.
    MalformedLength { offset: u64, text: String },
    #[error(transparent)]
    Window(#[from] WindowError),
}

/// The constants describing the layout of an archive.
///
/// A record starts with [`start_marker`](ArchiveFormat::start_marker),
/// followed by the decimal length of the record (counted from the start of
/// the marker) and by metadata lines containing a
/// [response marker](ArchiveFormat::response_marker) followed by the URL of
/// the document and a [content-type marker](ArchiveFormat::content_type_markers).
/// HTML documents have a body starting with one of the
/// [HTML tags](ArchiveFormat::html_tags).
///
/// The [`Default`] instance describes WARC 0.9 archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFormat {
    pub start_marker: Vec<u8>,
    /// Bytes that can end the length field.
    pub length_terminators: Vec<u8>,
    pub response_marker: Vec<u8>,
    /// Spellings of the content-type marker.
    pub content_type_markers: Vec<Vec<u8>>,
    /// Bytes that can end the content-type value.
    pub content_type_terminators: Vec<u8>,
    pub html_tags: Vec<Vec<u8>>,
}

impl Default for ArchiveFormat {
    fn default() -> Self {
        Self {
            start_marker: b"warc/0.9".to_vec(),
            length_terminators: b" \r\n".to_vec(),
            response_marker: b"response ".to_vec(),
            content_type_markers: vec![
                b"content-type: ".to_vec(),
                b"Content-Type: ".to_vec(),
                b"Content-type: ".to_vec(),
            ],
            content_type_terminators: b" \r\n;".to_vec(),
            html_tags: [
                b"<html", b"<HTML", b"<head", b"<HEAD", b"<body", b"<BODY",
            ]
            .iter()
            .map(|tag| tag.to_vec())
            .collect(),
        }
    }
}

/// A record of the archive.
///
/// Records are created by a [`RecordCursor`]; the scanning phase sets the
/// [signature](DocumentRecord::signature), and the reordering phase the
/// [output offset](DocumentRecord::new_offset).
#[derive(Debug, Clone, PartialEq, Eq, MemDbg, MemSize)]
pub struct DocumentRecord {
    /// The position of the record in the archive.
    pub id: usize,
    /// The offset of the start marker.
    pub start: u64,
    /// The length of the span of the record in the archive.
    ///
    /// Once the record is in a [`Catalog`], the span extends to the start of
    /// the following record, or to end of file.
    pub len: u64,
    /// The length declared in the header of the record, clipped at end of file.
    pub declared_len: u64,
    /// The offset at which the markup of the document starts, if the record
    /// contains an HTML document.
    pub body: Option<u64>,
    /// The key used to sort records in the output (usually a URL).
    pub sort_key: Option<String>,
    /// The MinHash signature of the body.
    pub signature: Option<Box<[u64]>>,
    /// The offset of the record in the output.
    pub new_offset: Option<u64>,
}

impl DocumentRecord {
    /// Returns the end (exclusive) of the span of the record.
    #[inline(always)]
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Returns the end (exclusive) of the declared content of the record.
    #[inline(always)]
    pub fn declared_end(&self) -> u64 {
        self.start + self.declared_len
    }

    /// Returns true if the record takes part in clustering, that is, if it
    /// has a signature.
    #[inline(always)]
    pub fn is_indexable(&self) -> bool {
        self.signature.is_some()
    }
}

/// The catalog of the records of an archive, indexed by id.
#[derive(Debug, Clone, Default, MemDbg, MemSize)]
pub struct Catalog {
    records: Vec<DocumentRecord>,
    /// Bytes before the first record.
    preamble: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, extending the span of the previous record up to the
    /// start of the new one.
    ///
    /// # Panics
    ///
    /// If the id of the record is not the number of records in the catalog,
    /// or if the record does not start after the previous one.
    pub fn push(&mut self, record: DocumentRecord) {
        assert_eq!(
            record.id,
            self.records.len(),
            "Record ids must be assigned in scan order"
        );
        match self.records.last_mut() {
            Some(last) => {
                assert!(
                    record.start > last.start,
                    "Record {} starts at {}, not after the previous record ({})",
                    record.id,
                    record.start,
                    last.start
                );
                last.len = record.start - last.start;
            }
            None => self.preamble = record.start,
        }
        self.records.push(record);
    }

    /// Extends the span of the last record up to end of file.
    pub fn finish(&mut self, file_len: u64) {
        if let Some(last) = self.records.last_mut() {
            debug_assert!(file_len > last.start);
            last.len = file_len - last.start;
        } else {
            self.preamble = file_len;
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of bytes preceding the first record.
    #[inline(always)]
    pub fn preamble(&self) -> u64 {
        self.preamble
    }

    /// Returns the number of bytes covered by the preamble and the records.
    pub fn total_len(&self) -> u64 {
        self.preamble + self.records.iter().map(|r| r.len).sum::<u64>()
    }

    #[inline(always)]
    pub fn get(&self, id: usize) -> Option<&DocumentRecord> {
        self.records.get(id)
    }

    #[inline(always)]
    pub fn get_mut(&mut self, id: usize) -> Option<&mut DocumentRecord> {
        self.records.get_mut(id)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, DocumentRecord> {
        self.records.iter()
    }

    /// Returns an iterator on the ids of the records having a signature.
    pub fn indexable(&self) -> impl Iterator<Item = usize> + '_ {
        self.records
            .iter()
            .filter(|r| r.is_indexable())
            .map(|r| r.id)
    }

    /// Discards signatures and sort keys, which are no longer needed once
    /// output offsets have been assigned.
    pub fn drop_scan_data(&mut self) {
        for record in &mut self.records {
            record.signature = None;
            record.sort_key = None;
        }
        self.records.shrink_to_fit();
    }
}

impl Index<usize> for Catalog {
    type Output = DocumentRecord;

    #[inline(always)]
    fn index(&self, id: usize) -> &DocumentRecord {
        &self.records[id]
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a DocumentRecord;
    type IntoIter = core::slice::Iter<'a, DocumentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
