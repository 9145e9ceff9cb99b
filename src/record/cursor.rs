/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use super::{ArchiveFormat, DocumentRecord, RecordError, WHITESPACE};
use crate::window::WindowedSource;
use log::warn;
use std::iter::FusedIterator;

/// The maximum number of bytes of a length field, including leading spaces.
const MAX_LENGTH_FIELD: u64 = 32;

/// A forward-only cursor over the records of an archive.
///
/// The cursor is an [`Iterator`] returning the records of the archive in
/// order; it stops when no start marker can be found between the end of the
/// previous record and end of file, and after returning an error. The start
/// marker is searched in steps of [`search_step`](RecordCursor::new) bytes,
/// and the bytes scanned at each step are freed, so arbitrarily long gaps
/// between records can be skipped in bounded memory.
///
/// Memory is bounded cooperatively: when the cursor is advanced, it frees the
/// underlying [`WindowedSource`] up to the end of the record returned
/// previously. Thus, the bytes of a record (e.g., its body, which can be
/// retrieved with [`read_body`](RecordCursor::read_body)) must be read before
/// asking for the next record.
#[derive(Debug)]
pub struct RecordCursor {
    source: WindowedSource,
    format: ArchiveFormat,
    search_step: u64,
    next_id: usize,
    next_from: u64,
    done: bool,
}

impl RecordCursor {
    pub fn new(source: WindowedSource, format: ArchiveFormat, search_step: u64) -> Self {
        Self {
            source,
            format,
            search_step: search_step.max(1),
            next_id: 0,
            next_from: 0,
            done: false,
        }
    }

    /// Returns the underlying source.
    pub fn source(&mut self) -> &mut WindowedSource {
        &mut self.source
    }

    pub fn into_source(self) -> WindowedSource {
        self.source
    }

    /// Copies into `buf` the body of the given record, that is, the bytes
    /// from the HTML start tag to the declared end of the record, cut at the
    /// first occurrence of the start marker.
    ///
    /// Returns false, leaving `buf` empty, if the record has no body.
    ///
    /// This method must be called on the last record returned by the cursor.
    pub fn read_body(
        &mut self,
        record: &DocumentRecord,
        buf: &mut Vec<u8>,
    ) -> Result<bool, RecordError> {
        let Some(body) = record.body else {
            buf.clear();
            return Ok(false);
        };
        self.source.read_span(body, record.declared_end(), buf)?;
        let marker = &self.format.start_marker[..];
        if let Some(pos) = buf.windows(marker.len()).position(|w| w == marker) {
            buf.truncate(pos);
        }
        Ok(true)
    }

    fn parse_next(&mut self) -> Result<Option<DocumentRecord>, RecordError> {
        let marker_len = self.format.start_marker.len() as u64;
        let mut from = self.next_from;
        let start = loop {
            self.source.free(from)?;
            // A match starting in this step must lie entirely in readable data
            let readable = self.source.readable_end();
            let step = if readable >= self.source.len() {
                self.search_step
            } else {
                self.search_step
                    .min((readable - from).saturating_sub(marker_len.saturating_sub(1)))
                    .max(1)
            };
            let found = self
                .source
                .search(&[&self.format.start_marker], from, step)?;
            if let Some(start) = found.hit() {
                break start;
            }
            from = found.position + 1;
            if from >= self.source.len() {
                return Ok(None);
            }
        };

        // Length field
        let mut pos = start + self.format.start_marker.len() as u64;
        while pos < self.source.len() && self.source.get(pos)? == b' ' {
            pos += 1;
        }
        let term = self
            .source
            .search_any_of(&self.format.length_terminators, pos, MAX_LENGTH_FIELD)?;
        let text = if term.found {
            self.source.copy_as_text(pos, term.position.saturating_sub(1))?
        } else {
            String::new()
        };
        let declared_len = match text.parse::<u64>() {
            Ok(len) if term.found && len > 0 => len,
            _ => {
                return Err(RecordError::MalformedLength {
                    offset: start,
                    text,
                })
            }
        };
        let declared_len = if declared_len > self.source.len() - start {
            warn!(
                "Record {} at offset {} declares {} bytes, but only {} are available",
                self.next_id,
                start,
                declared_len,
                self.source.len() - start
            );
            self.source.len() - start
        } else {
            declared_len
        };
        let end = start + declared_len;
        pos = term.position;

        // Sort key
        let response = self
            .source
            .search(&[&self.format.response_marker], pos, end.saturating_sub(pos))?;
        let sort_key = match response.hit() {
            Some(at) => {
                let url_start = at + self.format.response_marker.len() as u64;
                let url_end = self
                    .source
                    .search_any_of(WHITESPACE, url_start, end.saturating_sub(url_start))?
                    .hit()
                    .unwrap_or(end);
                pos = url_end;
                Some(if url_end > url_start {
                    self.source.copy_as_text(url_start, url_end - 1)?
                } else {
                    String::new()
                })
            }
            None => None,
        };

        // Content type and body
        let body = self.find_body(pos, end)?;

        let record = DocumentRecord {
            id: self.next_id,
            start,
            len: declared_len,
            declared_len,
            body,
            sort_key,
            signature: None,
            new_offset: None,
        };
        self.next_id += 1;
        self.next_from = end;
        Ok(Some(record))
    }

    /// Returns the offset of the HTML start tag, if the record declares an
    /// HTML content type and the tag appears before `end`.
    fn find_body(&mut self, from: u64, end: u64) -> Result<Option<u64>, RecordError> {
        let content_type =
            self.source
                .search(&self.format.content_type_markers, from, end.saturating_sub(from))?;
        let Some(at) = content_type.hit() else {
            return Ok(None);
        };
        let mut value_start = at;
        for marker in &self.format.content_type_markers {
            if self.source.starts_with(at, marker)? {
                value_start = at + marker.len() as u64;
                break;
            }
        }
        let value_end = self
            .source
            .search_any_of(
                &self.format.content_type_terminators,
                value_start,
                end.saturating_sub(value_start),
            )?
            .hit()
            .unwrap_or(end);
        if value_end <= value_start {
            return Ok(None);
        }
        let value = self.source.copy_as_text(value_start, value_end - 1)?;
        if !value.to_ascii_lowercase().contains("html") {
            return Ok(None);
        }
        Ok(self
            .source
            .search(&self.format.html_tags, value_end, end.saturating_sub(value_end))?
            .hit())
    }
}

impl Iterator for RecordCursor {
    type Item = Result<DocumentRecord, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.parse_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for RecordCursor {}
