/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

/// The smallest window size usable on all platforms.
pub const LOG2_WINDOW: u32 = 16;
pub const WINDOW: usize = 1 << LOG2_WINDOW;

/// Returns a WARC 0.9 record whose declared length is its actual length.
pub fn record(url: &str, content_type: &str, body: &str) -> Vec<u8> {
    let rest = format!(
        " response {url} 20080322183942 {content_type} 0\r\nHTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\n\r\n{body}\r\n"
    );
    let prefix = "warc/0.9 ".len();
    let mut len = prefix + rest.len();
    loop {
        let total = prefix + len.to_string().len() + rest.len();
        if total == len {
            break;
        }
        len = total;
    }
    format!("warc/0.9 {len}{rest}").into_bytes()
}

/// Returns a record of exactly `len` bytes, padding the body with `x`.
pub fn record_of_len(url: &str, content_type: &str, len: usize) -> Vec<u8> {
    let mut pad = len.saturating_sub(record(url, content_type, "").len());
    loop {
        let r = record(url, content_type, &"x".repeat(pad));
        match r.len().cmp(&len) {
            std::cmp::Ordering::Equal => return r,
            std::cmp::Ordering::Greater => pad -= 1,
            std::cmp::Ordering::Less => pad += 1,
        }
    }
}

pub fn html(url: &str, body: &str) -> Vec<u8> {
    record(url, "text/html", body)
}

/// Writes the given bytes to a temporary file.
pub fn temp_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

pub fn archive(records: &[Vec<u8>]) -> (Vec<u8>, NamedTempFile) {
    let data = records.concat();
    let file = temp_file(&data);
    (data, file)
}
