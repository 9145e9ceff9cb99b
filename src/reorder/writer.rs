/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::record::Catalog;
use anyhow::{bail, ensure, Context, Result};
use dsi_progress_logger::*;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Copies the records of an archive to the offsets computed by
/// [`plan`](super::plan).
///
/// Records are processed in batches of consecutive ids. The span of the
/// input containing a batch is read into a scratch buffer, the records of
/// the batch are copied into a second buffer in output order, and each run
/// of records that are contiguous in the output is written with a single
/// positioned write. Bytes preceding the first record are copied first, in
/// chunks. Memory usage is thus bounded by twice the largest batch span, plus
/// [`margin`](BatchWriter::margin).
#[derive(Debug, Clone, Copy)]
pub struct BatchWriter {
    /// The number of records in a batch.
    pub batch_size: usize,
    /// Additional bytes reserved for the scratch buffers.
    pub margin: usize,
}

impl BatchWriter {
    pub fn new(batch_size: usize, margin: usize) -> Self {
        Self { batch_size, margin }
    }

    /// Writes `output`, a permutation of `input` according to the new
    /// offsets of the records in `catalog`.
    ///
    /// The output file has the same length of the input file. Every record
    /// must have a new offset.
    pub fn write(
        &self,
        catalog: &Catalog,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        pl: &mut impl ProgressLog,
    ) -> Result<()> {
        ensure!(self.batch_size > 0, "The batch size must be positive");
        let input = input.as_ref();
        let output = output.as_ref();

        let mut src =
            File::open(input).with_context(|| format!("Cannot open {}", input.display()))?;
        let len = src.metadata()?.len();
        ensure!(
            catalog.total_len() == len,
            "The catalog covers {} bytes, but {} is {} bytes long",
            catalog.total_len(),
            input.display(),
            len
        );

        let mut dst =
            File::create(output).with_context(|| format!("Cannot create {}", output.display()))?;
        dst.set_len(len).with_context(|| {
            format!("Cannot allocate {} bytes for {}", len, output.display())
        })?;

        let mut scratch = Vec::new();
        let mut permuted = Vec::new();

        let largest = (0..catalog.len())
            .step_by(self.batch_size)
            .map(|first| {
                let last = (first + self.batch_size).min(catalog.len()) - 1;
                catalog[last].end() - catalog[first].start
            })
            .max()
            .unwrap_or(0) as usize;
        let capacity = largest + self.margin;
        for buffer in [&mut scratch, &mut permuted] {
            buffer.clear();
            buffer.try_reserve_exact(capacity).with_context(|| {
                format!("Cannot allocate a buffer of {} bytes", capacity)
            })?;
        }

        // Preamble, in chunks of at most the buffer capacity
        let chunk = capacity.max(1 << 12) as u64;
        let mut copied = 0;
        while copied < catalog.preamble() {
            let n = chunk.min(catalog.preamble() - copied);
            read_at(&mut src, copied, n as usize, &mut scratch)?;
            dst.write_all(&scratch)?;
            copied += n;
        }

        pl.item_name("record");
        pl.expected_updates(Some(catalog.len()));
        pl.start(format!("Writing {}...", output.display()));

        let mut batch = Vec::with_capacity(self.batch_size);
        for first in (0..catalog.len()).step_by(self.batch_size) {
            let last = (first + self.batch_size).min(catalog.len());
            let span_start = catalog[first].start;
            let span_end = catalog[last - 1].end();
            read_at(
                &mut src,
                span_start,
                (span_end - span_start) as usize,
                &mut scratch,
            )?;

            batch.clear();
            for id in first..last {
                let Some(new_offset) = catalog[id].new_offset else {
                    bail!("Record {} has not been assigned an output offset", id);
                };
                batch.push((new_offset, id));
            }
            batch.sort_unstable();

            permuted.clear();
            // Output offset of the first record in permuted
            let mut run_start = batch[0].0;
            for &(new_offset, id) in &batch {
                if run_start + permuted.len() as u64 != new_offset {
                    dst.seek(SeekFrom::Start(run_start))?;
                    dst.write_all(&permuted)?;
                    permuted.clear();
                    run_start = new_offset;
                }
                let record = &catalog[id];
                let pos = (record.start - span_start) as usize;
                permuted.extend_from_slice(&scratch[pos..pos + record.len as usize]);
            }
            dst.seek(SeekFrom::Start(run_start))?;
            dst.write_all(&permuted)?;

            pl.update_with_count(last - first);
        }

        dst.flush()?;
        pl.done();
        Ok(())
    }
}

fn read_at(src: &mut File, offset: u64, len: usize, buf: &mut Vec<u8>) -> Result<()> {
    buf.resize(len, 0);
    src.seek(SeekFrom::Start(offset))?;
    src.read_exact(buf)
        .with_context(|| format!("Cannot read {} bytes at offset {}", len, offset))
}
