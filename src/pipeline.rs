/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The phases of a clustering run.
//!
//! A run [scans](scan) the archive, computing the signatures of HTML bodies
//! and adding them to an [`LshIndex`], [plans](crate::reorder::plan) the
//! output order, and finally [writes](crate::reorder::BatchWriter) the
//! reordered archive and its listing. Each phase completes before the next
//! one starts.

use crate::config::Config;
use crate::lsh::LshIndex;
use crate::record::{Catalog, RecordCursor};
use crate::reorder::{plan, write_listing, BatchWriter};
use crate::shingle::SignatureBuilder;
use crate::window::WindowedSource;
use anyhow::{Context, Result};
use dsi_progress_logger::*;
use log::{info, warn};
use mem_dbg::{MemSize, SizeFlags};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Statistics about a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// The number of records in the archive.
    pub records: usize,
    /// The number of records with a signature.
    pub indexable: usize,
    /// The number of clusters.
    pub groups: usize,
    /// The size of the largest cluster.
    pub largest_group: usize,
    /// The number of records that were not indexed.
    pub ungrouped: usize,
    /// The length of the archive.
    pub bytes: u64,
}

/// Computes the signatures of a batch of bodies, stores them in the
/// catalog, and adds them to the index in id order.
fn sign_batch(
    batch: &mut Vec<(usize, Vec<u8>)>,
    builder: &SignatureBuilder,
    catalog: &mut Catalog,
    index: &mut LshIndex,
) -> Result<()> {
    #[cfg(feature = "rayon")]
    let signatures = batch
        .par_iter()
        .map(|(_, body)| builder.signature(body))
        .collect::<Vec<_>>();
    #[cfg(not(feature = "rayon"))]
    let signatures = batch
        .iter()
        .map(|(_, body)| builder.signature(body))
        .collect::<Vec<_>>();

    for (&(id, _), signature) in batch.iter().zip(signatures) {
        if let Some(signature) = signature {
            index.add_document(id, &signature)?;
            if let Some(record) = catalog.get_mut(id) {
                record.signature = Some(signature);
            }
        }
    }
    batch.clear();
    Ok(())
}

/// Parses the records of an archive, computing the signatures of their HTML
/// bodies and adding them to a new [`LshIndex`].
pub fn scan(
    config: &Config,
    input: impl AsRef<Path>,
    pl: &mut impl ProgressLog,
) -> Result<(Catalog, LshIndex)> {
    config.validate()?;
    let input = input.as_ref();
    let source = WindowedSource::open(input, config.log2_window, config.read_ahead)
        .with_context(|| format!("Cannot open {}", input.display()))?;
    let file_len = source.len();
    let mut cursor =
        RecordCursor::new(source, config.format.clone(), config.marker_search_bytes());

    let builder = SignatureBuilder::new(config.signature_width, config.q_gram);
    let mut index = LshIndex::new(
        config.signature_width,
        config.bands,
        config.rows_per_band,
        config.seed,
    )?;
    let mut catalog = Catalog::new();
    let mut batch = Vec::with_capacity(config.signature_batch);
    let mut html = 0;

    pl.item_name("record");
    pl.start(format!("Scanning {}...", input.display()));

    while let Some(record) = cursor.next() {
        let record = record.with_context(|| format!("Cannot parse {}", input.display()))?;
        if record.body.is_some() {
            let mut body = Vec::new();
            cursor.read_body(&record, &mut body)?;
            html += 1;
            batch.push((record.id, body));
        }
        catalog.push(record);
        if batch.len() == config.signature_batch {
            sign_batch(&mut batch, &builder, &mut catalog, &mut index)?;
        }
        pl.light_update();
    }
    sign_batch(&mut batch, &builder, &mut catalog, &mut index)?;
    pl.done();

    if let Some(last) = catalog.iter().last() {
        if last.declared_end() < file_len {
            warn!(
                "No record found after offset {}; the remaining {} bytes are kept with record {}",
                last.declared_end(),
                file_len - last.declared_end(),
                last.id
            );
        }
    } else {
        warn!("No record found in {}", input.display());
    }
    catalog.finish(file_len);

    info!(
        "{} records, {} with an HTML body, {} indexed",
        catalog.len(),
        html,
        index.num_documents()
    );
    info!(
        "The catalog occupies {} bytes",
        catalog.mem_size(SizeFlags::default())
    );

    Ok((catalog, index))
}

/// Reorders `input` into `output`, optionally writing the grouping to
/// `listing`.
pub fn run(
    config: &Config,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    listing: Option<&Path>,
    pl: &mut impl ProgressLog,
) -> Result<Summary> {
    let input = input.as_ref();
    let output = output.as_ref();

    let (mut catalog, index) = scan(config, input, pl)?;
    let plan = plan(&mut catalog, &index, pl)?;
    drop(index);
    catalog.drop_scan_data();

    BatchWriter::new(config.batch_size, config.margin).write(&catalog, input, output, pl)?;

    if let Some(listing) = listing {
        let file = File::create(listing)
            .with_context(|| format!("Cannot create {}", listing.display()))?;
        write_listing(&plan, BufWriter::new(file))
            .with_context(|| format!("Cannot write {}", listing.display()))?;
    }

    Ok(Summary {
        records: catalog.len(),
        indexable: plan.groups.iter().map(Vec::len).sum(),
        groups: plan.groups.len(),
        largest_group: plan.groups.iter().map(Vec::len).max().unwrap_or(0),
        ungrouped: plan.ungrouped.len(),
        bytes: catalog.total_len(),
    })
}
