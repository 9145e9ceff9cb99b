/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dsi_progress_logger::*;
use log::info;
use warc_cluster::{init_env_logger, lsh::threshold, prelude::*};

#[derive(Parser, Debug)]
#[command(about = "Reorders a web archive so that near-duplicate documents are contiguous.", long_about = None)]
struct Args {
    /// The input archive.
    source: PathBuf,
    /// The reordered archive.
    dest: PathBuf,
    /// The file listing the groups (one line of comma-separated record ids per
    /// group, then a line with the ungrouped ids). Defaults to DEST.groups.
    #[arg(short, long)]
    listing: Option<PathBuf>,
    /// Do not write the listing.
    #[arg(long, conflicts_with = "listing")]
    no_listing: bool,
    /// The base-2 logarithm of the size of the mapped windows.
    #[arg(short = 'w', long, default_value_t = 28)]
    log2_window: u32,
    /// The size in bytes of the read-ahead buffer.
    #[arg(long, default_value_t = 40 * 1024)]
    read_ahead: usize,
    /// The number of bytes scanned at a time while looking for the next
    /// record. Defaults to the window size.
    #[arg(long)]
    marker_search_window: Option<u64>,
    /// The minimum number of characters in a shingle.
    #[arg(short, long, default_value_t = 25)]
    q_gram: usize,
    /// The number of MinHash permutations.
    #[arg(short = 's', long, default_value_t = 20)]
    signature_width: usize,
    /// The number of LSH bands.
    #[arg(short, long, default_value_t = 37)]
    bands: usize,
    /// The number of signature positions per band.
    #[arg(short, long, default_value_t = 3)]
    rows_per_band: usize,
    /// The seed used to choose band positions.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// The number of records copied at a time.
    #[arg(long, default_value_t = 25_000)]
    batch_size: usize,
    /// Additional bytes allocated for the copy buffers.
    #[arg(long, default_value_t = 1 << 20)]
    margin: usize,
    /// Use this number of threads to compute signatures.
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    init_env_logger()?;

    let args = Args::parse();

    #[cfg(feature = "rayon")]
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let mut config = Config::default()
        .log2_window(args.log2_window)
        .read_ahead(args.read_ahead)
        .q_gram(args.q_gram)
        .signature_width(args.signature_width)
        .bands(args.bands)
        .rows_per_band(args.rows_per_band)
        .seed(args.seed)
        .batch_size(args.batch_size)
        .margin(args.margin);
    if let Some(bytes) = args.marker_search_window {
        config = config.marker_search_window(bytes);
    }

    info!(
        "Similarity threshold ≈{:.2}",
        threshold(config.rows_per_band, config.bands)
    );

    let listing = if args.no_listing {
        None
    } else {
        Some(args.listing.unwrap_or_else(|| {
            let mut name = args.dest.clone().into_os_string();
            name.push(".groups");
            name.into()
        }))
    };

    let mut pl = ProgressLogger::default();
    pl.display_memory(true);

    let summary = run(&config, &args.source, &args.dest, listing.as_deref(), &mut pl)?;

    info!(
        "Wrote {} records ({} bytes): {} groups (largest: {}), {} ungrouped records",
        summary.records, summary.bytes, summary.groups, summary.largest_group, summary.ungrouped
    );

    Ok(())
}
