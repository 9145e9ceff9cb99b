/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Configuration of a clustering run.

use crate::record::ArchiveFormat;
use anyhow::{ensure, Result};
use derivative::Derivative;
use derive_setters::*;
use mmap_rs::MmapOptions;

/// The parameters of a clustering run.
///
/// All parameters have sensible defaults, and can be set in a builder-like
/// fashion:
///
/// ```
/// use warc_cluster::config::Config;
///
/// let config = Config::default().bands(7).rows_per_band(3).seed(42);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Setters, Debug, Clone, Derivative)]
#[derivative(Default)]
pub struct Config {
    /// The base-2 logarithm of the size of the windows through which the
    /// input is mapped. The default is 28 (256 MiB).
    #[derivative(Default(value = "28"))]
    pub log2_window: u32,

    /// The size of the read-ahead buffer of the windowed source. The default
    /// is 40 KiB.
    #[derivative(Default(value = "40 * 1024"))]
    pub read_ahead: usize,

    /// The number of bytes scanned by each step of the search for the next
    /// start marker; the search continues until end of file, freeing the
    /// bytes scanned at each step. The default is the window size.
    #[setters(strip_option)]
    #[derivative(Default(value = "None"))]
    pub marker_search_window: Option<u64>,

    /// The minimum number of characters in a shingle. The default is 25.
    #[derivative(Default(value = "25"))]
    pub q_gram: usize,

    /// The number of MinHash permutations. The default is 20.
    #[derivative(Default(value = "20"))]
    pub signature_width: usize,

    /// The number of LSH bands. The default is 37.
    #[derivative(Default(value = "37"))]
    pub bands: usize,

    /// The number of signature positions per band. The default is 3.
    #[derivative(Default(value = "3"))]
    pub rows_per_band: usize,

    /// The seed for the random choice of band positions.
    pub seed: u64,

    /// The number of records copied at a time by the writer. The default is
    /// 25000.
    #[derivative(Default(value = "25_000"))]
    pub batch_size: usize,

    /// Additional bytes allocated for the scratch buffers of the writer. The
    /// default is 1 MiB.
    #[derivative(Default(value = "1 << 20"))]
    pub margin: usize,

    /// The number of bodies whose signatures are computed together (in
    /// parallel, with the `rayon` feature). The default is 4096.
    #[derivative(Default(value = "4096"))]
    pub signature_batch: usize,

    /// The layout of the archive.
    pub format: ArchiveFormat,
}

impl Config {
    /// Returns the number of bytes scanned by each step of the search for
    /// the next start marker.
    pub fn marker_search_bytes(&self) -> u64 {
        self.marker_search_window.unwrap_or(1 << self.log2_window)
    }

    /// Checks that the parameters are consistent.
    pub fn validate(&self) -> Result<()> {
        let granularity = MmapOptions::allocation_granularity() as u64;
        ensure!(
            self.log2_window < 48 && (1_u64 << self.log2_window) % granularity == 0,
            "The window size 2^{} is not a multiple of the allocation granularity ({})",
            self.log2_window,
            granularity
        );
        ensure!(self.read_ahead > 0, "The read-ahead buffer cannot be empty");
        ensure!(
            self.marker_search_window != Some(0),
            "The marker search window cannot be empty"
        );
        ensure!(self.q_gram > 0, "The q-gram size must be positive");
        ensure!(
            self.signature_width > 0,
            "The signature width must be positive"
        );
        ensure!(self.bands > 0, "The number of bands must be positive");
        ensure!(
            self.rows_per_band > 0 && self.rows_per_band <= self.signature_width,
            "The number of rows per band ({}) must be between 1 and the signature width ({})",
            self.rows_per_band,
            self.signature_width
        );
        ensure!(self.batch_size > 0, "The batch size must be positive");
        ensure!(
            self.signature_batch > 0,
            "The signature batch size must be positive"
        );
        ensure!(
            !self.format.start_marker.is_empty(),
            "The start marker cannot be empty"
        );
        ensure!(
            !self.format.content_type_markers.is_empty()
                && self.format.content_type_markers.iter().all(|m| !m.is_empty()),
            "The content-type markers cannot be empty"
        );
        ensure!(
            !self.format.length_terminators.is_empty(),
            "The set of length terminators cannot be empty"
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log2_window, 28);
        assert_eq!(config.read_ahead, 40960);
        assert_eq!(config.q_gram, 25);
        assert_eq!(config.signature_width, 20);
        assert_eq!(config.bands, 37);
        assert_eq!(config.rows_per_band, 3);
        assert_eq!(config.batch_size, 25_000);
        assert_eq!(config.margin, 1 << 20);
        assert_eq!(config.marker_search_bytes(), 1 << 28);
        assert_eq!(
            config.clone().log2_window(16).marker_search_bytes(),
            1 << 16
        );
        assert_eq!(config.clone().marker_search_window(100).marker_search_bytes(), 100);
        assert_eq!(config.format, ArchiveFormat::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid() {
        assert!(Config::default().rows_per_band(21).validate().is_err());
        assert!(Config::default().bands(0).validate().is_err());
        assert!(Config::default().log2_window(1).validate().is_err());
        assert!(Config::default().marker_search_window(0).validate().is_err());
        let mut format = ArchiveFormat::default();
        format.content_type_markers.push(Vec::new());
        assert!(Config::default().format(format).validate().is_err());
    }
}
