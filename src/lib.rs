/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Near-duplicate clustering and reordering of web archives.
//!
//! Archives made of concatenated web pages compress much better if similar
//! pages are stored next to each other. This crate scans an archive through
//! a bounded number of [memory-mapped windows](window), computes a
//! [MinHash signature](shingle) of the HTML body of each [record](record),
//! clusters the signatures with a [banding index](lsh), and finally
//! [rewrites](reorder) the archive so that the records of each cluster are
//! contiguous. The bytes of each record are left untouched.
//!
//! The [`pipeline`] module runs all phases given a [`Config`](config::Config);
//! the `warc_cluster` binary (feature `cli`) exposes it on the command line.

#![deny(unconditional_recursion)]

pub mod config;
pub mod hash;
pub mod lsh;
pub mod pipeline;
pub mod record;
pub mod reorder;
pub mod shingle;
pub mod window;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::hash::*;
    pub use crate::lsh::*;
    pub use crate::pipeline::*;
    pub use crate::record::*;
    pub use crate::reorder::*;
    pub use crate::shingle::*;
    pub use crate::window::*;
}

/// Initializes `env_logger` with level `info`, unless otherwise specified by
/// the `RUST_LOG` environment variable.
pub fn init_env_logger() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()?;
    Ok(())
}
