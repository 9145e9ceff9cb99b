/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Output order of the records and their copy into a new archive.
//!
//! [`plan`] computes the output order: clusters of similar documents come
//! first, each sorted by sort key, followed by the records that could not be
//! indexed. The [`BatchWriter`] then copies the records to their new offsets
//! in bounded memory, and [`write_listing`] records the grouping.

mod writer;
pub use writer::*;

use crate::lsh::{LshError, LshIndex};
use crate::record::{Catalog, DocumentRecord};
use dsi_progress_logger::*;
use itertools::Itertools;
use std::cmp::Ordering;
use std::io::Write;

/// The output order of a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// The ids of all records in output order.
    pub order: Vec<usize>,
    /// The clusters of indexable records, in output order.
    pub groups: Vec<Vec<usize>>,
    /// The records that could not be indexed, in output order.
    pub ungrouped: Vec<usize>,
}

/// Compares records by sort key (records without a key first), then by id.
fn by_key(a: &DocumentRecord, b: &DocumentRecord) -> Ordering {
    a.sort_key.cmp(&b.sort_key).then(a.id.cmp(&b.id))
}

/// Computes the output order of the records of a catalog and stores their
/// new offsets in the catalog.
///
/// Indexable records are visited by increasing id; the first record of each
/// cluster causes the whole cluster to be placed, sorted by sort key. All
/// other records follow, sorted by sort key. New offsets are assigned
/// cumulatively, starting after the preamble of the archive.
pub fn plan(
    catalog: &mut Catalog,
    index: &LshIndex,
    pl: &mut impl ProgressLog,
) -> Result<Plan, LshError> {
    let mut placed = vec![false; catalog.len()];
    let mut plan = Plan::default();

    pl.item_name("record");
    pl.expected_updates(Some(catalog.len()));
    pl.start("Clustering records...");

    for id in catalog.indexable().collect::<Vec<_>>() {
        if placed[id] {
            continue;
        }
        let mut group = index.cluster(id, &*catalog)?;
        group.sort_by(|&a, &b| by_key(&catalog[a], &catalog[b]));
        for &member in &group {
            debug_assert!(!placed[member]);
            placed[member] = true;
        }
        pl.update_with_count(group.len());
        plan.order.extend_from_slice(&group);
        plan.groups.push(group);
    }

    let mut ungrouped = (0..catalog.len())
        .filter(|&id| !placed[id])
        .collect::<Vec<_>>();
    ungrouped.sort_by(|&a, &b| by_key(&catalog[a], &catalog[b]));
    pl.update_with_count(ungrouped.len());
    plan.order.extend_from_slice(&ungrouped);
    plan.ungrouped = ungrouped;
    pl.done();

    let mut offset = catalog.preamble();
    for &id in &plan.order {
        if let Some(record) = catalog.get_mut(id) {
            record.new_offset = Some(offset);
            offset += record.len;
        }
    }

    pl.info(format_args!(
        "{} groups ({} of more than one record), {} ungrouped records",
        plan.groups.len(),
        plan.groups.iter().filter(|g| g.len() > 1).count(),
        plan.ungrouped.len()
    ));

    Ok(plan)
}

/// Writes the grouping of a plan: one line per group with the comma-separated
/// ids of its members, then a line with the ungrouped ids.
pub fn write_listing(plan: &Plan, mut writer: impl Write) -> std::io::Result<()> {
    for group in &plan.groups {
        writeln!(writer, "{}", group.iter().join(","))?;
    }
    writeln!(writer, "{}", plan.ungrouped.iter().join(","))?;
    writer.flush()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_write_listing() {
        let plan = Plan {
            order: vec![2, 0, 1, 3],
            groups: vec![vec![2, 0], vec![1]],
            ungrouped: vec![3],
        };
        let mut out = Vec::new();
        write_listing(&plan, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "2,0\n1\n3\n");

        let mut out = Vec::new();
        write_listing(&Plan::default(), &mut out).unwrap();
        assert_eq!(out, b"\n");
    }
}
