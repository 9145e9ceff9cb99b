/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

mod common;

use anyhow::Result;
use common::*;
use dsi_progress_logger::*;
use std::collections::HashSet;
use warc_cluster::prelude::*;

const TEXT: &str = "it was the best of times it was the worst of times it was the age of wisdom \
    it was the age of foolishness it was the epoch of belief it was the epoch of incredulity \
    it was the season of light";

/// Two pages whose texts differ by one word and a plain-text record.
fn three_records() -> [Vec<u8>; 3] {
    [
        html(
            "http://example.org/b",
            &format!("<html><body><p>{TEXT}</p></body></html>"),
        ),
        html(
            "http://example.org/a",
            &format!(
                "<html><head></head><body>{}</body></html>",
                TEXT.replace("age of wisdom", "age of darkness")
            ),
        ),
        record("http://example.org/c", "text/plain", "just some plain text"),
    ]
}

#[test]
fn test_three_records() -> Result<()> {
    // Near duplicates, but not identical
    let builder = SignatureBuilder::new(20, 25);
    let a_shingles = builder.shingles(TEXT.as_bytes()).collect::<HashSet<_>>();
    let changed = TEXT.replace("age of wisdom", "age of darkness");
    let b_shingles = builder.shingles(changed.as_bytes()).collect::<HashSet<_>>();
    assert!(a_shingles.intersection(&b_shingles).count() > 0);
    assert_ne!(a_shingles, b_shingles);
    let s = estimate_similarity(
        &builder.signature(TEXT.as_bytes()).unwrap(),
        &builder.signature(changed.as_bytes()).unwrap(),
    );
    assert!(s > 0.5 && s < 1.0, "{}", s);

    let [a, b, c] = three_records();
    assert_eq!((a.len(), b.len(), c.len()), (341, 349, 139));
    let (data, input) = archive(&[a.clone(), b.clone(), c.clone()]);
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.warc");
    let listing = dir.path().join("out.warc.groups");

    let config = Config::default().log2_window(LOG2_WINDOW);
    let summary = run(&config, input.path(), &output, Some(listing.as_path()), no_logging![])?;
    assert_eq!(
        summary,
        Summary {
            records: 3,
            indexable: 2,
            groups: 1,
            largest_group: 2,
            ungrouped: 1,
            bytes: 829,
        }
    );

    // B (0..349), A (349..690), C (690..829)
    let out = std::fs::read(&output)?;
    assert_eq!(out.len(), data.len());
    assert_eq!(&out[0..349], &b[..]);
    assert_eq!(&out[349..690], &a[..]);
    assert_eq!(&out[690..829], &c[..]);

    assert_eq!(std::fs::read_to_string(&listing)?, "1,0\n2\n");
    Ok(())
}

#[test]
fn test_gaps_between_records() -> Result<()> {
    let [page_b, page_a, plain] = three_records();
    let mut data = vec![b'\n'; 1500];
    data.extend_from_slice(&plain);
    data.extend_from_slice(&[b'\n'; 2000]);
    data.extend_from_slice(&page_b);
    data.extend_from_slice(&page_a);
    let input = temp_file(&data);
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.warc");

    // Small search steps, so the gaps take several steps
    let config = Config::default()
        .log2_window(LOG2_WINDOW)
        .marker_search_window(100);
    let (catalog, index) = scan(&config, input.path(), no_logging![])?;
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.preamble(), 1500);
    assert_eq!(catalog[0].len, plain.len() as u64 + 2000);
    assert_eq!(index.num_documents(), 2);

    let summary = run(&config, input.path(), &output, None, no_logging![])?;
    assert_eq!(summary.records, 3);
    assert_eq!(summary.groups, 1);
    assert_eq!(summary.largest_group, 2);
    assert_eq!(summary.ungrouped, 1);

    // The preamble stays in place, and the two pages are adjacent
    let mut expected = vec![b'\n'; 1500];
    expected.extend_from_slice(&page_a);
    expected.extend_from_slice(&page_b);
    expected.extend_from_slice(&plain);
    expected.extend_from_slice(&[b'\n'; 2000]);
    assert_eq!(std::fs::read(output)?, expected);
    Ok(())
}

#[test]
fn test_idempotence() -> Result<()> {
    let records = (0..200)
        .map(|i| {
            let topic = i % 13;
            let text = (0..40)
                .map(|j| format!("topic{topic}word{j}"))
                .collect::<Vec<_>>()
                .join(" ");
            match i % 5 {
                0 => record(&format!("http://example.org/{i}"), "image/gif", "GIF89a"),
                _ => html(
                    &format!("http://example.org/{i}"),
                    &format!("<html><body><h{}>{text}</h{}></body></html>", i % 4, i % 4),
                ),
            }
        })
        .collect::<Vec<_>>();
    let (data, input) = archive(&records);
    let dir = tempfile::tempdir()?;
    let config = Config::default()
        .log2_window(LOG2_WINDOW)
        .signature_batch(7)
        .batch_size(11);

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    let summary = run(&config, input.path(), &first, None, no_logging![])?;
    run(&config, input.path(), &second, None, no_logging![])?;
    let first = std::fs::read(first)?;
    assert_eq!(first, std::fs::read(second)?);
    assert_eq!(first.len(), data.len());

    assert_eq!(summary.records, 200);
    assert_eq!(summary.indexable, 160);
    assert_eq!(summary.ungrouped, 40);
    assert!(summary.groups <= 13);

    // Same multiset of records
    let mut before = records.clone();
    before.sort();
    let (catalog, _) = scan(&config, dir.path().join("first"), no_logging![])?;
    let mut after = catalog
        .iter()
        .map(|r| first[r.start as usize..r.end() as usize].to_vec())
        .collect::<Vec<_>>();
    after.sort();
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn test_empty_archive() -> Result<()> {
    let input = temp_file(b"");
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out");
    let summary = run(
        &Config::default().log2_window(LOG2_WINDOW),
        input.path(),
        &output,
        None,
        no_logging![],
    )?;
    assert_eq!(summary, Summary::default());
    assert_eq!(std::fs::read(output)?.len(), 0);
    Ok(())
}

#[test]
fn test_malformed_archive() -> Result<()> {
    let mut data = html("a", "<html>a</html>");
    data.extend_from_slice(b"warc/0.9 x response b 0 text/html 0\r\n");
    let input = temp_file(&data);
    let dir = tempfile::tempdir()?;
    assert!(run(
        &Config::default().log2_window(LOG2_WINDOW),
        input.path(),
        dir.path().join("out"),
        None,
        no_logging![],
    )
    .is_err());
    Ok(())
}

#[test]
fn test_invalid_config() {
    let input = temp_file(b"");
    assert!(scan(&Config::default().bands(0), input.path(), no_logging![]).is_err());
}
