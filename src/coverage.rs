use crate::errors::SnvError;
use crate::types::{CoverageIndex, CoverageRow, SegmentKey};
use anyhow::{Context, Result};
use std::path::Path;

/// File name of the window coverage table inside the working directory.
pub const COVERAGE_FILE: &str = "coverage.txt";

/// Read the tab-separated window coverage table, preserving file order.
///
/// Columns: `window_id, contig, begin, end, depth`. A missing file is reported
/// as [`SnvError::MissingInput`].
pub fn read_coverage_table(path: &Path) -> Result<Vec<CoverageRow>> {
    if !path.is_file() {
        return Err(SnvError::MissingInput {
            what: "Coverage table",
            path: path.to_path_buf(),
        }
        .into());
    }

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to open coverage table: {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse coverage row {}", i + 1))?;
        rows.push(parse_coverage_record(&record, i + 1)?);
    }
    Ok(rows)
}

fn parse_coverage_record(record: &csv::StringRecord, row: usize) -> Result<CoverageRow> {
    let ctx = || format!("coverage row {}", row);

    if record.len() != 5 {
        anyhow::bail!("coverage row {} has {} columns, expected 5", row, record.len());
    }

    Ok(CoverageRow {
        window_id: record.get(0).with_context(ctx)?.to_string(),
        contig: record.get(1).with_context(ctx)?.to_string(),
        begin: record.get(2).with_context(ctx)?.trim().parse().with_context(ctx)?,
        end: record.get(3).with_context(ctx)?.trim().parse().with_context(ctx)?,
        depth: record.get(4).with_context(ctx)?.trim().to_string(),
    })
}

/// The three segment starts of a window beginning at `begin`, in offset order.
pub fn window_segments(contig: &str, begin: u64, increment: u64) -> [SegmentKey; 3] {
    [
        SegmentKey::new(contig, begin),
        SegmentKey::new(contig, begin + increment),
        SegmentKey::new(contig, begin + 2 * increment),
    ]
}

/// Record, for every segment, which window offsets it occupies.
pub fn build_coverage_index(rows: &[CoverageRow], increment: u64) -> CoverageIndex {
    let mut index = CoverageIndex::new();
    for row in rows {
        for (offset, segment) in window_segments(&row.contig, row.begin, increment)
            .into_iter()
            .enumerate()
        {
            index.entry(segment).or_default().0[offset] = true;
        }
    }
    index
}
