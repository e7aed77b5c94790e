use crate::reference::Reference;
use crate::types::{
    ConsensusRecord, ConsensusTable, CoverageIndex, CoverageRow, SegmentKey, Slot, WindowVariant,
    WindowVariants,
};
use crate::window;
use anyhow::Result;
use indicatif::ProgressBar;
use std::path::Path;

/// Slot a window fills for a variant at `position`.
///
/// A variant in the window's first segment goes to slot 2, the middle segment
/// to slot 1 and the last segment to slot 0, so that the three windows sliding
/// over one segment land in distinct slots.
pub fn window_slot(position: u64, begin: u64, increment: u64) -> usize {
    if position < begin + increment {
        2
    } else if position < begin + 2 * increment {
        1
    } else {
        0
    }
}

/// Initial slots of a record first seen in `observed_slot`, given the coverage
/// pattern of the segment holding the variant. Slot `j` corresponds to the
/// window that has this segment at offset `2 - j`.
fn initial_slots(
    observed_slot: usize,
    call: &WindowVariant,
    pattern_covered: impl Fn(usize) -> bool,
) -> [Slot; 3] {
    std::array::from_fn(|j| {
        if j == observed_slot {
            Slot::Observed {
                frequency: call.frequency,
                posterior: call.posterior,
            }
        } else if pattern_covered(2 - j) {
            Slot::VariantAbsentDespiteCoverage
        } else {
            Slot::WindowAbsent
        }
    })
}

/// Fold one window's calls into the consensus table.
pub fn merge_window(
    table: &mut ConsensusTable,
    coverage: &CoverageIndex,
    row: &CoverageRow,
    variants: &WindowVariants,
    increment: u64,
) {
    for (key, call) in variants {
        let slot = window_slot(key.position, row.begin, increment);

        if let Some(record) = table.get_mut(key) {
            match record.slots[slot] {
                Slot::Observed { .. } => {
                    eprintln!(
                        "Warning: {}:{} {}>{} already observed in slot {}; ignoring window {}",
                        record.contig,
                        record.position,
                        record.ref_base,
                        record.var_base,
                        slot + 1,
                        row.window_id
                    );
                }
                _ => {
                    record.slots[slot] = Slot::Observed {
                        frequency: call.frequency,
                        posterior: call.posterior,
                    };
                }
            }
            continue;
        }

        let segment_start = row.begin + (2 - slot) as u64 * increment;
        let pattern = coverage
            .get(&SegmentKey::new(&row.contig, segment_start))
            .copied()
            .unwrap_or_default();

        table.insert(
            key.clone(),
            ConsensusRecord {
                contig: key.contig.clone(),
                position: key.position,
                ref_base: key.ref_base,
                var_base: key.var_base,
                slots: initial_slots(slot, call, |offset| pattern.is_covered(offset)),
            },
        );
    }
}

/// Consensus table plus bookkeeping from the merge pass.
#[derive(Debug, Default)]
pub struct Consensus {
    pub table: ConsensusTable,
    pub windows: usize,
    /// Windows contributing no read mass: no reconstruction above the
    /// posterior cutoff, or only zero-abundance ones
    pub degenerate_windows: usize,
}

/// Call every window in coverage-table order and merge the calls.
pub fn build_consensus(
    workdir: &Path,
    rows: &[CoverageRow],
    reference: &Reference,
    coverage: &CoverageIndex,
    increment: u64,
    pb: Option<&ProgressBar>,
) -> Result<Consensus> {
    let mut consensus = Consensus::default();

    for row in rows {
        let extraction = window::extract_window(workdir, row, reference)?;
        if extraction.reads <= 0.0 {
            if extraction.qualifying > 0 {
                eprintln!(
                    "Warning: {} reconstruction(s) in {} carry no reads",
                    extraction.qualifying, row.window_id
                );
            }
            consensus.degenerate_windows += 1;
        }
        merge_window(&mut consensus.table, coverage, row, &extraction.variants, increment);
        consensus.windows += 1;

        if let Some(pb) = pb {
            pb.inc(1);
        }
    }

    Ok(consensus)
}
