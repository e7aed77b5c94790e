use crate::consensus;
use crate::coverage::{self, COVERAGE_FILE};
use crate::output::{self, TableCounts, FILTERED_TABLE, RAW_TABLE};
use crate::reference::Reference;
use crate::significance::{self, MIN_REPORTED_Q_VALUE};
use crate::strand_bias::StrandBiasTest;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

/// Directory checked for a filtered table left by an earlier run.
pub const PREVIOUS_RUN_DIR: &str = "snv";

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Holds `coverage.txt`, the reconstruction files and all outputs
    pub workdir: PathBuf,
    /// Read alignment handed to the strand-bias filter
    pub alignment: PathBuf,
    pub sigma: f64,
    /// Segment length; windows are three segments long
    pub increment: u64,
    pub quiet: bool,
}

/// Where the filtered SNV table came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilteredTable {
    /// Built now from the reconstruction files
    Built {
        windows: usize,
        degenerate_windows: usize,
        counts: TableCounts,
    },
    /// Already in the working directory
    Reused,
    /// Moved in from `snv/SNV.txt`
    Restored { from: PathBuf },
}

#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub filtered: FilteredTable,
    pub strand_bias_table: PathBuf,
    pub final_table: PathBuf,
    pub rows_corrected: usize,
    pub rows_written: usize,
    /// Smallest strand-bias p-value, `None` for an empty table
    pub min_p_value: Option<f64>,
}

fn make_progress_bar(quiet: bool, len: u64) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template("  [{elapsed_precise}/{eta_precise}] {bar:40} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    pb.set_style(style);
    pb
}

/// Produce `SNV.txt` in the working directory, reusing an existing one when
/// present. Reused tables are not checked against the current inputs.
pub fn prepare_filtered_table(config: &PipelineConfig, reference: &Reference) -> Result<FilteredTable> {
    let workdir = &config.workdir;
    let filtered_path = workdir.join(FILTERED_TABLE);

    // The coverage table is required even when the merge is skipped.
    let rows = coverage::read_coverage_table(&workdir.join(COVERAGE_FILE))?;
    let index = coverage::build_coverage_index(&rows, config.increment);
    progress!(config.quiet, "  Windows: {}, segments: {}", rows.len(), index.len());

    let previous = workdir.join(PREVIOUS_RUN_DIR).join(FILTERED_TABLE);
    if previous.is_file() {
        std::fs::rename(&previous, &filtered_path).with_context(|| {
            format!("Failed to move {} to {}", previous.display(), filtered_path.display())
        })?;
        return Ok(FilteredTable::Restored { from: previous });
    }
    if filtered_path.is_file() {
        return Ok(FilteredTable::Reused);
    }

    let pb = make_progress_bar(config.quiet, rows.len() as u64);
    pb.set_message("windows merged");
    let consensus = consensus::build_consensus(
        workdir,
        &rows,
        reference,
        &index,
        config.increment,
        Some(&pb),
    )?;
    pb.finish_and_clear();

    let counts = output::write_consensus_tables(&consensus.table, &workdir.join(RAW_TABLE), &filtered_path)?;

    Ok(FilteredTable::Built {
        windows: consensus.windows,
        degenerate_windows: consensus.degenerate_windows,
        counts,
    })
}

/// `SNVs_0.010000.txt` -> `SNVs_0.010000_final.csv`, next to the input.
pub fn final_table_path(strand_bias_table: &Path) -> PathBuf {
    let stem = strand_bias_table
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "SNVs".to_string());
    strand_bias_table.with_file_name(format!("{}_final.csv", stem))
}

/// Full run: consensus tables, strand-bias test, FDR correction, final table.
pub fn run(
    config: &PipelineConfig,
    reference: &Reference,
    strand_bias: &dyn StrandBiasTest,
) -> Result<PipelineSummary> {
    progress!(config.quiet, "Step 1: Building consensus SNV tables...");
    let filtered = prepare_filtered_table(config, reference)?;
    match &filtered {
        FilteredTable::Built {
            windows,
            degenerate_windows,
            counts,
        } => {
            progress!(config.quiet, "  Windows processed: {} ({} without qualifying read mass)", windows, degenerate_windows);
            progress!(config.quiet, "  Raw SNVs: {}", counts.raw);
            progress!(config.quiet, "  SNVs in >= {} windows: {}", output::MIN_SUPPORT, counts.filtered);
        }
        FilteredTable::Reused => {
            progress!(config.quiet, "  Reusing existing {}", FILTERED_TABLE);
        }
        FilteredTable::Restored { from } => {
            progress!(config.quiet, "  Reusing {}", from.display());
        }
    }

    progress!(config.quiet, "Step 2: Running strand bias filter (sigma={})...", config.sigma);
    let outcome = strand_bias.run(&config.workdir, &config.alignment, config.sigma)?;
    let strand_bias_table = outcome.into_table(&config.workdir)?;
    progress!(config.quiet, "  Strand bias table: {}", strand_bias_table.display());

    progress!(config.quiet, "Step 3: Benjamini-Hochberg correction...");
    let rows = significance::read_strand_bias_table(&strand_bias_table)?;
    let corrected = significance::correct_rows(rows);
    let rows_corrected = corrected.len();
    let min_p_value = corrected.iter().map(|r| r.p_value).min_by(f64::total_cmp);
    if let Some(p) = min_p_value {
        progress!(config.quiet, "  Rows: {}, smallest p-value: {:.3e}", rows_corrected, p);
    }

    let final_table = final_table_path(&strand_bias_table);
    let rows_written = output::write_final_table(&corrected, &final_table, MIN_REPORTED_Q_VALUE)?;
    progress!(config.quiet, "  Rows with q >= {}: {} / {}", MIN_REPORTED_Q_VALUE, rows_written, rows_corrected);

    Ok(PipelineSummary {
        filtered,
        strand_bias_table,
        final_table,
        rows_corrected,
        rows_written,
        min_p_value,
    })
}
