use crate::types::{ConsensusRecord, ConsensusTable, FinalRow};
use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use std::fs::File;
use std::path::Path;

/// Every consensus variant.
pub const RAW_TABLE: &str = "raw_snv.txt";
/// Variants reported by at least [`MIN_SUPPORT`] windows.
pub const FILTERED_TABLE: &str = "SNV.txt";
/// Windows that must agree before a variant reaches the filtered table.
pub const MIN_SUPPORT: usize = 2;

pub const SNV_HEADER: [&str; 10] = [
    "Chromosome",
    "Pos",
    "Ref",
    "Var",
    "Frq1",
    "Frq2",
    "Frq3",
    "Pst1",
    "Pst2",
    "Pst3",
];

pub const FINAL_HEADER: [&str; 16] = [
    "Chromosome",
    "Pos",
    "Ref",
    "Var",
    "Frq1",
    "Frq2",
    "Frq3",
    "Pst1",
    "Pst2",
    "Pst3",
    "Fvar",
    "Rvar",
    "Ftot",
    "Rtot",
    "Pval",
    "Qval",
];

/// Rows written to each consensus table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub raw: usize,
    pub filtered: usize,
}

fn tsv_writer(path: &Path) -> Result<Writer<File>> {
    WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))
}

fn snv_fields(record: &ConsensusRecord) -> Vec<String> {
    let mut fields = vec![
        record.contig.clone(),
        record.position.to_string(),
        record.ref_base.to_string(),
        record.var_base.to_string(),
    ];
    fields.extend(record.slots.iter().map(|s| s.frequency_field()));
    fields.extend(record.slots.iter().map(|s| s.posterior_field()));
    fields
}

/// Write the raw table (all variants) and the filtered table (variants
/// observed in at least [`MIN_SUPPORT`] windows), both in key order.
pub fn write_consensus_tables(
    table: &ConsensusTable,
    raw_path: &Path,
    filtered_path: &Path,
) -> Result<TableCounts> {
    let mut raw = tsv_writer(raw_path)?;
    let mut filtered = tsv_writer(filtered_path)?;
    raw.write_record(SNV_HEADER)?;
    filtered.write_record(SNV_HEADER)?;

    let mut counts = TableCounts::default();
    for record in table.values() {
        let fields = snv_fields(record);
        raw.write_record(&fields)?;
        counts.raw += 1;

        if record.support() >= MIN_SUPPORT {
            filtered.write_record(&fields)?;
            counts.filtered += 1;
        }
    }

    raw.flush()?;
    filtered.flush()?;
    Ok(counts)
}

/// Write the q-value annotated strand-bias rows, keeping only those with
/// `q_value >= min_q_value`. Returns the number of rows written.
pub fn write_final_table(rows: &[FinalRow], path: &Path, min_q_value: f64) -> Result<usize> {
    let mut wtr = WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    wtr.write_record(FINAL_HEADER)?;

    let mut written = 0;
    for row in rows.iter().filter(|r| r.q_value >= min_q_value) {
        let q = row.q_value.to_string();
        wtr.write_record(row.fields.iter().map(String::as_str).chain(std::iter::once(q.as_str())))?;
        written += 1;
    }

    wtr.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Slot, VariantKey};
    use std::fs;
    use tempfile::TempDir;

    fn observed(frequency: f64) -> Slot {
        Slot::Observed {
            frequency,
            posterior: 0.987654,
        }
    }

    fn insert(table: &mut ConsensusTable, position: u64, var_base: char, slots: [Slot; 3]) {
        let key = VariantKey {
            position,
            ref_base: 'A',
            var_base,
            contig: "chr".to_string(),
        };
        table.insert(
            key,
            ConsensusRecord {
                contig: "chr".to_string(),
                position,
                ref_base: 'A',
                var_base,
                slots,
            },
        );
    }

    #[test]
    fn test_corroboration_filter() {
        let mut table = ConsensusTable::new();
        insert(
            &mut table,
            100,
            'T',
            [observed(0.1), Slot::VariantAbsentDespiteCoverage, Slot::WindowAbsent],
        );
        insert(
            &mut table,
            20,
            'G',
            [observed(0.2), observed(0.3), Slot::WindowAbsent],
        );
        insert(&mut table, 20, 'C', [observed(0.2), observed(0.3), observed(0.4)]);

        let dir = TempDir::new().unwrap();
        let raw = dir.path().join(RAW_TABLE);
        let filtered = dir.path().join(FILTERED_TABLE);
        let counts = write_consensus_tables(&table, &raw, &filtered).unwrap();
        assert_eq!(counts, TableCounts { raw: 3, filtered: 2 });

        let raw_text = fs::read_to_string(&raw).unwrap();
        let lines: Vec<&str> = raw_text.lines().collect();
        assert_eq!(lines[0], "Chromosome\tPos\tRef\tVar\tFrq1\tFrq2\tFrq3\tPst1\tPst2\tPst3");
        assert_eq!(lines[1], "chr\t20\tA\tC\t0.2000\t0.3000\t0.4000\t0.9877\t0.9877\t0.9877");
        assert_eq!(lines[2], "chr\t20\tA\tG\t0.2000\t0.3000\t*\t0.9877\t0.9877\t*");
        assert_eq!(lines[3], "chr\t100\tA\tT\t0.1000\t-\t*\t0.9877\t-\t*");

        let filtered_text = fs::read_to_string(&filtered).unwrap();
        assert_eq!(filtered_text.lines().count(), 3);
        assert!(!filtered_text.contains("\t100\t"));
    }

    #[test]
    fn test_final_table_threshold() {
        let row = |p: f64, q: f64| FinalRow {
            fields: vec!["chr".to_string(), "5".to_string(), p.to_string()],
            p_value: p,
            q_value: q,
        };
        let rows = vec![row(0.001, 0.004), row(0.2, 0.05), row(0.5, 0.6)];

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("SNVs_0.010000_final.csv");
        assert_eq!(write_final_table(&rows, &path, 0.05).unwrap(), 2);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Chromosome,Pos,Ref,Var,Frq1"));
        assert!(lines[0].ends_with("Pval,Qval"));
        assert_eq!(lines[1], "chr,5,0.2,0.05");
        assert_eq!(lines[2], "chr,5,0.5,0.6");
    }
}
