use crate::types::FinalRow;
use anyhow::{Context, Result};
use std::path::Path;

/// Rows whose q-value falls below this are dropped from the final table.
pub const MIN_REPORTED_Q_VALUE: f64 = 0.05;

/// Benjamini-Hochberg correction over `(p_value, row)` pairs already sorted by
/// ascending p-value.
///
/// `q_i = min(1, p_i * n / (i + 1))`, then made non-decreasing by carrying the
/// running maximum forward. Output order matches input order.
pub fn benjamini_hochberg(sorted_p_values: &[(f64, usize)]) -> Vec<(f64, usize)> {
    let n = sorted_p_values.len() as f64;
    let mut prev = 0.0f64;

    sorted_p_values
        .iter()
        .enumerate()
        .map(|(i, &(p, row))| {
            let q = (p * n / (i + 1) as f64).min(1.0).max(prev);
            prev = q;
            (q, row)
        })
        .collect()
}

/// Pair each p-value with its row index and sort ascending (ties by row).
pub fn sorted_p_values(p_values: &[f64]) -> Vec<(f64, usize)> {
    let mut indexed: Vec<(f64, usize)> = p_values.iter().copied().zip(0..).collect();
    indexed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    indexed
}

/// q-values in the original row order.
pub fn q_values(p_values: &[f64]) -> Vec<f64> {
    let mut q = vec![0.0; p_values.len()];
    for (value, row) in benjamini_hochberg(&sorted_p_values(p_values)) {
        q[row] = value;
    }
    q
}

/// Rows of a strand-bias output table, each with the p-value in its last
/// column. A leading header row (last column `Pval`) is skipped.
pub fn read_strand_bias_table(path: &Path) -> Result<Vec<(Vec<String>, f64)>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open strand bias table: {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse {} row {}", path.display(), i + 1))?;
        let fields: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();

        let last = fields.last().map(String::as_str).unwrap_or_default();
        if i == 0 && last == "Pval" {
            continue;
        }
        let p_value: f64 = last
            .parse()
            .with_context(|| format!("Invalid p-value '{}' in {} row {}", last, path.display(), i + 1))?;
        rows.push((fields, p_value));
    }
    Ok(rows)
}

/// Attach BH q-values to strand-bias rows, keeping the table's row order.
pub fn correct_rows(rows: Vec<(Vec<String>, f64)>) -> Vec<FinalRow> {
    let p_values: Vec<f64> = rows.iter().map(|(_, p)| *p).collect();
    let q = q_values(&p_values);

    rows.into_iter()
        .zip(q)
        .map(|((fields, p_value), q_value)| FinalRow {
            fields,
            p_value,
            q_value,
        })
        .collect()
}
