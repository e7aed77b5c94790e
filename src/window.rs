use crate::errors::SnvError;
use crate::reference::Reference;
use crate::types::{CoverageRow, VariantKey, WindowVariant, WindowVariants};
use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Reconstructions below this posterior are ignored entirely.
pub const MIN_POSTERIOR: f64 = 0.9;

/// Subdirectory searched after the working directory.
pub const SUPPORT_DIR: &str = "support";

const VARIANT_BASES: &[u8] = b"ACGT-";

/// Candidate locations of a window's reconstruction file, in search order.
pub fn candidate_paths(workdir: &Path, file_name: &str) -> Vec<PathBuf> {
    let gz_name = format!("{}.gz", file_name);
    vec![
        workdir.join(file_name),
        workdir.join(SUPPORT_DIR).join(file_name),
        workdir.join(&gz_name),
        workdir.join(SUPPORT_DIR).join(&gz_name),
    ]
}

/// First existing candidate for the window's reconstruction file.
pub fn locate_support_file(workdir: &Path, row: &CoverageRow) -> Result<PathBuf> {
    let candidates = candidate_paths(workdir, &row.support_file_name());
    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        return Ok(found.clone());
    }
    Err(SnvError::MissingWindowFile {
        window: row.window_id.clone(),
        tried: candidates,
    }
    .into())
}

fn open_support_file(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open reconstruction file: {}", path.display()))?;
    if path.extension().map_or(false, |ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Posterior and abundance from a reconstruction header such as
/// `>hap_3|posterior=0.97 ave_reads=12.5`.
fn parse_header(header: &str, file: &Path) -> Result<(f64, f64)> {
    let malformed = || SnvError::MalformedHeader {
        file: file.to_path_buf(),
        header: header.to_string(),
    };

    let fields: Vec<&str> = header.split_whitespace().collect();
    if fields.len() != 2 {
        return Err(malformed().into());
    }
    let value = |field: &str| -> Option<f64> { field.rsplit('=').next()?.parse().ok() };

    let posterior = value(fields[0]).ok_or_else(malformed)?;
    let abundance = value(fields[1]).ok_or_else(malformed)?;
    Ok((posterior, abundance))
}

/// Variants of one window together with the evidence behind them.
#[derive(Debug, Clone, Default)]
pub struct WindowExtraction {
    pub variants: WindowVariants,
    /// Reconstructions passing [`MIN_POSTERIOR`]
    pub qualifying: usize,
    /// Summed abundance of the qualifying reconstructions
    pub reads: f64,
}

#[derive(Default)]
struct Accumulator {
    abundance: f64,
    weighted_posterior: f64,
}

/// Call substitutions from a stream of (header, sequence) line pairs against
/// `ref_slice`, whose first base sits at `begin`.
pub fn extract_from_reader<R: BufRead>(
    reader: R,
    contig: &str,
    begin: u64,
    ref_slice: &[u8],
    source: &Path,
) -> Result<WindowExtraction> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("Failed to read {}", source.display()))?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }

    let mut sums: BTreeMap<VariantKey, Accumulator> = BTreeMap::new();
    let mut qualifying = 0;
    let mut reads = 0.0;

    for pair in lines.chunks_exact(2) {
        let (posterior, abundance) = parse_header(pair[0].trim(), source)?;
        if posterior < MIN_POSTERIOR {
            continue;
        }
        qualifying += 1;
        reads += abundance;

        let seq = pair[1].trim().to_ascii_uppercase();
        if seq.len() != ref_slice.len() {
            eprintln!(
                "Warning: {} has a reconstruction of length {} for a window of length {}",
                source.display(),
                seq.len(),
                ref_slice.len()
            );
        }

        for (i, (&ref_base, &base)) in ref_slice.iter().zip(seq.as_bytes()).enumerate() {
            if ref_base == base {
                continue;
            }
            if !VARIANT_BASES.contains(&base) {
                eprintln!(
                    "Warning: skipping symbol '{}' at {}:{} in {}",
                    base as char,
                    contig,
                    begin + i as u64,
                    source.display()
                );
                continue;
            }
            let key = VariantKey {
                position: begin + i as u64,
                ref_base: ref_base as char,
                var_base: base as char,
                contig: contig.to_string(),
            };
            let acc = sums.entry(key).or_default();
            acc.abundance += abundance;
            acc.weighted_posterior += posterior * abundance;
        }
    }

    if reads <= 0.0 {
        return Ok(WindowExtraction {
            variants: WindowVariants::new(),
            qualifying,
            reads,
        });
    }

    let variants = sums
        .into_iter()
        .map(|(key, acc)| {
            let posterior = if acc.abundance > 0.0 {
                acc.weighted_posterior / acc.abundance
            } else {
                0.0
            };
            let frequency = acc.abundance / reads;
            (key, WindowVariant { frequency, posterior })
        })
        .collect();

    Ok(WindowExtraction {
        variants,
        qualifying,
        reads,
    })
}

/// Locate, open and call one window of the coverage table.
pub fn extract_window(workdir: &Path, row: &CoverageRow, reference: &Reference) -> Result<WindowExtraction> {
    let path = locate_support_file(workdir, row)?;
    let ref_slice = reference.slice(&row.contig, row.begin, row.end)?;
    let reader = open_support_file(&path)?;
    extract_from_reader(reader, &row.contig, row.begin, ref_slice, &path)
        .with_context(|| format!("Failed to call variants for window {}", row.window_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    fn key(position: u64, ref_base: char, var_base: char) -> VariantKey {
        VariantKey {
            position,
            ref_base,
            var_base,
            contig: "chr".to_string(),
        }
    }

    fn extract(text: &str, begin: u64, reference: &[u8]) -> WindowExtraction {
        extract_from_reader(Cursor::new(text), "chr", begin, reference, Path::new("test.fas")).unwrap()
    }

    fn row(begin: u64, end: u64) -> CoverageRow {
        CoverageRow {
            window_id: format!("w-chr-{}-{}.reads.fas", begin, end),
            contig: "chr".to_string(),
            begin,
            end,
            depth: "10".to_string(),
        }
    }

    #[test]
    fn test_frequency_normalization() {
        let text = "\
>hap_0|posterior=1.0 ave_reads=3.0
ACGTAC
>hap_1|posterior=0.9 ave_reads=1.0
ACTTAC
>hap_2|posterior=0.95 ave_reads=4.0
ACTTAC
";
        let result = extract(text, 101, b"ACGTAC");
        assert_eq!(result.qualifying, 3);
        assert_relative_eq!(result.reads, 8.0);
        assert_eq!(result.variants.len(), 1);

        let call = result.variants[&key(103, 'G', 'T')];
        assert_relative_eq!(call.frequency, 5.0 / 8.0, epsilon = 1e-12);
        assert_relative_eq!(call.posterior, (0.9 * 1.0 + 0.95 * 4.0) / 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_low_posterior_excluded_from_read_mass() {
        let text = "\
>hap_0|posterior=0.5 ave_reads=100.0
TCGT
>hap_1|posterior=0.99 ave_reads=2.0
ACGA
>hap_2|posterior=0.99 ave_reads=2.0
ACGT
";
        let result = extract(text, 1, b"ACGT");
        assert_eq!(result.qualifying, 2);
        assert_relative_eq!(result.reads, 4.0);
        assert!(!result.variants.contains_key(&key(1, 'A', 'T')));
        assert_relative_eq!(result.variants[&key(4, 'T', 'A')].frequency, 0.5);
    }

    #[test]
    fn test_lowercase_and_deletion() {
        let text = ">h|posterior=1 ave_reads=1\nac-t\n";
        let result = extract(text, 10, b"ACGT");
        assert_relative_eq!(result.variants[&key(12, 'G', '-')].frequency, 1.0);
    }

    #[test]
    fn test_degenerate_window_is_empty() {
        let text = ">h|posterior=0.2 ave_reads=5\nTTTT\n";
        let result = extract(text, 1, b"ACGT");
        assert_eq!(result.qualifying, 0);
        assert!(result.variants.is_empty());

        let empty = extract("", 1, b"ACGT");
        assert!(empty.variants.is_empty());
    }

    #[test]
    fn test_zero_abundance_does_not_divide_by_zero() {
        let text = ">h|posterior=1 ave_reads=0\nTCGT\n";
        let result = extract(text, 1, b"ACGT");
        assert!(result.variants.is_empty());
    }

    #[test]
    fn test_malformed_header() {
        let text = ">h|posterior=abc ave_reads=1\nACGT\n";
        let err = extract_from_reader(Cursor::new(text), "chr", 1, b"ACGT", Path::new("x")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SnvError>(),
            Some(SnvError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_locate_search_order() {
        let dir = TempDir::new().unwrap();
        let w = row(1, 4);
        let name = w.support_file_name();
        let gz_name = format!("{}.gz", name);
        let support = dir.path().join(SUPPORT_DIR);
        fs::create_dir(&support).unwrap();

        // added from lowest to highest priority
        let tiers = [
            support.join(&gz_name),
            dir.path().join(&gz_name),
            support.join(&name),
            dir.path().join(&name),
        ];
        for path in &tiers {
            fs::write(path, "").unwrap();
            assert_eq!(&locate_support_file(dir.path(), &w).unwrap(), path);
        }

        // and removed again, highest first
        for i in (1..tiers.len()).rev() {
            fs::remove_file(&tiers[i]).unwrap();
            assert_eq!(locate_support_file(dir.path(), &w).unwrap(), tiers[i - 1]);
        }
    }

    #[test]
    fn test_window_past_contig_end() {
        let dir = TempDir::new().unwrap();
        let w = row(4, 9);
        fs::write(
            dir.path().join(w.support_file_name()),
            ">h|posterior=1 ave_reads=3\nTGCAAA\n",
        )
        .unwrap();

        let reference = Reference::from_sequences([("chr", "ACGTAC")]);
        let result = extract_window(dir.path(), &w, &reference).unwrap();
        assert_eq!(result.variants.len(), 1);
        assert_relative_eq!(result.variants[&key(5, 'A', 'G')].frequency, 1.0);
    }

    #[test]
    fn test_missing_window_file() {
        let dir = TempDir::new().unwrap();
        let err = locate_support_file(dir.path(), &row(1, 4)).unwrap_err();
        match err.downcast_ref::<SnvError>() {
            Some(SnvError::MissingWindowFile { tried, .. }) => assert_eq!(tried.len(), 4),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_extract_window_from_gzip_in_support() {
        let dir = TempDir::new().unwrap();
        let w = row(2, 5);
        let support = dir.path().join(SUPPORT_DIR);
        fs::create_dir(&support).unwrap();

        let path = support.join(format!("{}.gz", w.support_file_name()));
        let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
        encoder
            .write_all(b">h|posterior=0.97 ave_reads=2\nCGTT\n>h|posterior=0.91 ave_reads=2\nCGTA\n")
            .unwrap();
        encoder.finish().unwrap();

        let reference = Reference::from_sequences([("chr", "ACGTAC")]);
        let result = extract_window(dir.path(), &w, &reference).unwrap();
        let call = result.variants[&key(5, 'A', 'T')];
        assert_relative_eq!(call.frequency, 0.5);
        assert_relative_eq!(call.posterior, 0.97);
    }
}
