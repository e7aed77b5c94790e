use crate::errors::SnvError;
use anyhow::{Context, Result};
use bio::io::fasta;
use std::collections::HashMap;
use std::path::Path;

/// Reference contigs, upper-cased, keyed by FASTA record id.
#[derive(Debug, Clone, Default)]
pub struct Reference {
    contigs: HashMap<String, Vec<u8>>,
}

impl Reference {
    /// Load every record of a FASTA file into memory.
    pub fn from_fasta(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SnvError::MissingInput {
                what: "Reference FASTA",
                path: path.to_path_buf(),
            }
            .into());
        }

        let reader = fasta::Reader::from_file(path)
            .with_context(|| format!("Failed to open reference: {}", path.display()))?;

        let mut contigs = HashMap::new();
        for result in reader.records() {
            let record = result
                .with_context(|| format!("Failed to read FASTA record from {}", path.display()))?;
            contigs.insert(record.id().to_string(), record.seq().to_ascii_uppercase());
        }
        Ok(Self { contigs })
    }

    pub fn from_sequences<I, S>(sequences: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let contigs = sequences
            .into_iter()
            .map(|(id, seq)| (id.as_ref().to_string(), seq.as_ref().to_ascii_uppercase().into_bytes()))
            .collect();
        Self { contigs }
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    pub fn contig_names(&self) -> impl Iterator<Item = &str> {
        self.contigs.keys().map(String::as_str)
    }

    /// Bases `begin..=end` (1-based, inclusive) of `contig`, truncated at the
    /// contig end. Fails when `begin` lies outside the contig.
    pub fn slice(&self, contig: &str, begin: u64, end: u64) -> Result<&[u8]> {
        let seq = self
            .contigs
            .get(contig)
            .ok_or_else(|| SnvError::UnknownContig(contig.to_string()))?;

        let out_of_bounds = || SnvError::WindowOutOfBounds {
            contig: contig.to_string(),
            begin,
            end,
            length: seq.len(),
        };
        if begin == 0 || begin > end || begin as usize > seq.len() {
            return Err(out_of_bounds().into());
        }
        let stop = (end as usize).min(seq.len());
        Ok(&seq[(begin - 1) as usize..stop])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_from_fasta_uppercases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ref.fasta");
        fs::write(&path, ">chr1 description\nacgt\nACGT\n>chr2\nTTTT\n").unwrap();

        let reference = Reference::from_fasta(&path).unwrap();
        assert_eq!(reference.len(), 2);
        assert!(!reference.is_empty());
        assert_eq!(reference.slice("chr1", 1, 8).unwrap(), b"ACGTACGT");
        assert_eq!(reference.slice("chr2", 2, 3).unwrap(), b"TT");
    }

    #[test]
    fn test_slice_bounds() {
        let reference = Reference::from_sequences([("c", "ACGTA")]);
        assert_eq!(reference.slice("c", 2, 4).unwrap(), b"CGT");
        assert!(reference.slice("c", 0, 3).is_err());
        assert_eq!(reference.slice("c", 4, 9).unwrap(), b"TA");
        assert!(reference.slice("c", 6, 8).is_err());
        assert!(reference.slice("c", 3, 2).is_err());

        let err = reference.slice("missing", 1, 2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SnvError>(),
            Some(SnvError::UnknownContig(c)) if c == "missing"
        ));
    }

    #[test]
    fn test_empty_fasta() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.fasta");
        fs::write(&path, "").unwrap();
        assert!(Reference::from_fasta(&path).unwrap().is_empty());
    }

    #[test]
    fn test_missing_reference() {
        let dir = TempDir::new().unwrap();
        assert!(Reference::from_fasta(&dir.path().join("nope.fa")).is_err());
    }
}
