use crate::errors::SnvError;
use anyhow::{Context, Result};
use rust_htslib::bam::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Name of the strand-bias filter executable.
pub const FILTER_PROGRAM: &str = "fil";

/// What a strand-bias run left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrandBiasOutcome {
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// `SNVs*.txt` tables present in the working directory afterwards
    pub tables: Vec<PathBuf>,
}

impl StrandBiasOutcome {
    /// The table to correct. Fails on a non-zero exit or when no table was
    /// written; with several tables the first in name order is used.
    pub fn into_table(self, workdir: &Path) -> Result<PathBuf> {
        if self.exit_code != Some(0) {
            let status = match self.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "a signal".to_string(),
            };
            return Err(SnvError::StrandBiasFailed { status }.into());
        }

        if self.tables.len() > 1 {
            eprintln!(
                "Warning: {} strand bias tables found, using {}",
                self.tables.len(),
                self.tables[0].display()
            );
        }
        self.tables.into_iter().next().ok_or_else(|| {
            SnvError::NoStrandBiasTable {
                dir: workdir.to_path_buf(),
            }
            .into()
        })
    }
}

/// Strand-bias significance test over the filtered SNV table in `workdir`.
pub trait StrandBiasTest {
    fn run(&self, workdir: &Path, alignment: &Path, sigma: f64) -> Result<StrandBiasOutcome>;
}

/// Runs the external `fil` program as `fil -b <alignment> -v <sigma>`.
#[derive(Debug, Clone)]
pub struct ExternalFilter {
    pub program: PathBuf,
}

impl ExternalFilter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `fil` next to the running executable if present, otherwise from `PATH`.
    pub fn locate_default() -> Self {
        let sibling = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(FILTER_PROGRAM)))
            .filter(|path| path.is_file());
        Self::new(sibling.unwrap_or_else(|| PathBuf::from(FILTER_PROGRAM)))
    }
}

impl StrandBiasTest for ExternalFilter {
    fn run(&self, workdir: &Path, alignment: &Path, sigma: f64) -> Result<StrandBiasOutcome> {
        let status = Command::new(&self.program)
            .arg("-b")
            .arg(alignment)
            .arg("-v")
            .arg(sigma.to_string())
            .current_dir(workdir)
            .status()
            .with_context(|| format!("Failed to launch {}", self.program.display()))?;

        Ok(StrandBiasOutcome {
            exit_code: status.code(),
            tables: find_strand_bias_tables(workdir)?,
        })
    }
}

/// `SNVs*.txt` files in `dir`, sorted by name.
pub fn find_strand_bias_tables(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut tables = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let is_table = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with("SNVs") && n.ends_with(".txt"));
        if is_table && path.is_file() {
            tables.push(path);
        }
    }
    tables.sort();
    Ok(tables)
}

/// Reference sequence names declared in an alignment file's header.
pub fn alignment_contigs(path: &Path) -> Result<Vec<String>> {
    let reader = bam::Reader::from_path(path)
        .with_context(|| format!("Failed to open alignment: {}", path.display()))?;
    Ok(reader
        .header()
        .target_names()
        .iter()
        .map(|name| String::from_utf8_lossy(name).to_string())
        .collect())
}
