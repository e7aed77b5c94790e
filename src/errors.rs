use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions of an SNV calling run.
///
/// These travel inside `anyhow::Error`; callers that need to tell them apart
/// use `downcast_ref::<SnvError>()`.
#[derive(Error, Debug)]
pub enum SnvError {
    /// A required input file does not exist
    #[error("{what} not found: {}", .path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    /// None of the candidate locations held the window's reconstruction file
    #[error("Reconstruction file for window {window} not found (tried: {})", display_paths(.tried))]
    MissingWindowFile { window: String, tried: Vec<PathBuf> },

    /// A reconstruction header did not carry `posterior=` and `ave_reads=` fields
    #[error("Malformed reconstruction header in {}: '{header}'", .file.display())]
    MalformedHeader { file: PathBuf, header: String },

    /// The coverage table names a contig absent from the reference
    #[error("Contig '{0}' not present in the reference")]
    UnknownContig(String),

    /// A window extends past the end of its contig
    #[error("Window {contig}:{begin}-{end} exceeds contig length {length}")]
    WindowOutOfBounds {
        contig: String,
        begin: u64,
        end: u64,
        length: usize,
    },

    /// The strand-bias program exited with a non-zero status
    #[error("Strand bias filter failed with {status}")]
    StrandBiasFailed { status: String },

    /// The strand-bias program succeeded but wrote no `SNVs*.txt` table
    #[error("No SNVs*.txt table found in {}", .dir.display())]
    NoStrandBiasTable { dir: PathBuf },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
