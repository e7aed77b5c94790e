use anyhow::{Context, Result};
use clap::Parser;
use snv_consensus::pipeline::{self, PipelineConfig};
use snv_consensus::progress;
use snv_consensus::reference::Reference;
use snv_consensus::strand_bias::{self, ExternalFilter};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "snv-consensus")]
#[command(version)]
#[command(about = "Call SNVs from overlapping haplotype reconstruction windows", long_about = None)]
struct Args {
    /// Reference FASTA the windows were reconstructed against
    #[arg(short, long = "ref")]
    reference: String,

    /// Sorted BAM alignment used by the strand bias filter
    #[arg(short, long)]
    bam: String,

    /// Sigma passed to the strand bias filter
    #[arg(short, long, default_value = "0.01")]
    sigma: f64,

    /// Segment length; each window spans three segments
    #[arg(short, long, default_value = "1")]
    increment: u64,

    /// Directory holding coverage.txt and the reconstruction files
    #[arg(short, long, default_value = ".")]
    workdir: String,

    /// Strand bias filter executable (default: `fil` next to this binary, then PATH)
    #[arg(long)]
    fil: Option<String>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

/// Warn about reference contigs the alignment header does not declare.
fn check_alignment(bam: &Path, reference: &Reference) -> Result<()> {
    let declared = strand_bias::alignment_contigs(bam)?;
    let mut missing: Vec<&str> = reference
        .contig_names()
        .filter(|name| !declared.iter().any(|d| d.as_str() == *name))
        .collect();
    missing.sort_unstable();
    if !missing.is_empty() {
        eprintln!(
            "Warning: reference contigs absent from {}: {}",
            bam.display(),
            missing.join(", ")
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.increment == 0 {
        anyhow::bail!("--increment must be positive");
    }
    if args.sigma.is_nan() || args.sigma <= 0.0 {
        anyhow::bail!("--sigma must be positive, got {}", args.sigma);
    }
    if !Path::new(&args.reference).exists() {
        anyhow::bail!("Reference file not found: {}", args.reference);
    }
    if !Path::new(&args.bam).exists() {
        anyhow::bail!("Alignment file not found: {}", args.bam);
    }
    let workdir = PathBuf::from(&args.workdir);
    if !workdir.is_dir() {
        anyhow::bail!("Working directory not found: {}", args.workdir);
    }

    // the filter runs inside the working directory
    let alignment = std::fs::canonicalize(&args.bam)
        .with_context(|| format!("Failed to resolve {}", args.bam))?;
    let filter = match &args.fil {
        Some(program) => ExternalFilter::new(program),
        None => ExternalFilter::locate_default(),
    };

    progress!(args.quiet, "Window SNV Consensus Caller");
    progress!(args.quiet, "=========================================");
    progress!(args.quiet, "Reference: {}", args.reference);
    progress!(args.quiet, "Alignment: {}", alignment.display());
    progress!(args.quiet, "Working directory: {}", workdir.display());
    progress!(args.quiet, "Increment: {}", args.increment);
    progress!(args.quiet, "Sigma: {}", args.sigma);
    progress!(args.quiet, "Strand bias filter: {}", filter.program.display());
    progress!(args.quiet);

    let reference = Reference::from_fasta(Path::new(&args.reference))?;
    if reference.is_empty() {
        anyhow::bail!("Reference file has no sequences: {}", args.reference);
    }
    progress!(args.quiet, "Loaded {} reference contig(s)", reference.len());
    check_alignment(&alignment, &reference)?;

    let config = PipelineConfig {
        workdir,
        alignment,
        sigma: args.sigma,
        increment: args.increment,
        quiet: args.quiet,
    };
    let summary = pipeline::run(&config, &reference, &filter)?;

    progress!(args.quiet);
    progress!(
        args.quiet,
        "Done! {} of {} SNVs written to: {}",
        summary.rows_written,
        summary.rows_corrected,
        summary.final_table.display()
    );

    Ok(())
}
