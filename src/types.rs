use std::collections::{BTreeMap, HashMap};

/// One row of the window coverage table (`coverage.txt`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageRow {
    pub window_id: String,
    pub contig: String,
    pub begin: u64, // 1-based, inclusive
    pub end: u64,   // 1-based, inclusive
    pub depth: String,
}

impl CoverageRow {
    /// Name of the reconstruction file holding this window's haplotypes.
    pub fn support_file_name(&self) -> String {
        format!("w-{}-{}-{}.reads-support.fas", self.contig, self.begin, self.end)
    }
}

/// Start of an `increment`-long segment on a contig.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey {
    pub contig: String,
    pub position: u64,
}

impl SegmentKey {
    pub fn new(contig: &str, position: u64) -> Self {
        Self {
            contig: contig.to_string(),
            position,
        }
    }
}

/// Which windows cover a segment, indexed by the segment's offset (0, 1, 2)
/// inside each window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoveragePattern(pub [bool; 3]);

impl CoveragePattern {
    pub fn is_covered(&self, offset: usize) -> bool {
        self.0[offset]
    }

    pub fn as_indicators(&self) -> [u8; 3] {
        self.0.map(u8::from)
    }
}

/// Segment start -> coverage pattern, built once from the coverage table.
pub type CoverageIndex = HashMap<SegmentKey, CoveragePattern>;

/// Ordering key of a consensus record: position, then reference base, then
/// variant base. The contig is the last tie-breaker so that equal positions on
/// different contigs never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    pub position: u64,
    pub ref_base: char,
    pub var_base: char,
    pub contig: String,
}

/// Aggregated evidence for one substitution within a single window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowVariant {
    pub frequency: f64,
    pub posterior: f64,
}

/// All substitutions called in one window.
pub type WindowVariants = BTreeMap<VariantKey, WindowVariant>;

/// Content of one of the three per-window slots of a consensus record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    Observed { frequency: f64, posterior: f64 },
    /// No window places this segment at the slot's offset.
    WindowAbsent,
    /// A window covers the segment but did not report the substitution.
    VariantAbsentDespiteCoverage,
}

impl Slot {
    pub const WINDOW_ABSENT_TOKEN: &'static str = "*";
    pub const NOT_OBSERVED_TOKEN: &'static str = "-";

    pub fn is_observed(&self) -> bool {
        matches!(self, Slot::Observed { .. })
    }

    pub fn frequency_field(&self) -> String {
        match self {
            Slot::Observed { frequency, .. } => format!("{:.4}", frequency),
            other => other.token().to_string(),
        }
    }

    pub fn posterior_field(&self) -> String {
        match self {
            Slot::Observed { posterior, .. } => format!("{:.4}", posterior),
            other => other.token().to_string(),
        }
    }

    fn token(&self) -> &'static str {
        match self {
            Slot::WindowAbsent => Self::WINDOW_ABSENT_TOKEN,
            Slot::VariantAbsentDespiteCoverage => Self::NOT_OBSERVED_TOKEN,
            Slot::Observed { .. } => "",
        }
    }
}

/// Merged view of one substitution across up to three overlapping windows.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusRecord {
    pub contig: String,
    pub position: u64,
    pub ref_base: char,
    pub var_base: char,
    pub slots: [Slot; 3],
}

impl ConsensusRecord {
    /// Number of windows that reported this substitution.
    pub fn support(&self) -> usize {
        self.slots.iter().filter(|s| s.is_observed()).count()
    }
}

/// Consensus table, iterated in key order.
pub type ConsensusTable = BTreeMap<VariantKey, ConsensusRecord>;

/// One row of a strand-bias output table with its corrected q-value.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalRow {
    pub fields: Vec<String>,
    pub p_value: f64,
    pub q_value: f64,
}
