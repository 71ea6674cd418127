//! The aggregated result of one pipeline run.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use uref_graph::EdgeDelta;
use uref_graph::UpdaterStats;
use uref_guid::Guid;
use uref_parser::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Full,
    Incremental,
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

/// A per-entry filesystem failure, kept as text so the report serializes.
#[derive(Debug, Clone, Serialize)]
pub struct IoErrorRecord {
    pub path: String,
    pub message: String,
}

/// An edge that could not be resolved to a known target GUID.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveWarning {
    pub source_path: String,
    pub target: Guid,
    pub context_path: Option<String>,
    pub reason: String,
}

/// Everything a scan wants to tell its caller. Errors are accumulated, never
/// thrown: an entry here did not abort the scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: u64,
    pub mode: ScanMode,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub cancelled: bool,

    pub files_walked: usize,
    pub files_skipped_large: usize,
    /// Change classification counts, keyed `new/modified/unchanged/deleted`.
    pub changes: BTreeMap<String, usize>,
    pub files_parsed: usize,
    pub fallback_documents: usize,

    pub transactions_committed: usize,
    pub transactions_failed: usize,
    pub nodes_upserted: usize,
    pub nodes_deactivated: usize,
    pub edges: EdgeDelta,
    /// GUIDs whose node or edge set changed; feeds incremental cycle
    /// analysis.
    pub changed_guids: Vec<Guid>,

    pub io_errors: Vec<IoErrorRecord>,
    pub parse_errors: Vec<ParseError>,
    pub resolve_warnings: Vec<ResolveWarning>,
    pub conflicts: Vec<String>,

    pub updater_stats: UpdaterStats,
}

impl ScanReport {
    #[must_use]
    pub fn new(scan_id: u64, mode: ScanMode) -> Self {
        Self {
            scan_id,
            mode,
            started_at: Utc::now(),
            duration_ms: 0,
            cancelled: false,
            files_walked: 0,
            files_skipped_large: 0,
            changes: BTreeMap::new(),
            files_parsed: 0,
            fallback_documents: 0,
            transactions_committed: 0,
            transactions_failed: 0,
            nodes_upserted: 0,
            nodes_deactivated: 0,
            edges: EdgeDelta::default(),
            changed_guids: Vec::new(),
            io_errors: Vec::new(),
            parse_errors: Vec::new(),
            resolve_warnings: Vec::new(),
            conflicts: Vec::new(),
            updater_stats: UpdaterStats::default(),
        }
    }

    /// True when the pipeline performed no graph mutation.
    #[must_use]
    pub fn is_no_op(&self) -> bool {
        self.nodes_upserted == 0 && self.nodes_deactivated == 0 && self.edges.added == 0 && self.edges.removed == 0 && self.edges.updated == 0
    }

    /// Error counts by kind, for the CLI's final summary line.
    #[must_use]
    pub fn error_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();

        if !self.io_errors.is_empty() {
            counts.insert("io".to_string(), self.io_errors.len());
        }

        for error in &self.parse_errors {
            *counts.entry(format!("parse/{}", error.kind)).or_insert(0) += 1;
        }

        if !self.resolve_warnings.is_empty() {
            counts.insert("resolve".to_string(), self.resolve_warnings.len());
        }

        if !self.conflicts.is_empty() {
            counts.insert("conflict".to_string(), self.conflicts.len());
        }

        counts
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.io_errors.is_empty() || !self.parse_errors.is_empty() || !self.conflicts.is_empty()
    }
}
