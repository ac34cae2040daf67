//! Directory usage report over the mirror.
//!
//! Aggregation happens in SQL ([`crate::store::MirrorStore::directory_usage`]);
//! this module turns the raw rows into percentages of the grand total and
//! the cumulative coverage figure, and renders the report.

use std::fmt::Write as _;

use crate::store::DirUsage;

/// One reported directory.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRow {
    /// Directory path.
    pub path: String,
    /// Aggregate file size in whole megabytes.
    pub size_mb: u64,
    /// Share of the grand total, in percent.
    pub percent: f64,
}

/// The assembled usage report.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    /// Reported directories, largest first.
    pub rows: Vec<UsageRow>,
    /// Grand total over every mirrored file, in megabytes.
    pub total_mb: u64,
    /// Share of the grand total covered by the reported rows, in percent.
    pub covered_percent: f64,
}

impl UsageReport {
    /// Build a report from the store's usage rows and the grand total.
    ///
    /// An empty mirror yields an empty report with zero percentages.
    #[must_use]
    pub fn build(rows: Vec<DirUsage>, total_mb: u64) -> Self {
        let percent_of_total = |mb: u64| {
            if total_mb == 0 {
                0.0
            } else {
                mb as f64 * 100.0 / total_mb as f64
            }
        };

        let covered_mb: u64 = rows.iter().map(|r| r.size_mb).sum();
        let rows = rows
            .into_iter()
            .map(|r| UsageRow {
                percent: percent_of_total(r.size_mb),
                path: r.path,
                size_mb: r.size_mb,
            })
            .collect();

        Self {
            rows,
            total_mb,
            covered_percent: percent_of_total(covered_mb),
        }
    }

    /// Render the report as console text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{}: {} MB = {:.1}%",
                row.path, row.size_mb, row.percent
            );
        }
        let _ = writeln!(
            out,
            "Query covered {:.1}% out of {} MB of indexed files.",
            self.covered_percent, self.total_mb
        );
        out
    }
}
