//! Report output port.

use crate::domain::error::ScoretraderError;
use crate::domain::ledger::LedgerReport;

/// Port for writing ledger reports.
pub trait ReportPort {
    fn write(&self, report: &LedgerReport, output_path: &str) -> Result<(), ScoretraderError>;
}
