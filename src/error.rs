//! Error types for the import path.
//!
//! Errors are classified by recoverability: transport-level failures from the
//! Sheets API are retryable on a later poll cycle; contract violations in the
//! job definition (missing ranges, unresolvable columns) are not.

use thiserror::Error;

use crate::dashboard::DashboardError;
use crate::sheets::SheetsError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Sheets API: {0}")]
    Sheets(#[from] SheetsError),

    #[error("Missing source range")]
    MissingSourceRange,

    #[error("Missing sheetName or gid")]
    MissingSheetName,

    #[error("Header row not found for keepColumns")]
    HeaderRowMissing,

    #[error("Missing keepColumns in header row: {0}")]
    MissingKeepColumns(String),

    #[error("Dashboard: {0}")]
    Dashboard(#[from] DashboardError),
}

impl ImportError {
    /// True if a later attempt against the same job may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ImportError::Sheets(inner) if inner.is_retryable())
    }

    /// True if the job definition itself is at fault.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ImportError::MissingSourceRange
                | ImportError::MissingSheetName
                | ImportError::HeaderRowMissing
                | ImportError::MissingKeepColumns(_)
                | ImportError::Dashboard(_)
        )
    }
}
