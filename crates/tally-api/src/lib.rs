use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tally_core::{evaluate, CalcError, CalculationRecord};
use tally_store_sqlite::HistoryStore;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The submitted expression could not be evaluated. The caller is at
    /// fault; nothing was appended to history.
    #[error(transparent)]
    Eval(#[from] CalcError),
    /// The history store failed; the calculation outcome is unknown to the
    /// caller and should be retried.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalculateRequest {
    pub expression: String,
}

/// The two public operations of the calculation service: evaluate an
/// expression (appending the outcome to history) and list the history.
#[derive(Debug, Clone)]
pub struct CalculatorApi {
    db_path: PathBuf,
}

impl CalculatorApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn open_store(&self) -> Result<HistoryStore, ApiError> {
        let mut store = HistoryStore::open(&self.db_path)?;
        store.migrate()?;
        Ok(store)
    }

    /// Evaluate one expression and append the result to history.
    ///
    /// # Errors
    /// Returns [`ApiError::Eval`] when the expression is malformed or divides
    /// by zero (no record is appended), and [`ApiError::Storage`] when
    /// persistence fails.
    pub fn calculate(&self, input: CalculateRequest) -> Result<CalculationRecord, ApiError> {
        let mut store = self.open_store()?;
        let result = evaluate(&input.expression)?;
        let record = CalculationRecord::new(input.expression, result);
        store.append(&record)?;
        Ok(record)
    }

    /// List every past calculation in chronological order, oldest first.
    ///
    /// # Errors
    /// Returns [`ApiError::Storage`] when the history cannot be read.
    pub fn history(&self) -> Result<Vec<CalculationRecord>, ApiError> {
        let store = self.open_store()?;
        Ok(store.list()?)
    }
}
