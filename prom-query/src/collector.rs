use serde::Serialize;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::PromError;

/// A backend warning attached to the query that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryWarning {
    pub query: String,
    pub message: String,
}

/// A hard failure attached to the query that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryError {
    pub query: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct Records {
    warnings: Vec<QueryWarning>,
    errors: Vec<QueryError>,
}

/// Append-only record of every warning and error seen by a query context.
///
/// Many query tasks report into the same collector concurrently; it is never reset.
#[derive(Debug, Default)]
pub struct QueryErrorCollector {
    records: RwLock<Records>,
}

impl QueryErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of a single query. Missing errors and an empty warning list
    /// are ignored, so this can be called unconditionally after every query.
    pub fn report(
        &self,
        query: &str,
        warnings: &[String],
        request_error: Option<&PromError>,
        parse_error: Option<&PromError>,
    ) {
        if warnings.is_empty() && request_error.is_none() && parse_error.is_none() {
            return;
        }

        let mut records = self.write();
        records
            .warnings
            .extend(warnings.iter().map(|w| QueryWarning {
                query: query.to_string(),
                message: w.clone(),
            }));
        records.errors.extend(
            [request_error, parse_error]
                .into_iter()
                .flatten()
                .map(|e| QueryError {
                    query: query.to_string(),
                    message: e.to_string(),
                }),
        );
    }

    pub fn warnings(&self) -> Vec<QueryWarning> {
        self.read().warnings.clone()
    }

    pub fn errors(&self) -> Vec<QueryError> {
        self.read().errors.clone()
    }

    pub fn is_warning(&self) -> bool {
        !self.read().warnings.is_empty()
    }

    pub fn is_error(&self) -> bool {
        !self.read().errors.is_empty()
    }

    /// Point-in-time copy of everything recorded so far.
    pub fn report_snapshot(&self) -> ErrorReport {
        let records = self.read();
        ErrorReport {
            warnings: records.warnings.clone(),
            errors: records.errors.clone(),
        }
    }

    // A panic while holding the lock cannot leave the vectors half-written, so a
    // poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, Records> {
        self.records.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Records> {
        self.records.write().unwrap_or_else(|p| p.into_inner())
    }
}

/// Structured view of a collector that also renders as one combined error message.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ErrorReport {
    pub warnings: Vec<QueryWarning>,
    pub errors: Vec<QueryError>,
}

impl ErrorReport {
    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "no error");
        }
        writeln!(f, "Error Collection:")?;
        for e in &self.errors {
            writeln!(f, "Query: {}, Error: {}", e.query, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorReport {}
