use tokio::sync::oneshot;

use crate::decoder::QueryResult;
use crate::errors::{PromError, Result};

/// Everything produced by one asynchronously executed query.
#[derive(Debug)]
pub struct QueryResults {
    pub query: String,
    pub results: Vec<QueryResult>,
    pub warnings: Vec<String>,
    pub error: Option<PromError>,
}

impl QueryResults {
    pub(crate) fn new(query: String, outcome: QueryOutcome) -> Self {
        let (results, error) = match outcome.results {
            Ok(results) => (results, None),
            Err(e) => (Vec::new(), Some(e)),
        };
        Self {
            query,
            results,
            warnings: outcome.warnings,
            error,
        }
    }

    /// Drops the warnings and returns either the results or the error.
    pub fn into_result(self) -> Result<Vec<QueryResult>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.results),
        }
    }
}

/// Outcome of an inline query: decoded results or an error, never both, plus any
/// soft warnings the backend returned.
#[derive(Debug)]
pub struct QueryOutcome {
    pub results: Result<Vec<QueryResult>>,
    pub warnings: Vec<String>,
}

impl QueryOutcome {
    pub(crate) fn failed(error: PromError, warnings: Vec<String>) -> Self {
        Self {
            results: Err(error),
            warnings,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.results.is_ok()
    }
}

/// Receiving end of a query started with [`QueryContext::query`](crate::QueryContext::query).
///
/// Exactly one [`QueryResults`] is ever delivered. Reading consumes the handle;
/// dropping it unread discards the result.
#[derive(Debug)]
pub struct QueryResultsHandle {
    query: String,
    receiver: oneshot::Receiver<QueryResults>,
}

impl QueryResultsHandle {
    pub(crate) fn new(query: String, receiver: oneshot::Receiver<QueryResults>) -> Self {
        Self { query, receiver }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Waits for the query to complete.
    pub async fn read(self) -> QueryResults {
        match self.receiver.await {
            Ok(results) => results,
            Err(_) => {
                let error = PromError::TaskFailed {
                    query: self.query.clone(),
                    message: "query task ended without delivering results".to_string(),
                };
                QueryResults::new(self.query, QueryOutcome::failed(error, Vec::new()))
            }
        }
    }

    /// Waits for the query to complete and returns its results or error.
    pub async fn await_results(self) -> Result<Vec<QueryResult>> {
        self.read().await.into_result()
    }
}
