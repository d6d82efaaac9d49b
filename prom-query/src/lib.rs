//! Prom-Query
//!
//! Prom-Query -- query contexts, error collection and retries for Prometheus compatible backends

mod client;
pub use client::{PromClient, PromClientBuilder};

pub mod config;
pub use config::PromConfig;

pub mod errors;
pub use errors::{PromError, Result};

mod collector;
pub use collector::{ErrorReport, QueryError, QueryErrorCollector, QueryWarning};

mod context;
pub use context::{
    ContextOptions, QueryContext, ALLOCATION_CONTEXT_NAME, CONTEXT_NAME_HEADER, QUERY_ENDPOINT,
    QUERY_HEADER, QUERY_RANGE_ENDPOINT,
};

mod decoder;
pub use decoder::{PromResultDecoder, QueryResult, ResultDecoder, Vector};

mod handle;
pub use handle::{QueryOutcome, QueryResults, QueryResultsHandle};

pub mod labels;

pub mod pod_metrics;

pub mod query_metrics;

pub mod retry;
pub use retry::{RetryError, RetryExecutor};

pub mod warnings;




#[cfg(test)]
mod pod_metrics_test;

#[cfg(test)]
mod retry_test;
