use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error};
use url::Url;

use crate::{
    client::{header_string, PromClient},
    collector::{ErrorReport, QueryError, QueryErrorCollector, QueryWarning},
    config::PromConfig,
    decoder::{PromResultDecoder, ResultDecoder},
    errors::{PromError, Result},
    handle::{QueryOutcome, QueryResults, QueryResultsHandle},
    query_metrics::profile,
    warnings::{classify_warnings, warnings_from},
};

/// Contexts with this name always query at the current time, ignoring the offset.
pub const ALLOCATION_CONTEXT_NAME: &str = "allocation";

pub const QUERY_ENDPOINT: &str = "/api/v1/query";
pub const QUERY_RANGE_ENDPOINT: &str = "/api/v1/query_range";

/// Carries the context name on outgoing requests.
pub const CONTEXT_NAME_HEADER: &str = "x-prom-query-context";
/// Carries the form-urlencoded query text on outgoing requests.
pub const QUERY_HEADER: &str = "x-prom-query";

/// Options applied when building a [`QueryContext`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    name: Option<String>,
    query_offset: Duration,
    decoder: Option<Arc<dyn ResultDecoder>>,
}

impl ContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a loaded configuration (name and query offset).
    pub fn from_config(config: &PromConfig) -> Result<Self> {
        Ok(Self {
            name: config.context_name.clone(),
            query_offset: config.query_offset()?,
            decoder: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Instant queries are evaluated this far in the past.
    pub fn with_query_offset(mut self, offset: Duration) -> Self {
        self.query_offset = offset;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ResultDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) enum QueryKind {
    Instant,
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    },
}

#[derive(Debug)]
struct ContextInner {
    client: PromClient,
    name: String,
    query_offset: Duration,
    decoder: Arc<dyn ResultDecoder>,
    error_collector: QueryErrorCollector,
}

/// Issues queries against one backend and keeps a record of every warning and error
/// they produced.
///
/// Clones share the same client and the same error collector. The asynchronous entry
/// points spawn a task per query and must be called from within a Tokio runtime.
#[derive(Debug, Clone)]
pub struct QueryContext {
    inner: Arc<ContextInner>,
}

impl QueryContext {
    pub fn new(client: PromClient) -> Self {
        Self::with_options(client, ContextOptions::default())
    }

    /// Creates a context whose name tags every outgoing request.
    pub fn named(client: PromClient, name: impl Into<String>) -> Self {
        Self::with_options(client, ContextOptions::new().with_name(name))
    }

    pub fn with_options(client: PromClient, options: ContextOptions) -> Self {
        let decoder = options
            .decoder
            .unwrap_or_else(|| Arc::new(PromResultDecoder));

        QueryContext {
            inner: Arc::new(ContextInner {
                client,
                name: options.name.unwrap_or_default(),
                query_offset: options.query_offset,
                decoder,
                error_collector: QueryErrorCollector::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn query_offset(&self) -> Duration {
        self.inner.query_offset
    }

    pub fn client(&self) -> &PromClient {
        &self.inner.client
    }

    /// Warnings collected from every query issued through this context.
    pub fn warnings(&self) -> Vec<QueryWarning> {
        self.inner.error_collector.warnings()
    }

    pub fn has_warnings(&self) -> bool {
        self.inner.error_collector.is_warning()
    }

    /// Errors collected from every query issued through this context.
    pub fn errors(&self) -> Vec<QueryError> {
        self.inner.error_collector.errors()
    }

    pub fn has_errors(&self) -> bool {
        self.inner.error_collector.is_error()
    }

    /// Returns the aggregated report as an error once at least one query has failed.
    pub fn error_collection(&self) -> std::result::Result<(), ErrorReport> {
        let report = self.inner.error_collector.report_snapshot();
        if report.is_error() {
            Err(report)
        } else {
            Ok(())
        }
    }

    /// Runs an instant query in its own task. The results are delivered on the
    /// returned handle.
    pub fn query(&self, query: impl Into<String>) -> QueryResultsHandle {
        self.spawn(query.into(), QueryKind::Instant, None)
    }

    /// Same as [`query`](Self::query), additionally recording the latency under `label`.
    pub fn profile_query(
        &self,
        query: impl Into<String>,
        label: impl Into<String>,
    ) -> QueryResultsHandle {
        self.spawn(query.into(), QueryKind::Instant, Some(label.into()))
    }

    /// Runs every query concurrently. Handle `i` receives the results of query `i`.
    pub fn query_all<I, S>(&self, queries: I) -> Vec<QueryResultsHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        queries.into_iter().map(|q| self.query(q)).collect()
    }

    /// Profiled [`query_all`](Self::query_all); query `i` is labeled `Query #i`, from 1.
    pub fn profile_query_all<I, S>(&self, queries: I) -> Vec<QueryResultsHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        queries
            .into_iter()
            .enumerate()
            .map(|(i, q)| self.profile_query(q, format!("Query #{}", i + 1)))
            .collect()
    }

    /// Runs an instant query and waits for it.
    pub async fn query_sync(&self, query: &str) -> QueryOutcome {
        self.execute(query, &QueryKind::Instant).await
    }

    /// Runs a range query over `[start, end]` at `step` resolution in its own task.
    pub fn query_range(
        &self,
        query: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> QueryResultsHandle {
        self.spawn(query.into(), QueryKind::Range { start, end, step }, None)
    }

    pub fn profile_query_range(
        &self,
        query: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        label: impl Into<String>,
    ) -> QueryResultsHandle {
        self.spawn(
            query.into(),
            QueryKind::Range { start, end, step },
            Some(label.into()),
        )
    }

    /// Runs a range query and waits for it.
    pub async fn query_range_sync(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> QueryOutcome {
        self.execute(query, &QueryKind::Range { start, end, step })
            .await
    }

    /// Sends an instant query and returns the undecoded response body.
    pub async fn raw_query(&self, query: &str) -> Result<Bytes> {
        self.raw(query, &QueryKind::Instant).await
    }

    /// Sends a range query and returns the undecoded response body.
    pub async fn raw_query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Bytes> {
        self.raw(query, &QueryKind::Range { start, end, step })
            .await
    }

    /// The URL used for instant queries.
    pub fn query_url(&self) -> Url {
        self.inner.client.url(QUERY_ENDPOINT)
    }

    /// The URL used for range queries.
    pub fn query_range_url(&self) -> Url {
        self.inner.client.url(QUERY_RANGE_ENDPOINT)
    }

    fn spawn(
        &self,
        query: String,
        kind: QueryKind,
        profile_label: Option<String>,
    ) -> QueryResultsHandle {
        let (sender, receiver) = oneshot::channel();
        let ctx = self.clone();
        let task_query = query.clone();

        tokio::spawn(async move {
            let start = Instant::now();

            // a panic in this query must become its own error, not take down the runtime
            let outcome = match AssertUnwindSafe(ctx.execute(&task_query, &kind))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let error = PromError::TaskFailed {
                        query: task_query.clone(),
                        message: panic_message(panic.as_ref()),
                    };
                    error!(query = %task_query, error = %error, "query task panicked");
                    ctx.inner
                        .error_collector
                        .report(&task_query, &[], Some(&error), None);
                    QueryOutcome::failed(error, Vec::new())
                }
            };

            if let Some(label) = profile_label {
                profile(start, &label);
            }

            if sender.send(QueryResults::new(task_query, outcome)).is_err() {
                debug!("query handle dropped before results were delivered");
            }
        });

        QueryResultsHandle::new(query, receiver)
    }

    /// Fetches, classifies, decodes and reports a single query.
    async fn execute(&self, query: &str, kind: &QueryKind) -> QueryOutcome {
        let collector = &self.inner.error_collector;

        let (body, warnings) = self.fetch(query, kind).await;
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                collector.report(query, &warnings, Some(&e), None);
                return QueryOutcome::failed(e, warnings);
            }
        };

        match self.inner.decoder.decode(query, &body) {
            Ok(results) => {
                collector.report(query, &warnings, None, None);
                QueryOutcome {
                    results: Ok(results),
                    warnings,
                }
            }
            Err(e) => {
                collector.report(query, &warnings, None, Some(&e));
                QueryOutcome::failed(e, warnings)
            }
        }
    }

    async fn fetch(&self, query: &str, kind: &QueryKind) -> (Result<Value>, Vec<String>) {
        let body = match self.raw(query, kind).await {
            Ok(body) => body,
            Err(e) => return (Err(e), Vec::new()),
        };

        let value: Value = match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(source) => {
                let error = PromError::Decode {
                    query: query.to_string(),
                    source,
                };
                return (Err(error), Vec::new());
            }
        };

        let warnings = warnings_from(&value);
        match classify_warnings(query, &body, &warnings) {
            Ok(()) => (Ok(value), warnings),
            Err(e) => (Err(e), warnings),
        }
    }

    async fn raw(&self, query: &str, kind: &QueryKind) -> Result<Bytes> {
        let url = self.request_url(query, kind);
        let headers = self.request_headers(query);

        let response = match self
            .inner
            .client
            .post(url.clone(), headers.clone())
            .await
        {
            Ok(response) => response,
            Err(failure) => {
                let message = match failure.status {
                    Some(status) => format!("{} (status {})", failure.error, status.as_u16()),
                    None => failure.error.to_string(),
                };
                return Err(PromError::Request {
                    query: query.to_string(),
                    message,
                });
            }
        };

        let status = response.status;
        if !status.is_success() {
            return Err(PromError::Status(format!(
                "{} ({}) URL: '{}', Request Headers: '{}', Headers: '{}', Body: '{}' Query: '{}'",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
                url,
                header_string(&headers),
                header_string(&response.headers),
                String::from_utf8_lossy(&response.body),
                query
            )));
        }

        Ok(response.body)
    }

    pub(crate) fn request_url(&self, query: &str, kind: &QueryKind) -> Url {
        match kind {
            QueryKind::Instant => {
                let mut url = self.query_url();
                let time = self
                    .evaluation_time()
                    .to_rfc3339_opts(SecondsFormat::Secs, true);
                url.query_pairs_mut()
                    .append_pair("query", query)
                    .append_pair("time", &time);
                url
            }
            QueryKind::Range { start, end, step } => {
                let mut url = self.query_range_url();
                url.query_pairs_mut()
                    .append_pair("query", query)
                    .append_pair("start", &start.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                    .append_pair("end", &end.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                    .append_pair("step", &format!("{:.3}", step.as_secs_f64()));
                url
            }
        }
    }

    // Backends with delayed ingestion (thanos, cortex, ...) are queried in the past,
    // except by the allocation context which cannot tolerate the skew.
    fn evaluation_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        if self.inner.query_offset.is_zero() || self.inner.name == ALLOCATION_CONTEXT_NAME {
            return now;
        }

        TimeDelta::from_std(self.inner.query_offset)
            .ok()
            .and_then(|offset| now.checked_sub_signed(offset))
            .unwrap_or(now)
    }

    fn request_headers(&self, query: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if !self.inner.name.is_empty() {
            match HeaderValue::from_str(&self.inner.name) {
                Ok(value) => {
                    headers.insert(CONTEXT_NAME_HEADER, value);
                }
                Err(_) => debug!(name = %self.inner.name, "context name is not a valid header value"),
            }
        }

        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        if let Ok(value) = HeaderValue::from_str(&encoded) {
            headers.insert(QUERY_HEADER, value);
        }

        headers
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
