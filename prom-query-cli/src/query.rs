use anyhow::{bail, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::Args;
use metrics_exporter_prometheus::PrometheusBuilder;
use prom_query::config::parse_duration;
use prom_query::query_metrics::register_metrics;
use prom_query::{QueryContext, QueryResult, QueryResults};
use std::time::Duration;
use tracing::info;

use crate::ConnectionArgs;

#[derive(Debug, Args)]
pub(crate) struct QueryArgs {
    #[arg(required = true, help = "PromQL expressions, run concurrently")]
    queries: Vec<String>,
    #[arg(long, default_value_t = false, help = "Log and print the latency of every query")]
    profile: bool,
    #[arg(long, value_parser = ["json"], help = "Output format: json (default: text)")]
    output: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct RangeWindow {
    #[arg(long, value_parser = parse_time, help = "Range start, RFC3339 (default: end - 1h)")]
    start: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_time, help = "Range end, RFC3339 (default: now)")]
    end: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_step, default_value = "60s", help = "Resolution step (e.g. 15s, 5m)")]
    step: Duration,
}

impl RangeWindow {
    fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let end = self.end.unwrap_or_else(Utc::now);
        let start = self.start.unwrap_or(end - TimeDelta::hours(1));
        if start > end {
            bail!("range start {} is after end {}", start, end);
        }
        Ok((start, end))
    }
}

#[derive(Debug, Args)]
pub(crate) struct RangeArgs {
    #[arg(help = "PromQL expression")]
    query: String,
    #[command(flatten)]
    window: RangeWindow,
    #[arg(long, value_parser = ["json"], help = "Output format: json (default: text)")]
    output: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct RawArgs {
    #[arg(help = "PromQL expression")]
    query: String,
    #[arg(long, default_value_t = false, help = "Send a range query instead of an instant one")]
    range: bool,
    #[command(flatten)]
    window: RangeWindow,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC3339 time '{}': {}", value, e))
}

fn parse_step(value: &str) -> Result<Duration, String> {
    match parse_duration(value) {
        Ok(step) if !step.is_zero() => Ok(step),
        Ok(_) => Err("step must be greater than zero".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

pub(crate) async fn handle_query(connection: &ConnectionArgs, args: QueryArgs) -> Result<()> {
    let ctx = connection.context()?;

    let (handles, latencies) = if args.profile {
        let recorder = PrometheusBuilder::new().install_recorder()?;
        register_metrics();
        (ctx.profile_query_all(args.queries), Some(recorder))
    } else {
        (ctx.query_all(args.queries), None)
    };

    let mut all = Vec::with_capacity(handles.len());
    for handle in handles {
        all.push(handle.read().await);
    }

    let json = matches!(args.output.as_deref(), Some("json"));
    for results in &all {
        print_results(results, json)?;
    }
    if let Some(recorder) = latencies {
        print!("{}", recorder.render());
    }

    finish(&ctx)
}

pub(crate) async fn handle_range(connection: &ConnectionArgs, args: RangeArgs) -> Result<()> {
    let ctx = connection.context()?;
    let (start, end) = args.window.bounds()?;
    info!(query = %args.query, %start, %end, step = ?args.window.step, "running range query");

    let outcome = ctx
        .query_range_sync(&args.query, start, end, args.window.step)
        .await;
    for warning in &outcome.warnings {
        println!("warning: {}", warning);
    }

    let results = outcome.results?;
    if matches!(args.output.as_deref(), Some("json")) {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("{}", args.query);
        print_series(&results);
    }

    finish(&ctx)
}

pub(crate) async fn handle_raw(connection: &ConnectionArgs, args: RawArgs) -> Result<()> {
    let ctx = connection.context()?;

    let body = if args.range {
        let (start, end) = args.window.bounds()?;
        ctx.raw_query_range(&args.query, start, end, args.window.step)
            .await?
    } else {
        ctx.raw_query(&args.query).await?
    };

    println!("{}", String::from_utf8_lossy(&body));
    Ok(())
}

fn print_results(results: &QueryResults, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "query": results.query,
            "warnings": results.warnings,
            "error": results.error.as_ref().map(|e| e.to_string()),
            "results": results.results,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", results.query);
    for warning in &results.warnings {
        println!("  warning: {}", warning);
    }
    match &results.error {
        Some(e) => println!("  error: {}", e),
        None => print_series(&results.results),
    }
    Ok(())
}

fn print_series(series: &[QueryResult]) {
    if series.is_empty() {
        println!("  (no data)");
    }
    for s in series {
        let labels: Vec<String> = s
            .metric
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        println!("  {{{}}}", labels.join(", "));
        if let Some(text) = &s.text {
            println!("    \"{}\"", text);
        }
        for sample in &s.values {
            println!("    {} @ {}", sample.value, sample.timestamp);
        }
    }
}

fn finish(ctx: &QueryContext) -> Result<()> {
    if let Err(report) = ctx.error_collection() {
        return Err(report.into());
    }
    Ok(())
}
