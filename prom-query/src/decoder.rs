//! Turns a generic Prometheus JSON response into ordered [`QueryResult`]s.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::errors::{PromError, Result};

/// A single sample: unix timestamp in seconds and its value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Vector {
    pub timestamp: f64,
    pub value: f64,
}

/// One series of a query response, with its labels and samples.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub metric: BTreeMap<String, String>,
    pub values: Vec<Vector>,
    /// Verbatim content of a `string` result. Its sample value is NaN unless the
    /// text happens to be numeric.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl QueryResult {
    /// Returns the value of a label of the series.
    pub fn get_string(&self, field: &str) -> Result<&str> {
        self.metric
            .get(field)
            .map(String::as_str)
            .ok_or_else(|| PromError::MissingField(field.to_string()))
    }

    /// Returns all requested labels, failing on the first one that is missing.
    pub fn get_strings(&self, fields: &[&str]) -> Result<HashMap<String, String>> {
        fields
            .iter()
            .map(|f| self.get_string(f).map(|v| (f.to_string(), v.to_string())))
            .collect()
    }

    /// Labels exported with a `label_` prefix, with the prefix removed.
    pub fn get_labels(&self) -> BTreeMap<String, String> {
        self.prefixed("label_")
    }

    /// Annotations exported with an `annotation_` prefix, with the prefix removed.
    pub fn get_annotations(&self) -> BTreeMap<String, String> {
        self.prefixed("annotation_")
    }

    fn prefixed(&self, prefix: &str) -> BTreeMap<String, String> {
        self.metric
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix).map(|k| (k.to_string(), v.clone())))
            .collect()
    }
}

/// Decodes a generic JSON response body into results.
pub trait ResultDecoder: Send + Sync + fmt::Debug {
    fn decode(&self, query: &str, body: &Value) -> Result<Vec<QueryResult>>;
}

/// Decoder for the standard `/api/v1/query` and `/api/v1/query_range` payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct PromResultDecoder;

impl ResultDecoder for PromResultDecoder {
    fn decode(&self, query: &str, body: &Value) -> Result<Vec<QueryResult>> {
        let body = body
            .as_object()
            .ok_or_else(|| result_error(query, "response body is not an object"))?;

        if body.get("status").and_then(Value::as_str) == Some("error") {
            let error_type = body
                .get("errorType")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let message = body.get("error").and_then(Value::as_str).unwrap_or("");
            return Err(result_error(query, format!("{}: {}", error_type, message)));
        }

        let data = body
            .get("data")
            .and_then(Value::as_object)
            .ok_or_else(|| result_error(query, "'data' field does not exist in response"))?;
        let result = data
            .get("result")
            .ok_or_else(|| result_error(query, "'result' field does not exist in data"))?;

        match data.get("resultType").and_then(Value::as_str) {
            Some("scalar") => Ok(vec![QueryResult {
                metric: BTreeMap::new(),
                values: vec![decode_sample(query, result)?],
                text: None,
            }]),
            Some("string") => decode_string(query, result).map(|r| vec![r]),
            _ => result
                .as_array()
                .ok_or_else(|| result_error(query, "'result' field is not an array"))?
                .iter()
                .map(|series| decode_series(query, series))
                .collect(),
        }
    }
}

fn decode_series(query: &str, series: &Value) -> Result<QueryResult> {
    let series = series
        .as_object()
        .ok_or_else(|| result_error(query, "result entry is not an object"))?;

    let metric = series
        .get("metric")
        .and_then(Value::as_object)
        .map(decode_metric)
        .unwrap_or_default();

    let values = if let Some(value) = series.get("value") {
        vec![decode_sample(query, value)?]
    } else if let Some(values) = series.get("values") {
        values
            .as_array()
            .ok_or_else(|| result_error(query, "'values' field is not an array"))?
            .iter()
            .map(|v| decode_sample(query, v))
            .collect::<Result<Vec<_>>>()?
    } else {
        return Err(result_error(
            query,
            "neither 'value' nor 'values' exist in result entry",
        ));
    };

    Ok(QueryResult {
        metric,
        values,
        text: None,
    })
}

// String results are `[<unix seconds>, "<text>"]` where the text is arbitrary.
fn decode_string(query: &str, result: &Value) -> Result<QueryResult> {
    let (timestamp, raw) = sample_pair(query, result)?;
    Ok(QueryResult {
        metric: BTreeMap::new(),
        values: vec![Vector {
            timestamp,
            value: parse_sample_value(raw).unwrap_or(f64::NAN),
        }],
        text: Some(raw.to_string()),
    })
}

fn decode_metric(metric: &Map<String, Value>) -> BTreeMap<String, String> {
    metric
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
        .collect()
}

// Samples are `[<unix seconds>, "<value>"]`.
fn decode_sample(query: &str, sample: &Value) -> Result<Vector> {
    let (timestamp, raw) = sample_pair(query, sample)?;
    let value = parse_sample_value(raw)
        .ok_or_else(|| result_error(query, format!("unable to parse sample value '{}'", raw)))?;

    Ok(Vector { timestamp, value })
}

fn sample_pair<'a>(query: &str, sample: &'a Value) -> Result<(f64, &'a str)> {
    let pair = sample
        .as_array()
        .filter(|p| p.len() == 2)
        .ok_or_else(|| result_error(query, "sample is not a [timestamp, value] pair"))?;

    let timestamp = pair[0]
        .as_f64()
        .ok_or_else(|| result_error(query, "sample timestamp is not a number"))?;
    let raw = pair[1]
        .as_str()
        .ok_or_else(|| result_error(query, "sample value is not a string"))?;

    Ok((timestamp, raw))
}

fn parse_sample_value(raw: &str) -> Option<f64> {
    match raw {
        "NaN" => Some(f64::NAN),
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        other => other.parse::<f64>().ok(),
    }
}

fn result_error(query: &str, message: impl Into<String>) -> PromError {
    PromError::Result {
        query: query.to_string(),
        message: message.into(),
    }
}
