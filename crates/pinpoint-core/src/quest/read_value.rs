//! Extract measurements from a test's output isolate.
//!
//! The output isolate is a manifest `{"files": {name: {"h": digest}}}`; the
//! measurements live in the `chartjson-output.json` file it references, in
//! either chartjson or graphjson form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExecutionError, ExecutionResult};
use crate::services::IsolateStore;

/// Name of the results file inside the output isolate.
pub const CHARTJSON_OUTPUT: &str = "chartjson-output.json";

/// Largest number of samples a histogram expands to.
pub const MAX_HISTOGRAM_SAMPLES: u64 = 10_000;

/// Trace read when no trace is named.
const SUMMARY_TRACE: &str = "summary";

/// Read a chart's values from chartjson output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadChartJsonValue {
    chart: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tir_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

/// Read a single trace value from graphjson output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadGraphJsonValue {
    chart: String,
    trace: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    files: BTreeMap<String, FileRef>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    h: String,
}

#[derive(Debug, Deserialize)]
struct ChartJson {
    charts: BTreeMap<String, BTreeMap<String, Value>>,
}

/// A chartjson trace, discriminated by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChartValue {
    Scalar { value: f64 },
    ListOfScalarValues { values: Vec<f64> },
    Histogram { buckets: Vec<Bucket> },
}

#[derive(Debug, Clone, Deserialize)]
struct Bucket {
    low: f64,
    #[serde(default)]
    high: Option<f64>,
    count: u64,
}

impl Bucket {
    fn representative(&self) -> f64 {
        match self.high {
            Some(high) => (self.low + high) / 2.0,
            None => self.low,
        }
    }
}

impl ReadChartJsonValue {
    pub fn new(chart: impl Into<String>, tir_label: Option<String>, trace: Option<String>) -> Self {
        Self {
            chart: chart.into(),
            tir_label: tir_label.filter(|label| !label.is_empty()),
            trace: trace.filter(|trace| !trace.is_empty()),
        }
    }

    pub fn chart(&self) -> &str {
        &self.chart
    }

    pub fn tir_label(&self) -> Option<&str> {
        self.tir_label.as_deref()
    }

    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Key of the chart in the `charts` map: `tir_label@@chart` or `chart`.
    fn chart_key(&self) -> String {
        match &self.tir_label {
            Some(label) => format!("{label}@@{}", self.chart),
            None => self.chart.clone(),
        }
    }

    /// Values of the chart's trace in the output isolate `isolate_hash`.
    pub async fn values(
        &self,
        isolate_hash: &str,
        store: &dyn IsolateStore,
    ) -> ExecutionResult<Vec<f64>> {
        let data = retrieve_output(isolate_hash, store).await?;
        let chartjson: ChartJson = serde_json::from_slice(&data)
            .map_err(|e| ExecutionError::UnsupportedValue(format!("chartjson: {e}")))?;

        let chart_key = self.chart_key();
        let chart = chartjson
            .charts
            .get(&chart_key)
            .ok_or_else(|| ExecutionError::ChartMissing(chart_key.clone()))?;
        let trace_key = self.trace.as_deref().unwrap_or(SUMMARY_TRACE);
        let trace = chart
            .get(trace_key)
            .ok_or_else(|| ExecutionError::TraceMissing {
                chart: chart_key.clone(),
                trace: trace_key.to_string(),
            })?;

        let value = ChartValue::deserialize(trace)
            .map_err(|e| ExecutionError::UnsupportedValue(format!("{chart_key}/{trace_key}: {e}")))?;
        Ok(chart_values(value))
    }
}

impl ReadGraphJsonValue {
    pub fn new(chart: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            chart: chart.into(),
            trace: trace.into(),
        }
    }

    pub fn chart(&self) -> &str {
        &self.chart
    }

    pub fn trace(&self) -> &str {
        &self.trace
    }

    pub async fn values(
        &self,
        isolate_hash: &str,
        store: &dyn IsolateStore,
    ) -> ExecutionResult<Vec<f64>> {
        let data = retrieve_output(isolate_hash, store).await?;
        let graphjson: Value = serde_json::from_slice(&data)
            .map_err(|e| ExecutionError::UnsupportedValue(format!("graphjson: {e}")))?;

        let chart = graphjson
            .get(&self.chart)
            .ok_or_else(|| ExecutionError::ChartMissing(self.chart.clone()))?;
        let trace = chart
            .get("traces")
            .and_then(|traces| traces.get(&self.trace))
            .ok_or_else(|| ExecutionError::TraceMissing {
                chart: self.chart.clone(),
                trace: self.trace.clone(),
            })?;

        // [value, stddev]; only the value is used.
        let value = trace
            .get(0)
            .and_then(graph_number)
            .ok_or_else(|| ExecutionError::UnsupportedValue(format!("{}/{}: {trace}", self.chart, self.trace)))?;
        Ok(vec![value])
    }
}

/// Fetch the output manifest, then the results file it names.
async fn retrieve_output(isolate_hash: &str, store: &dyn IsolateStore) -> ExecutionResult<Vec<u8>> {
    let manifest = store.retrieve(isolate_hash).await?;
    let manifest: Manifest = serde_json::from_slice(&manifest)
        .map_err(|e| ExecutionError::UnsupportedValue(format!("output manifest: {e}")))?;
    let file = manifest
        .files
        .get(CHARTJSON_OUTPUT)
        .ok_or_else(|| ExecutionError::FileMissing(CHARTJSON_OUTPUT.to_string()))?;
    Ok(store.retrieve(&file.h).await?)
}

fn graph_number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn chart_values(value: ChartValue) -> Vec<f64> {
    match value {
        ChartValue::Scalar { value } => vec![value],
        ChartValue::ListOfScalarValues { values } => values,
        ChartValue::Histogram { buckets } => histogram_samples(&buckets, MAX_HISTOGRAM_SAMPLES),
    }
}

/// Expand buckets into samples, scaling counts down to at most `cap` samples.
///
/// Counts are apportioned by largest remainder; equal remainders favour the
/// earlier bucket.
fn histogram_samples(buckets: &[Bucket], cap: u64) -> Vec<f64> {
    let counts: Vec<u64> = buckets.iter().map(|b| b.count).collect();
    let counts = apportion(&counts, cap);
    buckets
        .iter()
        .zip(counts)
        .flat_map(|(bucket, count)| std::iter::repeat(bucket.representative()).take(count as usize))
        .collect()
}

fn apportion(counts: &[u64], cap: u64) -> Vec<u64> {
    let total: u128 = counts.iter().map(|&c| u128::from(c)).sum();
    if total <= u128::from(cap) {
        return counts.to_vec();
    }

    let cap = u128::from(cap);
    let mut shares: Vec<u64> = Vec::with_capacity(counts.len());
    let mut remainders: Vec<(usize, u128)> = Vec::with_capacity(counts.len());
    for (index, &count) in counts.iter().enumerate() {
        let scaled = u128::from(count) * cap;
        // Each share is at most `cap`, which came from a u64.
        shares.push((scaled / total) as u64);
        remainders.push((index, scaled % total));
    }

    let assigned: u128 = shares.iter().map(|&s| u128::from(s)).sum();
    let leftover = (cap - assigned) as usize;
    // Stable sort keeps earlier buckets first among equal remainders.
    remainders.sort_by(|a, b| b.1.cmp(&a.1));
    for &(index, _) in remainders.iter().take(leftover) {
        shares[index] += 1;
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(low: f64, high: Option<f64>, count: u64) -> Bucket {
        Bucket { low, high, count }
    }

    #[test]
    fn test_chart_key() {
        let quest = ReadChartJsonValue::new("chart", Some("tir_label".to_string()), None);
        assert_eq!(quest.chart_key(), "tir_label@@chart");
        let quest = ReadChartJsonValue::new("chart", Some(String::new()), Some(String::new()));
        assert_eq!(quest.chart_key(), "chart");
        assert!(quest.trace().is_none());
    }

    #[test]
    fn test_histogram_representatives() {
        let samples = histogram_samples(
            &[bucket(0.0, None, 2), bucket(0.0, Some(2.0), 3)],
            MAX_HISTOGRAM_SAMPLES,
        );
        assert_eq!(samples, vec![0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_apportion_exact_scaling() {
        assert_eq!(apportion(&[20_000, 30_000], 10_000), vec![4_000, 6_000]);
    }

    #[test]
    fn test_apportion_largest_remainder() {
        // 10 * 3/11 = 2.72, 10 * 8/11 = 7.27: the larger remainder wins.
        assert_eq!(apportion(&[3, 8], 10), vec![3, 7]);
        // Equal remainders: earlier bucket gets the extra sample.
        assert_eq!(apportion(&[1, 1, 1], 2), vec![1, 1, 0]);
    }

    #[test]
    fn test_apportion_under_cap_untouched() {
        assert_eq!(apportion(&[5, 0, 7], 100), vec![5, 0, 7]);
        assert_eq!(apportion(&[], 100), Vec::<u64>::new());
    }

    #[test]
    fn test_apportion_never_exceeds_cap() {
        let shares = apportion(&[7, 13, 29, 31, 97], 50);
        assert_eq!(shares.iter().sum::<u64>(), 50);
    }

    #[test]
    fn test_graph_number() {
        assert_eq!(graph_number(&Value::from("126444.869721")), Some(126444.869721));
        assert_eq!(graph_number(&Value::from(3)), Some(3.0));
        assert_eq!(graph_number(&Value::from("n/a")), None);
    }
}
