//! Build a quest pipeline from a flat request.
//!
//! The `target` selects the pipeline family. Each stage builder either
//! consumes its fields and produces a quest, rejects the request when a
//! required field is missing, or yields nothing when its optional triggering
//! field is absent. In the last case the pipeline stops there and the shorter
//! pipeline is returned.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{QuestError, QuestResult};
use crate::quest::read_value::CHARTJSON_OUTPUT;
use crate::quest::{FindIsolate, Quest, ReadChartJsonValue, ReadGraphJsonValue, RunTest};
use crate::services::Dimension;

/// Targets that run Telemetry benchmarks and emit chartjson.
pub const TELEMETRY_TARGETS: &[&str] = &["telemetry_perf_tests", "telemetry_perf_webview_tests"];

pub const DEFAULT_REPEAT_COUNT: u32 = 20;

/// Request fields consumed, and the pipeline they describe.
pub type GeneratedQuests = (BTreeMap<String, String>, Vec<Quest>);

type Request = BTreeMap<String, String>;
type StageBuilder = fn(&Request) -> QuestResult<Option<(Request, Quest)>>;

/// Generate the pipeline for `request`.
///
/// Returns the request fields actually used alongside the quests.
pub fn generate_quests(request: &Request) -> QuestResult<GeneratedQuests> {
    let telemetry = field(request, "target").is_some_and(|t| TELEMETRY_TARGETS.contains(&t));
    let builders: [StageBuilder; 3] = if telemetry {
        [find_isolate, telemetry_run_test, read_chart_json_value]
    } else {
        [find_isolate, gtest_run_test, read_graph_json_value]
    };

    let mut arguments = BTreeMap::new();
    let mut quests = Vec::new();
    for builder in builders {
        let Some((used, quest)) = builder(request)? else {
            break;
        };
        arguments.extend(used);
        quests.push(quest);
    }
    debug!(quests = quests.len(), telemetry, "generated quests");
    Ok((arguments, quests))
}

/// A non-empty request field.
fn field<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn required<'a>(request: &'a Request, name: &'static str) -> QuestResult<&'a str> {
    field(request, name).ok_or(QuestError::MissingArgument(name))
}

fn swarming_output_args() -> Vec<String> {
    [
        "--isolated-script-test-output".to_string(),
        "${ISOLATED_OUTDIR}/output.json".to_string(),
        "--isolated-script-test-chartjson-output".to_string(),
        format!("${{ISOLATED_OUTDIR}}/{CHARTJSON_OUTPUT}"),
    ]
    .into()
}

fn find_isolate(request: &Request) -> QuestResult<Option<(Request, Quest)>> {
    let configuration = required(request, "configuration")?;
    let target = required(request, "target")?;

    let arguments = BTreeMap::from([
        ("configuration".to_string(), configuration.to_string()),
        ("target".to_string(), target.to_string()),
    ]);
    Ok(Some((
        arguments,
        Quest::FindIsolate(FindIsolate::new(configuration, target)),
    )))
}

/// Parse the `dimensions` field. `None` when absent.
fn dimensions(request: &Request, arguments: &mut Request) -> QuestResult<Option<Vec<Dimension>>> {
    let Some(raw) = field(request, "dimensions") else {
        return Ok(None);
    };
    let dimensions: Vec<Dimension> =
        serde_json::from_str(raw).map_err(|e| QuestError::InvalidArgument {
            field: "dimensions",
            reason: e.to_string(),
        })?;
    let normalised = serde_json::to_string(&dimensions).map_err(|e| QuestError::InvalidArgument {
        field: "dimensions",
        reason: e.to_string(),
    })?;
    arguments.insert("dimensions".to_string(), normalised);
    Ok(Some(dimensions))
}

/// The requested repeat count, recorded only when given explicitly.
fn repeat_count(request: &Request, arguments: &mut Request) -> QuestResult<String> {
    match field(request, "repeat_count") {
        Some(count) => {
            count
                .parse::<u32>()
                .map_err(|e| QuestError::InvalidArgument {
                    field: "repeat_count",
                    reason: e.to_string(),
                })?;
            arguments.insert("repeat_count".to_string(), count.to_string());
            Ok(count.to_string())
        }
        None => Ok(DEFAULT_REPEAT_COUNT.to_string()),
    }
}

fn telemetry_run_test(request: &Request) -> QuestResult<Option<(Request, Quest)>> {
    let mut arguments = BTreeMap::new();
    let Some(dimensions) = dimensions(request, &mut arguments)? else {
        return Ok(None);
    };

    let benchmark = required(request, "benchmark")?;
    arguments.insert("benchmark".to_string(), benchmark.to_string());
    let mut extra_args = vec![benchmark.to_string()];

    if let Some(story) = field(request, "story") {
        arguments.insert("story".to_string(), story.to_string());
        extra_args.extend(["--story-filter".to_string(), story.to_string()]);
    }

    let repeat = repeat_count(request, &mut arguments)?;
    extra_args.extend(["--pageset-repeat".to_string(), repeat]);

    let browser = required(request, "browser")?;
    arguments.insert("browser".to_string(), browser.to_string());
    extra_args.extend(["--browser".to_string(), browser.to_string()]);

    extra_args.extend(
        ["-v", "--upload-results", "--output-format", "chartjson"]
            .into_iter()
            .map(str::to_string),
    );
    extra_args.extend(swarming_output_args());

    Ok(Some((arguments, Quest::RunTest(RunTest::new(dimensions, extra_args)))))
}

fn gtest_run_test(request: &Request) -> QuestResult<Option<(Request, Quest)>> {
    let mut arguments = BTreeMap::new();
    let Some(dimensions) = dimensions(request, &mut arguments)? else {
        return Ok(None);
    };

    let mut extra_args = Vec::new();
    if let Some(test) = field(request, "test") {
        arguments.insert("test".to_string(), test.to_string());
        extra_args.extend(["--gtest_filter".to_string(), test.to_string()]);
    }

    let repeat = repeat_count(request, &mut arguments)?;
    extra_args.extend(["--gtest_repeat".to_string(), repeat]);
    extra_args.extend(swarming_output_args());

    Ok(Some((arguments, Quest::RunTest(RunTest::new(dimensions, extra_args)))))
}

fn read_chart_json_value(request: &Request) -> QuestResult<Option<(Request, Quest)>> {
    let Some(chart) = field(request, "chart") else {
        return Ok(None);
    };
    let mut arguments = BTreeMap::from([("chart".to_string(), chart.to_string())]);

    let tir_label = field(request, "tir_label").map(str::to_string);
    if let Some(label) = &tir_label {
        arguments.insert("tir_label".to_string(), label.clone());
    }
    let trace = field(request, "trace").map(str::to_string);
    if let Some(trace) = &trace {
        arguments.insert("trace".to_string(), trace.clone());
    }

    Ok(Some((
        arguments,
        Quest::ReadChartJsonValue(ReadChartJsonValue::new(chart, tir_label, trace)),
    )))
}

fn read_graph_json_value(request: &Request) -> QuestResult<Option<(Request, Quest)>> {
    let (chart, trace) = match (field(request, "chart"), field(request, "trace")) {
        (None, None) => return Ok(None),
        (Some(_), None) => {
            return Err(QuestError::InvalidArgument {
                field: "trace",
                reason: "\"chart\" specified but no \"trace\" given".to_string(),
            })
        }
        (None, Some(_)) => {
            return Err(QuestError::InvalidArgument {
                field: "chart",
                reason: "\"trace\" specified but no \"chart\" given".to_string(),
            })
        }
        (Some(chart), Some(trace)) => (chart, trace),
    };

    let arguments = BTreeMap::from([
        ("chart".to_string(), chart.to_string()),
        ("trace".to_string(), trace.to_string()),
    ]);
    Ok(Some((
        arguments,
        Quest::ReadGraphJsonValue(ReadGraphJsonValue::new(chart, trace)),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_treats_empty_as_absent() {
        let request = BTreeMap::from([("story".to_string(), String::new())]);
        assert!(field(&request, "story").is_none());
        assert!(field(&request, "chart").is_none());
    }

    #[test]
    fn test_swarming_output_args() {
        assert_eq!(
            swarming_output_args(),
            vec![
                "--isolated-script-test-output",
                "${ISOLATED_OUTDIR}/output.json",
                "--isolated-script-test-chartjson-output",
                "${ISOLATED_OUTDIR}/chartjson-output.json",
            ]
        );
    }

    #[test]
    fn test_repeat_count_default_not_recorded() {
        let mut arguments = BTreeMap::new();
        let repeat = repeat_count(&BTreeMap::new(), &mut arguments).unwrap();
        assert_eq!(repeat, "20");
        assert!(arguments.is_empty());
    }

    #[test]
    fn test_repeat_count_rejects_non_numeric() {
        let request = BTreeMap::from([("repeat_count".to_string(), "lots".to_string())]);
        let err = repeat_count(&request, &mut BTreeMap::new()).unwrap_err();
        assert!(matches!(err, QuestError::InvalidArgument { field: "repeat_count", .. }));
    }
}
