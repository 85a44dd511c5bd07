use std::collections::BTreeMap;

use pinpoint_core::quest::{FindIsolate, ReadChartJsonValue, ReadGraphJsonValue, RunTest};
use pinpoint_core::services::Dimension;
use pinpoint_core::{generate_quests, Quest, QuestError};

const DIMENSIONS: &str = r#"[{"key": "pool", "value": "Chrome-perf"}]"#;
const DIMENSIONS_COMPACT: &str = r#"[{"key":"pool","value":"Chrome-perf"}]"#;

fn request(fields: &[(&str, &str)]) -> BTreeMap<String, String> {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn output_args() -> Vec<String> {
    strings(&[
        "--isolated-script-test-output",
        "${ISOLATED_OUTDIR}/output.json",
        "--isolated-script-test-chartjson-output",
        "${ISOLATED_OUTDIR}/chartjson-output.json",
    ])
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

#[test]
fn telemetry_without_dimensions_stops_after_find_isolate() {
    let (arguments, quests) = generate_quests(&request(&[
        ("target", "telemetry_perf_tests"),
        ("configuration", "chromium-rel-mac11-pro"),
        ("benchmark", "speedometer"),
    ]))
    .expect("generate");

    assert_eq!(
        arguments,
        request(&[
            ("configuration", "chromium-rel-mac11-pro"),
            ("target", "telemetry_perf_tests"),
        ])
    );
    assert_eq!(
        quests,
        vec![Quest::FindIsolate(FindIsolate::new(
            "chromium-rel-mac11-pro",
            "telemetry_perf_tests"
        ))]
    );
}

#[test]
fn telemetry_full_pipeline() {
    let (arguments, quests) = generate_quests(&request(&[
        ("target", "telemetry_perf_webview_tests"),
        ("configuration", "chromium-rel-mac11-pro"),
        ("dimensions", DIMENSIONS),
        ("benchmark", "speedometer"),
        ("story", "http://www.fifa.com/"),
        ("browser", "release"),
        ("chart", "timeToFirst"),
        ("tir_label", "pcv1-cold"),
        ("trace", "trace_name"),
        ("unused", "ignored"),
    ]))
    .expect("generate");

    assert_eq!(
        arguments,
        request(&[
            ("benchmark", "speedometer"),
            ("browser", "release"),
            ("chart", "timeToFirst"),
            ("configuration", "chromium-rel-mac11-pro"),
            ("dimensions", DIMENSIONS_COMPACT),
            ("story", "http://www.fifa.com/"),
            ("target", "telemetry_perf_webview_tests"),
            ("tir_label", "pcv1-cold"),
            ("trace", "trace_name"),
        ])
    );

    let mut extra_args = strings(&[
        "speedometer",
        "--story-filter",
        "http://www.fifa.com/",
        "--pageset-repeat",
        "20",
        "--browser",
        "release",
        "-v",
        "--upload-results",
        "--output-format",
        "chartjson",
    ]);
    extra_args.extend(output_args());
    assert_eq!(
        quests,
        vec![
            Quest::FindIsolate(FindIsolate::new(
                "chromium-rel-mac11-pro",
                "telemetry_perf_webview_tests"
            )),
            Quest::RunTest(RunTest::new(
                vec![Dimension::new("pool", "Chrome-perf")],
                extra_args
            )),
            Quest::ReadChartJsonValue(ReadChartJsonValue::new(
                "timeToFirst",
                Some("pcv1-cold".to_string()),
                Some("trace_name".to_string()),
            )),
        ]
    );
}

#[test]
fn telemetry_explicit_repeat_count_is_recorded() {
    let (arguments, quests) = generate_quests(&request(&[
        ("target", "telemetry_perf_tests"),
        ("configuration", "chromium-rel-mac11-pro"),
        ("dimensions", DIMENSIONS),
        ("benchmark", "speedometer"),
        ("browser", "release"),
        ("repeat_count", "5"),
    ]))
    .expect("generate");

    assert_eq!(arguments.get("repeat_count").map(String::as_str), Some("5"));
    assert!(!arguments.contains_key("story"));
    assert_eq!(quests.len(), 2);
    let Quest::RunTest(run_test) = &quests[1] else {
        panic!("expected RunTest, got {:?}", quests[1]);
    };
    assert_eq!(&run_test.extra_args()[..3], &strings(&["speedometer", "--pageset-repeat", "5"])[..]);
}

#[test]
fn telemetry_requires_benchmark_and_browser() {
    let err = generate_quests(&request(&[
        ("target", "telemetry_perf_tests"),
        ("configuration", "chromium-rel-mac11-pro"),
        ("dimensions", DIMENSIONS),
        ("browser", "release"),
    ]))
    .unwrap_err();
    assert_eq!(err, QuestError::MissingArgument("benchmark"));

    let err = generate_quests(&request(&[
        ("target", "telemetry_perf_tests"),
        ("configuration", "chromium-rel-mac11-pro"),
        ("dimensions", DIMENSIONS),
        ("benchmark", "speedometer"),
    ]))
    .unwrap_err();
    assert_eq!(err, QuestError::MissingArgument("browser"));
}

#[test]
fn telemetry_without_chart_stops_after_run_test() {
    let (arguments, quests) = generate_quests(&request(&[
        ("target", "telemetry_perf_tests"),
        ("configuration", "chromium-rel-mac11-pro"),
        ("dimensions", DIMENSIONS),
        ("benchmark", "speedometer"),
        ("browser", "release"),
        ("trace", "ignored without chart"),
    ]))
    .expect("generate");

    assert_eq!(quests.len(), 2);
    assert!(!arguments.contains_key("trace"));
}

// ---------------------------------------------------------------------------
// GTest
// ---------------------------------------------------------------------------

#[test]
fn gtest_full_pipeline() {
    let (arguments, quests) = generate_quests(&request(&[
        ("target", "net_perftests"),
        ("configuration", "chromium-rel-mac11-pro"),
        ("dimensions", DIMENSIONS),
        ("test", "SomeTest.Case"),
        ("chart", "chart_name"),
        ("trace", "trace_name"),
    ]))
    .expect("generate");

    assert_eq!(
        arguments,
        request(&[
            ("chart", "chart_name"),
            ("configuration", "chromium-rel-mac11-pro"),
            ("dimensions", DIMENSIONS_COMPACT),
            ("target", "net_perftests"),
            ("test", "SomeTest.Case"),
            ("trace", "trace_name"),
        ])
    );

    let mut extra_args = strings(&["--gtest_filter", "SomeTest.Case", "--gtest_repeat", "20"]);
    extra_args.extend(output_args());
    assert_eq!(
        quests,
        vec![
            Quest::FindIsolate(FindIsolate::new("chromium-rel-mac11-pro", "net_perftests")),
            Quest::RunTest(RunTest::new(
                vec![Dimension::new("pool", "Chrome-perf")],
                extra_args
            )),
            Quest::ReadGraphJsonValue(ReadGraphJsonValue::new("chart_name", "trace_name")),
        ]
    );
}

#[test]
fn gtest_chart_and_trace_must_come_together() {
    let base = [
        ("target", "net_perftests"),
        ("configuration", "chromium-rel-mac11-pro"),
        ("dimensions", DIMENSIONS),
    ];

    let mut only_chart = request(&base);
    only_chart.insert("chart".to_string(), "chart_name".to_string());
    let err = generate_quests(&only_chart).unwrap_err();
    assert!(matches!(err, QuestError::InvalidArgument { field: "trace", .. }));

    let mut only_trace = request(&base);
    only_trace.insert("trace".to_string(), "trace_name".to_string());
    let err = generate_quests(&only_trace).unwrap_err();
    assert!(matches!(err, QuestError::InvalidArgument { field: "chart", .. }));

    let (_, quests) = generate_quests(&request(&base)).expect("generate");
    assert_eq!(quests.len(), 2);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn missing_configuration_or_target() {
    let err = generate_quests(&request(&[("target", "net_perftests")])).unwrap_err();
    assert_eq!(err, QuestError::MissingArgument("configuration"));
    assert_eq!(err.to_string(), "missing \"configuration\" argument");

    let err = generate_quests(&request(&[("configuration", "chromium-rel-mac11-pro")])).unwrap_err();
    assert_eq!(err, QuestError::MissingArgument("target"));
}

#[test]
fn empty_fields_count_as_missing() {
    let (arguments, quests) = generate_quests(&request(&[
        ("target", "net_perftests"),
        ("configuration", "chromium-rel-mac11-pro"),
        ("dimensions", ""),
    ]))
    .expect("generate");

    assert_eq!(quests.len(), 1);
    assert!(!arguments.contains_key("dimensions"));
}

#[test]
fn malformed_dimensions_rejected() {
    let err = generate_quests(&request(&[
        ("target", "net_perftests"),
        ("configuration", "chromium-rel-mac11-pro"),
        ("dimensions", "pool=Chrome-perf"),
    ]))
    .unwrap_err();
    assert!(matches!(err, QuestError::InvalidArgument { field: "dimensions", .. }));
}
