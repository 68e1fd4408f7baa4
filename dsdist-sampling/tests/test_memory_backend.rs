use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use dsdist_query::{Dataset, MemoryBackend, OrganizationId, ProjectId};
use dsdist_sampling::{
    MAX_SAMPLE_SIZE, ProjectBreakdownEntry, ReportError, ReportRequest, SamplingReport,
    SamplingReportBuilder, StatsPeriod,
};
use serde_json::{Value, json};
use similar_asserts::assert_eq;

const ORG: u64 = 10;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn minutes_ago(minutes: i64) -> String {
    (now() - Duration::minutes(minutes)).to_rfc3339()
}

fn root(id: &str, project: u64, rate: Value) -> Value {
    json!({
        "id": id,
        "trace": format!("trace-{id}"),
        "project": project,
        "timestamp": minutes_ago(10),
        "client_sample_rate": rate,
        "transaction": "/checkout",
    })
}

fn child(id: &str, trace: &str, project: u64) -> Value {
    json!({
        "id": id,
        "trace": trace,
        "project": project,
        "timestamp": minutes_ago(9),
        "parent_span_id": "b0e6f15b45c36b12",
    })
}

fn projects(count: u64) -> Vec<Value> {
    (1..=count)
        .map(|id| json!({"id": id, "organization_id": ORG}))
        .chain([json!({"id": 99, "organization_id": 20})])
        .collect()
}

fn builder(projects: Vec<Value>, events: Vec<Value>) -> SamplingReportBuilder {
    let dataset: Dataset =
        serde_json::from_value(json!({"projects": projects, "events": events})).unwrap();
    let backend = Arc::new(MemoryBackend::new(dataset));
    SamplingReportBuilder::new(backend.clone(), backend)
}

fn request(distributed_trace: bool) -> ReportRequest {
    ReportRequest {
        distributed_trace,
        end: now(),
        ..ReportRequest::new(ProjectId::new(1), OrganizationId::new(ORG))
    }
}

fn sorted_breakdown(report: &SamplingReport) -> Vec<ProjectBreakdownEntry> {
    let mut breakdown = report.project_breakdown.clone().unwrap();
    breakdown.sort_by_key(|entry| entry.project);
    breakdown
}

#[tokio::test]
async fn test_project_without_transactions() {
    dsdist_log::init_test!();

    // Only a child transaction and an event outside the window exist for the project.
    let mut old = root("old", 1, json!(0.5));
    old["timestamp"] = json!(minutes_ago(120));
    let builder = builder(projects(2), vec![child("c1", "trace-x", 1), old]);

    let report = builder.build(&request(true)).await.unwrap();
    assert_eq!(report, SamplingReport::empty());
}

#[tokio::test]
async fn test_mixed_sample_rates() {
    let builder = builder(
        projects(2),
        vec![
            root("a", 1, json!(0.1)),
            root("b", 1, Value::Null),
            root("c", 1, json!("0.2")),
            root("d", 1, json!(0.5)),
            root("e", 1, json!("")),
            // Other projects do not contribute to the sample.
            root("f", 2, json!(0.9)),
            child("g", "trace-a", 1),
        ],
    );

    let report = builder.build(&request(false)).await.unwrap();

    assert_eq!(report.sample_size, 5);
    assert_eq!(report.null_sample_rate_percentage, Some(40.0));
    assert_eq!(report.project_breakdown, None);

    let distributions = report.sample_rate_distributions.unwrap();
    assert_eq!(distributions.min, Some(0.1));
    assert_eq!(distributions.max, Some(0.5));
    assert!((distributions.mean.unwrap() - 0.26666666666666666).abs() < 1e-9);
    assert_eq!(distributions.p50, Some(0.2));
    assert_eq!(distributions.p99, Some(0.5));
}

#[tokio::test]
async fn test_search_query_narrows_sample() {
    let mut events = vec![root("a", 1, json!(0.1)), root("b", 1, json!(0.2))];
    events[1]["environment"] = json!("production");
    let builder = builder(projects(1), events);

    let request = ReportRequest {
        query: "environment:production".to_owned(),
        ..request(false)
    };
    let report = builder.build(&request).await.unwrap();

    assert_eq!(report.sample_size, 1);
    assert_eq!(
        report.sample_rate_distributions.and_then(|d| d.min),
        Some(0.2)
    );
}

#[tokio::test]
async fn test_distributed_trace_breakdown() {
    let builder = builder(
        projects(3),
        vec![
            root("a", 1, json!(1.0)),
            root("b", 1, json!(0.5)),
            child("a1", "trace-a", 2),
            child("a2", "trace-a", 2),
            child("b1", "trace-b", 3),
            // Unrelated traces and projects of other organizations are not counted.
            child("x1", "trace-x", 2),
            child("b2", "trace-b", 99),
        ],
    );

    let report = builder.build(&request(true)).await.unwrap();

    assert_eq!(report.sample_size, 2);
    assert_eq!(
        sorted_breakdown(&report),
        vec![
            ProjectBreakdownEntry {
                project: ProjectId::new(1),
                count: 2,
            },
            ProjectBreakdownEntry {
                project: ProjectId::new(2),
                count: 2,
            },
            ProjectBreakdownEntry {
                project: ProjectId::new(3),
                count: 1,
            },
        ]
    );
}

#[tokio::test]
async fn test_distributed_trace_exactly_ten_projects() {
    let mut events = vec![root("a", 1, json!(0.25))];
    events.extend((2..=10).map(|project| child(&format!("c{project}"), "trace-a", project)));
    let builder = builder(projects(12), events);

    let report = builder.build(&request(true)).await.unwrap();
    assert_eq!(sorted_breakdown(&report).len(), 10);
}

#[tokio::test]
async fn test_distributed_trace_too_many_projects() {
    let mut events = vec![root("a", 1, json!(0.25))];
    events.extend((2..=11).map(|project| child(&format!("c{project}"), "trace-a", project)));
    let builder = builder(projects(11), events);

    let error = builder.build(&request(true)).await.unwrap_err();

    assert!(matches!(error, ReportError::TooManyProjects { count: 11 }));
    assert!(error.is_client_error());
    assert_eq!(
        error.to_string(),
        "too many projects in the distributed trace breakdown"
    );
}

#[tokio::test]
async fn test_sample_size_bound() {
    let events: Vec<Value> = (0..1200)
        .map(|i| root(&format!("r{i}"), 1, json!(0.5)))
        .collect();
    let builder = builder(projects(1), events);

    let small = ReportRequest {
        sample_size: 7,
        ..request(false)
    };
    assert_eq!(builder.build(&small).await.unwrap().sample_size, 7);

    let large = ReportRequest {
        sample_size: 5000,
        ..request(false)
    };
    assert_eq!(
        builder.build(&large).await.unwrap().sample_size,
        MAX_SAMPLE_SIZE
    );
}

#[tokio::test]
async fn test_random_sample_varies() {
    let events: Vec<Value> = (0..200)
        .map(|i| root(&format!("r{i}"), 1, json!(f64::from(i) / 200.0)))
        .collect();
    let builder = builder(projects(1), events);

    let request = ReportRequest {
        sample_size: 10,
        ..request(false)
    };

    let mut minimums = Vec::new();
    for _ in 0..5 {
        let report = builder.build(&request).await.unwrap();
        minimums.push(report.sample_rate_distributions.and_then(|d| d.min));
    }

    minimums.dedup();
    assert!(minimums.len() > 1, "sample is not random: {minimums:?}");
}

#[tokio::test]
async fn test_stats_period_window() {
    let mut old = root("old", 1, json!(0.75));
    old["timestamp"] = json!(minutes_ago(180));
    let builder = builder(projects(1), vec![root("new", 1, json!(0.25)), old]);

    let report = builder.build(&request(false)).await.unwrap();
    assert_eq!(report.sample_size, 1);

    let request = ReportRequest {
        stats_period: "1d".parse::<StatsPeriod>().unwrap(),
        ..request(false)
    };
    let report = builder.build(&request).await.unwrap();
    assert_eq!(report.sample_size, 2);
}
