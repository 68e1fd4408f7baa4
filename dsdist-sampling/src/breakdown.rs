use std::collections::BTreeSet;

use dsdist_query::{Column, ProjectId, QueryError, QueryParams, QueryRequest, TraceQueryService};
use dsdist_statsd::metric;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ReportError;
use crate::statsd::{ReportCounters, ReportDistributions, ReportTimers};

/// Maximum number of project groups requested from the query service.
///
/// This bounds the size of the breakdown query and is independent of the eligibility rule.
pub const BREAKDOWN_QUERY_LIMIT: usize = 20;

/// Maximum number of distinct projects a trace breakdown may contain.
///
/// Organizations whose traces span more projects are not eligible for distributed trace rules.
pub const MAX_BREAKDOWN_PROJECTS: usize = 10;

const BREAKDOWN_REFERRER: &str = "dynamic-sampling.distribution.fetch-project-breakdown";

/// Returns `true` if the trace id can be listed in a `trace:[...]` search term verbatim.
fn is_searchable_trace_id(trace: &str) -> bool {
    !trace.is_empty()
        && !trace
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '[' | ']' | ','))
}

/// The number of transactions of one project within the sampled traces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectBreakdownEntry {
    /// The project.
    pub project: ProjectId,
    /// The number of transactions.
    #[serde(alias = "count()")]
    pub count: u64,
}

/// Resolves how transactions of distributed traces spread across projects.
pub struct ProjectBreakdownResolver<'a> {
    service: &'a dyn TraceQueryService,
}

impl<'a> ProjectBreakdownResolver<'a> {
    /// Creates a resolver issuing queries to the given service.
    pub fn new(service: &'a dyn TraceQueryService) -> Self {
        Self { service }
    }

    /// Counts transactions per project across the given traces.
    ///
    /// `params` must scope the query to all projects of the organization, since traces may cross
    /// project boundaries. Fails with [`ReportError::TooManyProjects`] if the traces span more than
    /// [`MAX_BREAKDOWN_PROJECTS`] projects, and with [`ReportError::InvalidTraceId`] if a trace id
    /// cannot be listed in a search query. The result is never truncated.
    pub async fn resolve(
        &self,
        trace_ids: &BTreeSet<String>,
        params: QueryParams,
    ) -> Result<Vec<ProjectBreakdownEntry>, ReportError> {
        if let Some(trace) = trace_ids.iter().find(|t| !is_searchable_trace_id(t)) {
            return Err(ReportError::InvalidTraceId {
                trace: trace.clone(),
            });
        }

        let trace_list: Vec<&str> = trace_ids.iter().map(String::as_str).collect();

        let request = QueryRequest {
            selected_columns: vec![Column::Project, Column::Count],
            query: format!("event.type:transaction trace:[{}]", trace_list.join(",")),
            params,
            order_by: None,
            limit: BREAKDOWN_QUERY_LIMIT,
            referrer: BREAKDOWN_REFERRER,
        };

        let rows = metric!(timer(ReportTimers::FetchProjectBreakdown), {
            self.service.query(request).await
        })?;

        let entries = rows
            .into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)))
            .collect::<Result<Vec<ProjectBreakdownEntry>, _>>()
            .map_err(QueryError::MalformedRow)?;

        let projects = entries
            .iter()
            .map(|entry| entry.project)
            .collect::<BTreeSet<_>>()
            .len();

        metric!(distribution(ReportDistributions::BreakdownProjects) = projects as u64);

        if projects > MAX_BREAKDOWN_PROJECTS {
            metric!(counter(ReportCounters::Rejected) += 1);
            dsdist_log::debug!(
                projects,
                traces = trace_ids.len(),
                "trace breakdown exceeds the eligible number of projects"
            );
            return Err(ReportError::TooManyProjects { count: projects });
        }

        Ok(entries)
    }
}
