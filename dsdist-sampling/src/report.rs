use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dsdist_query::{
    Column, OrderBy, OrganizationId, ProjectDirectory, ProjectId, QueryError, QueryParams,
    QueryRequest, TraceQueryService,
};
use dsdist_statsd::metric;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::statsd::{ReportCounters, ReportDistributions, ReportTimers};
use crate::{
    DistributionSummary, ProjectBreakdownEntry, ProjectBreakdownResolver, ReportError,
    RootTransactionSample, SampleRates, StatsPeriod, TimeWindow,
};

/// The largest number of root transactions a report may sample.
pub const MAX_SAMPLE_SIZE: usize = 1000;

/// The number of root transactions sampled if none is requested.
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

const ROOT_TRANSACTIONS_REFERRER: &str = "dynamic-sampling.distribution.fetch-parent-transactions";

/// Restricts a search to transactions that start a trace.
const ROOT_TRANSACTION_QUERY: &str = "event.type:transaction !has:trace.parent_span_id";

/// Parameters of a sampling report.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportRequest {
    /// The project whose root transactions are sampled.
    pub project_id: ProjectId,
    /// The organization owning the project.
    pub organization_id: OrganizationId,
    /// An additional search query to filter root transactions.
    pub query: String,
    /// The number of root transactions to sample, capped at [`MAX_SAMPLE_SIZE`].
    pub sample_size: usize,
    /// Resolve the project breakdown of the sampled traces.
    pub distributed_trace: bool,
    /// How far the report looks back from `end`.
    pub stats_period: StatsPeriod,
    /// The end of the time window, usually the current time.
    pub end: DateTime<Utc>,
}

impl ReportRequest {
    /// Creates a request with default parameters ending now.
    pub fn new(project_id: ProjectId, organization_id: OrganizationId) -> Self {
        Self {
            project_id,
            organization_id,
            query: String::new(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            distributed_trace: true,
            stats_period: StatsPeriod::default(),
            end: Utc::now(),
        }
    }

    /// Returns the number of root transactions to sample.
    pub fn effective_sample_size(&self) -> usize {
        self.sample_size.min(MAX_SAMPLE_SIZE)
    }

    /// Returns the time window of the report.
    pub fn window(&self) -> TimeWindow {
        self.stats_period.window_ending(self.end)
    }

    fn search_query(&self) -> String {
        let query = self.query.trim();
        if query.is_empty() {
            ROOT_TRANSACTION_QUERY.to_owned()
        } else {
            format!("{query} {ROOT_TRANSACTION_QUERY}")
        }
    }
}

/// Client sample rate statistics of a project's root transactions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingReport {
    /// Transactions per project in the sampled traces, if requested.
    pub project_breakdown: Option<Vec<ProjectBreakdownEntry>>,
    /// The number of root transactions that were sampled.
    pub sample_size: usize,
    /// The percentage of sampled transactions without a client sample rate.
    pub null_sample_rate_percentage: Option<f64>,
    /// The distribution of recorded client sample rates.
    pub sample_rate_distributions: Option<DistributionSummary>,
}

impl SamplingReport {
    /// Returns the report for a sample without any root transactions.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Builds [`SamplingReport`]s from stored events.
///
/// The builder holds no mutable state and can serve concurrent requests.
#[derive(Clone)]
pub struct SamplingReportBuilder {
    query_service: Arc<dyn TraceQueryService>,
    directory: Arc<dyn ProjectDirectory>,
}

impl SamplingReportBuilder {
    /// Creates a builder querying events from `query_service` and resolving organization
    /// projects through `directory`.
    pub fn new(
        query_service: Arc<dyn TraceQueryService>,
        directory: Arc<dyn ProjectDirectory>,
    ) -> Self {
        Self {
            query_service,
            directory,
        }
    }

    /// Samples root transactions and summarizes their client sample rates.
    ///
    /// An empty sample is not an error and yields [`SamplingReport::empty`]. In distributed trace
    /// mode, errors from resolving the project breakdown are returned instead of a report.
    pub async fn build(&self, request: &ReportRequest) -> Result<SamplingReport, ReportError> {
        let window = request.window();
        let samples = self.fetch_root_transactions(request, &window).await?;

        metric!(distribution(ReportDistributions::SampleSize) = samples.len() as u64);
        dsdist_log::debug!(
            project = request.project_id.value(),
            sample_size = samples.len(),
            "fetched root transactions"
        );

        if samples.is_empty() {
            metric!(counter(ReportCounters::EmptySample) += 1);
            return Ok(SamplingReport::empty());
        }

        let rates = SampleRates::extract(&samples);
        let distributions = DistributionSummary::from_values(&rates.numeric);

        let project_breakdown = if request.distributed_trace {
            Some(self.resolve_breakdown(request, &window, &samples).await?)
        } else {
            None
        };

        Ok(SamplingReport {
            project_breakdown,
            sample_size: samples.len(),
            null_sample_rate_percentage: rates.null_percentage(),
            sample_rate_distributions: Some(distributions),
        })
    }

    async fn fetch_root_transactions(
        &self,
        request: &ReportRequest,
        window: &TimeWindow,
    ) -> Result<Vec<RootTransactionSample>, ReportError> {
        let query = QueryRequest {
            selected_columns: vec![
                Column::Id,
                Column::Trace,
                Column::ClientSampleRate,
                Column::RandomNumber,
            ],
            query: request.search_query(),
            params: QueryParams {
                start: window.start,
                end: window.end,
                project_ids: vec![request.project_id],
                organization_id: request.organization_id,
            },
            order_by: Some(OrderBy::desc(Column::RandomNumber)),
            limit: request.effective_sample_size(),
            referrer: ROOT_TRANSACTIONS_REFERRER,
        };

        let rows = metric!(timer(ReportTimers::FetchRootTransactions), {
            self.query_service.query(query).await
        })?;

        let samples = rows
            .into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)))
            .collect::<Result<_, _>>()
            .map_err(QueryError::MalformedRow)?;

        Ok(samples)
    }

    async fn resolve_breakdown(
        &self,
        request: &ReportRequest,
        window: &TimeWindow,
        samples: &[RootTransactionSample],
    ) -> Result<Vec<ProjectBreakdownEntry>, ReportError> {
        let trace_ids: BTreeSet<String> = samples.iter().map(|s| s.trace.clone()).collect();

        let project_ids = self
            .directory
            .organization_projects(request.organization_id)
            .await?;

        let params = QueryParams {
            start: window.start,
            end: window.end,
            project_ids,
            organization_id: request.organization_id,
        };

        ProjectBreakdownResolver::new(self.query_service.as_ref())
            .resolve(&trace_ids, params)
            .await
    }
}
