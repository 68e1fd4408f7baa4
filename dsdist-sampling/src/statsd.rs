use dsdist_statsd::{CounterMetric, DistributionMetric, TimerMetric};

pub enum ReportTimers {
    /// Time spent querying the random sample of root transactions.
    FetchRootTransactions,
    /// Time spent querying the project breakdown of the sampled traces.
    FetchProjectBreakdown,
}

impl TimerMetric for ReportTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::FetchRootTransactions => "report.fetch_root_transactions.duration",
            Self::FetchProjectBreakdown => "report.fetch_project_breakdown.duration",
        }
    }
}

pub enum ReportCounters {
    /// Number of reports built from an empty sample.
    EmptySample,
    /// Number of reports rejected because the trace breakdown spans too many projects.
    Rejected,
}

impl CounterMetric for ReportCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::EmptySample => "report.empty_sample",
            Self::Rejected => "report.rejected",
        }
    }
}

pub enum ReportDistributions {
    /// Number of root transactions returned by the sample query.
    SampleSize,
    /// Number of distinct projects in a trace breakdown.
    BreakdownProjects,
}

impl DistributionMetric for ReportDistributions {
    fn name(&self) -> &'static str {
        match self {
            Self::SampleSize => "report.sample_size",
            Self::BreakdownProjects => "report.breakdown_projects",
        }
    }
}
