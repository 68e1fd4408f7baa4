use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{OrganizationId, ProjectId};

/// A single result row, keyed by [`Column::name`].
pub type Row = serde_json::Map<String, Value>;

/// A column that can be selected in a [`QueryRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    /// The event identifier.
    Id,
    /// The trace identifier.
    Trace,
    /// The sample rate recorded by the client SDK on the trace root.
    ClientSampleRate,
    /// The project the event belongs to.
    Project,
    /// The number of events in a group.
    ///
    /// Selecting this column turns the query into an aggregation grouped by all other selected
    /// columns.
    Count,
    /// A uniformly distributed random key in `[0, 1)`, drawn independently for every row on every
    /// query invocation.
    RandomNumber,
}

impl Column {
    /// Returns the name of the column in result rows.
    pub fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Trace => "trace",
            Column::ClientSampleRate => "trace.client_sample_rate",
            Column::Project => "project",
            Column::Count => "count()",
            Column::RandomNumber => "random_number",
        }
    }

    /// Returns `true` if this column is computed over groups of events.
    pub fn is_aggregate(self) -> bool {
        matches!(self, Column::Count)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sort order of query results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderBy {
    /// The column to sort by. Must be part of the selected columns.
    pub column: Column,
    /// Sort from largest to smallest value.
    pub descending: bool,
}

impl OrderBy {
    /// Ascending order by the given column.
    pub fn asc(column: Column) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    /// Descending order by the given column.
    pub fn desc(column: Column) -> Self {
        Self {
            column,
            descending: true,
        }
    }

    /// Compares two rows according to this order.
    ///
    /// Missing values sort first in ascending order. Numbers compare numerically, strings
    /// lexicographically, and mixed types order as `null < bool < number < string`.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let name = self.column.name();
        let ordering = compare_values(a.get(name), b.get(name));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.total_cmp(&b)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Scoping parameters applied to every query.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryParams {
    /// Inclusive start of the time window.
    pub start: DateTime<Utc>,
    /// Exclusive end of the time window.
    pub end: DateTime<Utc>,
    /// Only events of these projects are considered.
    pub project_ids: Vec<ProjectId>,
    /// The organization owning all projects in `project_ids`.
    pub organization_id: OrganizationId,
}

/// A request to a [`TraceQueryService`](crate::TraceQueryService).
#[derive(Clone, Debug, PartialEq)]
pub struct QueryRequest {
    /// The columns returned for every row.
    pub selected_columns: Vec<Column>,
    /// A search query filtering events, see [`SearchQuery`](crate::SearchQuery).
    pub query: String,
    /// Time window, project, and organization scoping.
    pub params: QueryParams,
    /// Optional sort order applied before the limit.
    pub order_by: Option<OrderBy>,
    /// Maximum number of rows to return.
    pub limit: usize,
    /// Identifies the caller of the query for attribution.
    pub referrer: &'static str,
}

impl QueryRequest {
    /// Returns `true` if the request aggregates events into groups.
    pub fn is_aggregate(&self) -> bool {
        self.selected_columns.iter().any(|c| c.is_aggregate())
    }
}
