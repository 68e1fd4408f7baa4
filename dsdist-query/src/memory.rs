//! An in-memory query backend serving a JSON dataset.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Column, Getter, OrganizationId, ProjectDirectory, ProjectId, QueryError, QueryParams,
    QueryRequest, Row, SearchQuery, TraceQueryService,
};

fn default_event_type() -> String {
    "transaction".to_owned()
}

/// A project and the organization it belongs to.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ProjectRecord {
    /// The project identifier.
    pub id: ProjectId,
    /// The owning organization.
    pub organization_id: OrganizationId,
}

/// A stored event.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct StoredEvent {
    /// The event identifier.
    pub id: String,
    /// The trace this event is part of.
    pub trace: String,
    /// The project this event was ingested into.
    pub project: ProjectId,
    /// The event type, for example `"transaction"` or `"error"`.
    #[serde(rename = "type", default = "default_event_type")]
    pub ty: String,
    /// When the event was received.
    pub timestamp: DateTime<Utc>,
    /// The parent span of the transaction. Trace roots have none.
    #[serde(default)]
    pub parent_span_id: Option<String>,
    /// The raw client sample rate as sent by the SDK.
    ///
    /// This may be a number, a numeric string, an empty string, or missing entirely.
    #[serde(default)]
    pub client_sample_rate: Option<Value>,
    /// The transaction name.
    #[serde(default)]
    pub transaction: Option<String>,
    /// The environment.
    #[serde(default)]
    pub environment: Option<String>,
    /// The release.
    #[serde(default)]
    pub release: Option<String>,
    /// Additional searchable tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StoredEvent {
    fn column_value(&self, column: Column) -> Value {
        match column {
            Column::Id => Value::String(self.id.clone()),
            Column::Trace => Value::String(self.trace.clone()),
            Column::ClientSampleRate => self.client_sample_rate.clone().unwrap_or(Value::Null),
            Column::Project => Value::from(self.project.value()),
            Column::RandomNumber => Value::from(rand::rng().random::<f64>()),
            // Aggregates are computed over groups, see `MemoryBackend::aggregate`.
            Column::Count => Value::Null,
        }
    }

    fn in_scope(&self, params: &QueryParams, projects: &BTreeMap<ProjectId, OrganizationId>) -> bool {
        self.timestamp >= params.start
            && self.timestamp < params.end
            && params.project_ids.contains(&self.project)
            && projects.get(&self.project) == Some(&params.organization_id)
    }
}

fn non_empty(value: &str) -> Option<Cow<'_, str>> {
    (!value.is_empty()).then_some(Cow::Borrowed(value))
}

impl Getter for StoredEvent {
    fn get_value(&self, path: &str) -> Option<Cow<'_, str>> {
        match path {
            "id" => non_empty(&self.id),
            "trace" => non_empty(&self.trace),
            "event.type" => non_empty(&self.ty),
            "project" | "project.id" => Some(Cow::Owned(self.project.to_string())),
            "trace.parent_span_id" => self.parent_span_id.as_deref().and_then(non_empty),
            "trace.client_sample_rate" => match self.client_sample_rate.as_ref()? {
                Value::String(s) => non_empty(s),
                Value::Null => None,
                other => Some(Cow::Owned(other.to_string())),
            },
            "transaction" => self.transaction.as_deref().and_then(non_empty),
            "environment" => self.environment.as_deref().and_then(non_empty),
            "release" => self.release.as_deref().and_then(non_empty),
            tag => self.tags.get(tag).map(String::as_str).and_then(non_empty),
        }
    }
}

/// The contents of a dataset file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Dataset {
    /// All known projects.
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
    /// All stored events.
    #[serde(default)]
    pub events: Vec<StoredEvent>,
}

/// A [`TraceQueryService`] and [`ProjectDirectory`] over events held in memory.
///
/// Random ordering is synthesized by drawing a fresh random key for every row on every query.
/// This is only suitable for datasets small enough to be enumerated in full.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    projects: BTreeMap<ProjectId, OrganizationId>,
    events: Vec<StoredEvent>,
}

impl MemoryBackend {
    /// Creates a backend from a dataset.
    pub fn new(dataset: Dataset) -> Self {
        let projects = dataset
            .projects
            .into_iter()
            .map(|p| (p.id, p.organization_id))
            .collect();

        Self {
            projects,
            events: dataset.events,
        }
    }

    /// Loads a dataset from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, QueryError> {
        let contents = fs::read(path.as_ref()).map_err(QueryError::DatasetIo)?;
        let dataset = serde_json::from_slice(&contents).map_err(QueryError::InvalidDataset)?;
        let backend = Self::new(dataset);

        dsdist_log::debug!(
            projects = backend.projects.len(),
            events = backend.events.len(),
            "loaded dataset from {}",
            path.as_ref().display()
        );

        Ok(backend)
    }

    /// Returns the organization of a project, if it is known.
    pub fn organization_of(&self, project_id: ProjectId) -> Option<OrganizationId> {
        self.projects.get(&project_id).copied()
    }

    fn matching_events<'a>(
        &'a self,
        params: &'a QueryParams,
        search: &'a SearchQuery,
    ) -> impl Iterator<Item = &'a StoredEvent> + 'a {
        self.events
            .iter()
            .filter(move |event| event.in_scope(params, &self.projects))
            .filter(move |event| search.matches(*event))
    }

    fn select(&self, request: &QueryRequest, search: &SearchQuery) -> Vec<Row> {
        self.matching_events(&request.params, search)
            .map(|event| {
                request
                    .selected_columns
                    .iter()
                    .map(|&column| (column.name().to_owned(), event.column_value(column)))
                    .collect()
            })
            .collect()
    }

    fn aggregate(
        &self,
        request: &QueryRequest,
        search: &SearchQuery,
    ) -> Result<Vec<Row>, QueryError> {
        let group_columns: Vec<Column> = request
            .selected_columns
            .iter()
            .copied()
            .filter(|c| !c.is_aggregate())
            .collect();

        if group_columns.contains(&Column::RandomNumber) {
            return Err(QueryError::UnsupportedColumns(
                "random_number cannot be grouped".to_owned(),
            ));
        }

        let mut groups = BTreeMap::<String, (Vec<Value>, u64)>::new();
        for event in self.matching_events(&request.params, search) {
            let values: Vec<Value> = group_columns
                .iter()
                .map(|&column| event.column_value(column))
                .collect();
            let key = Value::Array(values.clone()).to_string();
            groups.entry(key).or_insert_with(|| (values, 0)).1 += 1;
        }

        let rows = groups
            .into_values()
            .map(|(values, count)| {
                let mut row: Row = group_columns
                    .iter()
                    .map(|column| column.name().to_owned())
                    .zip(values)
                    .collect();
                row.insert(Column::Count.name().to_owned(), Value::from(count));
                row
            })
            .collect();

        Ok(rows)
    }
}

#[async_trait]
impl TraceQueryService for MemoryBackend {
    async fn query(&self, request: QueryRequest) -> Result<Vec<Row>, QueryError> {
        let search = SearchQuery::parse(&request.query)?;

        let mut rows = if request.is_aggregate() {
            self.aggregate(&request, &search)?
        } else {
            self.select(&request, &search)
        };

        if let Some(order_by) = request.order_by {
            rows.sort_by(|a, b| order_by.compare(a, b));
        }
        rows.truncate(request.limit);

        dsdist_log::trace!(
            referrer = request.referrer,
            rows = rows.len(),
            "executed query"
        );

        Ok(rows)
    }
}

#[async_trait]
impl ProjectDirectory for MemoryBackend {
    async fn organization_projects(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ProjectId>, QueryError> {
        let projects: BTreeSet<ProjectId> = self
            .projects
            .iter()
            .filter(|(_, org)| **org == organization_id)
            .map(|(project, _)| *project)
            .collect();

        Ok(projects.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::OrderBy;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn backend() -> MemoryBackend {
        let dataset = json!({
            "projects": [
                {"id": 1, "organization_id": 10},
                {"id": 2, "organization_id": 10},
                {"id": 3, "organization_id": 20},
            ],
            "events": [
                {"id": "a", "trace": "t1", "project": 1, "timestamp": "2024-05-01T11:30:00Z",
                 "client_sample_rate": 0.5, "transaction": "GET /a"},
                {"id": "b", "trace": "t1", "project": 2, "timestamp": "2024-05-01T11:31:00Z",
                 "parent_span_id": "span1"},
                {"id": "c", "trace": "t2", "project": 1, "timestamp": "2024-05-01T11:40:00Z",
                 "client_sample_rate": ""},
                {"id": "d", "trace": "t2", "project": 2, "type": "error",
                 "timestamp": "2024-05-01T11:41:00Z", "parent_span_id": "span2"},
                {"id": "e", "trace": "t3", "project": 1, "timestamp": "2024-04-30T11:00:00Z"},
                {"id": "f", "trace": "t4", "project": 3, "timestamp": "2024-05-01T11:50:00Z"},
            ]
        });

        MemoryBackend::new(serde_json::from_value(dataset).unwrap())
    }

    fn params(project_ids: Vec<u64>) -> QueryParams {
        QueryParams {
            start: now() - Duration::hours(1),
            end: now(),
            project_ids: project_ids.into_iter().map(ProjectId::new).collect(),
            organization_id: OrganizationId::new(10),
        }
    }

    #[tokio::test]
    async fn test_select_root_transactions() {
        let rows = backend()
            .query(QueryRequest {
                selected_columns: vec![Column::Id, Column::ClientSampleRate],
                query: "event.type:transaction !has:trace.parent_span_id".to_owned(),
                params: params(vec![1]),
                order_by: Some(OrderBy::asc(Column::Id)),
                limit: 10,
                referrer: "test",
            })
            .await
            .unwrap();

        assert_eq!(
            Value::from(rows.into_iter().map(Value::Object).collect::<Vec<_>>()),
            json!([
                {"id": "a", "trace.client_sample_rate": 0.5},
                {"id": "c", "trace.client_sample_rate": ""},
            ])
        );
    }

    #[tokio::test]
    async fn test_random_order_respects_limit() {
        let rows = backend()
            .query(QueryRequest {
                selected_columns: vec![Column::Id, Column::RandomNumber],
                query: String::new(),
                params: params(vec![1, 2]),
                order_by: Some(OrderBy::desc(Column::RandomNumber)),
                limit: 2,
                referrer: "test",
            })
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        let keys: Vec<f64> = rows
            .iter()
            .map(|row| row["random_number"].as_f64().unwrap())
            .collect();
        assert!(keys[0] >= keys[1]);
        assert!(keys.iter().all(|k| (0.0..1.0).contains(k)));
    }

    #[tokio::test]
    async fn test_count_by_project() {
        let rows = backend()
            .query(QueryRequest {
                selected_columns: vec![Column::Project, Column::Count],
                query: "event.type:transaction trace:[t1,t2,t4]".to_owned(),
                params: params(vec![1, 2, 3]),
                order_by: None,
                limit: 20,
                referrer: "test",
            })
            .await
            .unwrap();

        // Project 3 belongs to another organization and the error event is not counted.
        assert_eq!(
            Value::from(rows.into_iter().map(Value::Object).collect::<Vec<_>>()),
            json!([
                {"project": 1, "count()": 2},
                {"project": 2, "count()": 1},
            ])
        );
    }

    #[tokio::test]
    async fn test_grouping_random_number_unsupported() {
        let result = backend()
            .query(QueryRequest {
                selected_columns: vec![Column::RandomNumber, Column::Count],
                query: String::new(),
                params: params(vec![1]),
                order_by: None,
                limit: 20,
                referrer: "test",
            })
            .await;

        assert!(matches!(result, Err(QueryError::UnsupportedColumns(_))));
    }

    #[tokio::test]
    async fn test_invalid_search() {
        let result = backend()
            .query(QueryRequest {
                selected_columns: vec![Column::Id],
                query: "trace:[t1".to_owned(),
                params: params(vec![1]),
                order_by: None,
                limit: 20,
                referrer: "test",
            })
            .await;

        assert!(matches!(result, Err(QueryError::InvalidSearch(_))));
    }

    #[tokio::test]
    async fn test_organization_projects() {
        let backend = backend();
        let projects = backend
            .organization_projects(OrganizationId::new(10))
            .await
            .unwrap();

        assert_eq!(projects, vec![ProjectId::new(1), ProjectId::new(2)]);
        assert_eq!(
            backend.organization_of(ProjectId::new(3)),
            Some(OrganizationId::new(20))
        );
    }
}
