use std::io;

use async_trait::async_trait;
use thiserror::Error;

use crate::{OrganizationId, ProjectId, QueryRequest, Row, SearchParseError};

/// An error returned by a [`TraceQueryService`] or [`ProjectDirectory`].
#[derive(Debug, Error)]
pub enum QueryError {
    /// The search query of the request could not be parsed.
    #[error("invalid search query")]
    InvalidSearch(#[from] SearchParseError),
    /// The request selects columns that cannot be combined.
    #[error("unsupported column selection: {0}")]
    UnsupportedColumns(String),
    /// The dataset backing the service could not be read.
    #[error("failed to read dataset")]
    DatasetIo(#[source] io::Error),
    /// The dataset backing the service is malformed.
    #[error("failed to parse dataset")]
    InvalidDataset(#[source] serde_json::Error),
    /// A returned row does not have the expected shape.
    #[error("malformed result row")]
    MalformedRow(#[source] serde_json::Error),
}

/// Executes queries against stored events.
///
/// Implementations must support ordering by [`Column::RandomNumber`](crate::Column) for unbiased
/// sampling, and grouping with [`Column::Count`](crate::Column).
#[async_trait]
pub trait TraceQueryService: Send + Sync {
    /// Runs the query and returns at most `request.limit` rows.
    async fn query(&self, request: QueryRequest) -> Result<Vec<Row>, QueryError>;
}

/// Resolves which projects belong to an organization.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Returns the identifiers of all projects in the organization.
    async fn organization_projects(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<ProjectId>, QueryError>;
}
