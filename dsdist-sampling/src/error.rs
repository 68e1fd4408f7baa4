use dsdist_query::QueryError;
use thiserror::Error;

/// An error building a [`SamplingReport`](crate::SamplingReport).
#[derive(Debug, Error)]
pub enum ReportError {
    /// The sampled traces span more projects than dynamic sampling supports.
    ///
    /// The organization is not eligible for a distributed trace sampling rule.
    #[error("too many projects in the distributed trace breakdown")]
    TooManyProjects {
        /// The number of distinct projects found in the breakdown.
        count: usize,
    },
    /// A sampled trace id cannot be embedded into the breakdown search query.
    ///
    /// This indicates corrupt stored data rather than a bad request.
    #[error("sampled trace id {trace:?} cannot be used in a search query")]
    InvalidTraceId {
        /// The offending trace id.
        trace: String,
    },
    /// The query service failed.
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl ReportError {
    /// Returns `true` if the error was caused by the request rather than by a failing service.
    ///
    /// Client errors should be presented to the user and must not be retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::TooManyProjects { .. } | Self::Query(QueryError::InvalidSearch(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use dsdist_query::SearchParseError;

    use super::*;

    #[test]
    fn test_client_errors() {
        let error = ReportError::TooManyProjects { count: 11 };
        assert!(error.is_client_error());
        assert_eq!(
            error.to_string(),
            "too many projects in the distributed trace breakdown"
        );

        let error = ReportError::from(QueryError::InvalidSearch(
            SearchParseError::UnterminatedQuote,
        ));
        assert!(error.is_client_error());
    }

    #[test]
    fn test_invalid_trace_id_is_not_client_error() {
        let error = ReportError::InvalidTraceId {
            trace: "a\"b".to_owned(),
        };
        assert!(!error.is_client_error());
        assert_eq!(
            error.to_string(),
            r#"sampled trace id "a\"b" cannot be used in a search query"#
        );
    }

    #[test]
    fn test_upstream_error_is_transparent() {
        let error = ReportError::from(QueryError::DatasetIo(io::Error::other("disk gone")));
        assert!(!error.is_client_error());
        assert_eq!(error.to_string(), "failed to read dataset");
    }
}
