//! Sample rate distributions of root transactions for dynamic sampling.
//!
//! Before a dynamic sampling rule is created for a project, Sentry inspects how the project's
//! traffic is currently sampled by its SDKs. This crate builds a [`SamplingReport`] for that
//! decision:
//!
//!  1. A uniform random sample of root transactions (transactions without a parent span) is
//!     fetched from a [`TraceQueryService`](dsdist_query::TraceQueryService).
//!  2. The client sample rates recorded on those transactions are summarized in a
//!     [`DistributionSummary`], along with the share of transactions that did not record one.
//!  3. For rules on distributed traces, the [`ProjectBreakdownResolver`] counts transactions
//!     per project across the sampled traces. Organizations whose traces span more than
//!     [`MAX_BREAKDOWN_PROJECTS`] projects are rejected with [`ReportError::TooManyProjects`].
//!
//! # Example
//!
//! ```
//! use dsdist_sampling::{percentile, DistributionSummary};
//!
//! assert_eq!(percentile(&[10.0, 20.0, 30.0, 40.0], 0.9), Some(40.0));
//!
//! let summary = DistributionSummary::from_values(&[0.5, 0.1, 0.2]);
//! assert_eq!(summary.min, Some(0.1));
//! assert_eq!(summary.p50, Some(0.2));
//! ```

#![warn(missing_docs)]

mod breakdown;
mod distribution;
mod error;
mod period;
mod rates;
mod report;
mod statsd;

pub use self::breakdown::*;
pub use self::distribution::*;
pub use self::error::*;
pub use self::period::*;
pub use self::rates::*;
pub use self::report::*;
