//! Access to stored events for building sampling reports.
//!
//! The sampling core never talks to storage directly. Instead, it issues [`QueryRequest`]s to a
//! [`TraceQueryService`] and resolves organization membership through a [`ProjectDirectory`].
//! Both traits are implemented by [`MemoryBackend`], which serves a JSON dataset and is used by
//! the CLI and in tests.
//!
//! # Search Queries
//!
//! Requests carry a search query string that filters events. See [`SearchQuery`] for the
//! supported syntax.
//!
//! # Random Ordering
//!
//! Query services must provide the [`Column::RandomNumber`] pseudo-column, which assigns an
//! independent uniformly distributed key to every row on every invocation. Ordering by this column
//! and applying a limit yields a uniform random sample without replacement.

#![warn(missing_docs)]

mod ids;
mod memory;
mod request;
mod search;
mod service;

pub use self::ids::*;
pub use self::memory::*;
pub use self::request::*;
pub use self::search::*;
pub use self::service::*;
