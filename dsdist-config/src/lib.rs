//! Configuration for the dsdist CLI.
//!
//! The configuration is loaded from a `config.yml` file in a config folder. All values are
//! optional and fall back to defaults if the file or individual keys are missing. Values can be
//! overridden from the command line through [`OverridableConfig`].

#![warn(missing_docs)]

mod config;

pub use crate::config::*;
