use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised if a numeric identifier cannot be parsed from a string.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ParseIdError {
    /// Raised if the value is not an integer in the supported range.
    #[error("invalid value for {0} id")]
    InvalidValue(&'static str),
    /// Raised if an empty value is parsed.
    #[error("empty or missing {0} id")]
    EmptyValue(&'static str),
}

macro_rules! numeric_id {
    ($(#[$attr:meta])* $name:ident, $kind:literal) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from its numeric value.
            #[inline]
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the numeric value of this identifier.
            #[inline]
            pub fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.value())
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, ParseIdError> {
                if s.is_empty() {
                    return Err(ParseIdError::EmptyValue($kind));
                }

                match s.parse::<u64>() {
                    Ok(val) => Ok(Self::new(val)),
                    Err(_) => Err(ParseIdError::InvalidValue($kind)),
                }
            }
        }
    };
}

numeric_id!(
    /// The unique identifier of a Sentry project.
    ProjectId,
    "project"
);

numeric_id!(
    /// The unique identifier of a Sentry organization.
    OrganizationId,
    "organization"
);
