//! Parsing and evaluation of event search queries.

use std::borrow::Cow;

use thiserror::Error;

/// Key of the free-text search, which matches against the transaction name.
const TEXT_SEARCH_KEY: &str = "transaction";

/// Provides access to field values of an event by path.
pub trait Getter {
    /// Returns the value at the given path, or `None` if the field is missing or empty.
    fn get_value(&self, path: &str) -> Option<Cow<'_, str>>;
}

/// An error raised by [`SearchQuery::parse`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SearchParseError {
    /// A term of the form `:value` is missing its key.
    #[error("search term at position {0} has no key")]
    MissingKey(usize),
    /// A term of the form `key:` or a lone `!` is missing its value.
    #[error("search term at position {0} has no value")]
    MissingValue(usize),
    /// A quoted value was not closed.
    #[error("unterminated quote in search query")]
    UnterminatedQuote,
    /// A value list `[a,b]` was not closed.
    #[error("unterminated value list in search query")]
    UnterminatedList,
}

/// A single condition within a [`SearchQuery`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchTerm {
    /// `key:value` or `key:[a,b]`. Matches if the field equals any of the values.
    Eq {
        /// Path of the field.
        key: String,
        /// Accepted values.
        values: Vec<String>,
        /// Inverts the condition for `!key:value`.
        negated: bool,
    },
    /// `has:key`. Matches if the field is present and non-empty.
    Has {
        /// Path of the field.
        key: String,
        /// Inverts the condition for `!has:key`.
        negated: bool,
    },
    /// Free text. Matches if the transaction name contains the text.
    Text {
        /// The text to search for.
        text: String,
        /// Inverts the condition for `!text`.
        negated: bool,
    },
}

impl SearchTerm {
    fn matches<T>(&self, instance: &T) -> bool
    where
        T: Getter + ?Sized,
    {
        match self {
            SearchTerm::Eq {
                key,
                values,
                negated,
            } => {
                let matched = match instance.get_value(key) {
                    Some(value) => values.iter().any(|v| v == value.as_ref()),
                    None => values.iter().any(|v| v.is_empty()),
                };
                matched != *negated
            }
            SearchTerm::Has { key, negated } => instance.get_value(key).is_some() != *negated,
            SearchTerm::Text { text, negated } => {
                let matched = instance
                    .get_value(TEXT_SEARCH_KEY)
                    .is_some_and(|name| name.contains(text.as_str()));
                matched != *negated
            }
        }
    }
}

/// A conjunction of search terms.
///
/// The syntax is a whitespace-separated list of terms, all of which must match:
///
///  - `key:value` matches fields equal to `value`. Values containing whitespace are quoted:
///    `transaction:"GET /api"`.
///  - `key:[a,b,c]` matches fields equal to any of the listed values.
///  - `has:key` matches events where the field is set.
///  - A leading `!` negates any term.
///  - Any other word is a free-text search on the transaction name.
///
/// An empty query matches all events.
///
/// # Example
///
/// ```
/// use dsdist_query::SearchQuery;
///
/// let query = SearchQuery::parse("event.type:transaction !has:trace.parent_span_id").unwrap();
/// assert_eq!(query.terms().len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchQuery {
    terms: Vec<SearchTerm>,
}

impl SearchQuery {
    /// Parses a search query string.
    pub fn parse(query: &str) -> Result<Self, SearchParseError> {
        let terms = tokenize(query)?
            .into_iter()
            .map(|(position, token)| parse_term(position, &token))
            .collect::<Result<_, _>>()?;

        Ok(Self { terms })
    }

    /// Returns the parsed terms.
    pub fn terms(&self) -> &[SearchTerm] {
        &self.terms
    }

    /// Returns `true` if all terms match the instance.
    pub fn matches<T>(&self, instance: &T) -> bool
    where
        T: Getter + ?Sized,
    {
        self.terms.iter().all(|term| term.matches(instance))
    }
}

/// Splits a query into whitespace-separated tokens, respecting quotes and value lists.
///
/// Returns the byte position of each token along with the token text. Quotes are removed.
fn tokenize(query: &str) -> Result<Vec<(usize, String)>, SearchParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut in_list = false;

    for (index, c) in query.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => {
                in_list = true;
                current.push(c);
            }
            ']' if !in_quotes => {
                in_list = false;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes && !in_list => {
                if !current.is_empty() {
                    tokens.push((start, std::mem::take(&mut current)));
                }
                start = index + c.len_utf8();
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(SearchParseError::UnterminatedQuote);
    }
    if in_list {
        return Err(SearchParseError::UnterminatedList);
    }
    if !current.is_empty() {
        tokens.push((start, current));
    }

    Ok(tokens)
}

fn parse_term(position: usize, token: &str) -> Result<SearchTerm, SearchParseError> {
    let (negated, token) = match token.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    let Some((key, value)) = token.split_once(':') else {
        if token.is_empty() {
            return Err(SearchParseError::MissingValue(position));
        }
        return Ok(SearchTerm::Text {
            text: token.to_owned(),
            negated,
        });
    };

    if key.is_empty() {
        return Err(SearchParseError::MissingKey(position));
    }
    if value.is_empty() {
        return Err(SearchParseError::MissingValue(position));
    }

    if key == "has" {
        return Ok(SearchTerm::Has {
            key: value.to_owned(),
            negated,
        });
    }

    let values = match value
        .strip_prefix('[')
        .and_then(|list| list.strip_suffix(']'))
    {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .collect(),
        None => vec![value.to_owned()],
    };

    Ok(SearchTerm::Eq {
        key: key.to_owned(),
        values,
        negated,
    })
}
