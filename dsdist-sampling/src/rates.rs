use std::cmp::Ordering;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A root transaction returned by the random sample query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RootTransactionSample {
    /// The event identifier of the transaction.
    pub id: String,
    /// The trace started by this transaction.
    pub trace: String,
    /// The sample rate the SDK applied when starting the trace.
    ///
    /// Missing values, `null`, and empty strings all mean that no rate was recorded.
    #[serde(
        rename = "trace.client_sample_rate",
        default,
        deserialize_with = "deserialize_sample_rate"
    )]
    pub client_sample_rate: Option<f64>,
}

/// Accepts numbers and numeric strings. `null` and `""` map to `None`.
fn deserialize_sample_rate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let rate = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&s), &"a sample rate"))?,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom("sample rate out of range"))?,
        Some(other) => {
            return Err(de::Error::invalid_type(
                unexpected(&other),
                &"a number or numeric string",
            ));
        }
    };

    if !rate.is_finite() {
        return Err(de::Error::custom("sample rate must be finite"));
    }

    Ok(Some(rate))
}

fn unexpected(value: &Value) -> de::Unexpected<'_> {
    match value {
        Value::Bool(b) => de::Unexpected::Bool(*b),
        Value::Array(_) => de::Unexpected::Seq,
        Value::Object(_) => de::Unexpected::Map,
        _ => de::Unexpected::Other("value"),
    }
}

fn cmp_rates(a: &Option<f64>, b: &Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.total_cmp(b),
    }
}

/// Client sample rates extracted from a batch of root transactions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleRates {
    /// All recorded rates including missing ones, sorted with missing rates first.
    pub all: Vec<Option<f64>>,
    /// Only the recorded numeric rates, sorted ascending.
    pub numeric: Vec<f64>,
}

impl SampleRates {
    /// Extracts sample rates from the given root transactions.
    pub fn extract(samples: &[RootTransactionSample]) -> Self {
        let mut all: Vec<Option<f64>> = samples.iter().map(|s| s.client_sample_rate).collect();
        all.sort_by(cmp_rates);

        // `all` is sorted with missing rates first, so the numeric tail is already ascending.
        let numeric = all.iter().flatten().copied().collect();

        Self { all, numeric }
    }

    /// Returns the number of transactions without a recorded sample rate.
    pub fn missing(&self) -> usize {
        self.all.len() - self.numeric.len()
    }

    /// Returns the percentage in `[0, 100]` of transactions without a recorded sample rate.
    ///
    /// Returns `None` if there are no transactions.
    pub fn null_percentage(&self) -> Option<f64> {
        match self.all.len() {
            0 => None,
            len => Some(self.missing() as f64 / len as f64 * 100.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    fn sample(rate: Option<f64>) -> RootTransactionSample {
        RootTransactionSample {
            id: "a".repeat(32),
            trace: "b".repeat(32),
            client_sample_rate: rate,
        }
    }

    #[test]
    fn test_deserialize_rate_variants() {
        let rates: Vec<Option<f64>> = [
            json!({"id": "1", "trace": "t", "trace.client_sample_rate": 0.25}),
            json!({"id": "2", "trace": "t", "trace.client_sample_rate": "0.5"}),
            json!({"id": "3", "trace": "t", "trace.client_sample_rate": ""}),
            json!({"id": "4", "trace": "t", "trace.client_sample_rate": null}),
            json!({"id": "5", "trace": "t"}),
            json!({"id": "6", "trace": "t", "trace.client_sample_rate": 1}),
        ]
        .into_iter()
        .map(|row| {
            serde_json::from_value::<RootTransactionSample>(row)
                .unwrap()
                .client_sample_rate
        })
        .collect();

        assert_eq!(
            rates,
            vec![Some(0.25), Some(0.5), None, None, None, Some(1.0)]
        );
    }

    #[test]
    fn test_deserialize_rate_invalid() {
        for rate in [json!("fast"), json!(true), json!([0.5]), json!("inf")] {
            let row = json!({"id": "1", "trace": "t", "trace.client_sample_rate": rate});
            assert!(
                serde_json::from_value::<RootTransactionSample>(row).is_err(),
                "{rate}"
            );
        }
    }

    #[test]
    fn test_extract() {
        let samples: Vec<_> = [Some(0.1), None, Some(0.5), Some(0.2), None]
            .into_iter()
            .map(sample)
            .collect();

        let rates = SampleRates::extract(&samples);
        assert_eq!(rates.all, vec![None, None, Some(0.1), Some(0.2), Some(0.5)]);
        assert_eq!(rates.numeric, vec![0.1, 0.2, 0.5]);
        assert_eq!(rates.missing(), 2);
        assert_eq!(rates.null_percentage(), Some(40.0));
    }

    #[test]
    fn test_null_percentage_bounds() {
        assert_eq!(SampleRates::extract(&[]).null_percentage(), None);
        assert_eq!(
            SampleRates::extract(&[sample(None)]).null_percentage(),
            Some(100.0)
        );
        assert_eq!(
            SampleRates::extract(&[sample(Some(1.0))]).null_percentage(),
            Some(0.0)
        );
    }
}
