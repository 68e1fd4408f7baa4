use serde::{Deserialize, Serialize};

/// Returns the `p`-th percentile of an ascending sorted slice using the nearest-rank method.
///
/// The rank is `len * p`. If the rank is integral, the element at that zero-based index is
/// returned, otherwise the element at `ceil(rank) - 1`. The input is not sorted by this function.
///
/// Returns `None` if the slice is empty or `p` is not within `(0, 1]`. For `p = 1`, the largest
/// element is returned.
///
/// # Example
///
/// ```
/// use dsdist_sampling::percentile;
///
/// let data = [10.0, 20.0, 30.0, 40.0];
/// assert_eq!(percentile(&data, 0.5), Some(30.0));
/// assert_eq!(percentile(&data, 0.9), Some(40.0));
/// assert_eq!(percentile(&[], 0.5), None);
/// ```
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(p > 0.0 && p <= 1.0) {
        return None;
    }

    let rank = sorted.len() as f64 * p;
    let index = if rank.fract() == 0.0 {
        rank as usize
    } else {
        rank.ceil() as usize - 1
    };

    sorted.get(index.min(sorted.len() - 1)).copied()
}

/// Summary statistics of a sequence of sample rates.
///
/// All fields are `None` if the summarized sequence is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionSummary {
    /// The smallest value.
    pub min: Option<f64>,
    /// The largest value.
    pub max: Option<f64>,
    /// The arithmetic mean.
    pub mean: Option<f64>,
    /// The median.
    pub p50: Option<f64>,
    /// The 90th percentile.
    pub p90: Option<f64>,
    /// The 95th percentile.
    pub p95: Option<f64>,
    /// The 99th percentile.
    pub p99: Option<f64>,
}

impl DistributionSummary {
    /// Summarizes the given values, which do not need to be sorted.
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mean = match sorted.len() {
            0 => None,
            len => Some(sorted.iter().sum::<f64>() / len as f64),
        };

        Self {
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            mean,
            p50: percentile(&sorted, 0.5),
            p90: percentile(&sorted, 0.9),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
        }
    }

    /// Returns `true` if the summary was computed over an empty sequence.
    pub fn is_empty(&self) -> bool {
        self.min.is_none()
    }
}
