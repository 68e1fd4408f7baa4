//! A high-level StatsD metric client built on cadence.
//!
//! ## Defining Metrics
//!
//! In order to use metrics, one needs to first define one of the metric traits on a custom enum.
//! The following types of metrics are available: `counter`, `timer` and `distribution`.
//! For explanations on what that means see [Metric Types].
//!
//! The metric traits serve only to provide a type safe metric name. All metric types have exactly
//! the same form, they are different only to ensure that a metric can only be used for the type for
//! which it was defined, (e.g. a counter metric cannot be used as a timer metric).
//!
//! ## Initializing the Client
//!
//! Metrics can be used without initializing a statsd client. In that case, invoking `with_client`
//! or the [`metric!`] macro will become a noop. Only when configured, metrics will actually be
//! collected.
//!
//! ```no_run
//! # use std::collections::BTreeMap;
//! use dsdist_statsd::MetricsConfig;
//!
//! dsdist_statsd::init(MetricsConfig {
//!     prefix: "dsdist".to_owned(),
//!     host: "localhost:8125".to_owned(),
//!     default_tags: BTreeMap::new(),
//!     sample_rate: 1.0,
//! })
//! .ok();
//! ```
//!
//! ## Macro Usage
//!
//! ```
//! use dsdist_statsd::{metric, CounterMetric};
//!
//! struct MyCounter;
//!
//! impl CounterMetric for MyCounter {
//!     fn name(&self) -> &'static str {
//!         "counter"
//!     }
//! }
//!
//! metric!(counter(MyCounter) += 1);
//! ```
//!
//! [Metric Types]: https://github.com/statsd/statsd/blob/master/docs/metric_types.md

use std::collections::BTreeMap;
use std::net::UdpSocket;
use std::ops::Deref;
use std::sync::Arc;

use cadence::{BufferedUdpMetricSink, Metric, MetricBuilder, QueuingMetricSink, StatsdClient};
use parking_lot::RwLock;
use rand::Rng;

/// Maximum number of metric events that can be queued before we start dropping them.
const METRICS_MAX_QUEUE_SIZE: usize = 100_000;

/// Client configuration object to store globally.
#[derive(Debug)]
pub struct MetricsClient {
    /// The raw statsd client.
    pub statsd_client: StatsdClient,
    /// Default tags to apply to every metric.
    pub default_tags: BTreeMap<String, String>,
    /// Global sample rate between `0.0` and `1.0`.
    pub sample_rate: f64,
}

impl Deref for MetricsClient {
    type Target = StatsdClient;

    fn deref(&self) -> &StatsdClient {
        &self.statsd_client
    }
}

impl MetricsClient {
    /// Send a metric with the default tags defined on this `MetricsClient`.
    #[inline(always)]
    pub fn send_metric<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        if !self.should_send() {
            return;
        }

        for (k, v) in &self.default_tags {
            metric = metric.with_tag(k, v);
        }

        if self.sample_rate < 1.0 {
            metric = metric.with_sampling_rate(self.sample_rate);
        }

        if let Err(error) = metric.try_send() {
            dsdist_log::error!(
                error = &error as &dyn std::error::Error,
                maximum_capacity = METRICS_MAX_QUEUE_SIZE,
                "error sending a metric",
            );
        }
    }

    fn should_send(&self) -> bool {
        if self.sample_rate <= 0.0 {
            false
        } else if self.sample_rate >= 1.0 {
            true
        } else {
            rand::rng().random::<f64>() <= self.sample_rate
        }
    }
}

/// Configuration for [`init`].
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Prefix which is prepended to all metric names.
    pub prefix: String,
    /// Host and port of the statsd server.
    pub host: String,
    /// Tags that are added to all metrics.
    pub default_tags: BTreeMap<String, String>,
    /// Sample rate for all metrics, between `0.0` and `1.0`.
    pub sample_rate: f64,
}

static METRICS_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    static CURRENT_CLIENT: std::cell::RefCell<Option<Arc<MetricsClient>>> =
        METRICS_CLIENT.read().clone().into();
}

/// Internal prelude for the macro.
#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

/// Set a new statsd client.
pub fn set_client(client: MetricsClient) {
    *METRICS_CLIENT.write() = Some(Arc::new(client));
    CURRENT_CLIENT.with(|cell| cell.replace(METRICS_CLIENT.read().clone()));
}

/// Set a test client for the period of the called function (only affects the current thread).
///
/// Returns all metrics that were emitted in their statsd line format.
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let test_client = MetricsClient {
        statsd_client: StatsdClient::from_sink("", sink),
        default_tags: Default::default(),
        sample_rate: 1.0,
    };

    CURRENT_CLIENT.with(|cell| {
        let old_client = cell.replace(Some(Arc::new(test_client)));
        f();
        cell.replace(old_client);
    });

    rx.try_iter()
        .map(|x| String::from_utf8_lossy(&x).into_owned())
        .collect()
}

/// Tell the metrics system to report to statsd.
pub fn init(config: MetricsConfig) -> Result<(), cadence::MetricError> {
    dsdist_log::info!("reporting metrics to statsd at {}", config.host);

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;

    let udp_sink = BufferedUdpMetricSink::from(config.host.as_str(), socket)?;
    let queuing_sink = QueuingMetricSink::with_capacity(udp_sink, METRICS_MAX_QUEUE_SIZE);

    set_client(MetricsClient {
        statsd_client: StatsdClient::from_sink(&config.prefix, queuing_sink),
        default_tags: config.default_tags,
        sample_rate: config.sample_rate.clamp(0.0, 1.0),
    });

    Ok(())
}

/// Invoke a callback with the current statsd client.
///
/// If statsd is not configured the callback is not invoked.  For the most part
/// the [`metric!`] macro should be used instead.
#[inline(always)]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    CURRENT_CLIENT.with(|client| {
        if let Some(client) = client.borrow().as_deref() {
            f(client)
        } else {
            R::default()
        }
    })
}

/// A metric for capturing timings.
///
/// Timings are a positive number of milliseconds between a start and end time. Examples include
/// the time taken for a query to return.
pub trait TimerMetric {
    /// Returns the timer metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing counters.
///
/// Counters are simple values incremented or decremented by a client.
pub trait CounterMetric {
    /// Returns the counter metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing distributions.
///
/// A distribution is often similar to timers. Distributions can be thought of as a more general
/// (not limited to timing things) form of timers.
pub trait DistributionMetric {
    /// Returns the distribution metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// Emits a metric.
///
/// See [crate-level documentation](self) for examples.
#[macro_export]
macro_rules! metric {
    // counter increment
    (counter($id:expr) += $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        match $value {
            value if value != 0 => {
                $crate::with_client(|client| {
                    use $crate::_pred::*;
                    client.send_metric(
                        client.count_with_tags(&$crate::CounterMetric::name(&$id), value)
                        $(.with_tag(stringify!($($k).*), $v))*
                    )
                })
            },
            _ => {},
        };
    };

    // distribution
    (distribution($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.distribution_with_tags(&$crate::DistributionMetric::name(&$id), $value)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // timer value
    (timer($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                // NOTE: cadence distribution support Duration out of the box and converts it to nanos,
                // but we want milliseconds.
                client.distribution_with_tags(&$crate::TimerMetric::name(&$id), $value.as_nanos() as f64 / 1e6)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // timed block
    (timer($id:expr), $($($k:ident).* = $v:expr,)* $block:block) => {{
        let now = std::time::Instant::now();
        let rv = {$block};
        $crate::metric!(timer($id) = now.elapsed() $(, $($k).* = $v)*);
        rv
    }};
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    enum TestCounters {
        Rejected,
    }

    impl CounterMetric for TestCounters {
        fn name(&self) -> &'static str {
            match self {
                Self::Rejected => "rejected",
            }
        }
    }

    enum TestTimers {
        Query,
    }

    impl TimerMetric for TestTimers {
        fn name(&self) -> &'static str {
            match self {
                Self::Query => "query",
            }
        }
    }

    enum TestDistributions {
        Size,
    }

    impl DistributionMetric for TestDistributions {
        fn name(&self) -> &'static str {
            match self {
                Self::Size => "size",
            }
        }
    }

    #[test]
    fn test_capturing_client() {
        let captures = with_capturing_test_client(|| {
            metric!(counter(TestCounters::Rejected) += 1, reason = "fan_out");
            metric!(counter(TestCounters::Rejected) += 0);
            metric!(distribution(TestDistributions::Size) = 42u64);
        });

        assert_eq!(
            captures,
            ["rejected:1|c|#reason:fan_out", "size:42|d"]
        );
    }

    #[test]
    fn test_timer_value() {
        let captures = with_capturing_test_client(|| {
            metric!(timer(TestTimers::Query) = Duration::from_millis(3));
        });

        assert_eq!(captures, ["query:3|d"]);
    }

    #[test]
    fn test_timed_block_returns_value() {
        let mut value = 0;
        let captures = with_capturing_test_client(|| {
            value = metric!(timer(TestTimers::Query), { 7 });
        });

        assert_eq!(value, 7);
        assert_eq!(captures.len(), 1);
        assert!(captures[0].starts_with("query:"));
    }

    #[test]
    fn test_noop_without_client() {
        // No client is configured on this thread, so this must not panic.
        metric!(counter(TestCounters::Rejected) += 1);
    }
}
