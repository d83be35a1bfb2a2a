use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::attributes::Attributes;
use crate::histogram::HistogramObservation;

/// A `Metric` records an `Observation` for each unique set of `Attributes`
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Counter(u64),
    Gauge(f64),
    Histogram(HistogramObservation),
}

/// Types that wish to be used with `Metric` must implement this trait
/// that exposes the necessary reporting API
pub trait MetricObserver: MakeMetricObserver + std::fmt::Debug + Send + 'static {
    /// The type that is used to modify the value reported by this MetricObserver
    type Recorder;

    /// Exposition type name, e.g. "counter"
    const KIND: &'static str;

    /// Return a `Self::Recorder` that can be used to mutate the value reported
    /// by this `MetricObserver`
    fn recorder(&self) -> Self::Recorder;

    /// Return the current value
    fn observe(&self) -> Observation;
}

/// How to construct new instances of a `MetricObserver`, a blanket impl is
/// provided for types that implement Default.
pub trait MakeMetricObserver {
    type Options: Sized + Send + Sync + std::fmt::Debug;

    fn create(options: &Self::Options) -> Self;
}

impl<T: Default> MakeMetricObserver for T {
    type Options = ();

    fn create(_: &Self::Options) -> Self {
        Default::default()
    }
}

pub struct Metric<T: MetricObserver> {
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
    pub(crate) shard: Arc<Mutex<BTreeMap<Attributes, T>>>,

    pub(crate) options: Arc<T::Options>,
}

// A derive would require `T: Clone`, the fields are shared already.
impl<T: MetricObserver> Clone for Metric<T> {
    fn clone(&self) -> Self {
        Metric {
            name: self.name,
            description: self.description,
            shard: Arc::clone(&self.shard),
            options: Arc::clone(&self.options),
        }
    }
}

impl<T: MetricObserver> Metric<T> {
    pub fn recorder(&self, attributes: impl Into<Attributes>) -> T::Recorder {
        self.observer(attributes).recorder()
    }

    pub fn observer(&self, attributes: impl Into<Attributes>) -> MappedMutexGuard<'_, T> {
        MutexGuard::map(self.shard.lock(), |values| {
            values
                .entry(attributes.into())
                .or_insert_with(|| T::create(&self.options))
        })
    }
}
