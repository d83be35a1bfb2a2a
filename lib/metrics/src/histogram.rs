use std::iter::once;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::metric::{MakeMetricObserver, MetricObserver, Observation};

/// A bucketed observation, `count` is not cumulative.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationBucket {
    pub count: u64,
    pub le: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistogramObservation {
    pub buckets: Vec<ObservationBucket>,
    pub sum: f64,
}

impl HistogramObservation {
    pub fn count(&self) -> u64 {
        self.buckets
            .iter()
            .fold(0u64, |acc, bucket| acc.wrapping_add(bucket.count))
    }
}

#[derive(Clone, Debug)]
pub struct Histogram {
    state: Arc<Mutex<HistogramObservation>>,
}

impl Histogram {
    /// `buckets` must be sorted ascending, the `+Inf` bucket is appended.
    pub fn new(buckets: impl Iterator<Item = f64>) -> Self {
        let buckets = buckets
            .chain(once(f64::INFINITY))
            .map(|le| ObservationBucket { le, count: 0 })
            .collect::<Vec<_>>();

        Self {
            state: Arc::new(Mutex::new(HistogramObservation { buckets, sum: 0.0 })),
        }
    }

    pub fn record(&self, value: f64) {
        let mut state = self.state.lock();

        // NaN never matches a bucket and is dropped
        if let Some(bucket) = state.buckets.iter_mut().find(|b| value <= b.le) {
            bucket.count = bucket.count.wrapping_add(1);
            state.sum += value;
        }
    }

    pub fn get(&self) -> HistogramObservation {
        self.state.lock().clone()
    }
}

impl MetricObserver for Histogram {
    type Recorder = Self;

    const KIND: &'static str = "histogram";

    fn recorder(&self) -> Self::Recorder {
        self.clone()
    }

    fn observe(&self) -> Observation {
        Observation::Histogram(self.get())
    }
}

impl MakeMetricObserver for Histogram {
    type Options = Vec<f64>;

    fn create(options: &Self::Options) -> Self {
        let mut buckets = options
            .iter()
            .copied()
            .filter(|le| le.is_finite())
            .collect::<Vec<_>>();
        buckets.sort_by(f64::total_cmp);
        buckets.dedup();

        Histogram::new(buckets.into_iter())
    }
}
