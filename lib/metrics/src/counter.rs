use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::metric::{MetricObserver, Observation};

/// A monotonic counter.
#[derive(Clone, Debug, Default)]
pub struct Counter {
    state: Arc<AtomicU64>,
}

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, value: u64) {
        self.state.fetch_add(value, Ordering::Relaxed);
    }

    pub fn fetch(&self) -> u64 {
        self.state.load(Ordering::Relaxed)
    }
}

impl MetricObserver for Counter {
    type Recorder = Self;

    const KIND: &'static str = "counter";

    fn recorder(&self) -> Self::Recorder {
        self.clone()
    }

    fn observe(&self) -> Observation {
        Observation::Counter(self.fetch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter() {
        let counter = Counter::default();
        assert_eq!(counter.fetch(), 0);

        counter.inc();
        assert_eq!(counter.fetch(), 1);

        counter.inc_by(2);
        assert_eq!(counter.fetch(), 3);

        // clones share state
        let other = counter.clone();
        other.inc();
        assert_eq!(counter.fetch(), 4);
    }
}
