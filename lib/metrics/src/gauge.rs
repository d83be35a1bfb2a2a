use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::metric::{MetricObserver, Observation};

/// A gauge holding an `f64`, stored as its bit pattern.
#[derive(Clone, Debug, Default)]
pub struct Gauge {
    state: Arc<AtomicU64>,
}

impl Gauge {
    pub fn set(&self, value: f64) {
        self.state.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn fetch(&self) -> f64 {
        f64::from_bits(self.state.load(Ordering::Relaxed))
    }
}

impl MetricObserver for Gauge {
    type Recorder = Self;

    const KIND: &'static str = "gauge";

    fn recorder(&self) -> Self::Recorder {
        self.clone()
    }

    fn observe(&self) -> Observation {
        Observation::Gauge(self.fetch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge() {
        let gauge = Gauge::default();
        assert_eq!(gauge.fetch(), 0.0);

        gauge.set(42.0);
        assert_eq!(gauge.fetch(), 42.0);

        // recorders share the value
        gauge.recorder().set(-0.5);
        assert_eq!(gauge.fetch(), -0.5);
    }
}
