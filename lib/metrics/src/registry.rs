use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::attributes::{Attributes, assert_legal_key};
use crate::metric::{Metric, MetricObserver, Observation};
use crate::{Counter, Gauge, Histogram};

/// A set of named metrics. Cloning a `Registry` yields a handle to the same
/// metrics, so one instance can be shared by the producers and the exporter.
#[derive(Clone, Default)]
pub struct Registry {
    counters: Arc<Mutex<BTreeMap<&'static str, Metric<Counter>>>>,
    gauges: Arc<Mutex<BTreeMap<&'static str, Metric<Gauge>>>>,
    histograms: Arc<Mutex<BTreeMap<&'static str, Metric<Histogram>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registering an existing name returns the metric registered first.
    pub fn register_counter(
        &self,
        name: &'static str,
        description: &'static str,
    ) -> Metric<Counter> {
        register(&self.counters, name, description, ())
    }

    pub fn register_gauge(&self, name: &'static str, description: &'static str) -> Metric<Gauge> {
        register(&self.gauges, name, description, ())
    }

    pub fn register_histogram(
        &self,
        name: &'static str,
        description: &'static str,
        buckets: impl Iterator<Item = f64>,
    ) -> Metric<Histogram> {
        register(&self.histograms, name, description, buckets.collect())
    }

    pub fn report(&self, reporter: &mut impl Reporter) {
        report_generic(reporter, &self.counters);
        report_generic(reporter, &self.gauges);
        report_generic(reporter, &self.histograms);
    }
}

fn register<T: MetricObserver>(
    metrics: &Mutex<BTreeMap<&'static str, Metric<T>>>,
    name: &'static str,
    description: &'static str,
    options: T::Options,
) -> Metric<T> {
    assert_legal_key(name);

    metrics
        .lock()
        .entry(name)
        .or_insert_with(|| Metric {
            name,
            description,
            shard: Arc::new(Mutex::new(BTreeMap::new())),
            options: Arc::new(options),
        })
        .clone()
}

fn report_generic<M: MetricObserver>(
    reporter: &mut impl Reporter,
    metrics: &Mutex<BTreeMap<&'static str, Metric<M>>>,
) {
    metrics.lock().values().for_each(|metric| {
        reporter.start_metric(metric.name, metric.description, M::KIND);
        metric
            .shard
            .lock()
            .iter()
            .for_each(|(attrs, observer)| reporter.report(attrs, observer.observe()));
        reporter.finish_metric()
    })
}

pub trait Reporter {
    fn start_metric(&mut self, name: &'static str, description: &'static str, kind: &'static str);

    fn report(&mut self, attrs: &Attributes, observation: Observation);

    /// Finish recording a given metric
    fn finish_metric(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_multiple_times() {
        let reg = Registry::new();

        let cs = reg.register_counter("name", "desc");
        let c1 = cs.recorder(&[("foo", "bar")]);
        assert_eq!(c1.fetch(), 0);
        c1.inc();
        assert_eq!(c1.fetch(), 1);

        let cs = reg.register_counter("name", "desc");
        let c2 = cs.recorder(&[("foo", "bar")]);
        assert_eq!(c2.fetch(), 1);
        c2.inc();
        assert_eq!(c1.fetch(), 2);
    }

    #[test]
    fn clones_share_metrics() {
        let reg = Registry::new();
        let other = reg.clone();

        reg.register_gauge("up", "desc").recorder(&[]).set(1.0);
        let gauge = other.register_gauge("up", "desc").recorder(&[]);

        assert_eq!(gauge.fetch(), 1.0);
    }

    #[test]
    fn cloned_histogram_shares_observations() {
        let reg = Registry::new();

        let histogram = reg.register_histogram("latency", "desc", [0.1, 1.0].into_iter());
        let cloned = histogram.clone();
        histogram.recorder(&[]).record(0.5);

        assert_eq!(cloned.recorder(&[]).get().count(), 1);
    }

    #[test]
    fn independent_registries() {
        let a = Registry::new();
        let b = Registry::new();

        a.register_counter("total", "desc").recorder(&[]).inc();
        let counter = b.register_counter("total", "desc").recorder(&[]);

        assert_eq!(counter.fetch(), 0);
    }

    #[test]
    fn report_order() {
        #[derive(Default)]
        struct Collect {
            seen: Vec<(&'static str, &'static str, usize)>,
        }

        impl Reporter for Collect {
            fn start_metric(&mut self, name: &'static str, _: &'static str, kind: &'static str) {
                self.seen.push((name, kind, 0));
            }

            fn report(&mut self, _attrs: &Attributes, _observation: Observation) {
                if let Some(last) = self.seen.last_mut() {
                    last.2 += 1;
                }
            }

            fn finish_metric(&mut self) {}
        }

        let reg = Registry::new();
        reg.register_histogram("latency", "desc", [1.0].into_iter())
            .recorder(&[])
            .record(0.5);
        reg.register_gauge("b_gauge", "desc");
        let counters = reg.register_counter("a_counter", "desc");
        counters.recorder(&[("k", "1")]).inc();
        counters.recorder(&[("k", "2")]).inc();

        let mut collect = Collect::default();
        reg.report(&mut collect);

        assert_eq!(
            collect.seen,
            vec![
                ("a_counter", "counter", 2),
                ("b_gauge", "gauge", 0),
                ("latency", "histogram", 1),
            ]
        );
    }
}
