use metrics::{Counter, Gauge, Histogram, Registry};

const REQUEST_DURATION_BUCKETS: [f64; 8] = [0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0];

/// Instruments updated by the discovery engine.
#[derive(Clone, Debug)]
pub struct DiscoveryMetrics {
    pub request_duration: Histogram,
    pub discovered_targets: Gauge,
    pub request_failures: Counter,
}

impl DiscoveryMetrics {
    pub fn register(registry: &Registry) -> Self {
        let request_duration = registry
            .register_histogram(
                "prometheus_workspaces_sd_request_duration_seconds",
                "Histogram of latencies for requests to the Amazon Workspaces API.",
                REQUEST_DURATION_BUCKETS.into_iter(),
            )
            .recorder(&[]);
        let discovered_targets = registry
            .register_gauge(
                "prometheus_workspaces_sd_discovered_targets",
                "Number of discovered workspaces targets",
            )
            .recorder(&[]);
        let request_failures = registry
            .register_counter(
                "prometheus_workspaces_sd_request_failures_total",
                "Total number of failed requests to the Amazon Workspaces API.",
            )
            .recorder(&[]);

        DiscoveryMetrics {
            request_duration,
            discovered_targets,
            request_failures,
        }
    }
}

/// Publish a constant `build_info` series carrying the version.
pub fn register_build_info(registry: &Registry) {
    registry
        .register_gauge(
            "prometheus_workspaces_sd_build_info",
            "A metric with a constant '1' value labeled by version from which workspaces-sd was built.",
        )
        .recorder(&[("version", crate::get_version())])
        .set(1.0);
}
