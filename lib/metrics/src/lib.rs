#![forbid(unsafe_code)]
#![deny(unused)]
#![deny(dead_code)]

mod attributes;
mod counter;
mod gauge;
mod histogram;
mod metric;
mod registry;
mod text;

pub use attributes::Attributes;
pub use counter::Counter;
pub use gauge::Gauge;
pub use histogram::{Histogram, HistogramObservation, ObservationBucket};
pub use metric::{Metric, Observation};
pub use registry::{Registry, Reporter};
pub use text::{CONTENT_TYPE, TextEncoder};
