use std::fmt::Write;

use crate::attributes::Attributes;
use crate::metric::Observation;
use crate::registry::{Registry, Reporter};

/// Content type of the Prometheus text exposition format
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Renders a `Registry` in the Prometheus text exposition format.
#[derive(Default)]
pub struct TextEncoder {
    buf: String,
    current: Option<Header>,
}

struct Header {
    name: &'static str,
    description: &'static str,
    kind: &'static str,
    written: bool,
}

impl TextEncoder {
    pub fn encode(registry: &Registry) -> String {
        let mut encoder = TextEncoder::default();
        registry.report(&mut encoder);
        encoder.buf
    }

    fn write_sample(
        &mut self,
        name: &str,
        suffix: &str,
        attrs: &Attributes,
        le: Option<f64>,
        value: impl std::fmt::Display,
    ) {
        self.buf.push_str(name);
        self.buf.push_str(suffix);

        if !attrs.is_empty() || le.is_some() {
            self.buf.push('{');

            let mut first = true;
            for (key, value) in attrs.iter() {
                if !first {
                    self.buf.push(',');
                }
                first = false;

                self.buf.push_str(key);
                self.buf.push_str("=\"");
                escape_label_value(&mut self.buf, value);
                self.buf.push('"');
            }

            if let Some(le) = le {
                if !first {
                    self.buf.push(',');
                }
                self.buf.push_str("le=\"");
                write_float(&mut self.buf, le);
                self.buf.push('"');
            }

            self.buf.push('}');
        }

        let _ = writeln!(self.buf, " {value}");
    }
}

impl Reporter for TextEncoder {
    fn start_metric(&mut self, name: &'static str, description: &'static str, kind: &'static str) {
        self.current = Some(Header {
            name,
            description,
            kind,
            written: false,
        });
    }

    fn report(&mut self, attrs: &Attributes, observation: Observation) {
        let Some(header) = self.current.as_mut() else {
            return;
        };

        let name = header.name;
        if !header.written {
            header.written = true;
            let _ = writeln!(
                self.buf,
                "# HELP {} {}\n# TYPE {} {}",
                name, header.description, name, header.kind
            );
        }

        match observation {
            Observation::Counter(value) => self.write_sample(name, "", attrs, None, value),
            Observation::Gauge(value) => {
                let mut rendered = String::new();
                write_float(&mut rendered, value);
                self.write_sample(name, "", attrs, None, rendered)
            }
            Observation::Histogram(histogram) => {
                let mut cumulative = 0u64;
                for bucket in &histogram.buckets {
                    cumulative = cumulative.wrapping_add(bucket.count);
                    self.write_sample(name, "_bucket", attrs, Some(bucket.le), cumulative);
                }

                let mut sum = String::new();
                write_float(&mut sum, histogram.sum);
                self.write_sample(name, "_sum", attrs, None, sum);
                self.write_sample(name, "_count", attrs, None, cumulative);
            }
        }
    }

    fn finish_metric(&mut self) {
        self.current = None;
    }
}

fn write_float(buf: &mut String, value: f64) {
    if value == f64::INFINITY {
        buf.push_str("+Inf");
    } else if value == f64::NEG_INFINITY {
        buf.push_str("-Inf");
    } else if value.is_nan() {
        buf.push_str("NaN");
    } else {
        let _ = write!(buf, "{value}");
    }
}

fn escape_label_value(buf: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '"' => buf.push_str("\\\""),
            '\n' => buf.push_str("\\n"),
            c => buf.push(c),
        }
    }
}
