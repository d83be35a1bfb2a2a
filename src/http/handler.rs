use std::convert::Infallible;
use std::future::{Ready, ready};
use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::service::Service;
use metrics::{Registry, TextEncoder};

/// Serves the registry in text exposition format, a health endpoint and a
/// landing page.
#[derive(Clone)]
pub struct Telemetry {
    registry: Registry,
    path: Arc<str>,
    landing: Bytes,
}

impl Telemetry {
    pub fn new(registry: Registry, path: impl Into<Arc<str>>) -> Self {
        let path = path.into();
        let landing = Bytes::from(format!(
            "<html>\n\
             <head><title>WorkSpaces SD</title></head>\n\
             <body>\n\
             <h1>WorkSpaces SD</h1>\n\
             <p><a href=\"{path}\">Metrics</a></p>\n\
             </body>\n\
             </html>\n"
        ));

        Telemetry {
            registry,
            path,
            landing,
        }
    }

    pub fn handle<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        if req.method() != Method::GET {
            return not_found();
        }

        let path = req.uri().path();
        if path == &*self.path {
            return self.metrics(req.headers());
        }

        match path {
            "/health" => Response::builder()
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(Full::new(Bytes::from_static(b"OK")))
                .unwrap_or_else(|_| internal_error()),
            "/" => Response::builder()
                .header(CONTENT_TYPE, "text/html; charset=utf-8")
                .body(Full::new(self.landing.clone()))
                .unwrap_or_else(|_| internal_error()),
            _ => not_found(),
        }
    }

    fn metrics(&self, headers: &HeaderMap) -> Response<Full<Bytes>> {
        let text = TextEncoder::encode(&self.registry);

        let mut builder = Response::builder().header(CONTENT_TYPE, metrics::CONTENT_TYPE);
        let body = if should_compress(headers) {
            match gzip(text.as_bytes()) {
                Ok(compressed) => {
                    builder = builder.header(CONTENT_ENCODING, "gzip");
                    Bytes::from(compressed)
                }
                Err(err) => {
                    warn!(message = "compress metrics failed", %err);
                    Bytes::from(text)
                }
            }
        } else {
            Bytes::from(text)
        };

        builder
            .body(Full::new(body))
            .unwrap_or_else(|_| internal_error())
    }
}

impl<B> Service<Request<B>> for Telemetry {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        ready(Ok(self.handle(&req)))
    }
}

fn should_compress(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("gzip"))
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn not_found() -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::default());
    *resp.status_mut() = StatusCode::NOT_FOUND;
    resp
}

fn internal_error() -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::default());
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}
