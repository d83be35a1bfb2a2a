mod handler;
mod serve;

use std::fmt;

use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, USER_AGENT};
use http::{HeaderValue, Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_rustls::{ConfigBuilderExt, HttpsConnector};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::{ClientConfig, RootCertStore};
use thiserror::Error;

pub use handler::Telemetry;
pub use serve::serve;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Failed to make HTTP(S) request: {0}")]
    CallRequest(#[from] hyper_util::client::legacy::Error),
    #[error("Failed to reading response: {0}")]
    ReadIncoming(#[from] hyper::Error),
    #[error("Failed to build HTTP request: {0}")]
    BuildRequest(#[from] http::Error),
}

/// An HTTP(S) client verifying servers against the platform's root
/// certificates.
#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    user_agent: HeaderValue,
}

impl HttpClient {
    pub fn new() -> HttpClient {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let config = match ClientConfig::builder().with_native_roots() {
            Ok(builder) => builder.with_no_client_auth(),
            Err(err) => {
                warn!(
                    message = "load native root certificates failed, https endpoints cannot be verified",
                    %err
                );

                ClientConfig::builder()
                    .with_root_certificates(RootCertStore::empty())
                    .with_no_client_auth()
            }
        };

        let https = HttpsConnector::from((http, config));
        let client = hyper_util::client::legacy::Builder::new(TokioExecutor::new()).build(https);
        let user_agent =
            HeaderValue::from_static(concat!("workspaces-sd/", env!("CARGO_PKG_VERSION")));

        HttpClient { client, user_agent }
    }

    pub async fn send(&self, mut req: Request<Full<Bytes>>) -> Result<Response<Incoming>, HttpError> {
        default_request_headers(&mut req, &self.user_agent);

        let uri = req.uri().clone();
        let resp = self.client.request(req).await?;

        debug!(
            message = "HTTP response received",
            %uri,
            status = %resp.status(),
            version = ?resp.version(),
        );

        Ok(resp)
    }
}

fn default_request_headers<B>(request: &mut Request<B>, user_agent: &HeaderValue) {
    if !request.headers().contains_key(USER_AGENT) {
        request.headers_mut().insert(USER_AGENT, user_agent.clone());
    }

    if !request.headers().contains_key(ACCEPT_ENCODING) {
        request
            .headers_mut()
            .insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_headers_defaults() {
        let user_agent = HeaderValue::from_static("workspaces-sd");
        let mut request = Request::post("http://example.com").body(()).unwrap();
        default_request_headers(&mut request, &user_agent);

        assert_eq!(
            request.headers().get(ACCEPT_ENCODING),
            Some(&HeaderValue::from_static("identity")),
        );
        assert_eq!(request.headers().get(USER_AGENT), Some(&user_agent));
    }

    #[test]
    fn request_headers_not_overwritten() {
        let mut request = Request::post("http://example.com")
            .header(ACCEPT_ENCODING, "gzip")
            .header(USER_AGENT, "foo")
            .body(())
            .unwrap();
        default_request_headers(&mut request, &HeaderValue::from_static("workspaces-sd"));

        assert_eq!(
            request.headers().get(ACCEPT_ENCODING),
            Some(&HeaderValue::from_static("gzip")),
        );
        assert_eq!(
            request.headers().get(USER_AGENT),
            Some(&HeaderValue::from_static("foo"))
        );
    }
}
