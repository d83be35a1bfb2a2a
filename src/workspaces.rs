//! Amazon WorkSpaces inventory, spoken over the `DescribeWorkspaces` JSON 1.1
//! protocol.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Request, Uri};
use http_body_util::{BodyExt, Full};
use serde::Serialize;

use crate::http::{HttpClient, HttpError};
use crate::inventory::{FetchError, Inventory, Page};

const TARGET: &str = "WorkspacesService.DescribeWorkspaces";
const AMZ_JSON: &str = "application/x-amz-json-1.1";

/// Responses with a non-2xx status carry at most this much of the body in
/// the error.
const MAX_ERROR_BODY: usize = 512;

/// The regional endpoint used when none is configured.
pub fn default_endpoint(region: &str) -> String {
    format!("https://workspaces.{region}.amazonaws.com")
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeWorkspaces<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

pub struct Client {
    http: HttpClient,
    endpoint: Uri,
    page_size: Option<u32>,
    timeout: Duration,
}

impl Client {
    pub fn new(
        http: HttpClient,
        endpoint: Uri,
        page_size: Option<u32>,
        timeout: Duration,
    ) -> Self {
        Client {
            http,
            endpoint,
            page_size,
            timeout,
        }
    }

    async fn describe(&self, cursor: Option<&str>) -> Result<Page, FetchError> {
        let body = serde_json::to_vec(&DescribeWorkspaces {
            next_token: cursor,
            limit: self.page_size,
        })?;

        let req = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, AMZ_JSON)
            .header("X-Amz-Target", TARGET)
            .body(Full::new(Bytes::from(body)))
            .map_err(HttpError::from)?;

        let resp = self.http.send(req).await?;
        let (parts, incoming) = resp.into_parts();
        let body = incoming
            .collect()
            .await
            .map_err(HttpError::from)?
            .to_bytes();

        if !parts.status.is_success() {
            let end = body.len().min(MAX_ERROR_BODY);
            return Err(FetchError::UnexpectedStatus {
                status: parts.status,
                body: String::from_utf8_lossy(&body[..end]).into_owned(),
            });
        }

        serde_json::from_slice::<Page>(&body).map_err(Into::into)
    }
}

#[async_trait]
impl Inventory for Client {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page, FetchError> {
        match tokio::time::timeout(self.timeout, self.describe(cursor)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use http::{Response, StatusCode};
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;

    type Received = Arc<Mutex<Vec<(Option<String>, Option<String>, Value)>>>;

    /// Serves `respond(request_body)` and records the target and content
    /// type headers together with the body.
    async fn mock(
        respond: impl Fn(&Value) -> (StatusCode, String) + Clone + Send + Sync + 'static,
        delay: Duration,
    ) -> (SocketAddr, Received) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Received::default();

        let recorded = Arc::clone(&received);
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let respond = respond.clone();
                let recorded = Arc::clone(&recorded);

                let service = service_fn(move |req: Request<Incoming>| {
                    let respond = respond.clone();
                    let recorded = Arc::clone(&recorded);

                    async move {
                        let target = header(&req, "x-amz-target");
                        let content_type = header(&req, "content-type");

                        let body = req.into_body().collect().await.unwrap().to_bytes();
                        let body = serde_json::from_slice::<Value>(&body).unwrap();

                        let (status, payload) = respond(&body);
                        recorded.lock().unwrap().push((target, content_type, body));

                        tokio::time::sleep(delay).await;

                        let mut resp = Response::new(Full::new(Bytes::from(payload)));
                        *resp.status_mut() = status;
                        Ok::<_, Infallible>(resp)
                    }
                });

                tokio::spawn(http1::Builder::new().serve_connection(TokioIo::new(stream), service));
            }
        });

        (addr, received)
    }

    fn header(req: &Request<Incoming>, name: &str) -> Option<String> {
        req.headers()
            .get(name)
            .map(|value| value.to_str().unwrap().to_string())
    }

    fn client(addr: SocketAddr, page_size: Option<u32>, timeout: Duration) -> Client {
        Client::new(
            HttpClient::new(),
            format!("http://{addr}/").parse().unwrap(),
            page_size,
            timeout,
        )
    }

    #[tokio::test]
    async fn describe_pages() {
        let (addr, received) = mock(
            |body| {
                let payload = match body.get("NextToken").and_then(Value::as_str) {
                    None => json!({
                        "Workspaces": [
                            {"WorkspaceId": "ws-1", "IpAddress": "10.0.0.1"}
                        ],
                        "NextToken": "t2"
                    }),
                    Some(_) => json!({
                        "Workspaces": [
                            {"WorkspaceId": "ws-2"}
                        ]
                    }),
                };

                (StatusCode::OK, payload.to_string())
            },
            Duration::ZERO,
        )
        .await;
        let client = client(addr, Some(25), Duration::from_secs(5));

        let first = client.fetch_page(None).await.unwrap();
        assert_eq!(first.records[0].workspace_id, "ws-1");
        assert_eq!(first.next_token.as_deref(), Some("t2"));

        let second = client.fetch_page(Some("t2")).await.unwrap();
        assert_eq!(second.records[0].ip_address, None);
        assert!(!second.has_more());

        let received = received.lock().unwrap();
        assert_eq!(
            *received,
            vec![
                (
                    Some(TARGET.to_string()),
                    Some(AMZ_JSON.to_string()),
                    json!({"Limit": 25})
                ),
                (
                    Some(TARGET.to_string()),
                    Some(AMZ_JSON.to_string()),
                    json!({"NextToken": "t2", "Limit": 25})
                ),
            ]
        );
    }

    #[tokio::test]
    async fn unexpected_status() {
        let (addr, _) = mock(
            |_| {
                (
                    StatusCode::BAD_REQUEST,
                    r#"{"__type":"InvalidParameterValuesException"}"#.to_string(),
                )
            },
            Duration::ZERO,
        )
        .await;
        let client = client(addr, None, Duration::from_secs(5));

        match client.fetch_page(None).await.unwrap_err() {
            FetchError::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert!(body.contains("InvalidParameterValuesException"));
            }
            err => panic!("unexpected error {err:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_response() {
        let (addr, _) = mock(|_| (StatusCode::OK, "{".to_string()), Duration::ZERO).await;
        let client = client(addr, None, Duration::from_secs(5));

        let err = client.fetch_page(None).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)), "{err:?}");
    }

    #[tokio::test]
    async fn timeout() {
        let (addr, _) = mock(
            |_| (StatusCode::OK, r#"{"Workspaces":[]}"#.to_string()),
            Duration::from_secs(5),
        )
        .await;
        let client = client(addr, None, Duration::from_millis(100));

        let err = client.fetch_page(None).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)), "{err:?}");
    }

    #[tokio::test]
    async fn connection_refused() {
        let addr = testify::pick_unused_local_port();
        let client = client(addr, None, Duration::from_secs(5));

        let err = client.fetch_page(None).await.unwrap_err();
        assert!(matches!(err, FetchError::Http(_)), "{err:?}");
    }

    #[test]
    fn endpoint() {
        assert_eq!(
            default_endpoint("ap-southeast-2"),
            "https://workspaces.ap-southeast-2.amazonaws.com"
        );
    }
}
