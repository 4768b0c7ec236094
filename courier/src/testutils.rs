//! In-process stand-in for the platform API, upload servers and download hosts.
//!
//! Every request is recorded. Replies are scripted per path; unscripted paths
//! answer 404.

use crate::config::Credentials;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

pub const TEST_ACCESS_TOKEN: &str = "test-access-token";
pub const TEST_PEER_ID: &str = "2000000001";
pub const TEST_GROUP_ID: &str = "100";

#[derive(Clone, Debug)]
pub enum MockReply {
    /// 200 with a JSON body.
    Json(Value),
    Raw {
        status: u16,
        content_type: Option<String>,
        body: Bytes,
    },
}

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub http_method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RecordedCall {
    /// Platform method name for `/method/{name}` calls.
    pub fn api_method(&self) -> Option<&str> {
        self.path.strip_prefix("/method/")
    }

    /// Decoded form parameters of a form-encoded body.
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body)
            .into_owned()
            .collect()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Default)]
struct MockState {
    replies: HashMap<String, MockReply>,
    calls: Vec<RecordedCall>,
}

pub struct MockPlatform {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    handle: JoinHandle<()>,
}

impl MockPlatform {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(MockState::default()));

        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let io = TokioIo::new(stream);
                let state = server_state.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| handle_request(state.clone(), req));
                    let builder = Builder::new(TokioExecutor::new());
                    if let Err(err) = builder.serve_connection(io, service).await {
                        eprintln!("Error serving connection: {:?}", err);
                    }
                });
            }
        });

        MockPlatform {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api_url(&self) -> String {
        format!("{}/method", self.url())
    }

    /// Credentials pointing at this mock, with a group id configured.
    pub fn credentials(&self) -> Credentials {
        let mut credentials = Credentials::new(TEST_ACCESS_TOKEN, TEST_PEER_ID);
        credentials.group_id = Some(TEST_GROUP_ID.to_string());
        credentials.api_url = Url::parse(&self.api_url()).unwrap();
        credentials.request_timeout_secs = 5.0;
        credentials
    }

    pub fn on(&self, path: &str, reply: MockReply) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert(path.to_string(), reply);
    }

    /// Scripts the JSON envelope returned for a platform method.
    pub fn on_method(&self, method: &str, envelope: Value) {
        self.on(&format!("/method/{method}"), MockReply::Json(envelope));
    }

    /// Serves `body` at `path` with the given content type.
    pub fn on_file(&self, path: &str, content_type: &str, body: &[u8]) {
        self.on(
            path,
            MockReply::Raw {
                status: 200,
                content_type: Some(content_type.to_string()),
                body: Bytes::copy_from_slice(body),
            },
        );
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }

    /// Parameters of the single call made to `method`.
    pub fn method_params(&self, method: &str) -> HashMap<String, String> {
        let calls = self.calls_to(&format!("/method/{method}"));
        assert_eq!(calls.len(), 1, "expected exactly one call to {method}");
        calls[0].form()
    }

    /// Platform method names, in call order.
    pub fn api_methods(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| call.api_method().map(String::from))
            .collect()
    }
}

impl Drop for MockPlatform {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_request(
    state: Arc<Mutex<MockState>>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_else(|_| Bytes::new());

    let path = parts.uri.path().to_string();
    let reply = {
        let mut state = state.lock().unwrap();
        state.calls.push(RecordedCall {
            http_method: parts.method.to_string(),
            path: path.clone(),
            content_type: parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(String::from),
            body,
        });
        state.replies.get(&path).cloned()
    };

    let response = match reply {
        Some(MockReply::Json(value)) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(value.to_string()))),
        Some(MockReply::Raw {
            status,
            content_type,
            body,
        }) => {
            let mut builder = Response::builder().status(status);
            if let Some(content_type) = content_type {
                builder = builder.header(CONTENT_TYPE, content_type);
            }
            builder.body(Full::new(body))
        }
        None => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"not found"))),
    };

    Ok(response.unwrap())
}
