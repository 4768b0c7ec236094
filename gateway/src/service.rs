use crate::errors::{GatewayError, RequestError};
use crate::metrics_defs::{GATEWAY_REQUESTS, REQUEST_DURATION};
use crate::schemas::{
    Authenticated, SendImageRequest, SendMessageRequest, SendPostRequest, SendVideoRequest,
};
use courier::Courier;
use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use shared::http::make_json_response;
use shared::{counter, histogram};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use subtle::ConstantTimeEq;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SendMessage,
    SendImage,
    SendVideo,
    SendPost,
}

impl Route {
    pub fn from_path(path: &str) -> Option<Route> {
        match path.trim_end_matches('/') {
            "/send_message" => Some(Route::SendMessage),
            "/send_image" => Some(Route::SendImage),
            "/send_video" => Some(Route::SendVideo),
            "/send_post" => Some(Route::SendPost),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Route::SendMessage => "send_message",
            Route::SendImage => "send_image",
            Route::SendVideo => "send_video",
            Route::SendPost => "send_post",
        }
    }
}

/// Authenticates relay requests and hands them to the courier.
pub struct RelayHandler {
    courier: Courier,
    internal_token: String,
}

impl RelayHandler {
    pub fn new(courier: Courier, internal_token: impl Into<String>) -> Self {
        RelayHandler {
            courier,
            internal_token: internal_token.into(),
        }
    }

    /// Serves one request whose body has already been read.
    pub async fn handle(&self, method: &Method, path: &str, body: Bytes) -> Response<Bytes> {
        let start = Instant::now();
        let route = Route::from_path(path);
        let route_label = route.map_or("unknown", |route| route.as_str());

        let result = match route {
            None => Err(RequestError::NotFound),
            Some(_) if *method != Method::POST => Err(RequestError::MethodNotAllowed),
            Some(route) => self.dispatch(route, &body).await,
        };

        let response = match result {
            Ok(value) => make_json_response(StatusCode::OK, &json!({"response": value})),
            Err(e) => error_response(route_label, e),
        };

        let status = response.status().as_u16().to_string();
        counter!(GATEWAY_REQUESTS, "route" => route_label, "status" => status.clone()).increment(1);
        histogram!(REQUEST_DURATION, "route" => route_label, "status" => status)
            .record(start.elapsed().as_secs_f64());

        response
    }

    async fn dispatch(&self, route: Route, body: &[u8]) -> Result<Value, RequestError> {
        match route {
            Route::SendMessage => {
                let request: SendMessageRequest = self.authenticate(body)?;
                Ok(self.courier.send_text(&request.message).await?)
            }
            Route::SendImage => {
                let request: SendImageRequest = self.authenticate(body)?;
                Ok(self.courier.send_image(request.image.as_str()).await?)
            }
            Route::SendVideo => {
                let request: SendVideoRequest = self.authenticate(body)?;
                Ok(self
                    .courier
                    .send_video(request.video.as_str(), request.send_type)
                    .await?)
            }
            Route::SendPost => {
                let request: SendPostRequest = self.authenticate(body)?;
                let image = request.image.as_ref().map(|url| url.as_str());
                Ok(self.courier.send_post(&request.message, image).await?)
            }
        }
    }

    /// Decodes the body, then checks its token. A malformed body is reported
    /// before the token is looked at.
    fn authenticate<T>(&self, body: &[u8]) -> Result<T, RequestError>
    where
        T: DeserializeOwned + Authenticated,
    {
        let request: T =
            serde_json::from_slice(body).map_err(|e| RequestError::InvalidBody(e.to_string()))?;

        let matches: bool = request
            .token()
            .as_bytes()
            .ct_eq(self.internal_token.as_bytes())
            .into();
        if !matches {
            return Err(RequestError::Unauthorized);
        }
        Ok(request)
    }
}

fn error_response(route: &'static str, error: RequestError) -> Response<Bytes> {
    let status = error.status();
    if status.is_server_error() {
        tracing::warn!(route, status = status.as_u16(), error = %error, "Relay request failed");
    } else {
        tracing::debug!(route, status = status.as_u16(), error = %error, "Relay request rejected");
    }

    let mut response = make_json_response(status, &json!({"detail": error.to_string()}));
    if status == StatusCode::METHOD_NOT_ALLOWED {
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("POST"));
    }
    response
}

pub struct GatewayService {
    handler: Arc<RelayHandler>,
}

impl GatewayService {
    pub fn new(handler: RelayHandler) -> Self {
        GatewayService {
            handler: Arc::new(handler),
        }
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = Response<BoxBody<Bytes, GatewayError>>;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.handler.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();

            let response = match Limited::new(body, MAX_BODY_BYTES).collect().await {
                Ok(collected) => {
                    handler
                        .handle(&parts.method, parts.uri.path(), collected.to_bytes())
                        .await
                }
                Err(e) => {
                    let error = if e.downcast_ref::<LengthLimitError>().is_some() {
                        RequestError::BodyTooLarge
                    } else {
                        RequestError::BodyRead(e.to_string())
                    };
                    error_response("unknown", error)
                }
            };

            Ok(response.map(|body| Full::new(body).map_err(|e| match e {}).boxed()))
        })
    }
}
