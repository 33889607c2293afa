//! The unary handler core.
//!
//! A [`Handler`] serves one protobuf-defined unary RPC over three wire
//! protocols: canonical gRPC, gRPC-Web, and plain JSON. One `serve` call
//! handles one HTTP request end to end: negotiate, decode, run the
//! interceptor chain and the application, write the result in the shape the
//! protocol demands.

use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use axum::routing::MethodRouter;
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::Service;

use grpcmux_axum_core::{FrameError, decode_frame};

use crate::context::{
    ACCEPT_ENCODING_VALUE, ACCEPT_POST, ACCEPT_POST_WITHOUT_JSON, CompressionEncoding,
    GRPC_TIMEOUT_HEADER, RpcContext, RpcProtocol, Specification,
    negotiate_grpc_response_encoding, negotiate_json_response_encoding, parse_timeout,
};
use crate::error::{Code, RpcError};
use crate::interceptor::{BoxFuture, Interceptor, UnaryHandler};
use crate::registrar::Registrar;
use crate::response::{
    GRPC_MESSAGE, GRPC_STATUS, GRPC_STATUS_DETAILS_BIN, write_result_grpc, write_result_json,
};

/// A raw gRPC delegate: takes over the whole exchange for calls that do not
/// fit the unary shape (the reflection service's bidi stream). Receives the
/// request plus the negotiated request and response compression.
pub type RawGrpc =
    Arc<dyn Fn(Request, CompressionEncoding, CompressionEncoding) -> BoxFuture<'static, Response> + Send + Sync>;

/// Options resolved once at handler construction.
pub struct HandlerOptions<Req, Res> {
    /// Never compress responses, regardless of what the client accepts.
    pub disable_gzip_response: bool,
    /// Treat `application/json` like any other unsupported content type.
    pub disable_json: bool,
    /// Reject request messages larger than this many bytes; 0 = unbounded.
    pub max_request_bytes: usize,
    /// Collector the handler registers its method name with.
    pub registrar: Option<Registrar>,
    /// Interceptor (or chain) wrapped around every call.
    pub interceptor: Option<Arc<dyn Interceptor<Req, Res>>>,
    /// Static headers merged into every response prelude.
    pub response_headers: Option<HeaderMap>,
}

impl<Req, Res> Default for HandlerOptions<Req, Res> {
    fn default() -> Self {
        Self {
            disable_gzip_response: false,
            disable_json: false,
            max_request_bytes: 0,
            registrar: None,
            interceptor: None,
            response_headers: None,
        }
    }
}

impl<Req, Res> Clone for HandlerOptions<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            disable_gzip_response: self.disable_gzip_response,
            disable_json: self.disable_json,
            max_request_bytes: self.max_request_bytes,
            registrar: self.registrar.clone(),
            interceptor: self.interceptor.clone(),
            response_headers: self.response_headers.clone(),
        }
    }
}

impl<Req, Res> HandlerOptions<Req, Res> {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Never compress responses.
    pub fn disable_gzip_response(mut self) -> Self {
        self.disable_gzip_response = true;
        self
    }

    /// Refuse JSON requests.
    pub fn disable_json(mut self) -> Self {
        self.disable_json = true;
        self
    }

    /// Bound decompressed request messages; 0 means unbounded.
    pub fn max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = max;
        self
    }

    /// Register the method name with `registrar` at construction.
    pub fn registrar(mut self, registrar: Registrar) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// Wrap every call with `interceptor`.
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor<Req, Res>>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Merge `headers` into every response prelude.
    pub fn response_headers(mut self, headers: HeaderMap) -> Self {
        self.response_headers = Some(headers);
        self
    }
}

/// The server side of a single unary RPC.
///
/// Safe for concurrent use; every [`serve`](Handler::serve) call allocates
/// its own request message and per-call state.
pub struct Handler<Req, Res> {
    method_fqn: Arc<str>,
    implementation: UnaryHandler<Req, Res>,
    raw_grpc: Option<RawGrpc>,
    options: HandlerOptions<Req, Res>,
}

impl<Req, Res> Clone for Handler<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            method_fqn: self.method_fqn.clone(),
            implementation: self.implementation.clone(),
            raw_grpc: self.raw_grpc.clone(),
            options: self.options.clone(),
        }
    }
}

impl<Req, Res> Handler<Req, Res>
where
    Req: Message + DeserializeOwned + Default + Send + 'static,
    Res: Message + Serialize + Send + Sync + 'static,
{
    /// Construct a handler for `method_fqn` (e.g.
    /// `acme.ping.v1.PingService.Ping`) around the application function.
    pub fn new<F, Fut>(method_fqn: impl Into<String>, function: F, options: HandlerOptions<Req, Res>) -> Self
    where
        F: Fn(RpcContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res, RpcError>> + Send + 'static,
    {
        let method_fqn: Arc<str> = method_fqn.into().into();
        if let Some(registrar) = &options.registrar {
            registrar.register(&method_fqn);
        }

        let implementation: UnaryHandler<Req, Res> = Arc::new(move |ctx, req| {
            let fut = function(ctx, req);
            Box::pin(async move { fut.await.map(Some) })
        });

        Self {
            method_fqn,
            implementation,
            raw_grpc: None,
            options,
        }
    }

    /// Install a raw gRPC delegate. When set, gRPC-flavored calls hand the
    /// entire request to the delegate and emit its response untouched.
    pub fn with_raw_grpc(mut self, raw: RawGrpc) -> Self {
        self.raw_grpc = Some(raw);
        self
    }

    /// The fully-qualified method name this handler serves.
    pub fn method_fqn(&self) -> &str {
        &self.method_fqn
    }

    /// The URL path for this method: `/package.Service/Method`.
    pub fn route_path(&self) -> String {
        match self.method_fqn.rsplit_once('.') {
            Some((service, method)) => format!("/{service}/{method}"),
            None => format!("/{}", self.method_fqn),
        }
    }

    /// Serve one HTTP request as one RPC call, producing the complete
    /// response: headers, body, and (for the gRPC flavors) trailers.
    pub async fn serve(&self, req: Request) -> Response {
        // Early rejections drop the request, which lets the connection
        // layer discard any unread body bytes.
        if req.method() != Method::POST {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_owned();
        let mut protocol = RpcProtocol::from_content_type(&content_type);
        if protocol.is_json() && self.options.disable_json {
            protocol = RpcProtocol::Unknown;
        }
        if !protocol.is_valid() {
            let accept_post = if self.options.disable_json {
                ACCEPT_POST_WITHOUT_JSON
            } else {
                ACCEPT_POST
            };
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::UNSUPPORTED_MEDIA_TYPE;
            response
                .headers_mut()
                .insert("accept-post", HeaderValue::from_static(accept_post));
            return response;
        }

        // Metadata parsed before the interceptor chain runs can still fail;
        // the failure is deferred into the call so observability sees it.
        let mut failed: Option<RpcError> = None;

        let mut deadline = None;
        if let Some(value) = req.headers().get(GRPC_TIMEOUT_HEADER) {
            match value.to_str() {
                Ok(value) => match parse_timeout(value) {
                    Ok(timeout) => deadline = Some(Instant::now() + timeout),
                    // The client sent the header, so the parse error text is
                    // safe to send back.
                    Err(e) => failed = Some(RpcError::wrap(Code::InvalidArgument, e)),
                },
                Err(_) => {
                    failed = Some(RpcError::invalid_argument(
                        "protocol error: invalid grpc-timeout value",
                    ));
                }
            }
        }

        let (request_compression, response_compression) =
            self.negotiate_compression(&protocol, req.headers(), &mut failed);

        let spec = Specification {
            method: self.method_fqn.to_string(),
            protocol,
            content_type: content_type.clone(),
            request_compression,
            response_compression,
        };

        // Header prelude. Written before the call runs so a raw delegate
        // inherits it, and so trailers are declared up front for HTTP/1.1
        // intermediaries.
        let mut prelude = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            prelude.insert(header::CONTENT_TYPE, value);
        }
        if protocol.uses_framing() {
            prelude.insert(
                "grpc-accept-encoding",
                HeaderValue::from_static(ACCEPT_ENCODING_VALUE),
            );
            prelude.insert(
                "grpc-encoding",
                HeaderValue::from_static(response_compression.as_str()),
            );
            prelude.append(header::TRAILER, HeaderValue::from_static(GRPC_STATUS));
            prelude.append(header::TRAILER, HeaderValue::from_static(GRPC_MESSAGE));
            prelude.append(
                header::TRAILER,
                HeaderValue::from_static(GRPC_STATUS_DETAILS_BIN),
            );
        }
        if let Some(custom) = &self.options.response_headers {
            for (name, value) in custom.iter() {
                prelude.append(name, value.clone());
            }
        }

        let cancellation = CancellationToken::new();
        // Cancelled when serve finishes or is dropped (client disconnect).
        let _cancel_guard = cancellation.clone().drop_guard();

        let ctx = RpcContext::new(
            spec,
            req.headers().clone(),
            Arc::new(Mutex::new(prelude)),
            cancellation.clone(),
            deadline,
        );

        let hijacked: Arc<Mutex<Option<Response>>> = Arc::new(Mutex::new(None));
        let implementation: UnaryHandler<Req, Res> = if let Some(failed) = failed {
            Arc::new(move |_ctx, _req| {
                let failed = failed.clone();
                Box::pin(async move { Err(failed) })
            })
        } else if protocol.is_json() {
            self.implementation_json(req)
        } else {
            self.implementation_grpc(req, hijacked.clone())
        };

        let handler = match &self.options.interceptor {
            Some(interceptor) => interceptor.wrap_handler(implementation),
            None => implementation,
        };

        let call = (handler)(ctx.clone(), Req::default());
        let result = match deadline {
            Some(at) => {
                tokio::pin!(call);
                tokio::select! {
                    result = &mut call => result,
                    _ = tokio::time::sleep_until(at) => {
                        // Deadline expiry is cancellation: the application
                        // observes the token and picks its own error.
                        cancellation.cancel();
                        call.await
                    }
                }
            }
            None => call.await,
        };

        if let Some(response) = hijacked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            return response;
        }

        let outcome = match result {
            Ok(Some(res)) => Ok(res),
            Ok(None) => {
                tracing::error!(method = %self.method_fqn, "call returned no response and none was written");
                Err(RpcError::internal("no response produced for call"))
            }
            Err(err) => Err(err),
        };

        if protocol.is_json() {
            write_result_json(&ctx, outcome)
        } else {
            write_result_grpc(&ctx, outcome)
        }
    }

    fn negotiate_compression(
        &self,
        protocol: &RpcProtocol,
        headers: &HeaderMap,
        failed: &mut Option<RpcError>,
    ) -> (CompressionEncoding, CompressionEncoding) {
        if protocol.is_json() {
            let request = match header_str(headers, header::CONTENT_ENCODING.as_str()) {
                Some("gzip") => CompressionEncoding::Gzip,
                _ => CompressionEncoding::Identity,
            };
            let response = if self.options.disable_gzip_response {
                CompressionEncoding::Identity
            } else {
                negotiate_json_response_encoding(header_str(headers, header::ACCEPT_ENCODING.as_str()))
            };
            return (request, response);
        }

        let encoding = header_str(headers, "grpc-encoding");
        let request = match CompressionEncoding::from_header(encoding) {
            Some(encoding) => encoding,
            None => {
                if failed.is_none() {
                    *failed = Some(RpcError::unimplemented(format!(
                        "unknown compression {:?}: accepted grpc-encoding values are {}",
                        encoding.unwrap_or(""),
                        ACCEPT_ENCODING_VALUE,
                    )));
                }
                CompressionEncoding::Identity
            }
        };

        // Response compression defaults to mirroring the request, then the
        // client's accept list overrides it.
        let response = if self.options.disable_gzip_response {
            CompressionEncoding::Identity
        } else {
            negotiate_grpc_response_encoding(header_str(headers, "grpc-accept-encoding"), request)
        };
        (request, response)
    }

    /// The JSON decoding shim: read, decompress, bound, decode, then call
    /// the application.
    fn implementation_json(&self, req: Request) -> UnaryHandler<Req, Res> {
        let implementation = self.implementation.clone();
        let max = self.options.max_request_bytes;
        let body = Arc::new(Mutex::new(Some(req.into_body())));

        Arc::new(move |ctx: RpcContext, _req: Req| {
            let implementation = implementation.clone();
            let body = body
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            Box::pin(async move {
                let Some(body) = body else {
                    return Err(RpcError::internal("request body already consumed"));
                };
                let bytes = read_body(body).await?;

                let bytes = match ctx.spec().request_compression.codec() {
                    Some(codec) => {
                        let inflated = if max > 0 {
                            codec.decompress_limited(&bytes, max)
                        } else {
                            codec.decompress(&bytes)
                        };
                        inflated
                            .map_err(|_| RpcError::invalid_argument("can't read gzipped body"))?
                    }
                    None => bytes,
                };
                if max > 0 && bytes.len() > max {
                    return Err(RpcError::resource_exhausted(format!(
                        "message larger than configured maximum of {max} bytes"
                    )));
                }

                let message: Req = serde_json::from_slice(&bytes)
                    .map_err(|_| RpcError::invalid_argument("can't unmarshal JSON body"))?;
                implementation(ctx, message).await
            })
        })
    }

    /// The gRPC decoding shim: unwrap one length-prefixed frame, decode,
    /// then call the application. A raw delegate takes over instead when
    /// one is installed.
    fn implementation_grpc(
        &self,
        req: Request,
        hijacked: Arc<Mutex<Option<Response>>>,
    ) -> UnaryHandler<Req, Res> {
        let implementation = self.implementation.clone();
        let raw_grpc = self.raw_grpc.clone();
        let max = self.options.max_request_bytes;
        let request = Arc::new(Mutex::new(Some(req)));

        Arc::new(move |ctx: RpcContext, _req: Req| {
            let implementation = implementation.clone();
            let raw_grpc = raw_grpc.clone();
            let hijacked = hijacked.clone();
            let request = request
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            Box::pin(async move {
                let Some(request) = request else {
                    return Err(RpcError::internal("request body already consumed"));
                };

                if let Some(raw) = raw_grpc {
                    let response = raw(
                        request,
                        ctx.spec().request_compression,
                        ctx.spec().response_compression,
                    )
                    .await;
                    *hijacked
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(response);
                    return Ok(None);
                }

                let bytes = read_body(request.into_body()).await?;
                let codec = ctx.spec().request_compression.codec();
                let payload = decode_frame(bytes, codec.as_ref(), max).map_err(frame_error)?;
                let message =
                    Req::decode(payload).map_err(|_| {
                        RpcError::invalid_argument("can't unmarshal protobuf body")
                    })?;
                implementation(ctx, message).await
            })
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn read_body(body: Body) -> Result<bytes::Bytes, RpcError> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| RpcError::new(Code::Unknown, format!("can't read request body: {e}")))
}

fn frame_error(err: FrameError) -> RpcError {
    match err {
        FrameError::PayloadTooLarge { .. } => RpcError::wrap(Code::ResourceExhausted, err),
        _ => RpcError::wrap(Code::InvalidArgument, err),
    }
}

impl<Req, Res> Service<Request> for Handler<Req, Res>
where
    Req: Message + DeserializeOwned + Default + Send + 'static,
    Res: Message + Serialize + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.serve(req).await) })
    }
}

/// Mount a handler as a POST route, axum-style:
///
/// ```ignore
/// let handler = Handler::new("acme.ping.v1.PingService.Ping", ping, HandlerOptions::new());
/// let app = Router::new().route(&handler.route_path(), post_unary(handler));
/// ```
pub fn post_unary<Req, Res>(handler: Handler<Req, Res>) -> MethodRouter<()>
where
    Req: Message + DeserializeOwned + Default + Send + 'static,
    Res: Message + Serialize + Send + Sync + 'static,
{
    axum::routing::post_service(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_path() {
        let handler = Handler::<EchoRequest, EchoRequest>::new(
            "acme.ping.v1.PingService.Ping",
            |_ctx, req| async move { Ok::<_, RpcError>(req) },
            HandlerOptions::new(),
        );
        assert_eq!(handler.route_path(), "/acme.ping.v1.PingService/Ping");
    }

    #[test]
    fn test_registrar_sees_construction() {
        let registrar = Registrar::new();
        let _handler = Handler::<EchoRequest, EchoRequest>::new(
            "acme.ping.v1.PingService.Ping",
            |_ctx, req| async move { Ok::<_, RpcError>(req) },
            HandlerOptions::new().registrar(registrar.clone()),
        );
        assert_eq!(registrar.methods(), vec!["acme.ping.v1.PingService.Ping"]);
    }

    #[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
    struct EchoRequest {
        #[prost(string, tag = "1")]
        #[serde(default)]
        value: String,
    }
}
