//! Mode-specific result writers.
//!
//! Success and error take different shapes per protocol: the JSON mode maps
//! the status code onto the HTTP status and writes a JSON status body, while
//! the gRPC flavors keep HTTP 200 and carry the status in trailers after
//! zero or one length-prefixed frame.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use http_body::Frame;
use prost::Message;
use serde::Serialize;

use grpcmux_axum_core::{encode_binary_header, encode_frame, percent_encode};

use crate::context::RpcContext;
use crate::error::{Code, RpcError, StatusBody};

/// Trailer carrying the decimal status code.
pub const GRPC_STATUS: &str = "grpc-status";
/// Trailer carrying the percent-encoded status message.
pub const GRPC_MESSAGE: &str = "grpc-message";
/// Trailer carrying the base64 binary status with details.
pub const GRPC_STATUS_DETAILS_BIN: &str = "grpc-status-details-bin";

/// Response body for the gRPC flavors: at most one data frame, then the
/// status trailers.
pub(crate) struct UnaryGrpcBody {
    data: Option<Bytes>,
    trailers: Option<HeaderMap>,
}

impl UnaryGrpcBody {
    fn new(data: Bytes, trailers: HeaderMap) -> Self {
        Self {
            data: (!data.is_empty()).then_some(data),
            trailers: Some(trailers),
        }
    }
}

impl http_body::Body for UnaryGrpcBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let Some(data) = this.data.take() {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }
        if let Some(trailers) = this.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }
        Poll::Ready(None)
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none() && self.trailers.is_none()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        let len = self.data.as_ref().map(Bytes::len).unwrap_or(0) as u64;
        http_body::SizeHint::with_exact(len)
    }
}

/// Write a JSON-mode result: the response body on success, the status body
/// on error.
pub(crate) fn write_result_json<Res>(ctx: &RpcContext, result: Result<Res, RpcError>) -> Response
where
    Res: Serialize,
{
    match result {
        Ok(res) => match serde_json::to_vec(&res) {
            Ok(body) => json_response(ctx, StatusCode::OK, body),
            Err(e) => {
                tracing::error!(error = %e, "marshaling JSON response failed");
                write_error_json(ctx, &RpcError::internal("can't marshal JSON response"))
            }
        },
        Err(err) => write_error_json(ctx, &err),
    }
}

fn write_error_json(ctx: &RpcContext, err: &RpcError) -> Response {
    match serde_json::to_vec(&StatusBody::from_error(err)) {
        Ok(body) => json_response(ctx, err.code().http_status(), body),
        Err(e) => {
            tracing::error!(error = %e, "marshaling JSON status failed");
            let body = format!(
                r#"{{"code":{},"message":"error marshaling status with code {}"}}"#,
                Code::Internal as i32,
                err.code() as i32,
            );
            json_response(ctx, StatusCode::INTERNAL_SERVER_ERROR, body.into_bytes())
        }
    }
}

/// Assemble a JSON-mode response, compressing when gzip was negotiated and
/// no upstream middleware has already claimed `Content-Encoding`.
fn json_response(ctx: &RpcContext, status: StatusCode, payload: Vec<u8>) -> Response {
    let mut headers = ctx.response_headers_snapshot();
    let mut payload = payload;

    let compression = ctx.spec().response_compression;
    if !compression.is_identity() && !headers.contains_key(header::CONTENT_ENCODING) {
        if let Some(codec) = compression.codec() {
            match codec.compress(&payload) {
                Ok(compressed) => {
                    headers.insert(
                        header::CONTENT_ENCODING,
                        HeaderValue::from_static(compression.as_str()),
                    );
                    payload = compressed.into();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "response compression failed, sending identity");
                }
            }
        }
    }

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Write a gRPC-mode result: one frame plus OK trailers on success, empty
/// body plus error trailers otherwise.
///
/// The HTTP status is always 200; errors remain expressible after body bytes
/// have been sent because they travel in trailers.
pub(crate) fn write_result_grpc<Res>(ctx: &RpcContext, result: Result<Res, RpcError>) -> Response
where
    Res: Message,
{
    let headers = ctx.response_headers_snapshot();
    match result {
        Ok(res) => {
            let payload = res.encode_to_vec();
            let codec = ctx.spec().response_compression.codec();
            match encode_frame(&payload, codec.as_ref()) {
                Ok(frame) => grpc_response(headers, Bytes::from(frame), status_trailers(None)),
                Err(e) => {
                    tracing::error!(error = %e, "encoding response frame failed");
                    let err = RpcError::new(Code::Unknown, "can't marshal protobuf response");
                    grpc_response(headers, Bytes::new(), status_trailers(Some(&err)))
                }
            }
        }
        Err(err) => grpc_response(headers, Bytes::new(), status_trailers(Some(&err))),
    }
}

fn grpc_response(headers: HeaderMap, data: Bytes, trailers: HeaderMap) -> Response {
    let mut response = Response::new(Body::new(UnaryGrpcBody::new(data, trailers)));
    *response.headers_mut() = headers;
    response
}

/// Build the status trailers for a call outcome.
///
/// `None` is success: `grpc-status: 0` with empty message and details.
pub(crate) fn status_trailers(err: Option<&RpcError>) -> HeaderMap {
    let mut trailers = HeaderMap::with_capacity(3);

    let Some(err) = err else {
        trailers.insert(GRPC_STATUS, HeaderValue::from_static("0"));
        trailers.insert(GRPC_MESSAGE, HeaderValue::from_static(""));
        trailers.insert(GRPC_STATUS_DETAILS_BIN, HeaderValue::from_static(""));
        return trailers;
    };

    let status = err.to_status();
    let code = HeaderValue::from_str(&status.code.to_string());
    let message = HeaderValue::from_str(&percent_encode(&status.message));
    let details = HeaderValue::from_str(&encode_binary_header(&status.encode_to_vec()));

    match (code, message, details) {
        (Ok(code), Ok(message), Ok(details)) => {
            trailers.insert(GRPC_STATUS, code);
            trailers.insert(GRPC_MESSAGE, message);
            trailers.insert(GRPC_STATUS_DETAILS_BIN, details);
        }
        _ => {
            // Percent-encoding keeps values in printable ASCII, so this is
            // unreachable in practice; degrade to a detail-free internal
            // status rather than panic.
            let diagnostic =
                percent_encode(&format!("error marshaling status with code {}", status.code));
            trailers.insert(
                GRPC_STATUS,
                HeaderValue::from_str(&(Code::Internal as i32).to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("13")),
            );
            trailers.insert(
                GRPC_MESSAGE,
                HeaderValue::from_str(&diagnostic).unwrap_or_else(|_| HeaderValue::from_static("")),
            );
        }
    }
    trailers
}
