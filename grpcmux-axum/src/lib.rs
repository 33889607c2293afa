//! Serve a protobuf-defined unary RPC over three wire protocols — gRPC,
//! gRPC-Web, and plain JSON — from one axum handler.
//!
//! A [`Handler`] owns a single application function and negotiates the wire
//! details per request: content type, per-direction compression, the
//! `Grpc-Timeout` deadline, and the trailer-based status channel. An
//! optional [`Interceptor`] chain wraps every call for logging, metrics, or
//! auth without touching the application function.
//!
//! ```ignore
//! use axum::Router;
//! use grpcmux_axum::prelude::*;
//!
//! async fn ping(_ctx: RpcContext, req: PingRequest) -> Result<PingResponse, RpcError> {
//!     Ok(PingResponse { number: req.number })
//! }
//!
//! let handler = Handler::new("acme.ping.v1.PingService.Ping", ping, HandlerOptions::new());
//! let app = Router::new().route(&handler.route_path(), post_unary(handler));
//! ```

pub mod context;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod registrar;
pub mod response;

// Re-export key types at the crate root for convenience
pub use context::{
    ACCEPT_ENCODING_VALUE, ACCEPT_POST, ACCEPT_POST_WITHOUT_JSON, CompressionEncoding,
    GRPC_TIMEOUT_HEADER, RpcContext, RpcProtocol, Specification, TimeoutParseError,
    negotiate_grpc_response_encoding, negotiate_json_response_encoding, parse_timeout,
};
pub use error::{Code, ErrorDetail, RpcError};
pub use handler::{Handler, HandlerOptions, RawGrpc, post_unary};
pub use interceptor::{
    BoxFuture, FnInterceptor, Interceptor, InterceptorChain, UnaryHandler, UnaryNext, UnaryResult,
};
pub use registrar::Registrar;
pub use response::{GRPC_MESSAGE, GRPC_STATUS, GRPC_STATUS_DETAILS_BIN};

// Re-export the wire-level crate and the codecs downstream code touches
pub use grpcmux_axum_core as wire;
pub use grpcmux_axum_core::{
    BoxedCodec, Codec, FrameError, GzipCodec, IdentityCodec, Status, decode_binary_header,
    decode_frame, encode_binary_header, encode_frame, percent_decode, percent_encode,
};

// Re-export several crates downstream code needs in scope
pub use prost;
pub use serde;

pub mod prelude {
    //! The most common types in one import.
    pub use crate::context::{CompressionEncoding, RpcContext, RpcProtocol, Specification};
    pub use crate::error::{Code, ErrorDetail, RpcError};
    pub use crate::handler::{Handler, HandlerOptions, post_unary};
    pub use crate::interceptor::{FnInterceptor, Interceptor, InterceptorChain, UnaryNext};
    pub use crate::registrar::Registrar;
}
