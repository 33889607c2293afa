//! Per-call types: the negotiated [`Specification`] and the [`RpcContext`]
//! carried through the interceptor chain into the application.

pub mod encoding;
pub mod protocol;
pub mod timeout;

pub use encoding::{
    ACCEPT_ENCODING_VALUE, CompressionEncoding, negotiate_grpc_response_encoding,
    negotiate_json_response_encoding,
};
pub use protocol::{ACCEPT_POST, ACCEPT_POST_WITHOUT_JSON, RpcProtocol};
pub use timeout::{GRPC_TIMEOUT_HEADER, TimeoutParseError, parse_timeout};

use axum::http::HeaderMap;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call descriptor, immutable after negotiation.
///
/// Built when a request enters the handler and carried through the context
/// so interceptors and the application can see what was negotiated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Specification {
    /// Fully-qualified method name, e.g. `acme.ping.v1.PingService.Ping`.
    pub method: String,
    /// The wire protocol family serving this call.
    pub protocol: RpcProtocol,
    /// The request Content-Type as received; echoed on the response.
    pub content_type: String,
    /// Negotiated request-side message encoding.
    pub request_compression: CompressionEncoding,
    /// Negotiated response-side message encoding.
    pub response_compression: CompressionEncoding,
}

/// Per-call state visible to interceptors and the application.
///
/// Cloning is cheap; clones share the response header map and the
/// cancellation token.
#[derive(Clone, Debug)]
pub struct RpcContext {
    spec: Specification,
    request_headers: HeaderMap,
    response_headers: Arc<Mutex<HeaderMap>>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl RpcContext {
    pub(crate) fn new(
        spec: Specification,
        request_headers: HeaderMap,
        response_headers: Arc<Mutex<HeaderMap>>,
        cancellation: CancellationToken,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            spec,
            request_headers,
            response_headers,
            cancellation,
            deadline,
        }
    }

    /// The negotiated call descriptor.
    pub fn spec(&self) -> &Specification {
        &self.spec
    }

    /// Request headers, including any user-defined metadata.
    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    /// Read or mutate the response headers.
    ///
    /// The map is seeded with the protocol prelude before the interceptor
    /// chain runs; whatever it holds when the call finishes is written out.
    pub fn with_response_headers<R>(&self, f: impl FnOnce(&mut HeaderMap) -> R) -> R {
        let mut headers = self
            .response_headers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut headers)
    }

    pub(crate) fn response_headers_snapshot(&self) -> HeaderMap {
        self.with_response_headers(|headers| headers.clone())
    }

    /// Token cancelled when the deadline expires, the client goes away, or
    /// the call finishes. Long-running applications should watch it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the call has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The absolute deadline derived from `Grpc-Timeout`, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
