//! Protocol dispatch.
//!
//! The Content-Type header picks the wire protocol for a call. Three
//! families are served: canonical gRPC, the gRPC-Web browser variant, and a
//! plain JSON mode. Everything else is rejected before any allocation.

/// Wire protocol selected from the incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RpcProtocol {
    /// Canonical gRPC (`application/grpc`, `application/grpc+proto`).
    /// Length-prefixed frames, status in HTTP trailers.
    Grpc,

    /// gRPC-Web (`application/grpc-web`, `application/grpc-web+proto`).
    /// Same framing and trailer model as gRPC.
    GrpcWeb,

    /// Plain JSON (`application/json`). Raw body, status mapped onto the
    /// HTTP status code.
    Json,

    /// Unknown or unsupported content-type. Requests carrying this are
    /// rejected with 415.
    #[default]
    Unknown,
}

/// Content types advertised in `Accept-Post` on 415 responses.
pub const ACCEPT_POST: &str = "application/grpc,application/grpc+proto,application/json";

/// `Accept-Post` variant for handlers that refuse JSON.
pub const ACCEPT_POST_WITHOUT_JSON: &str = "application/grpc,application/grpc+proto";

impl RpcProtocol {
    /// Detect the protocol from a Content-Type header value.
    ///
    /// Matching is by prefix so parameterized values
    /// (`application/json; charset=utf-8`) resolve too.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("application/grpc-web") {
            Self::GrpcWeb
        } else if content_type.starts_with("application/grpc") {
            Self::Grpc
        } else if content_type.starts_with("application/json") {
            Self::Json
        } else {
            Self::Unknown
        }
    }

    /// Whether messages travel in length-prefixed frames (all gRPC flavors).
    pub fn uses_framing(&self) -> bool {
        matches!(self, Self::Grpc | Self::GrpcWeb)
    }

    /// Whether this is the JSON mode.
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }

    /// Whether this protocol is served at all.
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}
