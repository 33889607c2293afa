//! Message-encoding negotiation.
//!
//! The gRPC flavors negotiate compression through `Grpc-Encoding` and
//! `Grpc-Accept-Encoding`; the JSON mode uses the standard HTTP
//! `Content-Encoding` / `Accept-Encoding` pair. Exactly two encodings are
//! supported: identity and gzip.

use grpcmux_axum_core::{BoxedCodec, GzipCodec};

/// Value advertised in `Grpc-Accept-Encoding` on every gRPC response.
pub const ACCEPT_ENCODING_VALUE: &str = "gzip,identity";

/// Supported message encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionEncoding {
    #[default]
    Identity,
    Gzip,
}

impl CompressionEncoding {
    /// Parse a request-side encoding header (`Grpc-Encoding` or
    /// `Content-Encoding`).
    ///
    /// Returns `None` for unsupported encodings; on the gRPC side the caller
    /// turns that into Unimplemented listing the accepted values.
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("") | Some("identity") => Some(Self::Identity),
            Some("gzip") => Some(Self::Gzip),
            _ => None,
        }
    }

    /// Header value string for this encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
        }
    }

    /// Returns true if this encoding is identity (no compression).
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Get the codec for this encoding. `None` means identity.
    pub fn codec(&self) -> Option<BoxedCodec> {
        match self {
            Self::Identity => None,
            Self::Gzip => Some(BoxedCodec::new(GzipCodec::default())),
        }
    }
}

/// Negotiate the gRPC response encoding from a `Grpc-Accept-Encoding` value.
///
/// The list is split on commas and spaces. Gzip wins if it appears anywhere;
/// identity is chosen only when gzip is absent; unrecognized tokens never
/// override `default` (the request-side encoding).
pub fn negotiate_grpc_response_encoding(
    accept: Option<&str>,
    default: CompressionEncoding,
) -> CompressionEncoding {
    let Some(accept) = accept else {
        return default;
    };

    let mut saw_identity = false;
    for token in accept.split([',', ' ']) {
        match token {
            "gzip" => return CompressionEncoding::Gzip,
            "identity" => saw_identity = true,
            _ => {}
        }
    }
    if saw_identity {
        CompressionEncoding::Identity
    } else {
        default
    }
}

/// Negotiate the JSON response encoding from an `Accept-Encoding` value.
pub fn negotiate_json_response_encoding(accept: Option<&str>) -> CompressionEncoding {
    match accept {
        Some(value) if value.contains("gzip") => CompressionEncoding::Gzip,
        _ => CompressionEncoding::Identity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_header() {
        assert_eq!(
            CompressionEncoding::from_header(None),
            Some(CompressionEncoding::Identity)
        );
        assert_eq!(
            CompressionEncoding::from_header(Some("")),
            Some(CompressionEncoding::Identity)
        );
        assert_eq!(
            CompressionEncoding::from_header(Some("identity")),
            Some(CompressionEncoding::Identity)
        );
        assert_eq!(
            CompressionEncoding::from_header(Some("gzip")),
            Some(CompressionEncoding::Gzip)
        );
        assert_eq!(CompressionEncoding::from_header(Some("snappy")), None);
        assert_eq!(CompressionEncoding::from_header(Some("br")), None);
    }

    #[test]
    fn test_codec() {
        assert!(CompressionEncoding::Identity.codec().is_none());
        assert_eq!(CompressionEncoding::Gzip.codec().unwrap().name(), "gzip");
    }

    #[test]
    fn test_grpc_negotiation_prefers_gzip() {
        assert_eq!(
            negotiate_grpc_response_encoding(Some("gzip"), CompressionEncoding::Identity),
            CompressionEncoding::Gzip
        );
        assert_eq!(
            negotiate_grpc_response_encoding(Some("identity,gzip"), CompressionEncoding::Identity),
            CompressionEncoding::Gzip
        );
    }

    #[test]
    fn test_grpc_negotiation_gzip_wins_regardless_of_order() {
        // A trailing identity token must not override an earlier gzip.
        assert_eq!(
            negotiate_grpc_response_encoding(Some("gzip, identity"), CompressionEncoding::Identity),
            CompressionEncoding::Gzip
        );
        assert_eq!(
            negotiate_grpc_response_encoding(Some("gzip identity"), CompressionEncoding::Identity),
            CompressionEncoding::Gzip
        );
    }

    #[test]
    fn test_grpc_negotiation_identity_without_gzip() {
        assert_eq!(
            negotiate_grpc_response_encoding(Some("identity"), CompressionEncoding::Gzip),
            CompressionEncoding::Identity
        );
    }

    #[test]
    fn test_grpc_negotiation_unknown_tokens_keep_default() {
        assert_eq!(
            negotiate_grpc_response_encoding(Some("snappy, br"), CompressionEncoding::Gzip),
            CompressionEncoding::Gzip
        );
        assert_eq!(
            negotiate_grpc_response_encoding(Some("snappy"), CompressionEncoding::Identity),
            CompressionEncoding::Identity
        );
    }

    #[test]
    fn test_grpc_negotiation_missing_header_keeps_default() {
        assert_eq!(
            negotiate_grpc_response_encoding(None, CompressionEncoding::Gzip),
            CompressionEncoding::Gzip
        );
    }

    #[test]
    fn test_json_negotiation() {
        assert_eq!(
            negotiate_json_response_encoding(Some("gzip")),
            CompressionEncoding::Gzip
        );
        assert_eq!(
            negotiate_json_response_encoding(Some("deflate, gzip, br")),
            CompressionEncoding::Gzip
        );
        assert_eq!(
            negotiate_json_response_encoding(Some("deflate")),
            CompressionEncoding::Identity
        );
        assert_eq!(
            negotiate_json_response_encoding(None),
            CompressionEncoding::Identity
        );
    }
}
