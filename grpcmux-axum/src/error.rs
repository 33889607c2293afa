use axum::http::StatusCode;
use prost_types::Any;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use grpcmux_axum_core::Status;

/// RPC status codes with the canonical gRPC integer values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Code {
    Ok = 0,
    Canceled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
            Code::Unauthenticated => "unauthenticated",
        }
    }

    /// Map a wire integer back to a code. Values outside the canonical range
    /// collapse to [`Code::Unknown`].
    pub fn from_wire(value: i32) -> Self {
        match value {
            0 => Code::Ok,
            1 => Code::Canceled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    /// HTTP status used when this code is surfaced through the JSON mode.
    ///
    /// Deterministic and always 4xx/5xx for non-OK codes.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Code::Ok => StatusCode::OK,
            Code::Canceled => StatusCode::REQUEST_TIMEOUT,
            Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Code::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            Code::Aborted => StatusCode::CONFLICT,
            Code::OutOfRange => StatusCode::BAD_REQUEST,
            Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed payload attached to a non-OK status.
///
/// Maps to `google.protobuf.Any` on the wire: a URL-like type tag plus the
/// protobuf encoding of the detail message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    type_url: String,
    value: Vec<u8>,
}

impl ErrorDetail {
    /// Create a new detail with a type URL and protobuf-encoded bytes.
    pub fn new<S: Into<String>>(type_url: S, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }

    /// Get the type tag.
    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    /// Get the protobuf-encoded value bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl From<Any> for ErrorDetail {
    fn from(any: Any) -> Self {
        Self {
            type_url: any.type_url,
            value: any.value,
        }
    }
}

impl From<ErrorDetail> for Any {
    fn from(detail: ErrorDetail) -> Self {
        Any {
            type_url: detail.type_url,
            value: detail.value,
        }
    }
}

impl Serialize for ErrorDetail {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use base64::Engine;
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("ErrorDetail", 2)?;
        // Short type names in JSON: strip the well-known resolver prefix.
        let type_name = self
            .type_url
            .strip_prefix("type.googleapis.com/")
            .unwrap_or(&self.type_url);
        s.serialize_field("type", type_name)?;

        let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(&self.value);
        s.serialize_field("value", &encoded)?;
        s.end()
    }
}

/// An error that carries the pieces the wire needs: a [`Code`], a message,
/// an optional underlying cause, and zero or more typed details.
///
/// `Display` prefixes the code; the message stored here never repeats it, so
/// the status written to the wire stays clean.
#[derive(Clone, Debug)]
pub struct RpcError {
    code: Code,
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
    details: Vec<ErrorDetail>,
}

impl RpcError {
    /// Create a new error with a code and message.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            details: Vec::new(),
        }
    }

    /// Wrap an underlying error with a code. The wire message is the
    /// underlying error's message; the original is recoverable through
    /// [`std::error::Error::source`].
    pub fn wrap<E>(code: Code, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            code,
            message: source.to_string(),
            source: Some(Arc::new(source)),
            details: Vec::new(),
        }
    }

    /// Wrap an untagged error as [`Code::Unknown`].
    pub fn unknown<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::wrap(Code::Unknown, source)
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a not found error.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Create a permission denied error.
    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    /// Create an unauthenticated error.
    pub fn unauthenticated<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    /// Create a resource exhausted error.
    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Create an unimplemented error.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unavailable error.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Get the error code.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Get the error message, without the code prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the typed details.
    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }

    /// Attach a typed detail.
    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    /// Build the wire status for this error.
    pub fn to_status(&self) -> Status {
        Status {
            code: self.code as i32,
            message: self.message.clone(),
            details: self.details.iter().cloned().map(Any::from).collect(),
        }
    }

    /// Rebuild an error from a wire status.
    pub fn from_status(status: Status) -> Self {
        Self {
            code: Code::from_wire(status.code),
            message: status.message,
            source: None,
            details: status.details.into_iter().map(ErrorDetail::from).collect(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.code.as_str())
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn std::error::Error + 'static))
    }
}

/// The JSON body written for errors in the JSON mode: the protobuf-JSON shape
/// of the wire status.
#[derive(Serialize)]
pub(crate) struct StatusBody {
    pub code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

impl StatusBody {
    pub(crate) fn from_error(err: &RpcError) -> Self {
        Self {
            code: err.code() as i32,
            message: err.message().to_owned(),
            details: err.details().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_values_are_canonical() {
        assert_eq!(Code::Ok as i32, 0);
        assert_eq!(Code::InvalidArgument as i32, 3);
        assert_eq!(Code::ResourceExhausted as i32, 8);
        assert_eq!(Code::Unimplemented as i32, 12);
        assert_eq!(Code::Unauthenticated as i32, 16);
    }

    #[test]
    fn test_code_from_wire_roundtrip() {
        for value in 0..=16 {
            assert_eq!(Code::from_wire(value) as i32, value);
        }
        assert_eq!(Code::from_wire(99), Code::Unknown);
        assert_eq!(Code::from_wire(-1), Code::Unknown);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Code::InvalidArgument.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(Code::Unauthenticated.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Code::PermissionDenied.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(Code::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(Code::Unimplemented.http_status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(Code::Internal.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Code::Unavailable.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(Code::DeadlineExceeded.http_status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_http_status_never_2xx_for_failures() {
        for value in 1..=16 {
            let status = Code::from_wire(value).http_status();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "code {value} mapped to {status}"
            );
        }
    }

    #[test]
    fn test_display_prefixes_code() {
        let err = RpcError::invalid_argument("bad input");
        assert_eq!(err.to_string(), "invalid_argument: bad input");
    }

    #[test]
    fn test_status_message_has_no_code_prefix() {
        let err = RpcError::invalid_argument("bad input");
        assert_eq!(err.to_status().message, "bad input");
    }

    #[test]
    fn test_wrap_recovers_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = RpcError::wrap(Code::Internal, io_err);

        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.message(), "disk on fire");

        let source = std::error::Error::source(&err).expect("source preserved");
        let io = source.downcast_ref::<std::io::Error>().expect("io error");
        assert_eq!(io.to_string(), "disk on fire");
    }

    #[test]
    fn test_unknown_wraps_untagged_errors() {
        let err = RpcError::unknown(std::fmt::Error);
        assert_eq!(err.code(), Code::Unknown);
    }

    #[test]
    fn test_status_roundtrip_with_details() {
        let err = RpcError::new(Code::FailedPrecondition, "not ready")
            .with_detail(ErrorDetail::new("type.googleapis.com/acme.Hint", vec![9, 8]));

        let restored = RpcError::from_status(err.to_status());
        assert_eq!(restored.code(), err.code());
        assert_eq!(restored.message(), err.message());
        assert_eq!(restored.details(), err.details());
    }

    #[test]
    fn test_status_body_json_shape() {
        let err = RpcError::new(Code::NotFound, "no such thing")
            .with_detail(ErrorDetail::new("acme.Hint", vec![1, 2, 3]));
        let json = serde_json::to_value(StatusBody::from_error(&err)).unwrap();

        assert_eq!(json["code"], 5);
        assert_eq!(json["message"], "no such thing");
        assert_eq!(json["details"][0]["type"], "acme.Hint");
        assert_eq!(json["details"][0]["value"], "AQID");
    }

    #[test]
    fn test_status_body_omits_empty_fields() {
        let err = RpcError::new(Code::Internal, "");
        let json = serde_json::to_value(StatusBody::from_error(&err)).unwrap();

        assert!(json.get("message").is_none());
        assert!(json.get("details").is_none());
    }
}
