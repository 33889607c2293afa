//! The wire `Status` message carried in `grpc-status-details-bin` trailers.

use prost_types::Any;

/// On-wire status: the binary protobuf encoding of this message travels in
/// the `grpc-status-details-bin` trailer, base64-encoded.
///
/// Field numbers match `google.rpc.Status`, so standard clients decode it
/// with their stock types.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    /// Status code, one of the canonical gRPC code values.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Developer-facing error message.
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
    /// Typed payloads carrying structured error context.
    #[prost(message, repeated, tag = "3")]
    pub details: ::prost::alloc::vec::Vec<Any>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;

    #[test]
    fn test_status_binary_roundtrip() {
        let status = Status {
            code: 3,
            message: "bad argument".to_owned(),
            details: vec![Any {
                type_url: "type.googleapis.com/google.rpc.ErrorInfo".to_owned(),
                value: vec![1, 2, 3],
            }],
        };

        let bytes = status.encode_to_vec();
        let decoded = Status::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, status);
    }

    #[test]
    fn test_status_default_is_ok() {
        let status = Status::default();
        assert_eq!(status.code, 0);
        assert!(status.message.is_empty());
        assert!(status.details.is_empty());
    }
}
