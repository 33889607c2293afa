//! Header value encodings for the gRPC family.
//!
//! `grpc-message` trailers are percent-escaped so arbitrary UTF-8 survives
//! transports that only pass printable ASCII. `-bin` suffixed headers carry
//! raw bytes as unpadded URL-safe base64.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// URL-safe base64 without padding on encode, indifferent to padding on
/// decode, so peers that emit padded values still parse.
const BASE64_BIN: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const UPPER_HEX: &[u8; 16] = b"0123456789ABCDEF";

fn is_unreserved(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte) && byte != b'%'
}

/// Percent-escape a message for the `grpc-message` trailer.
///
/// Every `%` and every byte outside printable ASCII (0x20-0x7E) becomes an
/// upper-case `%XX` escape; everything else passes through untouched.
pub fn percent_encode(message: &str) -> String {
    let bytes = message.as_bytes();
    if bytes.iter().copied().all(is_unreserved) {
        return message.to_owned();
    }

    let mut out = String::with_capacity(bytes.len() + bytes.len() / 2);
    for &byte in bytes {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(UPPER_HEX[(byte >> 4) as usize] as char);
            out.push(UPPER_HEX[(byte & 0x0F) as usize] as char);
        }
    }
    out
}

/// Invert [`percent_encode`].
///
/// Malformed escapes (a `%` not followed by two hex digits) pass through
/// as-is rather than failing the whole value.
pub fn percent_decode(message: &str) -> String {
    let bytes = message.as_bytes();
    if !bytes.contains(&b'%') {
        return message.to_owned();
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push(((hi << 4) | lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Encode raw bytes for a `-bin` suffixed header.
pub fn encode_binary_header(bytes: &[u8]) -> String {
    BASE64_BIN.encode(bytes)
}

/// Decode a `-bin` suffixed header value, padded or not.
pub fn decode_binary_header(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_BIN.decode(value)
}
