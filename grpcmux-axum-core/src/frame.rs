//! Length-prefixed message framing.
//!
//! Every message in the gRPC family is framed as
//!
//! ```text
//! [flags:1][length:4, big-endian][payload:length]
//! ```
//!
//! Flags bit 0 marks a compressed payload. The remaining bits are reserved;
//! frames carrying them are rejected.

use bytes::Bytes;

use crate::codec::BoxedCodec;

/// Frame flag bits.
pub mod frame_flags {
    /// Payload is compressed with the negotiated message encoding.
    pub const COMPRESSED: u8 = 0b0000_0001;
}

/// Size of the frame prefix (flags + length).
pub const FRAME_HEADER_SIZE: usize = 5;

/// Errors produced while framing or deframing messages.
#[derive(Clone, Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a frame prefix.
    #[error("incomplete frame header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// The payload is shorter than the declared length.
    #[error("incomplete frame: declared {declared} payload bytes, got {actual}")]
    TruncatedPayload { declared: usize, actual: usize },

    /// Bytes remain after the declared payload.
    #[error("frame has {0} unexpected trailing bytes")]
    TrailingBytes(usize),

    /// Reserved flag bits were set.
    #[error("invalid frame flags: 0x{0:02x}")]
    InvalidFlags(u8),

    /// The (decompressed) payload exceeds the configured maximum.
    #[error("message larger than configured maximum of {max} bytes")]
    PayloadTooLarge { max: usize },

    /// The compressed flag was set but no message encoding was negotiated.
    #[error("frame is compressed but no message encoding was negotiated")]
    CompressedWithoutCodec,

    /// Decompression failed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Compression failed.
    #[error("compression failed: {0}")]
    Compression(String),
}

/// Decode a single length-prefixed message.
///
/// `codec` is the negotiated request encoding (`None` for identity).
/// `max_bytes` bounds the decompressed payload; `0` means unbounded. The
/// bound is enforced before allocation for identity frames and through a
/// bounded reader for compressed frames, so an oversized message is rejected
/// with [`FrameError::PayloadTooLarge`] either way.
pub fn decode_frame(
    data: Bytes,
    codec: Option<&BoxedCodec>,
    max_bytes: usize,
) -> Result<Bytes, FrameError> {
    if data.len() < FRAME_HEADER_SIZE {
        return Err(FrameError::IncompleteHeader {
            expected: FRAME_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]) as usize;

    if flags & !frame_flags::COMPRESSED != 0 {
        return Err(FrameError::InvalidFlags(flags));
    }

    let expected_len = FRAME_HEADER_SIZE + length;
    if data.len() < expected_len {
        return Err(FrameError::TruncatedPayload {
            declared: length,
            actual: data.len() - FRAME_HEADER_SIZE,
        });
    }
    if data.len() > expected_len {
        return Err(FrameError::TrailingBytes(data.len() - expected_len));
    }

    let payload = data.slice(FRAME_HEADER_SIZE..expected_len);

    if flags & frame_flags::COMPRESSED == 0 {
        if max_bytes > 0 && payload.len() > max_bytes {
            return Err(FrameError::PayloadTooLarge { max: max_bytes });
        }
        return Ok(payload);
    }

    let Some(codec) = codec else {
        return Err(FrameError::CompressedWithoutCodec);
    };

    let decompressed = if max_bytes > 0 {
        codec.decompress_limited(&payload, max_bytes)
    } else {
        codec.decompress(&payload)
    }
    .map_err(|e| FrameError::Decompression(e.to_string()))?;

    if max_bytes > 0 && decompressed.len() > max_bytes {
        return Err(FrameError::PayloadTooLarge { max: max_bytes });
    }
    Ok(decompressed)
}

/// Encode a single length-prefixed message.
///
/// `codec` is the negotiated response encoding (`None` for identity). Empty
/// payloads are never compressed; gzip overhead would only grow them.
pub fn encode_frame(payload: &[u8], codec: Option<&BoxedCodec>) -> Result<Vec<u8>, FrameError> {
    let (payload, flags) = match codec {
        Some(codec) if !payload.is_empty() => {
            let compressed = codec
                .compress(payload)
                .map_err(|e| FrameError::Compression(e.to_string()))?;
            (compressed, frame_flags::COMPRESSED)
        }
        _ => (Bytes::copy_from_slice(payload), 0),
    };

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.push(flags);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}
