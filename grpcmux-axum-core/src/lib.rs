//! Wire-level primitives for the gRPC family of protocols.
//!
//! This crate provides the pieces of the wire contract that do not depend on
//! any particular HTTP stack:
//!
//! - [`codec`]: per-message compression codecs (identity, gzip)
//! - [`frame`]: length-prefixed message framing
//! - [`headers`]: gRPC header encodings (percent escaping, `-bin` base64)
//! - [`status`]: the binary `Status` message carried in trailers

mod codec;
mod frame;
mod headers;
mod status;

pub use codec::*;
pub use frame::*;
pub use headers::*;
pub use status::*;
