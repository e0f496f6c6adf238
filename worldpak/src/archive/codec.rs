//! Payload decompression codecs.
//!
//! Compressed payloads are raw-DEFLATE streams (no zlib or gzip framing).
//! The codec is a trait seam so readers can be constructed with an alternate
//! implementation.

use std::io::Read;

use flate2::read::DeflateDecoder;
use thiserror::Error;

/// Errors raised while decoding a payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The compressed stream is malformed.
    #[error("inflate failed: {0}")]
    Inflate(#[source] std::io::Error),

    /// The decoded length does not match the entry's declared size.
    #[error("decoded {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Decompression seam for archive payloads.
pub trait PayloadCodec: Send + Sync {
    /// Decode `input`, verifying the result against `expected_len` when known.
    fn decompress(&self, input: &[u8], expected_len: Option<usize>) -> Result<Vec<u8>, CodecError>;
}

/// The default raw-DEFLATE codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeflateCodec;

impl PayloadCodec for DeflateCodec {
    fn decompress(&self, input: &[u8], expected_len: Option<usize>) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(expected_len.unwrap_or(input.len().saturating_mul(2)));
        DeflateDecoder::new(input)
            .read_to_end(&mut out)
            .map_err(CodecError::Inflate)?;
        if let Some(expected) = expected_len {
            if out.len() != expected {
                return Err(CodecError::LengthMismatch {
                    expected,
                    actual: out.len(),
                });
            }
        }
        Ok(out)
    }
}
