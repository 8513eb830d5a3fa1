use std::io::{Read, Write};

use flate2::{Compression, read::DeflateDecoder, write::DeflateEncoder};
use jwx_error::ErrorContext;

use crate::jose::{CompressionAlgorithm, ErrorKind, JoseError, error::WithKind};

/// Upper bound on an inflated JWE payload unless configured otherwise.
pub const DEFAULT_MAX_INFLATED_LEN: usize = 1024 * 1024;

impl CompressionAlgorithm {
    /// Compress a plaintext before it is encrypted.
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>, JoseError> {
        match self {
            Self::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder
                    .write_all(data)
                    .context("deflate payload")
                    .with_kind(ErrorKind::Compression)?;
                encoder
                    .finish()
                    .context("finish deflate stream")
                    .with_kind(ErrorKind::Compression)
            }
        }
    }

    /// Inflate a decrypted payload, failing once it grows past `max_len` bytes.
    pub fn decompress(self, data: &[u8], max_len: usize) -> Result<Vec<u8>, JoseError> {
        match self {
            Self::Deflate => {
                let limit = u64::try_from(max_len)
                    .unwrap_or(u64::MAX)
                    .saturating_add(1);
                let mut inflated = Vec::new();
                DeflateDecoder::new(data)
                    .take(limit)
                    .read_to_end(&mut inflated)
                    .context("inflate payload")
                    .with_kind(ErrorKind::Compression)?;
                if inflated.len() > max_len {
                    return Err(JoseError::from_display(
                        ErrorKind::Compression,
                        format!("inflated payload exceeds {max_len} bytes"),
                    ));
                }
                Ok(inflated)
            }
        }
    }
}
