//! Optional request framing: gzip compression behind a big-endian `u32`
//! length prefix.
//!
//! The default request path does not frame payloads. These helpers are for
//! gateways configured to expect `len(4, BE) || gzip(payload)`.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::warn;

use crate::CryptoError;

const LENGTH_PREFIX_LEN: usize = 4;

/// Frame `data` as `len(4, BE) || payload`, gzip-compressing the payload
/// when `compress` is set. The prefix holds the length of the payload as
/// written, so compressed frames carry the compressed size.
pub fn encode_framed_payload(data: &[u8], compress: bool) -> Result<Vec<u8>, CryptoError> {
    let payload = if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| CryptoError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CryptoError::Compression(e.to_string()))?
    } else {
        data.to_vec()
    };

    let len = u32::try_from(payload.len())
        .map_err(|_| CryptoError::InvalidFormat(format!("payload too large: {} bytes", payload.len())))?;

    let mut framed = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Inverse of [`encode_framed_payload`].
///
/// A prefix that disagrees with the actual payload length is logged and
/// otherwise ignored; the whole remainder is decoded.
pub fn decode_framed_payload(data: &[u8], compressed: bool) -> Result<Vec<u8>, CryptoError> {
    if data.len() < LENGTH_PREFIX_LEN {
        return Err(CryptoError::InvalidFormat(format!(
            "framed payload too short: {} bytes",
            data.len()
        )));
    }

    let (prefix, payload) = data.split_at(LENGTH_PREFIX_LEN);
    let declared = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    if usize::try_from(declared).ok() != Some(payload.len()) {
        warn!(
            declared,
            actual = payload.len(),
            "framed payload length prefix does not match"
        );
    }

    if !compressed {
        return Ok(payload.to_vec());
    }

    let mut out = Vec::new();
    GzDecoder::new(payload)
        .read_to_end(&mut out)
        .map_err(|e| CryptoError::Compression(e.to_string()))?;
    Ok(out)
}
