//! Versioned model artifacts.
//!
//! Two encodings of the same model are supported:
//!
//! ```text
//! binary:  header (16 bytes) | postcard payload
//! text:    {"format": "fastbdt", "version": 1, "model": {...}}
//! ```
//!
//! Header layout (little-endian):
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Magic ("FBDT")
//! 4       1     Version major
//! 5       1     Version minor
//! 6       2     Reserved
//! 8       4     Payload size (bytes)
//! 12      4     CRC32 checksum of payload
//! ```
//!
//! Readers reject newer major versions; compatibility across major versions
//! is not provided.

use std::io::{self, Read, Write};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"FBDT";
pub const FORMAT_NAME: &str = "fastbdt";
pub const CURRENT_VERSION_MAJOR: u8 = 1;
pub const CURRENT_VERSION_MINOR: u8 = 0;
pub const HEADER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelFormat {
    #[default]
    Binary,
    Json,
}

impl ModelFormat {
    /// Binary artifacts start with the magic bytes; anything else is read as
    /// JSON.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(MAGIC) {
            Self::Binary
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a fastbdt model")]
    NotAModel,

    #[error("model format {major}.{minor} is newer than this reader")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("artifact truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("encoding error: {0}")]
    Encoding(postcard::Error),

    #[error("decoding error: {0}")]
    Decoding(postcard::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt payload: {0}")]
    CorruptPayload(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub payload_size: u32,
    pub checksum: u32,
}

impl FormatHeader {
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            version_major: CURRENT_VERSION_MAJOR,
            version_minor: CURRENT_VERSION_MINOR,
            payload_size: payload.len() as u32,
            checksum: crc32fast::hash(payload),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version_major;
        buf[5] = self.version_minor;
        buf[8..12].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, FormatError> {
        if &buf[0..4] != MAGIC {
            return Err(FormatError::NotAModel);
        }
        let version_major = buf[4];
        let version_minor = buf[5];
        if version_major > CURRENT_VERSION_MAJOR {
            return Err(FormatError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }
        Ok(Self {
            version_major,
            version_minor,
            payload_size: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            checksum: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }
}

pub fn encode_binary<T: Serialize>(model: &T) -> Result<Vec<u8>, FormatError> {
    let payload = postcard::to_allocvec(model).map_err(FormatError::Encoding)?;
    let header = FormatHeader::for_payload(&payload);
    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub fn decode_binary<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FormatError> {
    let header_bytes: &[u8; HEADER_SIZE] = bytes
        .get(..HEADER_SIZE)
        .and_then(|head| head.try_into().ok())
        .ok_or(FormatError::Truncated {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        })?;
    let header = FormatHeader::from_bytes(header_bytes)?;

    let body = &bytes[HEADER_SIZE..];
    let payload_size = header.payload_size as usize;
    if body.len() < payload_size {
        return Err(FormatError::Truncated {
            expected: HEADER_SIZE + payload_size,
            actual: bytes.len(),
        });
    }
    if body.len() > payload_size {
        return Err(FormatError::CorruptPayload(format!(
            "{} unexpected bytes after payload",
            body.len() - payload_size
        )));
    }
    decode_payload(&header, body)
}

fn decode_payload<T: DeserializeOwned>(header: &FormatHeader, payload: &[u8]) -> Result<T, FormatError> {
    let actual = crc32fast::hash(payload);
    if actual != header.checksum {
        return Err(FormatError::ChecksumMismatch {
            expected: header.checksum,
            actual,
        });
    }
    let (model, rest) = postcard::take_from_bytes(payload).map_err(FormatError::Decoding)?;
    if !rest.is_empty() {
        return Err(FormatError::CorruptPayload(format!(
            "{} undecoded payload bytes",
            rest.len()
        )));
    }
    Ok(model)
}

/// Writes a binary artifact; I/O failures leave a partial file behind.
pub fn write_binary<W: Write, T: Serialize>(writer: &mut W, model: &T) -> crate::Result<()> {
    let bytes = encode_binary(model)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Reads exactly one binary artifact from `reader`.
pub fn read_binary<R: Read, T: DeserializeOwned>(reader: &mut R) -> crate::Result<T> {
    let mut header_buf = [0u8; HEADER_SIZE];
    read_exact_or_truncated(reader, &mut header_buf, 0)?;
    let header = FormatHeader::from_bytes(&header_buf)?;

    let mut payload = vec![0u8; header.payload_size as usize];
    read_exact_or_truncated(reader, &mut payload, HEADER_SIZE)?;
    Ok(decode_payload(&header, &payload)?)
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8], offset: usize) -> crate::Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FormatError::Truncated {
                expected: offset + buf.len(),
                actual: offset,
            }
            .into()
        } else {
            e.into()
        }
    })
}

#[derive(Serialize)]
struct JsonEnvelopeRef<'a, T> {
    format: &'a str,
    version: u8,
    model: &'a T,
}

#[derive(Deserialize)]
struct JsonEnvelope<T> {
    format: String,
    version: u8,
    model: T,
}

pub fn encode_json<T: Serialize>(model: &T) -> Result<String, FormatError> {
    let envelope = JsonEnvelopeRef {
        format: FORMAT_NAME,
        version: CURRENT_VERSION_MAJOR,
        model,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, FormatError> {
    let header: JsonEnvelope<serde::de::IgnoredAny> = serde_json::from_str(text)?;
    if header.format != FORMAT_NAME {
        return Err(FormatError::NotAModel);
    }
    if header.version > CURRENT_VERSION_MAJOR {
        return Err(FormatError::UnsupportedVersion {
            major: header.version,
            minor: 0,
        });
    }
    let envelope: JsonEnvelope<T> = serde_json::from_str(text)?;
    Ok(envelope.model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FastBdtError;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        values: Vec<f64>,
        nested: Option<Vec<u32>>,
    }

    fn sample() -> Sample {
        Sample {
            name: "stump".into(),
            values: vec![0.1, -2.5e-300, 1.0 / 3.0],
            nested: Some(vec![3, 1, 2]),
        }
    }

    #[test]
    fn test_header_layout() {
        let header = FormatHeader::for_payload(b"abc");
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"FBDT");
        assert_eq!(bytes[4], CURRENT_VERSION_MAJOR);
        assert_eq!(&bytes[8..12], &3u32.to_le_bytes());
        assert_eq!(FormatHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_binary_and_json_preserve_floats_exactly() {
        let bytes = encode_binary(&sample()).unwrap();
        assert_eq!(ModelFormat::detect(&bytes), ModelFormat::Binary);
        assert_eq!(decode_binary::<Sample>(&bytes).unwrap(), sample());

        let text = encode_json(&sample()).unwrap();
        assert_eq!(ModelFormat::detect(text.as_bytes()), ModelFormat::Json);
        assert_eq!(decode_json::<Sample>(&text).unwrap(), sample());
    }

    #[test]
    fn test_truncated_binary_rejected() {
        let bytes = encode_binary(&sample()).unwrap();
        for len in [0, 4, HEADER_SIZE, bytes.len() - 1] {
            assert!(matches!(
                decode_binary::<Sample>(&bytes[..len]),
                Err(FormatError::Truncated { .. })
            ));
        }

        let mut reader = &bytes[..bytes.len() - 1];
        assert!(matches!(
            read_binary::<_, Sample>(&mut reader),
            Err(FastBdtError::Serialization(FormatError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = encode_binary(&sample()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            decode_binary::<Sample>(&bytes),
            Err(FormatError::ChecksumMismatch { .. })
        ));

        let mut bytes = encode_binary(&sample()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_binary::<Sample>(&bytes),
            Err(FormatError::CorruptPayload(_))
        ));

        let mut bytes = encode_binary(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode_binary::<Sample>(&bytes), Err(FormatError::NotAModel)));
    }

    #[test]
    fn test_newer_versions_rejected() {
        let mut bytes = encode_binary(&sample()).unwrap();
        bytes[4] = CURRENT_VERSION_MAJOR + 1;
        assert!(matches!(
            decode_binary::<Sample>(&bytes),
            Err(FormatError::UnsupportedVersion { .. })
        ));

        let text = encode_json(&sample())
            .unwrap()
            .replace("\"version\": 1", "\"version\": 2");
        assert!(matches!(
            decode_json::<Sample>(&text),
            Err(FormatError::UnsupportedVersion { major: 2, .. })
        ));

        let text = encode_json(&sample()).unwrap().replace("fastbdt", "other");
        assert!(matches!(decode_json::<Sample>(&text), Err(FormatError::NotAModel)));
    }

    #[test]
    fn test_stream_round_trip() {
        let mut buffer = Vec::new();
        write_binary(&mut buffer, &sample()).unwrap();
        let mut reader = buffer.as_slice();
        assert_eq!(read_binary::<_, Sample>(&mut reader).unwrap(), sample());
    }
}
