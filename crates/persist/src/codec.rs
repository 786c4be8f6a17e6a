//! Compressed, versioned encoding for commit and stash files.
//!
//! Layout: zstd( CBOR{ format, kind, body } ). Body fields are named maps, so
//! additive optional fields stay readable by older builds; anything that is
//! not additive must bump [`FORMAT_VERSION`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::record::{Commit, Stash};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Default zstd level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// A value the codec knows how to frame.
pub trait Record: Serialize + DeserializeOwned {
    /// Tag written into the envelope so a stash file is never read as a commit.
    const KIND: &'static str;
}

impl Record for Commit {
    const KIND: &'static str = "commit";
}

impl Record for Stash {
    const KIND: &'static str = "stash";
}

/// Errors from encoding or decoding a record.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("zstd compression failed: {0}")]
    Compress(#[source] std::io::Error),
    #[error("zstd decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    Encode(String),
    #[error("CBOR deserialization error: {0}")]
    Decode(String),
    #[error("unsupported format version: found v{found}, expected v{expected}")]
    UnsupportedFormat { found: u32, expected: u32 },
    #[error("wrong record kind: found {found:?}, expected {expected:?}")]
    WrongKind { found: String, expected: &'static str },
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    format: u32,
    kind: &'a str,
    body: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    format: u32,
    kind: String,
    body: ciborium::Value,
}

/// CBOR + zstd codec.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    level: i32,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Codec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn encode<T: Record>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let envelope = EnvelopeRef {
            format: FORMAT_VERSION,
            kind: T::KIND,
            body: value,
        };
        let mut cbor = Vec::new();
        ciborium::into_writer(&envelope, &mut cbor)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        self.compress(&cbor)
    }

    pub fn decode<T: Record>(&self, data: &[u8]) -> Result<T, CodecError> {
        let cbor = decompress(data)?;
        let envelope: Envelope = ciborium::from_reader(cbor.as_slice())
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        if envelope.format != FORMAT_VERSION {
            return Err(CodecError::UnsupportedFormat {
                found: envelope.format,
                expected: FORMAT_VERSION,
            });
        }
        if envelope.kind != T::KIND {
            return Err(CodecError::WrongKind {
                found: envelope.kind,
                expected: T::KIND,
            });
        }
        envelope
            .body
            .deserialized()
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = zstd::Encoder::new(Vec::new(), self.level).map_err(CodecError::Compress)?;
        encoder.write_all(data).map_err(CodecError::Compress)?;
        encoder.finish().map_err(CodecError::Compress)
    }
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = zstd::Decoder::new(data).map_err(CodecError::Decompress)?;
    let mut buf = Vec::new();
    decoder
        .read_to_end(&mut buf)
        .map_err(CodecError::Decompress)?;
    Ok(buf)
}
