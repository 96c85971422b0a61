//! Decoding of the compressed telemetry and position sub-streams.
//!
//! The feed ships both as base64 text wrapping a raw deflate stream of JSON.

use std::io::Read;

use base64::{engine::general_purpose::STANDARD as B64_STD, Engine as _};
use flate2::read::DeflateDecoder;
use serde::de::DeserializeOwned;
use thiserror::Error;
use timing_replay_common::events::{CarDataFeed, PositionFeed};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to inflate: {0}")]
    Inflate(#[from] std::io::Error),
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid timestamp {utc:?}: {source}")]
    Timestamp {
        utc: String,
        source: chrono::ParseError,
    },
}

/// Turns a compressed blob into its structured feed.
pub trait Inflate: Send + Sync {
    fn car_data(&self, blob: &str) -> Result<CarDataFeed, DecodeError>;
    fn position(&self, blob: &str) -> Result<PositionFeed, DecodeError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Base64Deflate;

impl Base64Deflate {
    fn decode<T: DeserializeOwned>(blob: &str) -> Result<T, DecodeError> {
        let compressed = B64_STD.decode(blob.trim())?;
        let mut json = Vec::with_capacity(compressed.len() * 4);
        DeflateDecoder::new(compressed.as_slice()).read_to_end(&mut json)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Inflate for Base64Deflate {
    fn car_data(&self, blob: &str) -> Result<CarDataFeed, DecodeError> {
        Self::decode(blob)
    }

    fn position(&self, blob: &str) -> Result<PositionFeed, DecodeError> {
        Self::decode(blob)
    }
}

/// Inverse of `Base64Deflate`, for building blobs in tests.
#[cfg(test)]
pub(crate) fn encode<T: serde::Serialize>(value: &T) -> String {
    use flate2::{write::DeflateEncoder, Compression};
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&serde_json::to_vec(value).unwrap())
        .unwrap();
    B64_STD.encode(encoder.finish().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_car_data() {
        let blob = encode(&json!({
            "Entries": [{
                "Utc": "2024-01-01T00:00:00.1234567Z",
                "Cars": {
                    "1": { "Channels": { "0": 10500, "2": 288, "3": 7, "4": 99, "5": 0, "45": 8 } }
                }
            }]
        }));
        let feed = Base64Deflate.car_data(&blob).unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].cars["1"].channels.speed, 288);
    }

    #[test]
    fn test_decodes_position() {
        let blob = encode(&json!({
            "Position": [
                {
                    "Timestamp": "2024-01-01T00:00:00Z",
                    "Entries": { "1": { "Status": "OnTrack", "X": 1, "Y": 2, "Z": 3 } }
                },
                { "Timestamp": "2024-01-01T00:00:00.22Z", "Entries": {} }
            ]
        }));
        let feed = Base64Deflate.position(&blob).unwrap();
        assert_eq!(feed.position.len(), 2);
        assert_eq!(feed.position[0].entries["1"].z, 3.0);
    }

    #[test]
    fn test_bad_base64() {
        assert!(matches!(
            Base64Deflate.car_data("!!not base64!!"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn test_not_deflate() {
        let blob = B64_STD.encode([0xffu8; 16]);
        assert!(matches!(
            Base64Deflate.position(&blob),
            Err(DecodeError::Inflate(_))
        ));
    }

    #[test]
    fn test_wrong_shape() {
        let blob = encode(&json!({ "Entries": "nope" }));
        assert!(matches!(
            Base64Deflate.car_data(&blob),
            Err(DecodeError::Json(_))
        ));
    }
}
