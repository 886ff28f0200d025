//! Text encoding of the persisted reading: the reading serialized field-for-field as JSON, then
//! wrapped in standard base64 so it survives any string-only store untouched.

use anyhow::ensure;
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{prelude::*, reading::LocationReading};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("saved record is not valid base64: {0}")]
    Transport(#[from] base64::DecodeError),
    #[error("saved record has a malformed structure: {0}")]
    Structure(#[from] serde_json::Error),
}

pub fn encode_record(reading: &LocationReading) -> Result<String> {
    let coords = &reading.coords;
    // JSON has no representation for these, they'd be written as null and never read back
    ensure!(
        coords.latitude.is_finite() && coords.longitude.is_finite() && coords.accuracy.is_finite(),
        "Refusing to encode a reading with non-finite coordinates"
    );
    let json = serde_json::to_vec(reading).context("Failed to serialize location record")?;
    Ok(STANDARD.encode(json))
}

pub fn decode_record(raw: &str) -> Result<LocationReading, RecordError> {
    let json = STANDARD.decode(raw.trim())?;
    Ok(serde_json::from_slice(&json)?)
}
