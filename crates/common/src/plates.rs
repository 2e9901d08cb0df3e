//! Plate recognition contracts shared by the engine and its consumers.
//!
//! This module defines how a captured frame is handed to the recognizer and
//! what a successful reading looks like once it comes back.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::validation::{validate_length, MAX_IMAGE_PAYLOAD_BYTES};

/// A single captured frame as delivered by a camera client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum ImageInput {
    /// Base64 text, optionally prefixed with a data-URL header
    /// (`data:image/jpeg;base64,...`)
    Base64(String),

    /// Raw encoded image bytes (JPEG, PNG, ...)
    Bytes(Vec<u8>),
}

impl ImageInput {
    pub fn base64(data: impl Into<String>) -> Self {
        Self::Base64(data.into())
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into())
    }

    /// Resolve the payload into encoded image bytes.
    ///
    /// Base64 payloads have any data-URL header stripped before decoding.
    pub fn encoded_bytes(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            ImageInput::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(anyhow!("Image payload is empty"));
                }
                if bytes.len() > MAX_IMAGE_PAYLOAD_BYTES {
                    return Err(anyhow!(
                        "Image payload exceeds maximum size of {} bytes (got {})",
                        MAX_IMAGE_PAYLOAD_BYTES,
                        bytes.len()
                    ));
                }
                Ok(Cow::Borrowed(bytes))
            }
            ImageInput::Base64(text) => {
                // Clients wrap long payloads at 76 columns (MIME style)
                let payload: String = strip_data_url_header(text)
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                if payload.is_empty() {
                    return Err(anyhow!("Image payload is empty"));
                }
                // base64 inflates by 4/3
                validate_length(&payload, MAX_IMAGE_PAYLOAD_BYTES / 3 * 4 + 4, "image payload")?;
                let decoded = base64::prelude::BASE64_STANDARD
                    .decode(payload.as_bytes())
                    .context("Failed to decode base64 image")?;
                Ok(Cow::Owned(decoded))
            }
        }
    }
}

/// Drop a `data:<mime>;base64,` style header if one is present.
pub fn strip_data_url_header(text: &str) -> &str {
    match text.split_once(',') {
        Some((_, payload)) => payload,
        None => text,
    }
}

/// Uppercase a raw OCR fragment and keep only ASCII letters and digits.
pub fn normalize_plate_text(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_uppercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// A validated plate reading produced by the recognizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateReading {
    /// Normalized plate string (uppercase, alphanumeric, grammar-shaped)
    pub plate: String,

    /// Identifier of the grammar the plate matched (e.g. "COL_CARRO")
    pub grammar: String,

    /// Candidate score (higher is better)
    pub score: i32,

    /// Number of confusable characters that had to be substituted
    pub penalty: u32,

    /// Name of the image variant that produced the reading
    pub variant: String,

    /// Raw OCR fragment the reading was extracted from
    pub fragment: String,
}
