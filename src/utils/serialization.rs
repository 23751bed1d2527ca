// src/utils/serialization.rs
//! Serialization utilities for published documents.
//!
//! Every document the engine publishes goes through [`render_document`], so
//! two renders of equal values are byte-identical.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Renders a document as pretty-printed JSON bytes (two-space indent).
pub fn render_document<T: Serialize>(document: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(document)
}

/// Parses a stored document back into its typed form.
pub fn parse_document<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// ISO-8601 UTC timestamp with millisecond precision, e.g. `2024-05-01T10:00:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
