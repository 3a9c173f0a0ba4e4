use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamdock_core::ShardIteratorType;

pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Parse a boolean value from a raw string, accepting common env-style forms.
///
/// Accepted truthy values (case-insensitive): `"1"`, `"true"`, `"yes"`,
/// `"on"`.
/// Accepted falsy values: `"0"`, `"false"`, `"no"`, `"off"`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_iterator_type(raw: &str) -> Option<ShardIteratorType> {
    match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
        "TRIM_HORIZON" => Some(ShardIteratorType::TrimHorizon),
        "LATEST" => Some(ShardIteratorType::Latest),
        "AT_SEQUENCE_NUMBER" => Some(ShardIteratorType::AtSequenceNumber),
        "AFTER_SEQUENCE_NUMBER" => Some(ShardIteratorType::AfterSequenceNumber),
        _ => None,
    }
}

/// Duration written either as milliseconds or as a humantime string
/// (`"500ms"`, `"2s"`, `"1m 30s"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DurationValue {
    Millis(u64),
    Text(String),
}

impl DurationValue {
    pub fn resolve(&self) -> Result<Duration, humantime::DurationError> {
        match self {
            DurationValue::Millis(millis) => Ok(Duration::from_millis(*millis)),
            DurationValue::Text(text) => humantime::parse_duration(text.trim()),
        }
    }

    pub fn display(&self) -> String {
        match self {
            DurationValue::Millis(millis) => format!("{millis}ms"),
            DurationValue::Text(text) => text.clone(),
        }
    }
}
