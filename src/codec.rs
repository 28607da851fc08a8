//! JSON payload codec.
//!
//! All orchestration and activity inputs and outputs cross the engine
//! boundary as encoded text. The engine itself treats payloads as opaque;
//! this module is the seam where typed registration helpers and typed task
//! adapters convert between values and their encoded form.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value as JSON text.
pub fn encode<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

/// Decode JSON text into a value. Empty text decodes as JSON `null`, so
/// absent payloads round-trip into `Option`s and unit types.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let text = if text.is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| e.to_string())
}
