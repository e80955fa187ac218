//! Storage encoding for scan results.

use crate::errors::EncodeError;
use crate::models::ScanResult;

/// Serialize a result to the JSON document stored in the blob store.
pub fn encode(result: &ScanResult) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(result)?)
}

pub fn decode(bytes: &[u8]) -> Result<ScanResult, EncodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Blob key for a result: `scans/<target>_<unixSeconds>.json`.
pub fn result_key(target: &str, unix_secs: i64) -> String {
    format!("scans/{target}_{unix_secs}.json")
}
